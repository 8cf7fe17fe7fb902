//! Request dispatch for daemon connections.
//!
//! Each connection carries exactly one request. The client writes the whole
//! request, closes its write half, and reads the reply until the daemon
//! closes the connection.
//!
//! ## Protocol
//!
//! The first line is a header tokenised with shell quoting rules:
//!
//! ```text
//! <token> <cwd> <command> [args...]
//! ```
//!
//! Everything after the first newline is the body. It becomes the command's
//! standard input byte for byte. Whatever the command writes to standard
//! output or standard error is sent back over the connection. A failed
//! request is answered with a single line:
//!
//! ```text
//! error: unknown server command "lint"
//! ```
//!
//! ## Commands
//!
//! `stop` shuts the daemon down. `exec` runs the analyser in `cwd` with the
//! header arguments and the body as input. Any other name is rejected
//! before the standard streams are touched.

mod diagnostics;
mod errors;
mod handler;
mod request;
mod router;

#[cfg(test)]
pub(crate) mod test_utils;

pub use self::diagnostics::{DiagnosticSink, TracingDiagnostics};
pub use self::errors::DispatchError;
pub use self::handler::{DispatchConnectionHandler, MAX_REQUEST_BYTES};
pub use self::request::{Header, Request, RequestDecoder};
pub use self::router::{ConnectionOutput, Dispatcher};
