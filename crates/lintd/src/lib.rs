//! Lint daemon core.
//!
//! `lintd` keeps a code analyser ready behind a local socket so editor and
//! shell clients avoid paying its start-up cost on every run. A client
//! connects, writes one request, half-closes the connection, and reads the
//! command's output until the daemon closes its side.
//!
//! A request is a shell-quoted header line followed by a body:
//!
//! ```text
//! <token> <cwd> <command> [args...]
//! <body bytes, passed to the command as standard input>
//! ```
//!
//! The [`dispatch`] module decodes requests and maps the command name onto
//! the closed set of [`command::ServerCommand`] variants. While a command
//! runs, the [`stdio`] handles of its thread are bound to the connection, so
//! commands read and write "standard" streams without knowing where they
//! lead. Bindings are per thread and always restored, so concurrent requests
//! never see each other's streams.
//!
//! Every request must carry the token the daemon writes to its runtime
//! directory at start-up. Lifecycle events are reported through a
//! [`HealthReporter`], and logs are emitted with `tracing`.

pub mod command;
pub mod dispatch;
mod health;
mod process;
pub mod stdio;
mod telemetry;
mod transport;

pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{Daemon, LaunchError, ShutdownError, ShutdownTrigger, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::{ConnectionHandler, ConnectionStream, ListenerError};

#[cfg(test)]
mod tests;
