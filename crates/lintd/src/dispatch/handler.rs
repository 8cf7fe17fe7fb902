//! Connection handler that decodes and dispatches requests.
//!
//! This module provides the `DispatchConnectionHandler` which implements the
//! `ConnectionHandler` trait from the transport layer. It reads the whole
//! connection, decodes the request, runs the command with the connection as
//! its standard streams, and closes the write half once the command returns.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::errors::DispatchError;
use super::request::RequestDecoder;
use super::router::{DISPATCH_TARGET, Dispatcher};

/// Maximum size of a request, header and body together.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Connection handler serving one request per connection.
///
/// Failures are logged and reported to the client as a single
/// `error: <message>` line; the daemon keeps serving either way.
#[derive(Debug)]
pub struct DispatchConnectionHandler {
    decoder: RequestDecoder,
    dispatcher: Dispatcher,
}

impl DispatchConnectionHandler {
    pub fn new(decoder: RequestDecoder, dispatcher: Dispatcher) -> Self {
        Self {
            decoder,
            dispatcher,
        }
    }

    fn serve(&self, stream: &mut ConnectionStream) -> Result<(), DispatchError> {
        let raw = read_request(stream, MAX_REQUEST_BYTES)?;
        if raw.is_empty() {
            debug!(target: DISPATCH_TARGET, "client disconnected without request");
            return Ok(());
        }
        let request = self.decoder.decode(&raw)?;

        debug!(
            target: DISPATCH_TARGET,
            command = %request.header.command,
            cwd = %request.header.cwd,
            body_lines = request.body_lines(),
            "dispatching request"
        );

        self.dispatcher.handle(request, &*stream)
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        if let Err(error) = self.serve(&mut stream) {
            warn!(target: DISPATCH_TARGET, %error, "request failed");
            report_error(&mut stream, &error);
        }
        if let Err(error) = stream.shutdown_write() {
            debug!(target: DISPATCH_TARGET, %error, "failed to close connection");
        }
    }
}

/// Reads until the client closes its write half.
fn read_request(stream: &mut impl Read, max_size: usize) -> Result<Vec<u8>, DispatchError> {
    let mut buffer = Vec::new();
    let limit = u64::try_from(max_size)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    stream.by_ref().take(limit).read_to_end(&mut buffer)?;
    if buffer.len() > max_size {
        return Err(DispatchError::request_too_large(max_size));
    }
    Ok(buffer)
}

fn report_error(stream: &mut impl Write, error: &DispatchError) {
    let written = writeln!(stream, "error: {error}").and_then(|()| stream.flush());
    if let Err(write_error) = written {
        debug!(target: DISPATCH_TARGET, error = %write_error, "failed to report error");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::under(15, true)]
    #[case::at_limit(16, true)]
    #[case::over(17, false)]
    fn bounds_request_size(#[case] len: usize, #[case] accepted: bool) {
        let mut input = Cursor::new(vec![b'x'; len]);
        let result = read_request(&mut input, 16);
        match result {
            Ok(bytes) => {
                assert!(accepted, "request of {len} bytes should be rejected");
                assert_eq!(bytes.len(), len);
            }
            Err(DispatchError::RequestTooLarge { max_size }) => {
                assert!(!accepted, "request of {len} bytes should be accepted");
                assert_eq!(max_size, 16);
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reports_errors_as_a_single_line() {
        let mut output = Vec::new();
        report_error(&mut output, &DispatchError::unknown_server_command("lint"));
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "error: unknown server command \"lint\"\n"
        );
    }

    #[cfg(unix)]
    mod connection {
        use std::net::Shutdown;
        use std::os::unix::net::UnixStream;

        use rstest::{fixture, rstest};

        use super::*;
        use crate::command::{ServerContext, TokenVerifier};
        use crate::process::ShutdownTrigger;

        struct Harness {
            handler: DispatchConnectionHandler,
            shutdown: ShutdownTrigger,
        }

        impl Harness {
            /// Sends `request`, runs the handler, and returns the reply.
            fn exchange(&self, request: &[u8]) -> String {
                let (server, mut client) = UnixStream::pair().expect("socket pair");
                client.write_all(request).expect("send request");
                client.shutdown(Shutdown::Write).expect("close request");

                self.handler.handle(ConnectionStream::Unix(server));

                let mut reply = String::new();
                client.read_to_string(&mut reply).expect("read reply");
                reply
            }
        }

        #[fixture]
        fn harness() -> Harness {
            let shutdown = ShutdownTrigger::new();
            let context = ServerContext::new(TokenVerifier::new("tok123"), shutdown.clone())
                .with_analyser("cat");
            Harness {
                handler: DispatchConnectionHandler::new(
                    RequestDecoder::new(false),
                    Dispatcher::new(context),
                ),
                shutdown,
            }
        }

        #[rstest]
        fn exec_replies_with_analyser_output(harness: Harness) {
            let dir = tempfile::tempdir().expect("temp dir");
            let cwd = shell_words::quote(dir.path().to_str().expect("utf8 path")).into_owned();
            let reply = harness.exchange(format!("tok123 {cwd} exec\nputs 1\n").as_bytes());
            assert_eq!(reply, "puts 1\n");
        }

        #[rstest]
        fn silent_client_gets_no_reply(harness: Harness) {
            assert!(harness.exchange(b"").is_empty());
        }

        #[rstest]
        fn stop_closes_connection_without_output(harness: Harness) {
            let reply = harness.exchange(b"tok123 /tmp stop\n");
            assert!(reply.is_empty(), "unexpected reply: {reply}");
            assert!(harness.shutdown.is_tripped());
        }

        #[rstest]
        #[case::malformed(b"tok123 '/tmp stop\n".as_slice(), "error: malformed header")]
        #[case::blank_header(b"\n".as_slice(), "error: malformed header")]
        #[case::unknown(b"tok123 /tmp lint\n".as_slice(), "error: unknown server command \"lint\"")]
        #[case::foreign_token(b"intruder /tmp stop\n".as_slice(), "error: token is not valid")]
        fn failures_are_reported_to_the_client(
            harness: Harness,
            #[case] request: &[u8],
            #[case] expected: &str,
        ) {
            let reply = harness.exchange(request);
            assert!(reply.starts_with(expected), "unexpected reply: {reply}");
            assert!(reply.ends_with('\n'));
            assert!(!harness.shutdown.is_tripped());
        }
    }
}
