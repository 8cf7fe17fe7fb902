//! Request decoding for the dispatch loop.
//!
//! A request is the full byte stream of one connection. The first line is a
//! header tokenised like a POSIX shell command line:
//!
//! ```text
//! <token> <cwd> <command> [args...]
//! ```
//!
//! Everything after the first newline is the body. The body is passed to the
//! command as its standard input without being inspected.

use std::borrow::Cow;
use std::sync::Arc;

use super::diagnostics::{DiagnosticSink, TracingDiagnostics};
use super::errors::DispatchError;

/// Parsed header line of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Token the client presents to the daemon.
    pub token: String,
    /// Working directory the command runs in.
    pub cwd: String,
    /// Name of the server command.
    pub command: String,
    /// Arguments forwarded to the command, in order.
    pub args: Vec<String>,
}

impl Header {
    /// Tokenises a header line.
    ///
    /// Trailing line terminators are ignored. Quoting and backslash escapes
    /// follow shell rules, so `'a b'` is a single argument. A `#` is always
    /// literal; headers carry no comments.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedHeader` if the line cannot be
    /// tokenised, has fewer than three tokens, or names an empty command.
    pub fn parse(line: &str) -> Result<Self, DispatchError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut tokens = shell_words::split(&escape_comment_marks(line))
            .map_err(DispatchError::from_tokenize_error)?
            .into_iter();

        let (Some(token), Some(cwd), Some(command)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(DispatchError::malformed(
                "expected '<token> <cwd> <command> [args...]'",
            ));
        };
        if command.is_empty() {
            return Err(DispatchError::malformed("command name is empty"));
        }

        Ok(Self {
            token,
            cwd,
            command,
            args: tokens.collect(),
        })
    }

    /// Serialises the header back into a single line, quoting as needed.
    ///
    /// The result has no trailing newline and parses back to an equal header.
    pub fn to_line(&self) -> String {
        let fields = [&self.token, &self.cwd, &self.command];
        shell_words::join(fields.into_iter().chain(&self.args))
    }
}

/// One decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: Header,
    /// Bytes after the header line, terminators included.
    pub body: Vec<u8>,
}

impl Request {
    /// Number of lines in the body, counting an unterminated final line.
    pub fn body_lines(&self) -> usize {
        count_lines(&self.body)
    }
}

/// Decodes raw connection bytes into requests.
#[derive(Clone)]
pub struct RequestDecoder {
    verbose: bool,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for RequestDecoder {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestDecoder")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl RequestDecoder {
    /// Creates a decoder that reports verbose diagnostics through `tracing`.
    pub fn new(verbose: bool) -> Self {
        Self::with_sink(verbose, Arc::new(TracingDiagnostics))
    }

    /// Creates a decoder that reports verbose diagnostics to `sink`.
    pub fn with_sink(verbose: bool, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { verbose, sink }
    }

    /// Splits `raw` into header and body and parses the header.
    ///
    /// When verbose, the raw header line and the body line count are sent
    /// to the diagnostic sink before the header is parsed.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedHeader` for empty input, a header that
    /// is not UTF-8, or a header [`Header::parse`] rejects.
    pub fn decode(&self, raw: &[u8]) -> Result<Request, DispatchError> {
        let (raw_header, body) = split_header(raw);
        if raw_header.is_empty() {
            return Err(DispatchError::malformed("empty request"));
        }
        let header_line = std::str::from_utf8(raw_header)
            .map_err(|_| DispatchError::malformed("header line is not valid UTF-8"))?;

        if self.verbose {
            self.sink.line(header_line.trim_end_matches(['\r', '\n']));
            if !body.is_empty() {
                self.sink.line(&format!("STDIN: {} lines", count_lines(body)));
            }
        }

        Ok(Request {
            header: Header::parse(header_line)?,
            body: body.to_vec(),
        })
    }
}

/// Escapes every unquoted `#` that opens a word so the tokeniser keeps it.
fn escape_comment_marks(line: &str) -> Cow<'_, str> {
    enum Quote {
        None,
        Single,
        Double,
    }

    if !line.contains('#') {
        return Cow::Borrowed(line);
    }

    let mut escaped = String::with_capacity(line.len() + 4);
    let mut quote = Quote::None;
    let mut word_start = true;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => {
                    escaped.push(c);
                    if let Some(next) = chars.next() {
                        escaped.push(next);
                    }
                    continue;
                }
                _ => {}
            },
            Quote::None => {
                let at_word_start = word_start;
                word_start = matches!(c, ' ' | '\t' | '\n');
                match c {
                    '#' if at_word_start => escaped.push('\\'),
                    '\'' => quote = Quote::Single,
                    '"' => quote = Quote::Double,
                    '\\' => {
                        escaped.push(c);
                        if let Some(next) = chars.next() {
                            escaped.push(next);
                        }
                        continue;
                    }
                    _ => {}
                }
            }
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Splits after the first newline. Input without a newline is all header.
fn split_header(raw: &[u8]) -> (&[u8], &[u8]) {
    match raw.iter().position(|byte| *byte == b'\n') {
        Some(pos) => raw.split_at(pos + 1),
        None => (raw, &[]),
    }
}

fn count_lines(bytes: &[u8]) -> usize {
    let terminated = bytes.iter().filter(|byte| **byte == b'\n').count();
    match bytes.last() {
        Some(b'\n') | None => terminated,
        Some(_) => terminated + 1,
    }
}
