//! Error types for request decoding and dispatch.
//!
//! Each variant is one failure mode of a single request. The transport
//! handler reports the display form back over the connection.

use std::io;

use thiserror::Error;

use crate::command::CommandError;

/// Errors surfaced while decoding or dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Header line missing, not tokenisable, or lacking mandatory fields.
    #[error("malformed header: {message}")]
    MalformedHeader {
        message: String,
        #[source]
        source: Option<shell_words::ParseError>,
    },

    /// Command name does not match any server command.
    #[error("unknown server command {command:?}")]
    UnknownServerCommand { command: String },

    /// The command ran and failed.
    #[error(transparent)]
    CommandExecution(#[from] CommandError),

    /// Request exceeds the maximum allowed size.
    #[error("request too large: more than {max_size} bytes")]
    RequestTooLarge { max_size: usize },

    /// Reading the request or lending the connection failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DispatchError {
    /// Creates a malformed header error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a malformed header error from a tokenisation failure.
    pub fn from_tokenize_error(source: shell_words::ParseError) -> Self {
        Self::MalformedHeader {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an unknown server command error.
    pub fn unknown_server_command(command: impl Into<String>) -> Self {
        Self::UnknownServerCommand {
            command: command.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(max_size: usize) -> Self {
        Self::RequestTooLarge { max_size }
    }
}
