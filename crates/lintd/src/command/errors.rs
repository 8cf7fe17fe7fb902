//! Failures raised by server commands.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while a server command runs.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The request token does not match the daemon's token.
    #[error("token is not valid")]
    InvalidToken,

    /// The requested working directory does not exist.
    #[error("working directory '{path}' is not a directory")]
    WorkingDirectory { path: PathBuf },

    /// The analyser could not be started.
    #[error("failed to start analyser '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The analyser was killed before reporting an exit code.
    #[error("analyser '{program}' was terminated by a signal")]
    Terminated { program: String },

    /// The exit status could not be written to the status file.
    #[error("failed to record exit status in '{path}': {source}")]
    Status {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading input or writing output failed.
    #[error("command IO failed: {0}")]
    Io(#[from] io::Error),
}
