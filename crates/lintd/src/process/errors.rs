use std::io;
use std::path::PathBuf;

use thiserror::Error;

use lintd_config::{RuntimePathsError, SocketPreparationError};

use super::shutdown::ShutdownError;
use crate::transport::ListenerError;

/// Errors surfaced while starting or running the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Preparing the socket directory failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// The runtime directory could not be derived or created.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// A runtime artefact (token or PID file) could not be written.
    #[error("failed to write runtime file '{path}': {source}")]
    Artefact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Binding or running the socket listener failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Signal handlers could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
