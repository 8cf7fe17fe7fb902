//! Paths of the files the daemon keeps next to its socket.
//!
//! The token file lets local clients authenticate requests, the PID file
//! identifies the running process, and the status file records the exit
//! status of the most recent `exec` request.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::defaults::default_runtime_directory;
use crate::{Config, SocketEndpoint};

/// Canonical locations of the daemon's runtime artefacts.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    token_path: PathBuf,
    pid_path: PathBuf,
    status_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the configuration and creates the directory.
    ///
    /// # Errors
    ///
    /// Fails when the Unix socket path has no parent or the directory cannot
    /// be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_directory(config.daemon_socket())?;
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self::in_directory(runtime_dir))
    }

    /// Lays out runtime paths inside an existing directory.
    pub fn in_directory(runtime_dir: impl Into<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        Self {
            token_path: runtime_dir.join("lintd.token"),
            pid_path: runtime_dir.join("lintd.pid"),
            status_path: runtime_dir.join("lintd.status"),
            runtime_dir,
        }
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// File holding the token clients must present.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    /// File holding the exit status of the last analyser run.
    pub fn status_path(&self) -> &Path {
        &self.status_path
    }
}

fn runtime_directory(endpoint: &SocketEndpoint) -> Result<PathBuf, RuntimePathsError> {
    match endpoint {
        SocketEndpoint::Unix { path } => path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| parent.as_std_path().to_path_buf())
            .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                path: path.to_string(),
            }),
        SocketEndpoint::Tcp { .. } => Ok(default_runtime_directory()),
    }
}

/// Errors raised while deriving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent { path: String },
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
