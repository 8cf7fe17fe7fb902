use std::path::Path;

use tracing::{info, warn};

use lintd_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::files::{atomic_write, remove_if_present};
use crate::command::TokenVerifier;

/// Owns the daemon's runtime files and removes them when dropped.
#[derive(Debug)]
pub(super) struct RuntimeGuard {
    paths: RuntimePaths,
}

impl RuntimeGuard {
    pub(super) fn new(paths: RuntimePaths) -> Self {
        Self { paths }
    }

    pub(super) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    pub(super) fn write_token(&self, verifier: &TokenVerifier) -> Result<(), LaunchError> {
        let path = self.paths.token_path();
        write_artefact(path, format!("{}\n", verifier.token()).as_bytes())?;
        info!(
            target: PROCESS_TARGET,
            file = %path.display(),
            "token file written"
        );
        Ok(())
    }

    pub(super) fn write_pid(&self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        write_artefact(path, format!("{pid}\n").as_bytes())?;
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        for (path, kind) in [
            (self.paths.token_path(), "token"),
            (self.paths.pid_path(), "pid"),
            (self.paths.status_path(), "status"),
        ] {
            if let Err(error) = remove_if_present(path) {
                warn!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    kind,
                    %error,
                    "failed to remove runtime file"
                );
            }
        }
    }
}

fn write_artefact(path: &Path, contents: &[u8]) -> Result<(), LaunchError> {
    atomic_write(path, contents).map_err(|source| LaunchError::Artefact {
        path: path.to_path_buf(),
        source,
    })
}
