use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;

/// Shared flag that stops the daemon once tripped.
///
/// The `stop` command, termination signals and listener handles all trip the
/// same flag; the accept loop polls it between connections.
#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Tripping more than once is harmless.
    pub fn trip(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trips the flag on SIGTERM, SIGINT, SIGQUIT and SIGHUP.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownError::Install` when a handler cannot be registered.
    pub fn register_signals(&self) -> Result<(), ShutdownError> {
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .map_err(|source| ShutdownError::Install { source })?;
        }
        Ok(())
    }
}

/// Errors reported while wiring shutdown signals.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
}
