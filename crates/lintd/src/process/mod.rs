//! Daemon lifecycle: runtime files, listener startup, and shutdown.

mod errors;
pub(crate) mod files;
mod guard;
mod shutdown;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use lintd_config::{Config, RuntimePaths};

use crate::command::{ServerContext, TokenVerifier};
use crate::dispatch::{DispatchConnectionHandler, Dispatcher, RequestDecoder};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::{ListenerHandle, SocketListener};

use self::guard::RuntimeGuard;

pub use self::errors::LaunchError;
pub use self::shutdown::{ShutdownError, ShutdownTrigger};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// A running daemon.
///
/// Dropping the daemon stops the accept loop and removes its runtime files
/// without waiting for the loop to exit; call [`Daemon::wait`] for an orderly
/// shutdown.
pub struct Daemon {
    verifier: TokenVerifier,
    shutdown: ShutdownTrigger,
    local_addr: Option<SocketAddr>,
    listener: ListenerHandle,
    guard: RuntimeGuard,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("local_addr", &self.local_addr)
            .field("runtime", &self.guard.paths())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Prepares runtime files and starts accepting requests.
    ///
    /// Tripping `shutdown`, from a signal handler or the `stop` command,
    /// ends the accept loop.
    ///
    /// # Errors
    ///
    /// Fails when the socket or runtime directory cannot be prepared, a
    /// runtime file cannot be written, or the listener cannot be bound.
    pub fn start(
        config: &Config,
        reporter: Arc<dyn HealthReporter>,
        shutdown: ShutdownTrigger,
    ) -> Result<Self, LaunchError> {
        reporter.startup_starting();
        match Self::launch(config, Arc::clone(&reporter), shutdown) {
            Ok(daemon) => {
                reporter.startup_succeeded(config);
                Ok(daemon)
            }
            Err(error) => {
                reporter.startup_failed(&error);
                Err(error)
            }
        }
    }

    fn launch(
        config: &Config,
        reporter: Arc<dyn HealthReporter>,
        shutdown: ShutdownTrigger,
    ) -> Result<Self, LaunchError> {
        config
            .daemon_socket()
            .prepare_filesystem()
            .map_err(|source| LaunchError::Socket { source })?;
        let paths = RuntimePaths::from_config(config)?;
        let listener = SocketListener::bind(config.daemon_socket())?;
        let local_addr = listener.local_addr();

        let guard = RuntimeGuard::new(paths);
        let verifier = TokenVerifier::generate();
        guard.write_token(&verifier)?;
        guard.write_pid(std::process::id())?;

        let context = ServerContext::new(verifier.clone(), shutdown.clone())
            .with_analyser(config.analyser())
            .with_status_path(guard.paths().status_path());
        let handler = Arc::new(DispatchConnectionHandler::new(
            RequestDecoder::new(config.verbose()),
            Dispatcher::new(context),
        ));

        let listener = listener.start(handler, shutdown.clone())?;

        info!(
            target: PROCESS_TARGET,
            socket = %config.daemon_socket(),
            runtime = %guard.paths().runtime_dir().display(),
            "daemon started"
        );
        Ok(Self {
            verifier,
            shutdown,
            local_addr,
            listener,
            guard,
            reporter,
        })
    }

    /// Token clients must present with each request.
    pub fn token(&self) -> &str {
        self.verifier.token()
    }

    /// Bound address when listening on TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn runtime_paths(&self) -> &RuntimePaths {
        self.guard.paths()
    }

    pub fn shutdown_trigger(&self) -> &ShutdownTrigger {
        &self.shutdown
    }

    /// Blocks until the accept loop exits, then removes the runtime files.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Listener` if the accept loop panicked.
    pub fn wait(self) -> Result<(), LaunchError> {
        let Self {
            listener,
            guard,
            reporter,
            ..
        } = self;
        let joined = listener.join();
        drop(guard);
        info!(target: PROCESS_TARGET, "shutdown sequence completed");
        reporter.shutdown_completed();
        joined.map_err(LaunchError::from)
    }
}

/// Runs the daemon until a termination signal or a `stop` request arrives.
///
/// # Errors
///
/// Returns the first startup failure, or a listener failure on shutdown.
pub fn run_daemon(config: &Config) -> Result<(), LaunchError> {
    let shutdown = ShutdownTrigger::new();
    shutdown.register_signals()?;
    let daemon = Daemon::start(config, Arc::new(StructuredHealthReporter), shutdown)?;
    daemon.wait()
}
