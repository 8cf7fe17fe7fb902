//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use lintd_config::Config;

use crate::process::LaunchError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer notified as the daemon starts and stops.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the daemon prepares its socket.
    fn startup_starting(&self);

    /// Invoked once the listener accepts connections.
    fn startup_succeeded(&self, config: &Config);

    /// Invoked when startup fails.
    fn startup_failed(&self, error: &LaunchError);

    /// Invoked after the listener has stopped and runtime files are removed.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn startup_starting(&self) {
        (**self).startup_starting();
    }

    fn startup_succeeded(&self, config: &Config) {
        (**self).startup_succeeded(config);
    }

    fn startup_failed(&self, error: &LaunchError) {
        (**self).startup_failed(error);
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl HealthReporter for StructuredHealthReporter {
    fn startup_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_starting",
            "starting daemon"
        );
    }

    fn startup_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_succeeded",
            socket = %config.daemon_socket(),
            analyser = config.analyser(),
            verbose = config.verbose(),
            "daemon accepting requests"
        );
    }

    fn startup_failed(&self, error: &LaunchError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "startup_failed",
            error = %error,
            "daemon failed to start"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "daemon stopped"
        );
    }
}
