//! Diagnostic sink for verbose request logging.

use tracing::info;

const DIAGNOSTIC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::requests");

/// Receives line-oriented diagnostic text from the request decoder.
///
/// Implementations must not fail the request: errors while recording a line
/// are swallowed by the sink.
pub trait DiagnosticSink: Send + Sync {
    /// Records a single line of text.
    fn line(&self, line: &str);
}

/// Sink that records lines as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn line(&self, line: &str) {
        info!(target: DIAGNOSTIC_TARGET, "{line}");
    }
}
