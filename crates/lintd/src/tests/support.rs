//! Shared harness for the behavioural suites.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use lintd_config::{Config, SocketEndpoint};

use crate::health::HealthReporter;
use crate::process::{Daemon, LaunchError, ShutdownTrigger};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle events observed by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    StartupStarting,
    StartupSucceeded,
    StartupFailed(String),
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn startup_starting(&self) {
        self.record(HealthEvent::StartupStarting);
    }

    fn startup_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::StartupSucceeded);
    }

    fn startup_failed(&self, error: &LaunchError) {
        self.record(HealthEvent::StartupFailed(error.to_string()));
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Daemon configuration rooted in a fresh temporary directory.
pub struct TestRuntime {
    dir: TempDir,
    pub reporter: Arc<RecordingHealthReporter>,
    pub shutdown: ShutdownTrigger,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("runtime temp dir"),
            reporter: Arc::new(RecordingHealthReporter::default()),
            shutdown: ShutdownTrigger::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.root().join("lintd.sock")
    }

    pub fn config(&self, analyser: &str) -> Config {
        let socket = self.socket_path();
        Config {
            daemon_socket: SocketEndpoint::unix(socket.to_str().expect("utf8 socket path")),
            analyser: analyser.to_owned(),
            ..Config::default()
        }
    }

    pub fn start(&self, analyser: &str) -> Result<Daemon, LaunchError> {
        Daemon::start(
            &self.config(analyser),
            self.reporter.clone(),
            self.shutdown.clone(),
        )
    }

    /// Writes `request`, half-closes, and reads the reply until end of stream.
    pub fn send(&self, request: &[u8]) -> String {
        let mut stream = UnixStream::connect(self.socket_path()).expect("connect to daemon");
        stream
            .set_read_timeout(Some(REPLY_TIMEOUT))
            .expect("set read timeout");
        stream.write_all(request).expect("write request");
        stream.shutdown(Shutdown::Write).expect("half-close request");

        let mut reply = String::new();
        stream.read_to_string(&mut reply).expect("read reply");
        reply
    }

    /// Header line addressed to `cwd`, quoted for the wire.
    pub fn header(&self, token: &str, command: &str, args: &[&str]) -> String {
        let cwd = self.root().to_str().expect("utf8 runtime path");
        let fields = [token, cwd, command].into_iter().chain(args.iter().copied());
        format!("{}\n", shell_words::join(fields))
    }
}
