use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9787;

/// Log filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Analyser program run by the `exec` command.
pub const DEFAULT_ANALYSER: &str = "rubocop";

/// Directory name grouping the daemon's runtime artefacts.
pub(crate) const RUNTIME_NAMESPACE: &str = "lintd";

pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub fn default_analyser() -> &'static str {
    DEFAULT_ANALYSER
}

/// Computes the default socket endpoint for the daemon.
///
/// On Unix this is `lintd.sock` inside the per-user runtime directory
/// (`$XDG_RUNTIME_DIR/lintd`, or `$TMPDIR/lintd/uid-<euid>` when no runtime
/// directory exists). Other platforms listen on loopback TCP.
pub fn default_socket_endpoint() -> SocketEndpoint {
    #[cfg(unix)]
    {
        let path = default_runtime_directory().join("lintd.sock");
        match camino::Utf8PathBuf::from_path_buf(path) {
            Ok(path) => SocketEndpoint::unix(path),
            Err(_) => SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT),
        }
    }

    #[cfg(not(unix))]
    {
        SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
    }
}

/// Per-user directory for sockets and runtime files.
pub(crate) fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push(RUNTIME_NAMESPACE);
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir
    }
}
