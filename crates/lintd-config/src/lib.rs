//! Configuration shared by the `lintd` daemon and its clients.
//!
//! The daemon is configured entirely from its command line. [`Config`] holds
//! the socket endpoint, logging settings, the verbosity flag consumed by the
//! request decoder and the analyser program run by `exec` requests.

mod defaults;
mod runtime;
mod socket;

use std::ffi::OsString;

use clap::Parser;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use defaults::{
    DEFAULT_ANALYSER, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, default_analyser, default_log_filter,
    default_log_format, default_socket_endpoint,
};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Output format of the daemon's log records.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Runtime configuration of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Parser, Serialize, Deserialize)]
#[command(
    name = "lintd",
    version,
    about = "Keeps a code analyser warm and serves lint requests over a local socket."
)]
pub struct Config {
    /// Socket to listen on, as `unix:///path/to.sock` or `tcp://host:port`.
    #[arg(long = "socket", value_name = "URL", default_value_t = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,

    /// Tracing filter expression, for example `info` or `lintd=debug`.
    #[arg(long, value_name = "FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log record format.
    #[arg(long, value_name = "FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Log every request header and body size.
    #[arg(short, long)]
    pub verbose: bool,

    /// Program executed by `exec` requests.
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_ANALYSER)]
    pub analyser: String,
}

impl Config {
    /// Parses the process command line.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error describing invalid or unknown arguments; the
    /// error also covers `--help` and `--version` requests.
    pub fn load() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Parses an explicit argument list. The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error describing invalid or unknown arguments.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether the request decoder reports headers to the diagnostic log.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn analyser(&self) -> &str {
        &self.analyser
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter().to_string(),
            log_format: default_log_format(),
            verbose: false,
            analyser: default_analyser().to_string(),
        }
    }
}
