//! Server commands a request can invoke.
//!
//! The set of commands is closed: [`CommandKind`] names every command the
//! daemon understands and [`ServerCommand`] carries one constructed instance.
//! Commands read their input from [`crate::stdio::stdin`] and write to
//! [`crate::stdio::stdout`] and [`crate::stdio::stderr`]; the dispatcher binds
//! those streams to the connection before calling [`ServerCommand::run`].

mod errors;
mod exec;
mod stop;
mod token;

use std::fmt;
use std::path::{Path, PathBuf};

use lintd_config::DEFAULT_ANALYSER;

use crate::process::ShutdownTrigger;

pub use self::errors::CommandError;
pub use self::exec::Exec;
pub use self::stop::Stop;
pub use self::token::TokenVerifier;

/// Tracing target for command execution.
pub(crate) const COMMAND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

/// Names of the commands the daemon understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Shuts the daemon down.
    Stop,
    /// Runs the analyser.
    Exec,
}

impl CommandKind {
    /// Looks up a command by its wire name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stop" => Some(Self::Stop),
            "exec" => Some(Self::Exec),
            _ => None,
        }
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Exec => "exec",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Arguments and request context every command is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub token: String,
    pub cwd: String,
}

impl Invocation {
    pub fn new(args: Vec<String>, token: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            args,
            token: token.into(),
            cwd: cwd.into(),
        }
    }
}

/// A constructed server command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Stop(Stop),
    Exec(Exec),
}

impl ServerCommand {
    /// Builds the command named by `kind`.
    pub fn new(kind: CommandKind, invocation: Invocation) -> Self {
        match kind {
            CommandKind::Stop => Self::Stop(Stop::new(invocation)),
            CommandKind::Exec => Self::Exec(Exec::new(invocation)),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Stop(_) => CommandKind::Stop,
            Self::Exec(_) => CommandKind::Exec,
        }
    }

    pub fn invocation(&self) -> &Invocation {
        match self {
            Self::Stop(command) => command.invocation(),
            Self::Exec(command) => command.invocation(),
        }
    }

    /// Runs the command against the current standard streams.
    ///
    /// # Errors
    ///
    /// Returns the command's [`CommandError`].
    pub fn run(&self, context: &ServerContext) -> Result<(), CommandError> {
        match self {
            Self::Stop(command) => command.run(context),
            Self::Exec(command) => command.run(context),
        }
    }
}

/// Daemon state commands act on.
#[derive(Debug, Clone)]
pub struct ServerContext {
    verifier: TokenVerifier,
    shutdown: ShutdownTrigger,
    analyser: String,
    status_path: Option<PathBuf>,
}

impl ServerContext {
    /// Creates a context running the default analyser and keeping no status file.
    pub fn new(verifier: TokenVerifier, shutdown: ShutdownTrigger) -> Self {
        Self {
            verifier,
            shutdown,
            analyser: DEFAULT_ANALYSER.to_string(),
            status_path: None,
        }
    }

    /// Sets the program `exec` runs.
    #[must_use]
    pub fn with_analyser(mut self, analyser: impl Into<String>) -> Self {
        self.analyser = analyser.into();
        self
    }

    /// Records `exec` exit statuses in `path`.
    #[must_use]
    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    /// Checks the token presented with a request.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidToken` on mismatch.
    pub fn verify_token(&self, presented: &str) -> Result<(), CommandError> {
        self.verifier.verify(presented)
    }

    pub fn shutdown(&self) -> &ShutdownTrigger {
        &self.shutdown
    }

    pub fn analyser(&self) -> &str {
        &self.analyser
    }

    pub fn status_path(&self) -> Option<&Path> {
        self.status_path.as_deref()
    }
}
