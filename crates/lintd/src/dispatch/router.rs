//! Command resolution and execution for decoded requests.
//!
//! The dispatcher maps the header's command name onto a [`ServerCommand`],
//! binds the current standard streams to the connection, and runs the
//! command. Unknown names are rejected before any stream is touched.

use std::io::{self, Write};

use tracing::debug;

use crate::command::{CommandKind, Invocation, ServerCommand, ServerContext};
use crate::stdio::{self, Redirection};

use super::errors::DispatchError;
use super::request::{Header, Request};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Write side of a connection that a redirection scope can borrow.
///
/// The returned writer must reach the same peer as the connection itself.
/// Dropping it must not close the connection.
pub trait ConnectionOutput {
    /// Returns an independent writer onto the connection.
    ///
    /// # Errors
    ///
    /// Returns the error raised while duplicating the underlying handle.
    fn try_clone_output(&self) -> io::Result<Box<dyn Write>>;
}

/// Resolves and runs server commands.
#[derive(Debug)]
pub struct Dispatcher {
    context: ServerContext,
}

impl Dispatcher {
    pub fn new(context: ServerContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Builds the command a header names.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownServerCommand` if the name is not one
    /// of the daemon's commands.
    pub fn resolve(&self, header: Header) -> Result<ServerCommand, DispatchError> {
        let Header {
            token,
            cwd,
            command,
            args,
        } = header;
        let kind = CommandKind::from_name(&command)
            .ok_or_else(|| DispatchError::unknown_server_command(command))?;
        Ok(ServerCommand::new(kind, Invocation::new(args, token, cwd)))
    }

    /// Runs a request with its body as standard input and `connection` as
    /// standard output and error.
    ///
    /// The streams are bound only while the command runs; the previous
    /// bindings are back in place when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `UnknownServerCommand` before redirecting anything, `Io` if the
    /// connection cannot be lent, and `CommandExecution` if the command fails.
    pub fn handle<C>(&self, request: Request, connection: &C) -> Result<(), DispatchError>
    where
        C: ConnectionOutput + ?Sized,
    {
        let Request { header, body } = request;
        let command = self.resolve(header)?;
        let output = connection.try_clone_output()?;

        debug!(
            target: DISPATCH_TARGET,
            command = %command.kind(),
            args = command.invocation().args.len(),
            input_bytes = body.len(),
            "running command"
        );

        stdio::redirect(Redirection::new(body, output), || command.run(&self.context))?;
        Ok(())
    }
}
