//! The `stop` command.

use tracing::info;

use super::{COMMAND_TARGET, CommandError, Invocation, ServerContext};

/// Asks the daemon to stop accepting connections and exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    invocation: Invocation,
}

impl Stop {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Trips the daemon's shutdown trigger once the token checks out.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidToken` for a foreign token.
    pub fn run(&self, context: &ServerContext) -> Result<(), CommandError> {
        context.verify_token(&self.invocation.token)?;
        info!(target: COMMAND_TARGET, cwd = %self.invocation.cwd, "stop requested");
        context.shutdown().trip();
        Ok(())
    }
}
