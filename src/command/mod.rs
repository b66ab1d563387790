//! AT command/response traffic on the shared link.

pub mod engine;
pub mod link;

use log::debug;

use crate::error::CommandError;
use engine::{CommandEngine, CommandRequest, CommandResponse};

/// Caller-level bounded retry: up to `req.retries` extra attempts after a
/// timeout or an error reply.  Link failures and invalid commands are
/// returned immediately.
pub fn send_with_retries(
    engine: &mut CommandEngine,
    req: &CommandRequest<'_>,
) -> Result<CommandResponse, CommandError> {
    let attempts = u16::from(req.retries) + 1;
    let mut attempt = 1;
    loop {
        match engine.execute(req) {
            Ok(resp) => return Ok(resp),
            Err(e @ (CommandError::TimedOut | CommandError::ErrorSeen)) if attempt < attempts => {
                debug!(
                    "{} failed ({}), retry {}/{}",
                    req.command, e, attempt, req.retries
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
