//! Sends the profile's initialization commands and then the caller's
//! commands over a connected session, strictly in order.

use crate::deadline::Deadline;
use crate::error::ExpectError;
use crate::profile::{Command, DeviceProfile};
use crate::session::InteractiveSession;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Everything a session produced, already normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionOutput {
    pub init_output: String,
    pub command_output: String,
}

/// Run `profile.init_cmds` then `commands` through an already connected
/// `session`.
///
/// Each command waits for its own pattern, or the profile default when it
/// has none, before the next one is written. Errors are returned as-is;
/// closing the session is the caller's job.
pub async fn run_commands(
    session: &mut dyn InteractiveSession,
    profile: &DeviceProfile,
    commands: &[Command],
    deadline: &Deadline,
) -> Result<SessionOutput, ExpectError> {
    let init_output = send_all(session, profile, &profile.init_cmds, deadline).await?;
    let command_output = send_all(session, profile, commands, deadline).await?;
    Ok(SessionOutput {
        init_output,
        command_output,
    })
}

async fn send_all(
    session: &mut dyn InteractiveSession,
    profile: &DeviceProfile,
    commands: &[Command],
    deadline: &Deadline,
) -> Result<String, ExpectError> {
    let mut output = String::new();
    for command in commands {
        let expect = profile.expect_for(command);
        debug!(
            command = %command.text,
            expect = ?expect.map(Regex::as_str),
            remaining_ms = deadline.remaining().as_millis() as u64,
            "Dispatching command"
        );
        output.push_str(&session.send(&command.text, expect, deadline).await?);
    }
    Ok(output)
}
