//! A local program in a pseudo-terminal, driven like a remote shell.
//!
//! `host` names the program and its arguments (`sh` when empty); the
//! credentials are ignored. Useful for dry runs and for testing expect
//! scripts without a device.

use crate::deadline::Deadline;
use crate::error::ExpectError;
use crate::pty::PtySession;
use crate::pty_reader::PtyReader;
use crate::session::{InteractiveSession, Shell, ShellChannel, Target};
use async_trait::async_trait;
use regex::Regex;
use std::io;
use tracing::info;

const DEFAULT_PROGRAM: &str = "sh";

pub struct LocalChannel {
    pty: PtySession,
    reader: PtyReader,
}

impl LocalChannel {
    /// Spawn `command_line` (program followed by whitespace-separated args).
    pub fn spawn(command_line: &str) -> io::Result<Self> {
        let mut words = command_line.split_whitespace();
        let program = words.next().unwrap_or(DEFAULT_PROGRAM);
        let args: Vec<&str> = words.collect();
        let (pty, reader) = PtySession::spawn(program, &args)?;
        Ok(Self {
            pty,
            reader: PtyReader::spawn(reader),
        })
    }
}

impl ShellChannel for LocalChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.pty.write(data)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.reader.try_read(buf))
    }

    fn close(&mut self) -> io::Result<()> {
        self.pty.kill()
    }
}

/// [`InteractiveSession`] over a local PTY.
pub struct LocalSession {
    shell: Shell<LocalChannel>,
}

impl LocalSession {
    pub const NAME: &'static str = "local";

    pub fn new() -> Self {
        Self {
            shell: Shell::new(),
        }
    }

    pub fn boxed() -> Box<dyn InteractiveSession> {
        Box::new(Self::new())
    }
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl InteractiveSession for LocalSession {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn connect(&mut self, target: &Target, deadline: &Deadline) -> Result<(), ExpectError> {
        if deadline.expired() {
            return Err(ExpectError::Timeout {
                budget: deadline.budget(),
            });
        }
        let channel = LocalChannel::spawn(&target.host)
            .map_err(|e| ExpectError::Connection(e.to_string()))?;
        info!(program = %target.host, "Spawned local shell");
        self.shell.attach(channel);
        self.shell.drain_banner(deadline).await?;
        Ok(())
    }

    async fn send(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        deadline: &Deadline,
    ) -> Result<String, ExpectError> {
        self.shell.send(command, expect, deadline).await
    }

    async fn terminate(&mut self) {
        self.shell.terminate();
    }
}
