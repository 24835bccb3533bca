//! Interactive shell over SSH, via libssh2.

use crate::deadline::Deadline;
use crate::error::ExpectError;
use crate::session::{InteractiveSession, Shell, ShellChannel, Target};
use async_trait::async_trait;
use regex::Regex;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// Terminal type requested for the remote PTY.
const TERM_TYPE: &str = "vt100";

/// Least time allowed to close the channel, even past the deadline.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// libssh2's `LIBSSH2_ERROR_TIMEOUT`.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// A shell channel on an authenticated SSH session.
///
/// The session runs non-blocking so [`ShellChannel::try_read`] never waits;
/// writes and close switch back to blocking for their duration, bounded by
/// whatever is left on the session deadline.
pub struct SshChannel {
    session: ssh2::Session,
    channel: ssh2::Channel,
    deadline: Deadline,
}

impl ShellChannel for SshChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.deadline.expired() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "session deadline expired"));
        }
        self.session.set_timeout(timeout_ms(self.deadline.remaining()));
        self.session.set_blocking(true);
        let result = self
            .channel
            .write_all(data)
            .and_then(|()| self.channel.flush());
        self.session.set_blocking(false);
        result
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.channel.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.session
            .set_timeout(timeout_ms(self.deadline.remaining().max(CLOSE_GRACE)));
        self.session.set_blocking(true);
        let closed = self.channel.close();
        let _ = self.session.disconnect(None, "Session terminated", None);
        closed.map_err(io::Error::from)
    }
}

/// [`InteractiveSession`] over an SSH interactive shell.
pub struct SshSession {
    shell: Shell<SshChannel>,
}

impl SshSession {
    pub const NAME: &'static str = "ssh";

    pub fn new() -> Self {
        Self {
            shell: Shell::new(),
        }
    }

    pub fn boxed() -> Box<dyn InteractiveSession> {
        Box::new(Self::new())
    }
}

impl Default for SshSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl InteractiveSession for SshSession {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn connect(&mut self, target: &Target, deadline: &Deadline) -> Result<(), ExpectError> {
        let addr = resolve(target, deadline).await?;
        let channel = open_channel(addr, target, deadline)?;
        info!(host = %target.host, port = target.port, user = %target.username, "Connected");
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
        if self.shell.is_open() {
            info!("Closing SSH session");
        }
        self.shell.terminate();
    }
}

/// Time left on `deadline`, or a timeout if none is.
fn remaining(deadline: &Deadline) -> Result<Duration, ExpectError> {
    match deadline.remaining() {
        d if d.is_zero() => Err(ExpectError::Timeout {
            budget: deadline.budget(),
        }),
        d => Ok(d),
    }
}

/// libssh2 timeout in milliseconds. Zero means "wait forever" to libssh2,
/// so the result is at least one.
fn timeout_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX).max(1)
}

/// Bound the next blocking libssh2 call by the time left on `deadline`.
fn bound(session: &ssh2::Session, deadline: &Deadline) -> Result<(), ExpectError> {
    session.set_timeout(timeout_ms(remaining(deadline)?));
    Ok(())
}

/// Map a libssh2 failure during setup: its own timeout, or any failure once
/// the deadline has passed, is a [`ExpectError::Timeout`].
fn setup_error(step: &str, deadline: &Deadline, e: ssh2::Error) -> ExpectError {
    if deadline.expired() || matches!(e.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT)) {
        ExpectError::Timeout {
            budget: deadline.budget(),
        }
    } else {
        ExpectError::Connection(format!("{step} failed: {e}"))
    }
}

async fn resolve(target: &Target, deadline: &Deadline) -> Result<SocketAddr, ExpectError> {
    let lookup = tokio::net::lookup_host((target.host.as_str(), target.port));
    let mut addrs = timeout(remaining(deadline)?, lookup)
        .await
        .map_err(|_| ExpectError::Timeout {
            budget: deadline.budget(),
        })?
        .map_err(|e| ExpectError::Connection(format!("Cannot resolve {}: {}", target.host, e)))?;
    addrs
        .next()
        .ok_or_else(|| ExpectError::Connection(format!("No address for {}", target.host)))
}

/// Connect, authenticate with the password and start a shell on a PTY,
/// all within the time left on `deadline`.
fn open_channel(
    addr: SocketAddr,
    target: &Target,
    deadline: &Deadline,
) -> Result<SshChannel, ExpectError> {
    let tcp = TcpStream::connect_timeout(&addr, remaining(deadline)?).map_err(|e| {
        if e.kind() == io::ErrorKind::TimedOut {
            ExpectError::Timeout {
                budget: deadline.budget(),
            }
        } else {
            ExpectError::Connection(format!("TCP connect to {addr} failed: {e}"))
        }
    })?;

    let mut session = ssh2::Session::new()
        .map_err(|e| ExpectError::Connection(format!("SSH session setup failed: {e}")))?;
    session.set_tcp_stream(tcp);
    bound(&session, deadline)?;
    session
        .handshake()
        .map_err(|e| setup_error("SSH handshake", deadline, e))?;

    bound(&session, deadline)?;
    session
        .userauth_password(&target.username, &target.secret)
        .map_err(|e| setup_error("Password auth", deadline, e))?;
    if !session.authenticated() {
        return Err(ExpectError::Connection("Authentication failed".to_string()));
    }

    bound(&session, deadline)?;
    let mut channel = session
        .channel_session()
        .map_err(|e| setup_error("Channel open", deadline, e))?;
    bound(&session, deadline)?;
    channel
        .request_pty(TERM_TYPE, None, None)
        .map_err(|e| setup_error("PTY request", deadline, e))?;
    bound(&session, deadline)?;
    channel
        .shell()
        .map_err(|e| setup_error("Shell request", deadline, e))?;

    session.set_blocking(false);
    Ok(SshChannel {
        session,
        channel,
        deadline: *deadline,
    })
}
