//! The [`InteractiveSession`] trait, the [`ShellChannel`] byte seam transports
//! implement, and [`Shell`], the deadline-bound send/expect engine they share.

use crate::deadline::Deadline;
use crate::error::ExpectError;
use crate::normalize::normalize;
use async_trait::async_trait;
use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound on a single read from the channel.
pub const CHUNK_SIZE: usize = 1024;

/// How long the receive loop sleeps when nothing is pending.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where and as whom to open a session.
#[derive(Clone, Default)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A raw, already-authenticated byte channel to an interactive shell.
pub trait ShellChannel {
    /// Write all of `data` to the remote side.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is immediately available into `buf` without blocking.
    ///
    /// `Ok(0)` means nothing is pending right now.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Close the channel and release the underlying connection.
    fn close(&mut self) -> io::Result<()>;
}

/// One interactive session to a single endpoint.
///
/// Implementations are selected by name through [`crate::transports::open`].
/// Every blocking call takes the session's [`Deadline`] so the whole session
/// shares one budget.
#[async_trait(?Send)]
pub trait InteractiveSession {
    /// The registry name of this transport.
    fn name(&self) -> &'static str;

    /// Open the channel and discard any banner the remote prints on arrival.
    async fn connect(&mut self, target: &Target, deadline: &Deadline) -> Result<(), ExpectError>;

    /// Send `command` plus a line terminator and return the normalized
    /// output received for it. See [`Shell::receive_until`].
    async fn send(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        deadline: &Deadline,
    ) -> Result<String, ExpectError>;

    /// Close the channel. Safe to call more than once; never fails.
    async fn terminate(&mut self);
}

/// Send/expect engine over any [`ShellChannel`].
///
/// Owns the channel exclusively; the channel is closed on [`terminate`](Self::terminate)
/// or, failing that, when the shell is dropped.
pub struct Shell<C: ShellChannel> {
    channel: Option<C>,
    poll_interval: Duration,
}

impl<C: ShellChannel> Shell<C> {
    pub fn new() -> Self {
        Self {
            channel: None,
            poll_interval: POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Take ownership of a freshly opened channel.
    pub fn attach(&mut self, channel: C) {
        self.channel = Some(channel);
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Read and discard whatever the remote prints right after connecting,
    /// until it goes quiet. Returns the discarded text for logging.
    pub async fn drain_banner(&mut self, deadline: &Deadline) -> Result<String, ExpectError> {
        let banner = self.receive_until(None, deadline).await?;
        debug!(banner = %banner, "Captured init message");
        Ok(banner)
    }

    /// Write `command` followed by a newline, then wait for `expect`.
    ///
    /// Nothing is written once the deadline has expired.
    pub async fn send(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        deadline: &Deadline,
    ) -> Result<String, ExpectError> {
        if deadline.expired() {
            return Err(ExpectError::Timeout {
                budget: deadline.budget(),
            });
        }

        let mut line = command.as_bytes().to_vec();
        line.push(b'\n');
        self.channel_mut()?.write_all(&line)?;

        let output = normalize(&self.receive_until(expect, deadline).await?);
        debug!(command, output = %output, "Received output");
        Ok(output)
    }

    /// Accumulate output until `expect` matches anywhere in everything read
    /// so far, or, with no pattern, until the channel goes quiet after at
    /// least one chunk.
    ///
    /// When the deadline expires the partial output is returned, unless
    /// nothing at all was read, which is a [`ExpectError::Timeout`].
    pub async fn receive_until(
        &mut self,
        expect: Option<&Regex>,
        deadline: &Deadline,
    ) -> Result<String, ExpectError> {
        let poll_interval = self.poll_interval;
        let expect = expect.map(as_bytes_pattern).transpose()?;
        let channel = self.channel_mut()?;
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            if deadline.expired() {
                if buffer.is_empty() {
                    return Err(ExpectError::Timeout {
                        budget: deadline.budget(),
                    });
                }
                debug!(
                    bytes = buffer.len(),
                    "Deadline reached before a match, keeping partial output"
                );
                break;
            }

            let n = channel.try_read(&mut chunk)?;
            if n == 0 {
                if expect.is_none() && !buffer.is_empty() {
                    break;
                }
                sleep(poll_interval.min(deadline.remaining())).await;
                continue;
            }

            buffer.extend_from_slice(&chunk[..n]);
            if expect.as_ref().is_some_and(|pattern| pattern.is_match(&buffer)) {
                break;
            }
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Close the channel if it is open. Close errors are logged and dropped.
    pub fn terminate(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                warn!("Ignoring error while closing channel: {}", e);
            }
        }
    }

    fn channel_mut(&mut self) -> Result<&mut C, ExpectError> {
        self.channel
            .as_mut()
            .ok_or_else(|| ExpectError::Connection("Channel is not open".to_string()))
    }
}

/// The same pattern over raw bytes, so the buffer is matched without decoding.
fn as_bytes_pattern(pattern: &Regex) -> Result<BytesRegex, ExpectError> {
    BytesRegex::new(pattern.as_str())
        .map_err(|e| ExpectError::Config(format!("Invalid pattern '{}': {}", pattern.as_str(), e)))
}

impl<C: ShellChannel> Default for Shell<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ShellChannel> Drop for Shell<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// In-memory channel and session used by the unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tokio::time::Instant;

    /// A chunk the remote emits `after` the write that triggered it.
    #[derive(Clone)]
    pub(crate) struct Chunk {
        pub after: Duration,
        pub data: Vec<u8>,
    }

    pub(crate) fn now(data: &str) -> Chunk {
        at(Duration::ZERO, data)
    }

    pub(crate) fn at(after: Duration, data: &str) -> Chunk {
        Chunk {
            after,
            data: data.as_bytes().to_vec(),
        }
    }

    #[derive(Default)]
    pub(crate) struct ChannelLog {
        pub writes: Vec<String>,
        pub close_calls: usize,
    }

    /// Replays a fixed script: a banner on open, then one list of chunks per write.
    pub(crate) struct ScriptedChannel {
        pending: VecDeque<(Instant, Vec<u8>)>,
        replies: VecDeque<Vec<Chunk>>,
        log: Rc<RefCell<ChannelLog>>,
        failing_close: bool,
    }

    impl ScriptedChannel {
        pub fn new(banner: Vec<Chunk>, replies: Vec<Vec<Chunk>>) -> Self {
            let mut channel = Self {
                pending: VecDeque::new(),
                replies: replies.into(),
                log: Rc::default(),
                failing_close: false,
            };
            channel.schedule(banner);
            channel
        }

        /// Make every `close` report a broken connection.
        pub fn with_failing_close(mut self) -> Self {
            self.failing_close = true;
            self
        }

        pub fn log(&self) -> Rc<RefCell<ChannelLog>> {
            self.log.clone()
        }

        fn schedule(&mut self, chunks: Vec<Chunk>) {
            let start = Instant::now();
            for chunk in chunks {
                self.pending.push_back((start + chunk.after, chunk.data));
            }
        }
    }

    impl ShellChannel for ScriptedChannel {
        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            self.log
                .borrow_mut()
                .writes
                .push(String::from_utf8_lossy(data).into_owned());
            if let Some(reply) = self.replies.pop_front() {
                self.schedule(reply);
            }
            Ok(())
        }

        fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some((ready_at, data)) = self.pending.front_mut() else {
                return Ok(0);
            };
            if *ready_at > Instant::now() {
                return Ok(0);
            }
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            data.drain(..n);
            if data.is_empty() {
                self.pending.pop_front();
            }
            Ok(n)
        }

        fn close(&mut self) -> io::Result<()> {
            self.log.borrow_mut().close_calls += 1;
            if self.failing_close {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"));
            }
            Ok(())
        }
    }

    /// An [`InteractiveSession`] over a [`ScriptedChannel`].
    pub(crate) struct ScriptedSession {
        shell: Shell<ScriptedChannel>,
        channel: Option<ScriptedChannel>,
    }

    impl ScriptedSession {
        pub fn new(channel: ScriptedChannel) -> Self {
            Self {
                shell: Shell::new(),
                channel: Some(channel),
            }
        }
    }

    #[async_trait(?Send)]
    impl InteractiveSession for ScriptedSession {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&mut self, _target: &Target, deadline: &Deadline) -> Result<(), ExpectError> {
            let channel = self
                .channel
                .take()
                .ok_or_else(|| ExpectError::Connection("already connected".to_string()))?;
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
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn shell_with(channel: ScriptedChannel) -> Shell<ScriptedChannel> {
        let mut shell = Shell::new();
        shell.attach(channel);
        shell
    }

    fn pattern(re: &str) -> Regex {
        Regex::new(re).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_across_chunk_boundary() {
        let channel = ScriptedChannel::new(
            vec![],
            vec![vec![
                now("show clock\r\n12:00 Router"),
                at(Duration::from_secs(1), "#"),
                at(Duration::from_secs(2), " trailing"),
            ]],
        );
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(10));
        let re = pattern(r"Router#");

        let output = shell.send("show clock", Some(&re), &deadline).await.unwrap();
        assert!(output.ends_with("Router#"), "got: {output:?}");
        assert!(!output.contains("trailing"));
        assert!(deadline.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_read_without_pattern() {
        let channel = ScriptedChannel::new(
            vec![],
            vec![vec![now("first "), now("second"), at(Duration::from_secs(5), "late")]],
        );
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(10));

        let output = shell.send("cmd", None, &deadline).await.unwrap();
        assert_eq!(output, "first second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_output_when_deadline_expires() {
        let channel = ScriptedChannel::new(vec![], vec![vec![now("no prompt here")]]);
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(1));
        let re = pattern(r"never");

        let output = shell.send("cmd", Some(&re), &deadline).await.unwrap();
        assert_eq!(output, "no prompt here");
        assert!(deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_until_deadline_is_timeout() {
        let channel = ScriptedChannel::new(vec![], vec![vec![]]);
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(1));
        let re = pattern(r">");

        let err = shell.send("cmd", Some(&re), &deadline).await.unwrap_err();
        assert!(matches!(err, ExpectError::Timeout { .. }), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_expiry_writes_nothing() {
        let channel = ScriptedChannel::new(vec![], vec![vec![now(">")]]);
        let log = channel.log();
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let err = shell.send("cmd", None, &deadline).await.unwrap_err();
        assert!(matches!(err, ExpectError::Timeout { .. }));
        assert!(log.borrow().writes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_larger_than_one_chunk() {
        let body = "x".repeat(CHUNK_SIZE * 3);
        let reply = format!("{body}END>");
        let channel = ScriptedChannel::new(vec![], vec![vec![now(&reply)]]);
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(5));
        let re = pattern(r"END>");

        let output = shell.send("cmd", Some(&re), &deadline).await.unwrap();
        assert_eq!(output.len(), reply.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_is_normalized() {
        let channel = ScriptedChannel::new(vec![], vec![vec![now(r"line1\r\nline2\n>")]]);
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(5));
        let re = pattern(r">");

        let output = shell.send("cmd", Some(&re), &deadline).await.unwrap();
        assert_eq!(output, "line1\nline2\n>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_appends_newline() {
        let channel = ScriptedChannel::new(vec![], vec![vec![now(">")]]);
        let log = channel.log();
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(5));

        shell.send("show version", None, &deadline).await.unwrap();
        assert_eq!(log.borrow().writes, vec!["show version\n".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_drain_and_timeout() {
        let channel = ScriptedChannel::new(vec![at(Duration::from_millis(300), "Welcome\r\n>")], vec![]);
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(5));
        assert_eq!(shell.drain_banner(&deadline).await.unwrap(), "Welcome\r\n>");

        let mut silent = shell_with(ScriptedChannel::new(vec![], vec![]));
        let deadline = Deadline::start(Duration::from_secs(1));
        let err = silent.drain_banner(&deadline).await.unwrap_err();
        assert!(matches!(err, ExpectError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_is_idempotent() {
        let channel = ScriptedChannel::new(vec![], vec![]);
        let log = channel.log();
        let mut shell = shell_with(channel);

        shell.terminate();
        shell.terminate();
        drop(shell);
        assert_eq!(log.borrow().close_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_error_is_swallowed() {
        let channel = ScriptedChannel::new(vec![], vec![]).with_failing_close();
        let log = channel.log();
        let mut shell = shell_with(channel);

        shell.terminate();
        assert!(!shell.is_open());
        shell.terminate();
        assert_eq!(log.borrow().close_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_on_non_utf8_output() {
        let channel = ScriptedChannel::new(
            vec![],
            vec![vec![Chunk {
                after: Duration::ZERO,
                data: b"caf\xe9 \xff\xfe router#".to_vec(),
            }]],
        );
        let mut shell = shell_with(channel);
        let deadline = Deadline::start(Duration::from_secs(5));
        let re = pattern(r"router#$");

        let output = shell.send("cmd", Some(&re), &deadline).await.unwrap();
        assert!(output.ends_with("router#"), "got: {output:?}");
        assert!(!deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_on_closed_channel_fails() {
        let mut shell: Shell<ScriptedChannel> = Shell::new();
        let deadline = Deadline::start(Duration::from_secs(5));
        let err = shell.send("cmd", None, &deadline).await.unwrap_err();
        assert!(matches!(err, ExpectError::Connection(_)));
    }

    #[test]
    fn test_target_debug_redacts_secret() {
        let target = Target {
            host: "10.0.0.1".to_string(),
            port: 22,
            username: "admin".to_string(),
            secret: "hunter2".to_string(),
        };
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("admin"));
    }
}
