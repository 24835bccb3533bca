use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};

/// A local program running inside a pseudo-terminal.
pub struct PtySession {
    #[allow(dead_code)]
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl PtySession {
    /// Spawn `program` in an 80x24 PTY, returning the session and its output
    /// reader separately.
    pub fn spawn(program: &str, args: &[&str]) -> io::Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| io::Error::other(format!("Failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| io::Error::other(format!("Failed to spawn {program}: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| io::Error::other(format!("Failed to get PTY writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| io::Error::other(format!("Failed to get PTY reader: {e}")))?;

        let session = PtySession {
            master: pair.master,
            child,
            writer,
        };
        Ok((session, reader))
    }

    /// Write to the program's terminal input.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }

    /// Kill the program unless it already exited, then reap it.
    pub fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}
