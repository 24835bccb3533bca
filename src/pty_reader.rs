use std::io::Read;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;

/// Non-blocking view of a blocking PTY reader.
///
/// A background thread does the blocking reads and hands chunks over a
/// channel; [`try_read`](Self::try_read) only takes what has already arrived.
pub struct PtyReader {
    output_rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl PtyReader {
    pub fn spawn<R: Read + Send + 'static>(mut reader: R) -> Self {
        let (tx, rx) = channel();

        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            output_rx: rx,
            pending: Vec::new(),
        }
    }

    /// Copy already-received bytes into `buf`; `0` when nothing has arrived.
    ///
    /// Once the program has exited and its output is drained this keeps
    /// returning `0`.
    pub fn try_read(&mut self, buf: &mut [u8]) -> usize {
        if self.pending.is_empty() {
            match self.output_rx.try_recv() {
                Ok(data) => self.pending = data,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return 0,
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}
