use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::time::Duration;

/// Default line capacity. Console output of the simulator stays far below
/// this; a full relay blocks the producing reader thread rather than
/// dropping lines.
pub const DEFAULT_RELAY_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        })
    }
}

/// One line of simulator console output, tagged with its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

/// Producer half handed to the supervisor's reader threads. Cloneable; the
/// two streams write into one FIFO queue.
#[derive(Clone)]
pub struct LogSender {
    tx: Sender<LogLine>,
}

impl LogSender {
    /// Enqueues a line, blocking while the relay is full. A send after the
    /// relay was dropped is silently discarded; readers may still be
    /// flushing final output during shutdown.
    pub fn send(&self, stream: LogStream, text: impl Into<String>) {
        let _ = self.tx.send(LogLine {
            stream,
            text: text.into(),
        });
    }
}

/// Bounded, order-preserving hand-off between the supervisor's reader
/// threads and the single log consumer. The consumer polls [`drain`] on a
/// fixed period (the UI uses ~100 ms) and never blocks beyond the lines
/// already buffered.
///
/// [`drain`]: LogRelay::drain
pub struct LogRelay {
    tx: Sender<LogLine>,
    rx: Receiver<LogLine>,
}

impl LogRelay {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RELAY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> LogSender {
        LogSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything currently queued, FIFO, without blocking.
    pub fn drain(&self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Blocking receive with a deadline, for callers that want to wait for
    /// output instead of polling.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LogLine> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for LogRelay {
    fn default() -> Self {
        Self::new()
    }
}
