//! A blocking byte pipe: one writer, any number of readers, no data ever
//! dropped.
//!
//! Ported from the original emulator's `Stream` type (`bytes.Buffer` guarded
//! by a `sync.Mutex`/`sync.Cond`): `write` appends and wakes every blocked
//! reader, `read` blocks while the buffer is empty and the pipe is open,
//! and `close` is sticky — once closed, pending and future reads drain
//! whatever remains, then fail.

use std::sync::{Condvar, Mutex};

use crate::errors::PipeClosed;

#[derive(Debug, Default)]
struct State {
    buf: Vec<u8>,
    closed: bool,
}

/// A single-producer, blocking byte pipe.
#[derive(Debug)]
pub struct StreamPipe {
    state: Mutex<State>,
    cond: Condvar,
}

impl StreamPipe {
    pub fn new() -> Self {
        StreamPipe {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        }
    }

    /// Append bytes and wake any blocked readers. Returns the number of
    /// bytes written, or `Err(PipeClosed)` once the pipe is closed, matching
    /// the original's `io.EOF`-on-write-after-close behavior.
    pub fn write(&self, data: &[u8]) -> Result<usize, PipeClosed> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(PipeClosed);
        }
        state.buf.extend_from_slice(data);
        self.cond.notify_all();
        Ok(data.len())
    }

    /// Block until at least one byte is available, then drain and return
    /// whatever is buffered (not just one byte — this matches `Read`'s
    /// "fill what you can" contract in the original, since callers pass a
    /// pre-sized buffer there; here the full backlog is returned at once).
    /// Returns `Err(PipeClosed)` only once the buffer is empty *and* the
    /// pipe has been closed.
    pub fn read(&self) -> Result<Vec<u8>, PipeClosed> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.buf.is_empty() {
            if state.closed {
                return Err(PipeClosed);
            }
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        Ok(std::mem::take(&mut state.buf))
    }

    /// Mark the pipe closed and wake every blocked reader. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed
    }
}

impl Default for StreamPipe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn write_then_read_round_trips() {
        let p = StreamPipe::new();
        assert_eq!(p.write(b"hello").unwrap(), 5);
        assert_eq!(p.read().unwrap(), b"hello");
    }

    #[test]
    fn read_blocks_until_write() {
        let p = Arc::new(StreamPipe::new());
        let p2 = Arc::clone(&p);
        let handle = thread::spawn(move || p2.read());
        thread::sleep(Duration::from_millis(50));
        p.write(b"later").unwrap();
        let got = handle.join().unwrap().unwrap();
        assert_eq!(got, b"later");
    }

    #[test]
    fn close_wakes_blocked_reader_with_err() {
        let p = Arc::new(StreamPipe::new());
        let p2 = Arc::clone(&p);
        let handle = thread::spawn(move || p2.read());
        thread::sleep(Duration::from_millis(50));
        p.close();
        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn close_is_idempotent_and_does_not_panic() {
        let p = StreamPipe::new();
        p.close();
        p.close();
        assert!(p.is_closed());
    }

    #[test]
    fn write_after_close_returns_pipe_closed() {
        let p = StreamPipe::new();
        p.close();
        assert!(p.write(b"ignored").is_err());
        assert!(p.read().is_err());
    }

    #[test]
    fn pending_data_drains_before_close_error() {
        let p = StreamPipe::new();
        p.write(b"pending").unwrap();
        p.close();
        assert_eq!(p.read().unwrap(), b"pending");
        assert!(p.read().is_err());
    }
}
