//! The Screen Hub: owns the shared [`Terminal`] and the set of attached
//! [`ViewerSession`]s, and fans PTY output out to every live viewer.
//!
//! Grounded in the original emulator's `screen.Screen`/`main.go` globals
//! (`defaultScreen`, `sendToAll`, `removeConnection`) and in the reference
//! crate's own session-set-under-a-lock pattern (`hub/mod.rs`): the session
//! list is snapshotted under a short lock, then written to with the lock
//! released, so one slow viewer can never block delivery to the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::framing::{Frame, CMD_MSG, CMD_RESIZE};
use crate::pipe::StreamPipe;
use crate::terminal::Terminal;

/// One attached viewer: an outbound [`StreamPipe`] the hub writes framed
/// bytes into, and a private counter for that viewer's frame sequence.
///
/// The pipe is written to by the hub (under no lock beyond the session
/// map's momentary snapshot) and drained by the viewer's own outbound task
/// (see `crate::session`), matching the original `client.Client`'s split
/// between `Send`/`Write` (producer side) and `WriteLoop` (consumer side).
#[derive(Debug)]
pub struct ViewerSession {
    pub id: Uuid,
    pipe: StreamPipe,
    counter: AtomicU16,
}

impl ViewerSession {
    fn new() -> Arc<Self> {
        Arc::new(ViewerSession {
            id: Uuid::new_v4(),
            pipe: StreamPipe::new(),
            counter: AtomicU16::new(0),
        })
    }

    fn send(&self, cmd: u8, payload: Vec<u8>) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let frame = Frame {
            cmd,
            counter,
            payload,
        };
        match frame.encode() {
            Ok(bytes) => {
                if let Err(e) = self.pipe.write(&bytes) {
                    log::debug!("session {} write after close: {e}", self.id);
                }
            }
            Err(e) => log::warn!("dropping frame for session {}: {e}", self.id),
        }
    }

    /// Block until outbound bytes are ready, or the pipe closes. Intended
    /// to be called from a dedicated thread/`spawn_blocking`, never from
    /// inside a lock.
    pub fn recv_outbound(&self) -> Result<Vec<u8>, crate::errors::PipeClosed> {
        self.pipe.read()
    }

    pub fn close(&self) {
        self.pipe.close();
    }
}

/// Shared terminal plus the set of attached viewers.
#[derive(Debug)]
pub struct ScreenHub {
    terminal: Mutex<Terminal>,
    sessions: Mutex<HashMap<Uuid, Arc<ViewerSession>>>,
    streaming_enabled: std::sync::atomic::AtomicBool,
    version: String,
    motd: Mutex<String>,
}

impl ScreenHub {
    pub fn new(rows: usize, cols: usize, version: impl Into<String>) -> Arc<Self> {
        Arc::new(ScreenHub {
            terminal: Mutex::new(Terminal::new(rows, cols)),
            sessions: Mutex::new(HashMap::new()),
            streaming_enabled: std::sync::atomic::AtomicBool::new(true),
            version: version.into(),
            motd: Mutex::new(String::new()),
        })
    }

    pub fn size(&self) -> (usize, usize) {
        self.terminal.lock().unwrap_or_else(|e| e.into_inner()).size()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Set the banner sent as the first `MSG` frame a viewer sees, ahead of
    /// the catch-up burst. An empty string disables it. Intended to be
    /// called once at startup, before any viewer attaches.
    pub fn set_motd(&self, motd: impl Into<String>) {
        *self.motd.lock().unwrap_or_else(|e| e.into_inner()) = motd.into();
    }

    /// Feed bytes read from the PTY into the terminal and forward the same
    /// bytes verbatim to every attached viewer as an `MSG` frame. Each
    /// viewer's own frame counter advances independently.
    pub fn feed_pty_output(&self, bytes: &[u8]) {
        {
            let mut term = self.terminal.lock().unwrap_or_else(|e| e.into_inner());
            term.write(bytes);
        }
        if !self.streaming_enabled.load(Ordering::Relaxed) {
            return;
        }
        self.broadcast(CMD_MSG, bytes.to_vec());
    }

    /// Attach a new viewer, replaying a catch-up burst (the viewer's
    /// requested size, a screen clear/home, the current screen snapshot,
    /// and the cursor position) so it renders the live screen immediately
    /// without having seen any prior PTY output.
    pub fn attach(&self, rows: usize, cols: usize) -> Arc<ViewerSession> {
        let session = ViewerSession::new();
        let (snapshot, cursor, term_rows, term_cols) = {
            let term = self.terminal.lock().unwrap_or_else(|e| e.into_inner());
            (
                term.screen_as_ansi(),
                term.cursor_pos(),
                term.size().0,
                term.size().1,
            )
        };
        let _ = (rows, cols); // the viewer's hinted size; the hub is authoritative on actual size
        let motd = self.motd.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if !motd.is_empty() {
            session.send(CMD_MSG, motd.into_bytes());
        }
        session.send(
            CMD_MSG,
            format!("\x1b[8;{term_rows};{term_cols}t\x1b[2J\x1b[0;0H").into_bytes(),
        );
        session.send(CMD_RESIZE, format!("{term_rows}:{term_cols}").into_bytes());
        session.send(CMD_MSG, snapshot);
        session.send(
            CMD_MSG,
            format!("\x1b[{};{}H", cursor.0 + 1, cursor.1 + 1).into_bytes(),
        );
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id, Arc::clone(&session));
        session
    }

    pub fn detach(&self, id: Uuid) {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
        {
            session.close();
        }
    }

    pub fn detach_all(&self) {
        let sessions: Vec<Arc<ViewerSession>> = {
            let mut map = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().map(|(_, s)| s).collect()
        };
        for s in sessions {
            s.close();
        }
    }

    /// Resize the shared terminal and tell every viewer about the new
    /// dimensions.
    pub fn resize(&self, rows: usize, cols: usize) {
        {
            let mut term = self.terminal.lock().unwrap_or_else(|e| e.into_inner());
            term.resize(rows, cols);
        }
        self.broadcast(CMD_RESIZE, format!("{rows}:{cols}").into_bytes());
    }

    /// `enable-ws-stream`: re-home every viewer and resume forwarding PTY
    /// output, matching the original API's "enable-ws-stream" action.
    pub fn enable_streaming(&self) {
        self.streaming_enabled.store(true, Ordering::Relaxed);
        let (rows, cols) = self.size();
        self.broadcast(
            CMD_MSG,
            format!("\x1b[8;{rows};{cols}t\x1b[2J\x1b[0;0H").into_bytes(),
        );
        self.broadcast(CMD_RESIZE, format!("{rows}:{cols}").into_bytes());
    }

    /// `disable-ws-stream`: stop forwarding PTY output to viewers. Attached
    /// sessions stay connected; they simply stop receiving updates.
    pub fn disable_streaming(&self) {
        self.streaming_enabled.store(false, Ordering::Relaxed);
    }

    fn broadcast(&self, cmd: u8, payload: Vec<u8>) {
        // Snapshot under a short lock; the actual (possibly slow) writes
        // happen with no lock held, so one stuck viewer can't stall the
        // others or the PTY reader.
        let sessions: Vec<Arc<ViewerSession>> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for session in sessions {
            session.send(cmd, payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_delivers_a_catch_up_burst() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let bytes = session.recv_outbound().unwrap();
        let frames = crate::framing::FrameDecoder::new().feed(&bytes).unwrap();
        assert!(!frames.is_empty());
    }

    #[test]
    fn feed_pty_output_reaches_attached_viewer() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let _ = session.recv_outbound().unwrap(); // drain catch-up burst
        hub.feed_pty_output(b"hello");
        let bytes = session.recv_outbound().unwrap();
        let frames = crate::framing::FrameDecoder::new().feed(&bytes).unwrap();
        assert_eq!(frames[0].payload, b"hello");
    }

    #[test]
    fn a_slow_viewer_does_not_block_others() {
        let hub = ScreenHub::new(4, 10, "test");
        let a = hub.attach(4, 10);
        let b = hub.attach(4, 10);
        let _ = a.recv_outbound().unwrap();
        let _ = b.recv_outbound().unwrap();
        hub.feed_pty_output(b"x");
        // `a` never reads again; `b` must still get its copy.
        let bytes_b = b.recv_outbound().unwrap();
        assert!(!bytes_b.is_empty());
        let _ = a; // still pending, unread, but didn't block the broadcast above
    }

    #[test]
    fn detach_closes_the_session_pipe() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let id = session.id;
        hub.detach(id);
        assert!(session.pipe.is_closed());
    }

    #[test]
    fn disable_streaming_stops_forwarding() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let _ = session.recv_outbound().unwrap();
        hub.disable_streaming();
        hub.feed_pty_output(b"ignored");
        hub.detach(session.id); // closes the pipe so the blocked read below returns
        assert!(session.recv_outbound().is_err());
    }

    #[test]
    fn motd_is_sent_ahead_of_the_catch_up_burst() {
        let hub = ScreenHub::new(4, 10, "test");
        hub.set_motd("welcome");
        let session = hub.attach(4, 10);
        let bytes = session.recv_outbound().unwrap();
        let frames = crate::framing::FrameDecoder::new().feed(&bytes).unwrap();
        assert_eq!(frames[0].cmd, CMD_MSG);
        assert_eq!(frames[0].payload, b"welcome");
    }

    #[test]
    fn empty_motd_sends_no_extra_frame() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let bytes = session.recv_outbound().unwrap();
        let frames = crate::framing::FrameDecoder::new().feed(&bytes).unwrap();
        // first frame is the resize-equivalent size escape, not the motd
        assert_eq!(frames[0].cmd, CMD_MSG);
        assert_ne!(frames[0].payload, b"welcome");
    }

    #[test]
    fn resize_broadcasts_to_all_viewers() {
        let hub = ScreenHub::new(4, 10, "test");
        let session = hub.attach(4, 10);
        let _ = session.recv_outbound().unwrap();
        hub.resize(6, 20);
        let bytes = session.recv_outbound().unwrap();
        let frames = crate::framing::FrameDecoder::new().feed(&bytes).unwrap();
        assert_eq!(frames[0].cmd, CMD_RESIZE);
        assert_eq!(frames[0].payload, b"6:20");
    }
}
