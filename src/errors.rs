//! Typed errors for the parts of the system where a caller branches on the
//! failure kind, rather than just logging and moving on. Process-boundary
//! code (config I/O, PTY spawn, CLI) uses `anyhow` instead; see `main.rs`.

use std::fmt;

/// An unrecognized SGR parameter. Non-fatal: the terminal logs it and the
/// parameter stream continues at the next attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrError {
    UnknownCode(u32),
}

impl fmt::Display for SgrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SgrError::UnknownCode(c) => write!(f, "unknown SGR code: {c}"),
        }
    }
}

impl std::error::Error for SgrError {}

/// A parser-level error recorded against a [`crate::terminal::Terminal`].
/// None of these interrupt byte processing; they are surfaced through
/// `Terminal::last_errors()` for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalError {
    UnknownCsi(u8),
    UnknownEsc(u8),
    Sgr(SgrError),
    OffsetOutOfBounds { offset: usize, len: usize },
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalError::UnknownCsi(b) => write!(f, "unknown CSI final byte: {:#04x}", b),
            TerminalError::UnknownEsc(b) => write!(f, "unknown ESC sequence: {:#04x}", b),
            TerminalError::Sgr(e) => write!(f, "{e}"),
            TerminalError::OffsetOutOfBounds { offset, len } => {
                write!(f, "offset {offset} out of bounds for length {len}")
            }
        }
    }
}

impl std::error::Error for TerminalError {}

impl From<SgrError> for TerminalError {
    fn from(e: SgrError) -> Self {
        TerminalError::Sgr(e)
    }
}

/// Framing codec failures (§4.1 / §6 of the wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Declared payload length exceeds `MAX_DATA_SIZE`, or the buffer was
    /// too short to contain a full header.
    InvalidSize { declared: usize, max: usize },
    /// The trailing FNV-1a checksum did not match the computed one.
    InvalidChecksum { expected: u32, actual: u32 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidSize { declared, max } => {
                write!(f, "frame payload size {declared} exceeds maximum {max}")
            }
            FrameError::InvalidChecksum { expected, actual } => write!(
                f,
                "frame checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// The Stream Pipe has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeClosed;

impl fmt::Display for PipeClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream pipe is closed")
    }
}

impl std::error::Error for PipeClosed {}
