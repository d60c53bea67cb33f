//! Newline framing over a byte stream.
//!
//! The transport delivers a stream of bytes, not messages.  One read may hold
//! half a message, or three messages and the start of a fourth.  The
//! [`LineFramer`] keeps an accumulation buffer: [`push`](LineFramer::push)
//! appends whatever a read returned, and [`next_frame`](LineFramer::next_frame)
//! hands back each complete line in arrival order.
//!
//! # Split invariance
//!
//! Feeding the same byte stream split at any boundaries yields the same
//! sequence of frames.  This includes the over-long line case: a line longer
//! than the limit produces exactly one [`FrameError::LineTooLong`] whether it
//! arrived in one read or many.
//!
//! # Line endings
//!
//! Lines end at `\n`.  A single trailing `\r` is stripped as well, and blank
//! lines are skipped.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::codec::ProtocolError;

/// Default maximum line length in bytes (terminator excluded).
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Errors produced by the framer.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A line exceeded the configured limit.  Its bytes were discarded up to
    /// and including the next terminator.
    #[error("line exceeded {limit} bytes")]
    LineTooLong { limit: usize },
}

impl From<FrameError> for ProtocolError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::LineTooLong { limit } => ProtocolError::LineTooLong { limit },
        }
    }
}

/// Accumulation buffer that yields complete newline-terminated lines.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_len: usize,
    /// Set after an over-long partial line was dropped; bytes are skipped
    /// until the next `\n`.
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    /// Creates a framer that rejects lines longer than `max_line_len` bytes.
    pub fn new(max_line_len: usize) -> Self {
        let max_line_len = max_line_len.max(1);
        Self {
            buf: BytesMut::with_capacity(max_line_len.min(DEFAULT_MAX_LINE_LEN)),
            max_line_len,
            discarding: false,
        }
    }

    /// The configured line limit.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Number of bytes buffered that do not yet form a complete line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends bytes received from the transport.
    pub fn push(&mut self, mut data: &[u8]) {
        if self.discarding {
            match data.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    data = &data[i + 1..];
                    self.discarding = false;
                }
                None => return,
            }
        }
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete line, or `None` if more bytes are needed.
    ///
    /// The returned line has its terminator (and any trailing `\r`) removed.
    pub fn next_frame(&mut self) -> Option<Result<Bytes, FrameError>> {
        loop {
            match self.buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    let mut line = self.buf.split_to(i + 1);
                    line.truncate(i);
                    if line.last() == Some(&b'\r') {
                        line.truncate(i - 1);
                    }
                    if line.is_empty() {
                        continue;
                    }
                    if line.len() > self.max_line_len {
                        return Some(Err(FrameError::LineTooLong {
                            limit: self.max_line_len,
                        }));
                    }
                    return Some(Ok(line.freeze()));
                }
                // `+ 1` leaves room for a `\r` that may precede the terminator
                // in the next read.
                None if self.buf.len() > self.max_line_len + 1 => {
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Err(FrameError::LineTooLong {
                        limit: self.max_line_len,
                    }));
                }
                None => return None,
            }
        }
    }

    /// Drains every complete line currently buffered.
    pub fn drain_frames(&mut self) -> Vec<Result<Bytes, FrameError>> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
