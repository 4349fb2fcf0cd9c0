//! Length-prefix frame re-assembly.
//!
//! The byte stream arrives in arbitrary chunks; [`FrameAccumulator`]
//! buffers them and slices out whole `[type][len_be_u16][payload]` frames.
//! A frame split across chunk boundaries is held until its remainder
//! arrives; leftover bytes at end-of-stream mean the peer closed mid-frame
//! and are reported as a framing error rather than guessed at.

use bytes::{Buf, BytesMut};

/// Bytes in the `[type][len_be_u16]` header.
pub const HEADER_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One re-assembled wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Re-serialize to the exact on-wire byte sequence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(self.frame_type);
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// The peer closed the stream in the middle of a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("stream ended mid-frame with {0} bytes buffered")]
    Truncated(usize),
}

// ---------------------------------------------------------------------------
// FrameAccumulator
// ---------------------------------------------------------------------------

/// Growable buffer turning a chunked byte stream into whole frames.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: BytesMut,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Append one chunk as delivered by the transport.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Slice out the next complete frame, or `None` until more bytes arrive.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }
        let len = usize::from(u16::from_be_bytes([self.buf[1], self.buf[2]]));
        if self.buf.len() < HEADER_LEN + len {
            return None;
        }
        let frame_type = self.buf[0];
        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).to_vec();
        Some(Frame {
            frame_type,
            payload,
        })
    }

    /// Call at end-of-stream. Buffered bytes that never completed a frame
    /// are a framing error; the caller should drop the connection.
    pub fn finish(&self) -> Result<(), FramingError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FramingError::Truncated(self.buf.len()))
        }
    }
}
