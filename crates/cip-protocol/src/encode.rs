//! Frame encoders for the panel-to-processor direction.
//!
//! Every encoder emits a complete `[type][len_be_u16][payload]` frame. Join
//! ids go on the wire 0-indexed (`join - 1`). The digital join index is
//! transmitted byte-swapped with the inactive-state flag folded into the
//! packed value; that layout is part of the wire contract and is preserved
//! here exactly.

use crate::signal::{JOIN_MAX, JOIN_MIN};

/// Validation failure in an encoder. Nothing is emitted on error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("join number {0} outside {JOIN_MIN}..={JOIN_MAX}")]
    InvalidJoinNumber(u16),
    #[error("serial string length {0} outside 1..=255")]
    InvalidStringLength(usize),
    #[error("serial string contains non-ASCII characters")]
    NonAsciiText,
}

/// Check a public join id and return its 0-indexed wire form.
fn wire_join(join: u16) -> Result<u16, EncodeError> {
    if (JOIN_MIN..=JOIN_MAX).contains(&join) {
        Ok(join - 1)
    } else {
        Err(EncodeError::InvalidJoinNumber(join))
    }
}

/// Set or clear a digital join.
///
/// `button_style` selects the momentary-push variant (kind byte 0x27) over
/// the latched variant (0x00). The join index is packed low-byte-first and
/// bit 7 of the packed value marks the *low* state.
pub fn digital_join(join: u16, high: bool, button_style: bool) -> Result<Vec<u8>, EncodeError> {
    let c = wire_join(join)?;
    let mut packed = (c >> 8) | ((c & 0xFF) << 8);
    if !high {
        packed |= 0x80;
    }
    let kind = if button_style { 0x27 } else { 0x00 };
    Ok(vec![
        0x05,
        0x00,
        0x06,
        0x00,
        0x00,
        0x03,
        kind,
        (packed >> 8) as u8,
        (packed & 0xFF) as u8,
    ])
}

/// Set an analog join to a 16-bit value.
pub fn analog_join(join: u16, value: u16) -> Result<Vec<u8>, EncodeError> {
    let c = wire_join(join)?;
    Ok(vec![
        0x05,
        0x00,
        0x08,
        0x00,
        0x00,
        0x05,
        0x14,
        (c >> 8) as u8,
        (c & 0xFF) as u8,
        (value >> 8) as u8,
        (value & 0xFF) as u8,
    ])
}

/// Send ASCII text on a serial join. Text must be 1-255 ASCII bytes;
/// non-ASCII input is rejected rather than transcoded.
pub fn serial_join(join: u16, text: &str) -> Result<Vec<u8>, EncodeError> {
    let c = wire_join(join)?;
    if text.is_empty() || text.len() > 255 {
        return Err(EncodeError::InvalidStringLength(text.len()));
    }
    if !text.is_ascii() {
        return Err(EncodeError::NonAsciiText);
    }
    let n = text.len() as u16;
    let outer = n + 8;
    let inner = n + 4;
    let mut frame = Vec::with_capacity(11 + text.len());
    frame.extend_from_slice(&[
        0x12,
        (outer >> 8) as u8,
        (outer & 0xFF) as u8,
        0x00,
        0x00,
        (inner >> 8) as u8,
        (inner & 0xFF) as u8,
        0x34,
        (c >> 8) as u8,
        (c & 0xFF) as u8,
        0x03,
    ]);
    frame.extend_from_slice(text.as_bytes());
    Ok(frame)
}

/// Ask the processor to re-broadcast the current value of every join.
///
/// The same frame doubles as the acknowledgement emitted after a successful
/// registration response.
pub fn update_request() -> Vec<u8> {
    vec![0x05, 0x00, 0x05, 0x00, 0x00, 0x02, 0x03, 0x00]
}

/// Client liveness heartbeat.
pub fn heartbeat() -> Vec<u8> {
    vec![0x0D, 0x00, 0x02, 0x00, 0x00]
}

/// First half of the end-of-query acknowledgement pair; followed on the
/// wire by a [`heartbeat`] with no other frame in between.
pub fn end_of_query_reply() -> Vec<u8> {
    vec![0x05, 0x00, 0x05, 0x00, 0x00, 0x02, 0x03, 0x1D]
}

/// Identify this panel to the processor after its registration request.
pub fn registration_response(ipid: u8) -> Vec<u8> {
    vec![
        0x01, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, ipid, 0x40, 0xFF, 0xFF, 0xF1, 0x01,
    ]
}
