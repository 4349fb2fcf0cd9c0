//! Inbound frame classification.
//!
//! [`decode`] maps a re-assembled [`Frame`] onto a [`CipEvent`]. Join
//! updates carry the 1-indexed join id; the digital join index arrives
//! low-byte-first with bit 7 of the packed high byte marking the *low*
//! state, mirroring the outbound layout.

use crate::framing::Frame;

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// Sub-kinds of the update-request subframe (data frame, kind byte 0x03).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// 0x00 - plain update request; no reply expected.
    Standard,
    /// 0x16 - emitted by some processors near the end of the update burst.
    /// Its meaning is undocumented; the client acknowledges it with silence
    /// rather than guessing.
    Penultimate,
    /// 0x1C - the processor finished its update burst; requires the
    /// two-frame acknowledgement.
    EndOfQuery,
    /// 0x1D - acknowledgement of an end-of-query reply; no further reply.
    EndOfQueryAck,
}

/// Outcome of a registration response frame (type 0x02).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationResult {
    Success,
    /// The processor's program has no panel definition for this IPID.
    IpidRejected,
    Unknown,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipEvent {
    Digital { join: u16, high: bool },
    Analog { join: u16, value: u16 },
    Serial { join: u16, text: String },
    Update(UpdateKind),
    /// Date/time broadcast from the processor; logged, never answered.
    DateTime,
    /// The processor asks the panel to identify itself (type 0x0F).
    RegistrationRequest,
    Registration(RegistrationResult),
    /// Processor-side heartbeat (types 0x0D/0x0E); answered by silence.
    Heartbeat,
    /// Control-system-initiated disconnect (type 0x03).
    Disconnect,
}

/// Frame that does not decode to any recognized event. Non-fatal: callers
/// log and skip, keeping the connection up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized frame type 0x{0:02X}")]
    UnknownFrameType(u8),
    #[error("unrecognized data subframe kind 0x{0:02X}")]
    UnknownDataKind(u8),
    #[error("frame type 0x{frame_type:02X} payload too short ({len} bytes)")]
    ShortPayload { frame_type: u8, len: usize },
    #[error("serial join payload is not valid text")]
    InvalidText,
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Classify one inbound frame.
pub fn decode(frame: &Frame) -> Result<CipEvent, DecodeError> {
    let p = frame.payload.as_slice();
    match frame.frame_type {
        0x0D | 0x0E => Ok(CipEvent::Heartbeat),
        0x03 => Ok(CipEvent::Disconnect),
        0x0F => Ok(CipEvent::RegistrationRequest),
        0x02 => Ok(CipEvent::Registration(registration_result(p))),
        0x05 => decode_data(p),
        0x12 => decode_serial(p),
        other => Err(DecodeError::UnknownFrameType(other)),
    }
}

fn short(frame_type: u8, len: usize) -> DecodeError {
    DecodeError::ShortPayload { frame_type, len }
}

fn decode_data(p: &[u8]) -> Result<CipEvent, DecodeError> {
    if p.len() < 4 {
        return Err(short(0x05, p.len()));
    }
    match p[3] {
        // 0x27 is the button-style variant of the same digital layout.
        0x00 | 0x27 => {
            if p.len() < 6 {
                return Err(short(0x05, p.len()));
            }
            let lo = u16::from(p[4]);
            let packed_hi = p[5];
            let join = ((u16::from(packed_hi & 0x7F) << 8) | lo) + 1;
            // Bit 7 set means the join is low.
            let high = packed_hi & 0x80 == 0;
            Ok(CipEvent::Digital { join, high })
        }
        0x14 => {
            if p.len() < 8 {
                return Err(short(0x05, p.len()));
            }
            let join = ((u16::from(p[4]) << 8) | u16::from(p[5])) + 1;
            let value = (u16::from(p[6]) << 8) | u16::from(p[7]);
            Ok(CipEvent::Analog { join, value })
        }
        0x03 => {
            if p.len() < 5 {
                return Err(short(0x05, p.len()));
            }
            match p[4] {
                0x00 => Ok(CipEvent::Update(UpdateKind::Standard)),
                0x16 => Ok(CipEvent::Update(UpdateKind::Penultimate)),
                0x1C => Ok(CipEvent::Update(UpdateKind::EndOfQuery)),
                0x1D => Ok(CipEvent::Update(UpdateKind::EndOfQueryAck)),
                other => Err(DecodeError::UnknownDataKind(other)),
            }
        }
        0x08 => Ok(CipEvent::DateTime),
        other => Err(DecodeError::UnknownDataKind(other)),
    }
}

fn decode_serial(p: &[u8]) -> Result<CipEvent, DecodeError> {
    if p.len() < 8 {
        return Err(short(0x12, p.len()));
    }
    let join = ((u16::from(p[5]) << 8) | u16::from(p[6])) + 1;
    let text = std::str::from_utf8(&p[8..])
        .map_err(|_| DecodeError::InvalidText)?
        .to_owned();
    Ok(CipEvent::Serial { join, text })
}

fn registration_result(p: &[u8]) -> RegistrationResult {
    match p {
        [0xFF, 0xFF, 0x02] => RegistrationResult::IpidRejected,
        [0x00, 0x00, 0x00, 0x1F] => RegistrationResult::Success,
        _ => RegistrationResult::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_type: u8, payload: &[u8]) -> Frame {
        Frame {
            frame_type,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn digital_update_reconstructs_swapped_join_index() {
        // Join 5, high: index 4 arrives low-byte-first.
        let event = decode(&frame(0x05, &[0x00, 0x00, 0x00, 0x00, 0x04, 0x00])).unwrap();
        assert_eq!(
            event,
            CipEvent::Digital {
                join: 5,
                high: true
            }
        );

        // Join 2000, low: bit 7 of the packed high byte flags the state.
        let event = decode(&frame(0x05, &[0x00, 0x00, 0x00, 0x00, 0xCF, 0x87])).unwrap();
        assert_eq!(
            event,
            CipEvent::Digital {
                join: 2000,
                high: false
            }
        );
    }

    #[test]
    fn analog_update_is_big_endian() {
        let event = decode(&frame(
            0x05,
            &[0x00, 0x00, 0x05, 0x14, 0x07, 0xCF, 0x30, 0x39],
        ))
        .unwrap();
        assert_eq!(
            event,
            CipEvent::Analog {
                join: 2000,
                value: 12345
            }
        );
    }

    #[test]
    fn serial_update_extracts_join_and_text() {
        let event = decode(&frame(
            0x12,
            &[0x00, 0x00, 0x00, 0x07, 0x34, 0x00, 0x02, 0x03, 0x66, 0x6F, 0x6F],
        ))
        .unwrap();
        assert_eq!(
            event,
            CipEvent::Serial {
                join: 3,
                text: "foo".to_owned()
            }
        );
    }

    #[test]
    fn update_subframe_kinds() {
        for (kind_byte, kind) in [
            (0x00, UpdateKind::Standard),
            (0x16, UpdateKind::Penultimate),
            (0x1C, UpdateKind::EndOfQuery),
            (0x1D, UpdateKind::EndOfQueryAck),
        ] {
            let event = decode(&frame(0x05, &[0x00, 0x00, 0x00, 0x03, kind_byte])).unwrap();
            assert_eq!(event, CipEvent::Update(kind));
        }
        assert_eq!(
            decode(&frame(0x05, &[0x00, 0x00, 0x00, 0x03, 0x42])),
            Err(DecodeError::UnknownDataKind(0x42))
        );
    }

    #[test]
    fn registration_outcomes() {
        assert_eq!(
            decode(&frame(0x02, &[0x00, 0x00, 0x00, 0x1F])).unwrap(),
            CipEvent::Registration(RegistrationResult::Success)
        );
        assert_eq!(
            decode(&frame(0x02, &[0xFF, 0xFF, 0x02])).unwrap(),
            CipEvent::Registration(RegistrationResult::IpidRejected)
        );
        assert_eq!(
            decode(&frame(0x02, &[0xAB, 0xCD])).unwrap(),
            CipEvent::Registration(RegistrationResult::Unknown)
        );
    }

    #[test]
    fn housekeeping_frames() {
        assert_eq!(decode(&frame(0x0D, &[0x00, 0x00])).unwrap(), CipEvent::Heartbeat);
        assert_eq!(decode(&frame(0x0E, &[0x00, 0x00])).unwrap(), CipEvent::Heartbeat);
        assert_eq!(decode(&frame(0x03, &[])).unwrap(), CipEvent::Disconnect);
        assert_eq!(
            decode(&frame(0x0F, &[0x02])).unwrap(),
            CipEvent::RegistrationRequest
        );
        assert_eq!(
            decode(&frame(0x05, &[0x00, 0x00, 0x00, 0x08, 0x01])).unwrap(),
            CipEvent::DateTime
        );
    }

    #[test]
    fn unknown_frame_types_and_short_payloads_error() {
        assert_eq!(
            decode(&frame(0x7E, &[])),
            Err(DecodeError::UnknownFrameType(0x7E))
        );
        assert_eq!(
            decode(&frame(0x05, &[0x00, 0x00])),
            Err(DecodeError::ShortPayload {
                frame_type: 0x05,
                len: 2
            })
        );
        assert_eq!(
            decode(&frame(0x12, &[0x00, 0x00, 0x00, 0x03])),
            Err(DecodeError::ShortPayload {
                frame_type: 0x12,
                len: 4
            })
        );
    }

    #[test]
    fn serial_update_with_invalid_utf8_is_rejected() {
        let result = decode(&frame(
            0x12,
            &[0x00, 0x00, 0x00, 0x05, 0x34, 0x00, 0x00, 0x03, 0xFF],
        ));
        assert_eq!(result, Err(DecodeError::InvalidText));
    }
}
