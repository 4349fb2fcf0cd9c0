// Pinned wire vectors for every encoder, plus decoder round-trips.
//
// These byte sequences are the frozen contract with the processor; any
// change here is a wire-visible change.

use cip_protocol::{CipEvent, EncodeError, Frame, FrameAccumulator, decode, encode};

/// Parse a single complete frame from raw bytes.
fn frame_of(bytes: &[u8]) -> Frame {
    let mut acc = FrameAccumulator::new();
    acc.extend(bytes);
    let frame = acc.next_frame().expect("one complete frame");
    acc.finish().expect("no trailing bytes");
    frame
}

#[test]
fn digital_vectors() {
    let cases: [(u16, bool, bool, &[u8]); 5] = [
        (1, true, true, &[0x05, 0x00, 0x06, 0x00, 0x00, 0x03, 0x27, 0x00, 0x00]),
        (1, false, true, &[0x05, 0x00, 0x06, 0x00, 0x00, 0x03, 0x27, 0x00, 0x80]),
        (1, true, false, &[0x05, 0x00, 0x06, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00]),
        (1, false, false, &[0x05, 0x00, 0x06, 0x00, 0x00, 0x03, 0x00, 0x00, 0x80]),
        (2000, true, true, &[0x05, 0x00, 0x06, 0x00, 0x00, 0x03, 0x27, 0xCF, 0x07]),
    ];
    for (join, high, button, wire) in cases {
        assert_eq!(
            encode::digital_join(join, high, button).unwrap(),
            wire,
            "digital({join}, {high}, {button})"
        );
    }
}

#[test]
fn analog_vectors() {
    let cases: [(u16, u16, &[u8]); 3] = [
        (1, 130, &[0x05, 0x00, 0x08, 0x00, 0x00, 0x05, 0x14, 0x00, 0x00, 0x00, 0x82]),
        (1, 0, &[0x05, 0x00, 0x08, 0x00, 0x00, 0x05, 0x14, 0x00, 0x00, 0x00, 0x00]),
        (1, 65535, &[0x05, 0x00, 0x08, 0x00, 0x00, 0x05, 0x14, 0x00, 0x00, 0xFF, 0xFF]),
    ];
    for (join, value, wire) in cases {
        assert_eq!(
            encode::analog_join(join, value).unwrap(),
            wire,
            "analog({join}, {value})"
        );
    }
}

#[test]
fn serial_vectors() {
    assert_eq!(
        encode::serial_join(1, "foo").unwrap(),
        [0x12, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x07, 0x34, 0x00, 0x00, 0x03, 0x66, 0x6F, 0x6F]
    );
    assert_eq!(
        encode::serial_join(2000, "foo").unwrap(),
        [0x12, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x07, 0x34, 0x07, 0xCF, 0x03, 0x66, 0x6F, 0x6F]
    );
}

#[test]
fn serial_maximum_length_vector() {
    let text: String = "A".repeat(255);
    let wire = encode::serial_join(1, &text).unwrap();
    assert_eq!(wire.len(), 266);
    assert_eq!(wire[0], 0x12);
    assert_eq!(&wire[1..3], &[0x01, 0x07]);
    assert_eq!(&wire[5..7], &[0x01, 0x03]);
    assert_eq!(&wire[11..], text.as_bytes());
}

#[test]
fn fixed_frames() {
    assert_eq!(
        encode::update_request(),
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x02, 0x03, 0x00]
    );
    assert_eq!(encode::heartbeat(), [0x0D, 0x00, 0x02, 0x00, 0x00]);
    assert_eq!(
        encode::end_of_query_reply(),
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x02, 0x03, 0x1D]
    );
    assert_eq!(
        encode::registration_response(0x1A),
        [0x01, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1A, 0x40, 0xFF, 0xFF, 0xF1, 0x01]
    );
}

#[test]
fn every_encoder_rejects_out_of_range_joins() {
    for join in [0u16, 4001, 65535] {
        for result in [
            encode::digital_join(join, true, true),
            encode::analog_join(join, 0),
            encode::serial_join(join, "x"),
        ] {
            assert_eq!(result, Err(EncodeError::InvalidJoinNumber(join)));
        }
    }
}

#[test]
fn serial_string_length_validation() {
    assert_eq!(
        encode::serial_join(1, ""),
        Err(EncodeError::InvalidStringLength(0))
    );
    let long = "b".repeat(300);
    assert_eq!(
        encode::serial_join(1, &long),
        Err(EncodeError::InvalidStringLength(300))
    );
}

#[test]
fn digital_round_trips_through_decoder() {
    for join in [1u16, 2, 255, 256, 2000, 4000] {
        for high in [true, false] {
            for button in [true, false] {
                let wire = encode::digital_join(join, high, button).unwrap();
                let event = decode(&frame_of(&wire)).unwrap();
                assert_eq!(
                    event,
                    CipEvent::Digital { join, high },
                    "digital({join}, {high}, {button})"
                );
            }
        }
    }
}

#[test]
fn analog_round_trips_through_decoder() {
    for (join, value) in [(1u16, 130u16), (1, 0), (1, 65535), (2000, 12345), (4000, 1)] {
        let wire = encode::analog_join(join, value).unwrap();
        let event = decode(&frame_of(&wire)).unwrap();
        assert_eq!(event, CipEvent::Analog { join, value });
    }
}

#[test]
fn serial_round_trips_through_decoder() {
    for (join, text) in [(1u16, "foo"), (2000, "foo"), (4000, "end of line\r\n")] {
        let wire = encode::serial_join(join, text).unwrap();
        let event = decode(&frame_of(&wire)).unwrap();
        assert_eq!(
            event,
            CipEvent::Serial {
                join,
                text: text.to_owned()
            }
        );
    }
}
