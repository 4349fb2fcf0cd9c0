//! Crestron-over-IP (CIP) wire protocol: join codec and length-prefix
//! framing.
//!
//! CIP is the TCP-framed binary protocol a Crestron control processor
//! speaks to its virtual touch panels. Every frame on the wire is
//! `[type:u8][length:u16 BE][payload]`, where `length` counts payload bytes
//! only. Panel state is exchanged over numbered *joins*, each typed as
//! digital (bool), analog (u16), or serial (ASCII text).
//!
//! This crate is pure: encoders produce exact byte sequences, decoders
//! classify inbound frames, and [`FrameAccumulator`] re-assembles frames
//! from an arbitrary chunking of the byte stream. Connection management
//! lives elsewhere.

pub mod decode;
pub mod encode;
pub mod framing;
pub mod signal;

pub use decode::{CipEvent, DecodeError, RegistrationResult, UpdateKind, decode};
pub use encode::EncodeError;
pub use framing::{Frame, FrameAccumulator, FramingError};
pub use signal::{JOIN_MAX, JOIN_MIN, SignalType, SignalValue};

/// TCP port a control processor listens on for panel connections.
pub const DEFAULT_PORT: u16 = 41794;
