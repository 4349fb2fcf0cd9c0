//! Virtual-panel client for Crestron-over-IP (CIP).
//!
//! The client registers with a Crestron control processor as an XPanel
//! identified by an IPID, observes join updates the processor pushes, and
//! drives joins back. [`CipClient`] is the whole embedder surface:
//!
//! ```no_run
//! use cip_client::{CipClient, CipConfig};
//!
//! # async fn demo() {
//! let config = CipConfig::new("192.168.1.2", 0x03);
//! let client = CipClient::new(config);
//! client.subscribe_digital(17, |join, high| {
//!     println!("join {join} is now {high}");
//! });
//! client.connect(true);
//! # }
//! ```
//!
//! Subscriptions added before [`CipClient::connect`] are guaranteed to
//! observe the initial burst of joins the processor emits on registration.

pub mod client;
pub mod config;
mod engine;
mod registry;

pub use cip_protocol::{EncodeError, JOIN_MAX, JOIN_MIN, SignalType, SignalValue};
pub use client::{CipClient, ConnectionState, SendError};
pub use config::{CipConfig, DebugLevel};
