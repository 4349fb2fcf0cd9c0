//! Client configuration.

use std::fmt;

use cip_protocol::{SignalType, SignalValue};

use crate::client::ConnectionState;

/// Observer of join updates: `(signal type, join id, value)`.
pub type SignalCallback = Box<dyn Fn(SignalType, u16, &SignalValue) + Send + Sync>;
/// Observer of connection lifecycle transitions.
pub type ConnectionStateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;
/// Observer of registration state changes.
pub type RegistrationCallback = Box<dyn Fn(bool) + Send + Sync>;

// ---------------------------------------------------------------------------
// DebugLevel
// ---------------------------------------------------------------------------

/// Verbosity of the client's tracing output. Levels are cumulative; `Off`
/// silences everything, including errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    #[default]
    Off,
    /// Lifecycle transitions and errors.
    Low,
    /// Every protocol event.
    Moderate,
    /// Hex dump of every inbound and outbound frame.
    High,
}

// ---------------------------------------------------------------------------
// CipConfig
// ---------------------------------------------------------------------------

/// Connection parameters and lifecycle observers. Immutable once the client
/// is constructed.
pub struct CipConfig {
    /// Control processor hostname or address.
    pub host: String,
    /// Control processor port.
    pub port: u16,
    /// The panel identity to register as, from the processor's program.
    pub ipid: u8,
    pub debug: DebugLevel,
    pub(crate) on_connection_state: Option<ConnectionStateCallback>,
    pub(crate) on_registration_state: Option<RegistrationCallback>,
}

impl CipConfig {
    pub fn new(host: impl Into<String>, ipid: u8) -> Self {
        Self {
            host: host.into(),
            port: cip_protocol::DEFAULT_PORT,
            ipid,
            debug: DebugLevel::Off,
            on_connection_state: None,
            on_registration_state: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    /// Invoked on every connection-state transition.
    pub fn on_connection_state(
        mut self,
        cb: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.on_connection_state = Some(Box::new(cb));
        self
    }

    /// Invoked on every registration change.
    pub fn on_registration_state(mut self, cb: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_registration_state = Some(Box::new(cb));
        self
    }
}

impl fmt::Debug for CipConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ipid", &self.ipid)
            .field("debug", &self.debug)
            .field("on_connection_state", &self.on_connection_state.is_some())
            .field("on_registration_state", &self.on_registration_state.is_some())
            .finish()
    }
}
