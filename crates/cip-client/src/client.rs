//! Public facade: [`CipClient`] and its operation surface.

use std::fmt;
use std::sync::{Arc, Mutex};

use cip_protocol::{EncodeError, SignalType, SignalValue, encode};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::{CipConfig, DebugLevel};
use crate::engine::{self, Shared};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Connection lifecycle state, as reported to the state callback and
/// [`CipClient::connection_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the delay before the next connection attempt.
    Retrying,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Retrying => write!(f, "retrying"),
        }
    }
}

// ---------------------------------------------------------------------------
// SendError
// ---------------------------------------------------------------------------

/// Synchronous failure of a send operation. In either case no bytes reach
/// the wire.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The client is not both connected and registered.
    #[error("client is not connected and registered (state: {0})")]
    NotReady(ConnectionState),
}

// ---------------------------------------------------------------------------
// CipClient
// ---------------------------------------------------------------------------

/// A virtual-panel client for one control processor.
///
/// All methods take `&self`; the client is cheap to share behind an `Arc`.
/// Dropping the client tears the engine down.
pub struct CipClient {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl CipClient {
    pub fn new(config: CipConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            supervisor: Mutex::new(None),
        }
    }

    /// Start connecting to the processor. Returns immediately; progress is
    /// observable through the state callbacks and accessors.
    ///
    /// Connection attempts retry on a 2 s timer until the processor
    /// answers. `auto_reconnect` governs what happens after an established
    /// session drops: when `true` the engine reconnects after 1 s, except
    /// following an IPID rejection, which no amount of retrying can fix.
    ///
    /// Must be called from within a tokio runtime. A second call while the
    /// engine is running is ignored.
    pub fn connect(&self, auto_reconnect: bool) {
        let mut supervisor = self.supervisor.lock().unwrap();
        if let Some((_, handle)) = supervisor.as_ref()
            && !handle.is_finished()
        {
            if self.shared.debug_at(DebugLevel::Low) {
                warn!("connect() ignored: engine already running");
            }
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(engine::run(
            self.shared.clone(),
            auto_reconnect,
            shutdown_rx,
        ));
        *supervisor = Some((shutdown_tx, handle));
    }

    /// Disconnect and stop the engine. Cancels the heartbeat and any
    /// reconnect timer and drops pending writes; completes once the engine
    /// task has exited.
    pub async fn disconnect(&self) {
        let taken = self.supervisor.lock().unwrap().take();
        if let Some((shutdown_tx, handle)) = taken {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Observe a join. Callbacks for the same key fire in subscription
    /// order; subscriptions cannot be removed. Subscribing before
    /// [`connect`](Self::connect) guarantees the callback sees the initial
    /// burst of joins the processor emits on registration.
    pub fn subscribe(
        &self,
        signal: SignalType,
        join: u16,
        cb: impl Fn(SignalType, u16, &SignalValue) + Send + Sync + 'static,
    ) {
        self.shared.registry.subscribe(signal, join, Box::new(cb));
    }

    /// Observe a digital join as `(join, high)`.
    pub fn subscribe_digital(&self, join: u16, cb: impl Fn(u16, bool) + Send + Sync + 'static) {
        self.subscribe(SignalType::Digital, join, move |_, id, value| {
            if let SignalValue::Bool(high) = value {
                cb(id, *high);
            }
        });
    }

    /// Observe an analog join as `(join, value)`.
    pub fn subscribe_analog(&self, join: u16, cb: impl Fn(u16, u16) + Send + Sync + 'static) {
        self.subscribe(SignalType::Analog, join, move |_, id, value| {
            if let SignalValue::U16(v) = value {
                cb(id, *v);
            }
        });
    }

    /// Observe a serial join as `(join, text)`.
    pub fn subscribe_serial(&self, join: u16, cb: impl Fn(u16, &str) + Send + Sync + 'static) {
        self.subscribe(SignalType::Serial, join, move |_, id, value| {
            if let SignalValue::String(text) = value {
                cb(id, text);
            }
        });
    }

    // -----------------------------------------------------------------------
    // Join operations
    // -----------------------------------------------------------------------

    /// Drive a digital join high or low.
    pub fn set_digital_join(
        &self,
        join: u16,
        high: bool,
        button_style: bool,
    ) -> Result<(), SendError> {
        let frame = encode::digital_join(join, high, button_style)?;
        self.shared.send_user_frames(vec![frame])
    }

    /// Button-style digital high.
    pub fn press(&self, join: u16) -> Result<(), SendError> {
        self.set_digital_join(join, true, true)
    }

    /// Button-style digital low.
    pub fn release(&self, join: u16) -> Result<(), SendError> {
        self.set_digital_join(join, false, true)
    }

    /// Press immediately followed by release: two frames, each paced, with
    /// nothing interleaved between them.
    pub fn pulse(&self, join: u16) -> Result<(), SendError> {
        let press = encode::digital_join(join, true, true)?;
        let release = encode::digital_join(join, false, true)?;
        self.shared.send_user_frames(vec![press, release])
    }

    /// Set an analog join to a 16-bit value.
    pub fn set_analog(&self, join: u16, value: u16) -> Result<(), SendError> {
        let frame = encode::analog_join(join, value)?;
        self.shared.send_user_frames(vec![frame])
    }

    /// Send 1-255 bytes of ASCII text on a serial join.
    pub fn send_serial(&self, join: u16, text: &str) -> Result<(), SendError> {
        let frame = encode::serial_join(join, text)?;
        self.shared.send_user_frames(vec![frame])
    }

    /// Ask the processor to re-broadcast the current value of every join.
    pub fn send_update_request(&self) -> Result<(), SendError> {
        self.shared.send_user_frames(vec![encode::update_request()])
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the processor has accepted this panel's registration.
    pub fn registered(&self) -> bool {
        self.shared.registered()
    }
}

impl fmt::Debug for CipClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipClient")
            .field("config", &self.shared.config)
            .field("state", &self.connection_state())
            .field("registered", &self.registered())
            .finish()
    }
}
