//! Connection engine: supervisor, session loop, and paced outbound writes.
//!
//! # Lifecycle
//! 1. The supervisor attempts a TCP connect (2 s timeout); failures re-arm
//!    a 2 s retry timer until the processor appears or the client shuts
//!    down.
//! 2. An established session runs a single cooperative loop owning both
//!    stream halves: it reads and dispatches inbound frames, drains the
//!    outbound queue, and fires the heartbeat timer. Nothing else ever
//!    writes to the socket.
//! 3. The processor opens the handshake with a registration request
//!    (0x0F); the client answers with its IPID and, on the success
//!    response, acknowledges, arms the 15 s heartbeat, and reports
//!    registered.
//! 4. A dropped session reconnects after 1 s when auto-reconnect is
//!    enabled. A registration rejection (`FF FF 02`) means the IPID is not
//!    in the processor's program; retrying cannot fix that, so the
//!    supervisor stops regardless of the flag.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cip_protocol::{
    CipEvent, Frame, FrameAccumulator, FramingError, RegistrationResult, SignalType, SignalValue,
    UpdateKind, decode, encode,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, interval_at, sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::client::{ConnectionState, SendError};
use crate::config::{CipConfig, DebugLevel};
use crate::registry::SubscriptionRegistry;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const WRITE_PACING: Duration = Duration::from_millis(1);
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(15);

/// One outbound queue item: frames written back-to-back (each paced), never
/// interleaved with other traffic. `pulse` relies on this for its
/// press/release pair.
type FrameBatch = Vec<Vec<u8>>;

// ---------------------------------------------------------------------------
// Shared engine state
// ---------------------------------------------------------------------------

/// State shared between the facade and the engine tasks.
pub(crate) struct Shared {
    pub(crate) config: CipConfig,
    pub(crate) registry: SubscriptionRegistry,
    state: Mutex<ConnectionState>,
    registered: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<FrameBatch>>>,
}

impl Shared {
    pub(crate) fn new(config: CipConfig) -> Self {
        let registry = SubscriptionRegistry::new(config.debug);
        Self {
            config,
            registry,
            state: Mutex::new(ConnectionState::Disconnected),
            registered: AtomicBool::new(false),
            outbound: Mutex::new(None),
        }
    }

    pub(crate) fn debug_at(&self, level: DebugLevel) -> bool {
        self.config.debug >= level
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == next {
                return;
            }
            *state = next;
        }
        if self.debug_at(DebugLevel::Low) {
            info!(state = %next, "connection state");
        }
        if let Some(cb) = &self.config.on_connection_state
            && catch_unwind(AssertUnwindSafe(|| cb(next))).is_err()
            && self.debug_at(DebugLevel::Low)
        {
            error!("connection-state callback panicked");
        }
    }

    pub(crate) fn registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    fn set_registered(&self, value: bool) {
        if self.registered.swap(value, Ordering::AcqRel) == value {
            return;
        }
        if self.debug_at(DebugLevel::Low) {
            info!(registered = value, "registration state");
        }
        if let Some(cb) = &self.config.on_registration_state
            && catch_unwind(AssertUnwindSafe(|| cb(value))).is_err()
            && self.debug_at(DebugLevel::Low)
        {
            error!("registration-state callback panicked");
        }
    }

    /// Enqueue frames from a public send operation. Rejected unless the
    /// session is connected and registered; nothing reaches the wire on
    /// rejection.
    pub(crate) fn send_user_frames(&self, frames: FrameBatch) -> Result<(), SendError> {
        let state = self.state();
        if state != ConnectionState::Connected || !self.registered() {
            if self.debug_at(DebugLevel::Low) {
                error!(state = %state, "send rejected: not connected and registered");
            }
            return Err(SendError::NotReady(state));
        }
        let outbound = self.outbound.lock().unwrap();
        match outbound.as_ref() {
            Some(tx) if tx.send(frames).is_ok() => Ok(()),
            _ => Err(SendError::NotReady(state)),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Why a session ended; drives the supervisor's reconnect decision.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    RemoteClosed,
    ControlSystemDisconnect,
    Transport(std::io::Error),
    Framing(FramingError),
    IpidRejected,
    RegistrationFailed,
}

/// Connect/retry/reconnect loop. Runs until `disconnect()` flips the
/// shutdown watch, the watch sender is dropped, or the processor rejects
/// the configured IPID.
pub(crate) async fn run(
    shared: Arc<Shared>,
    auto_reconnect: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        let host = shared.config.host.clone();
        let port = shared.config.port;
        let attempt = tokio::select! {
            biased;
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
                continue;
            }
            res = timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port))) => res,
        };

        match attempt {
            Ok(Ok(stream)) => {
                shared.set_state(ConnectionState::Connected);
                let end = run_session(&shared, stream, shutdown.clone()).await;
                // Registration is cleared before observers see the state
                // transition.
                shared.set_registered(false);
                shared.set_state(ConnectionState::Disconnected);
                match end {
                    SessionEnd::Shutdown => return,
                    SessionEnd::IpidRejected => {
                        if shared.debug_at(DebugLevel::Low) {
                            error!(
                                ipid = shared.config.ipid,
                                "processor rejected the IPID; check the program's panel \
                                 definition. Not reconnecting."
                            );
                        }
                        return;
                    }
                    end => {
                        if shared.debug_at(DebugLevel::Low) {
                            warn!(reason = ?end, "session ended");
                        }
                        if !auto_reconnect {
                            return;
                        }
                        shared.set_state(ConnectionState::Retrying);
                        if wait_or_shutdown(RECONNECT_DELAY, &mut shutdown).await {
                            shared.set_state(ConnectionState::Disconnected);
                            return;
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                if shared.debug_at(DebugLevel::Low) {
                    warn!(error = %e, host = %host, port, "connect failed");
                }
                shared.set_state(ConnectionState::Retrying);
                if wait_or_shutdown(CONNECT_RETRY_DELAY, &mut shutdown).await {
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
            Err(_) => {
                if shared.debug_at(DebugLevel::Low) {
                    warn!(host = %host, port, "connect timed out");
                }
                shared.set_state(ConnectionState::Retrying);
                if wait_or_shutdown(CONNECT_RETRY_DELAY, &mut shutdown).await {
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }
}

/// Sleep for `delay`, returning early with `true` if shutdown fires first.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        res = shutdown.changed() => res.is_err() || *shutdown.borrow(),
        () = sleep(delay) => false,
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

/// One event observed by the session loop. Materialized as a value so the
/// handler can mutate the heartbeat timer and writer without borrow
/// conflicts against the select arms.
enum SessionEvent {
    ShutdownChanged(bool),
    HeartbeatDue,
    Outbound(Option<FrameBatch>),
    Read(std::io::Result<usize>),
}

/// Drive one established connection until it ends. Generic over the stream
/// so tests can run it over an in-memory duplex pipe.
async fn run_session<S>(
    shared: &Arc<Shared>,
    stream: S,
    mut shutdown: watch::Receiver<bool>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut rd, mut wr) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<FrameBatch>();
    *shared.outbound.lock().unwrap() = Some(outbound_tx);

    let mut acc = FrameAccumulator::new();
    let mut read_buf = vec![0u8; 4096];
    let mut heartbeat: Option<Interval> = None;

    let end = loop {
        let event = tokio::select! {
            biased;
            res = shutdown.changed() => SessionEvent::ShutdownChanged(res.is_err()),
            () = heartbeat_due(&mut heartbeat) => SessionEvent::HeartbeatDue,
            batch = outbound_rx.recv() => SessionEvent::Outbound(batch),
            res = rd.read(&mut read_buf) => SessionEvent::Read(res),
        };

        match event {
            SessionEvent::ShutdownChanged(sender_gone) => {
                if sender_gone || *shutdown.borrow() {
                    break SessionEnd::Shutdown;
                }
            }
            SessionEvent::HeartbeatDue => {
                if let Err(end) = write_frame(shared, &mut wr, &encode::heartbeat()).await {
                    break end;
                }
            }
            SessionEvent::Outbound(batch) => {
                // The sender lives in `Shared` for the session's lifetime,
                // so `None` only means the engine is being torn down.
                let Some(batch) = batch else {
                    break SessionEnd::Shutdown;
                };
                if let Err(end) = write_batch(shared, &mut wr, &batch).await {
                    break end;
                }
            }
            SessionEvent::Read(Ok(0)) => {
                break match acc.finish() {
                    Ok(()) => SessionEnd::RemoteClosed,
                    Err(e) => SessionEnd::Framing(e),
                };
            }
            SessionEvent::Read(Ok(n)) => {
                acc.extend(&read_buf[..n]);
                let mut ended = None;
                while let Some(frame) = acc.next_frame() {
                    if shared.debug_at(DebugLevel::High) {
                        trace!(frame = %hex(&frame.to_bytes()), "rx");
                    }
                    if let Err(end) = handle_frame(shared, &mut wr, &mut heartbeat, &frame).await {
                        ended = Some(end);
                        break;
                    }
                }
                if let Some(end) = ended {
                    break end;
                }
            }
            SessionEvent::Read(Err(e)) => break SessionEnd::Transport(e),
        }
    };

    *shared.outbound.lock().unwrap() = None;
    end
}

/// Resolves on the next heartbeat tick, or never while unregistered.
async fn heartbeat_due(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// React to one inbound frame. Replies are written inline by the session
/// loop, keeping multi-frame acknowledgements adjacent on the wire.
async fn handle_frame<W>(
    shared: &Arc<Shared>,
    wr: &mut W,
    heartbeat: &mut Option<Interval>,
    frame: &Frame,
) -> Result<(), SessionEnd>
where
    W: AsyncWrite + Unpin,
{
    let event = match decode(frame) {
        Ok(event) => event,
        Err(e) => {
            if shared.debug_at(DebugLevel::Low) {
                warn!(error = %e, "ignoring undecodable frame");
            }
            return Ok(());
        }
    };
    if shared.debug_at(DebugLevel::Moderate) {
        debug!(?event, "event");
    }
    match event {
        CipEvent::Digital { join, high } => {
            shared
                .registry
                .dispatch(SignalType::Digital, join, &SignalValue::Bool(high));
        }
        CipEvent::Analog { join, value } => {
            shared
                .registry
                .dispatch(SignalType::Analog, join, &SignalValue::U16(value));
        }
        CipEvent::Serial { join, text } => {
            shared
                .registry
                .dispatch(SignalType::Serial, join, &SignalValue::String(text));
        }
        CipEvent::RegistrationRequest => {
            write_frame(shared, wr, &encode::registration_response(shared.config.ipid)).await?;
        }
        CipEvent::Registration(RegistrationResult::Success) => {
            shared.set_registered(true);
            // Acknowledge first; the heartbeat timer starts counting only
            // after the acknowledgement is on the wire.
            write_frame(shared, wr, &encode::update_request()).await?;
            *heartbeat = Some(interval_at(
                Instant::now() + HEARTBEAT_PERIOD,
                HEARTBEAT_PERIOD,
            ));
        }
        CipEvent::Registration(RegistrationResult::IpidRejected) => {
            return Err(SessionEnd::IpidRejected);
        }
        CipEvent::Registration(RegistrationResult::Unknown) => {
            return Err(SessionEnd::RegistrationFailed);
        }
        CipEvent::Update(UpdateKind::EndOfQuery) => {
            // Two-frame acknowledgement, adjacent on the wire.
            write_frame(shared, wr, &encode::end_of_query_reply()).await?;
            write_frame(shared, wr, &encode::heartbeat()).await?;
        }
        // Standard and penultimate update subframes and the end-of-query
        // acknowledgement are answered by silence.
        CipEvent::Update(_) => {}
        CipEvent::DateTime => {
            if shared.debug_at(DebugLevel::Moderate) {
                debug!("date/time update from processor");
            }
        }
        // Liveness is maintained by our own timer; the processor's
        // heartbeat needs no answer.
        CipEvent::Heartbeat => {}
        CipEvent::Disconnect => {
            shared.set_registered(false);
            return Err(SessionEnd::ControlSystemDisconnect);
        }
    }
    Ok(())
}

async fn write_batch<W>(shared: &Shared, wr: &mut W, batch: &FrameBatch) -> Result<(), SessionEnd>
where
    W: AsyncWrite + Unpin,
{
    for frame in batch {
        write_frame(shared, wr, frame).await?;
    }
    Ok(())
}

/// Write one frame with the write timeout, then pace. The processor drops
/// frames issued too closely back-to-back, so every write is followed by a
/// short sleep.
async fn write_frame<W>(shared: &Shared, wr: &mut W, frame: &[u8]) -> Result<(), SessionEnd>
where
    W: AsyncWrite + Unpin,
{
    if shared.debug_at(DebugLevel::High) {
        trace!(frame = %hex(frame), "tx");
    }
    match timeout(WRITE_TIMEOUT, wr.write_all(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(SessionEnd::Transport(e)),
        Err(_) => {
            return Err(SessionEnd::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )));
        }
    }
    sleep(WRITE_PACING).await;
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
