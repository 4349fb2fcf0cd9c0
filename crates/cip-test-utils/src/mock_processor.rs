// mock_processor: A mock Crestron control processor for testing the client.
//
// Listens on 127.0.0.1:<random port>, opens the registration handshake on
// every accepted connection, answers the client's registration response per
// the configured behavior, records every client frame, and injects
// scripted frames on request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cip_protocol::{Frame, FrameAccumulator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::frames;

/// How the mock answers the client's registration response frame (0x01).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationReply {
    /// `00 00 00 1F` - registration accepted.
    Accept,
    /// `FF FF 02` - IPID does not exist.
    Reject,
    /// An unrecognized payload.
    Garbled,
    /// Never answer.
    Silent,
}

/// A mock processor for integration testing.
///
/// Binds to a random port and exposes it via [`local_addr`]. Each test
/// spins up its own isolated instance. Frames received from the client are
/// available through [`recv_frame`], in arrival order across connections.
///
/// [`local_addr`]: MockProcessor::local_addr
/// [`recv_frame`]: MockProcessor::recv_frame
pub struct MockProcessor {
    addr: SocketAddr,
    received: Mutex<mpsc::UnboundedReceiver<Frame>>,
    inject_tx: broadcast::Sender<Vec<u8>>,
    kill_tx: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
    /// Handle to the background accept loop; dropped with the mock.
    _task: tokio::task::JoinHandle<()>,
}

impl MockProcessor {
    /// Start a mock accepting any number of sequential connections.
    pub async fn start(reply: RegistrationReply) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::from_listener(listener, reply)
    }

    /// Start a mock on a specific port (e.g. one a client is already
    /// retrying against).
    pub async fn start_on(port: u16, reply: RegistrationReply) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Self::from_listener(listener, reply)
    }

    fn from_listener(listener: TcpListener, reply: RegistrationReply) -> std::io::Result<Self> {
        let addr = listener.local_addr()?;
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (inject_tx, _) = broadcast::channel(64);
        let (kill_tx, _) = broadcast::channel(4);
        let connections = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(Self::accept_loop(
            listener,
            reply,
            received_tx,
            inject_tx.clone(),
            kill_tx.clone(),
            connections.clone(),
        ));
        Ok(Self {
            addr,
            received: Mutex::new(received_rx),
            inject_tx,
            kill_tx,
            connections,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections accepted so far, including dropped ones.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Queue raw frame bytes for delivery to every live connection.
    pub fn inject(&self, frame: Vec<u8>) {
        let _ = self.inject_tx.send(frame);
    }

    /// Drop every live connection, as a processor reboot would.
    pub fn drop_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Next frame received from the client.
    pub async fn recv_frame(&self) -> Option<Frame> {
        self.received.lock().await.recv().await
    }

    // -- internal --

    async fn accept_loop(
        listener: TcpListener,
        reply: RegistrationReply,
        received_tx: mpsc::UnboundedSender<Frame>,
        inject_tx: broadcast::Sender<Vec<u8>>,
        kill_tx: broadcast::Sender<()>,
        connections: Arc<AtomicUsize>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let received_tx = received_tx.clone();
                    let inject_rx = inject_tx.subscribe();
                    let kill_rx = kill_tx.subscribe();
                    tokio::spawn(async move {
                        // Connection errors are expected in tests (the
                        // client hangs up at will); swallow them.
                        let _ =
                            Self::handle_connection(stream, reply, received_tx, inject_rx, kill_rx)
                                .await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        reply: RegistrationReply,
        received_tx: mpsc::UnboundedSender<Frame>,
        mut inject_rx: broadcast::Receiver<Vec<u8>>,
        mut kill_rx: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        // Open the handshake: ask the panel to register.
        stream.write_all(&frames::registration_request()).await?;

        let mut acc = FrameAccumulator::new();
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                _ = kill_rx.recv() => break,
                inject = inject_rx.recv() => {
                    match inject {
                        Ok(bytes) => stream.write_all(&bytes).await?,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                n = stream.read(&mut buf) => {
                    let n = n?;
                    if n == 0 {
                        break;
                    }
                    acc.extend(&buf[..n]);
                    while let Some(frame) = acc.next_frame() {
                        if frame.frame_type == 0x01 {
                            match reply {
                                RegistrationReply::Accept => {
                                    stream.write_all(&frames::registration_success()).await?;
                                }
                                RegistrationReply::Reject => {
                                    stream.write_all(&frames::registration_rejected()).await?;
                                }
                                RegistrationReply::Garbled => {
                                    stream.write_all(&[0x02, 0x00, 0x02, 0xAB, 0xCD]).await?;
                                }
                                RegistrationReply::Silent => {}
                            }
                        }
                        let _ = received_tx.send(frame);
                    }
                }
            }
        }
        Ok(())
    }
}
