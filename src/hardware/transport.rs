//! Serial transport connection manager.
//!
//! [`SerialTransport`] owns the bench's single serial channel. It walks the
//! connection through `Disconnected → Connecting → Connected` and back, runs a
//! read loop that hands every inbound chunk to a registered observer, and
//! funnels all outbound frames through one writer task so concurrent sends
//! never interleave on the wire.
//!
//! ## Lifecycle
//!
//! - `connect()` asks the [`PortProvider`] for a device and opens it at
//!   115200 8N1. A second call while connecting or connected is a no-op.
//! - `disconnect()` stops both tasks and releases the port. Issued while a
//!   connect is in flight, it aborts that attempt and the opened port is
//!   dropped unused.
//! - A read or write error tears the connection down. Subscribers see an
//!   [`TransportEvent::Error`] followed by [`TransportEvent::Disconnected`].
//!
//! The connect attempt runs in its own task, so cancelling the future returned
//! by `connect()` never leaves the transport stuck in `Connecting`.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::port::{DynSerial, LineSettings, PortInfo, PortProvider};
use super::protocol::{Command, Frame};
use crate::error::{AppResult, LabError};

/// Capacity of the notification channel.
const EVENT_CAPACITY: usize = 64;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No port is open.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The port is open and the read loop is running.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// User-visible notification published by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The port opened.
    Connected {
        /// Name of the opened port.
        port: String,
    },
    /// The port closed, on request or after a failure.
    Disconnected,
    /// An operation failed.
    Error {
        /// Error text for display.
        message: String,
        /// Whether retrying can succeed.
        recoverable: bool,
    },
}

impl TransportEvent {
    fn from_error(err: &LabError) -> Self {
        TransportEvent::Error {
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

/// Callback receiving raw inbound bytes, one call per chunk read.
pub type DataObserver = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Transport tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Size of the read buffer, and so the largest chunk delivered at once.
    pub read_buffer_size: usize,
    /// Frames that may wait in the writer queue before `send` applies
    /// backpressure.
    pub write_queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            write_queue_depth: 32,
        }
    }
}

struct WriteRequest {
    frame: Frame,
    done: oneshot::Sender<AppResult<()>>,
}

/// Everything that exists only while connected.
struct ActiveLink {
    port: PortInfo,
    writer_tx: mpsc::Sender<WriteRequest>,
    shutdown: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ActiveLink {
    /// Stop both tasks and wait for them, so the port is released on return.
    async fn close(self) {
        let _ = self.shutdown.send(true);
        drop(self.writer_tx);
        if let Err(e) = self.reader.await {
            warn!(error = %e, "Serial read task ended abnormally");
        }
        if let Err(e) = self.writer.await {
            warn!(error = %e, "Serial write task ended abnormally");
        }
    }

    /// Stop both tasks without waiting. Used from inside one of them.
    fn signal_close(self) {
        let _ = self.shutdown.send(true);
    }
}

struct LinkSlot {
    state: ConnectionState,
    /// Bumped on every connect and every teardown. Tasks and connect attempts
    /// holding an older value have been superseded.
    generation: u64,
    active: Option<ActiveLink>,
    /// Closes when the current connect attempt has finished with its port.
    attempt: Option<watch::Receiver<()>>,
}

struct Inner {
    provider: Arc<dyn PortProvider>,
    config: TransportConfig,
    slot: Mutex<LinkSlot>,
    observer: Arc<RwLock<Option<DataObserver>>>,
    events: broadcast::Sender<TransportEvent>,
}

/// Manager for the bench's single serial channel.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct SerialTransport {
    inner: Arc<Inner>,
}

impl SerialTransport {
    /// Transport using `provider` with default tuning.
    pub fn new(provider: Arc<dyn PortProvider>) -> Self {
        Self::with_config(provider, TransportConfig::default())
    }

    /// Transport using `provider` and `config`.
    pub fn with_config(provider: Arc<dyn PortProvider>, config: TransportConfig) -> Self {
        let config = TransportConfig {
            read_buffer_size: config.read_buffer_size.max(1),
            write_queue_depth: config.write_queue_depth.max(1),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                provider,
                config,
                slot: Mutex::new(LinkSlot {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    active: None,
                    attempt: None,
                }),
                observer: Arc::new(RwLock::new(None)),
                events,
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.slot.lock().await.state
    }

    /// True while a port is open.
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Name of the open port.
    pub async fn port_name(&self) -> Option<String> {
        let slot = self.inner.slot.lock().await;
        slot.active.as_ref().map(|link| link.port.name.clone())
    }

    /// Notifications for connects, disconnects and failures.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// Register the callback for inbound bytes, replacing any previous one.
    pub async fn set_observer(&self, observer: DataObserver) {
        *self.inner.observer.write().await = Some(observer);
    }

    /// Remove the inbound-bytes callback. Later chunks are discarded.
    pub async fn clear_observer(&self) {
        *self.inner.observer.write().await = None;
    }

    /// Request a device and open it.
    ///
    /// Returns `Ok(())` without doing anything when already connecting or
    /// connected, and also when the attempt is aborted by `disconnect()`.
    ///
    /// # Errors
    /// `TransportUnavailable`, `PortNotFound`, `PermissionDenied` or
    /// `OpenFailed`. The transport is back in `Disconnected` afterwards.
    pub async fn connect(&self) -> AppResult<()> {
        let (done_tx, done_rx) = watch::channel(());
        let generation = {
            let mut slot = self.inner.slot.lock().await;
            if slot.state != ConnectionState::Disconnected {
                debug!(state = %slot.state, "Connect ignored");
                return Ok(());
            }
            slot.state = ConnectionState::Connecting;
            slot.generation += 1;
            slot.attempt = Some(done_rx);
            slot.generation
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.attempt_connect(generation).await;
            drop(done_tx);
            result
        })
            .await
            .map_err(|e| LabError::Io(std::io::Error::other(e)))?
    }

    /// Close the port and stop the read loop.
    ///
    /// No-op when already disconnected. Aborts an in-flight connect and
    /// returns once its port, if one was opened, has been dropped.
    pub async fn disconnect(&self) {
        let (link, attempt) = {
            let mut slot = self.inner.slot.lock().await;
            match slot.state {
                ConnectionState::Disconnected => return,
                ConnectionState::Connecting => info!("Aborting connection attempt"),
                ConnectionState::Connected => {}
            }
            slot.generation += 1;
            slot.state = ConnectionState::Disconnected;
            (slot.active.take(), slot.attempt.take())
        };

        if let Some(mut attempt) = attempt {
            // Resolves with an error once the attempt drops its sender
            let _ = attempt.changed().await;
        }

        if let Some(link) = link {
            let port = link.port.name.clone();
            link.close().await;
            info!(port = %port, "Serial port closed");
        }
        self.inner.notify(TransportEvent::Disconnected);
    }

    /// Write one frame.
    ///
    /// Frames from concurrent callers are written whole, in the order they
    /// entered the writer queue.
    ///
    /// # Errors
    /// - `NotConnected` when no port is open. Nothing is written.
    /// - `WriteFailure` when the port rejected the bytes. The connection is
    ///   torn down.
    pub async fn send(&self, frame: Frame) -> AppResult<()> {
        let writer_tx = {
            let slot = self.inner.slot.lock().await;
            match (&slot.state, &slot.active) {
                (ConnectionState::Connected, Some(link)) => link.writer_tx.clone(),
                _ => return Err(LabError::NotConnected),
            }
        };

        let (done, result) = oneshot::channel();
        writer_tx
            .send(WriteRequest { frame, done })
            .await
            .map_err(|_| LabError::NotConnected)?;
        // The writer drops queued requests when the link closes under them.
        result.await.map_err(|_| LabError::NotConnected)?
    }

    /// Encode `command` and [`send`](Self::send) it.
    pub async fn send_command(&self, command: Command) -> AppResult<()> {
        self.send(command.encode()).await
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn notify(&self, event: TransportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn open_port(&self) -> AppResult<(PortInfo, DynSerial)> {
        let port = self.provider.request_port().await?;
        info!(port = %port.name, "Opening serial port");
        let handle = self.provider.open(&port, LineSettings::BENCH).await?;
        Ok((port, handle))
    }

    async fn attempt_connect(self: Arc<Self>, generation: u64) -> AppResult<()> {
        let opened = self.open_port().await;

        let mut slot = self.slot.lock().await;
        if slot.generation != generation || slot.state != ConnectionState::Connecting {
            info!("Connection attempt aborted, dropping port");
            return Ok(());
        }

        match opened {
            Err(err) => {
                slot.state = ConnectionState::Disconnected;
                slot.attempt = None;
                drop(slot);
                warn!(error = %err, "Serial connect failed");
                self.notify(TransportEvent::from_error(&err));
                Err(err)
            }
            Ok((port, handle)) => {
                slot.attempt = None;
                let name = port.name.clone();
                slot.active = Some(self.spawn_link(generation, port, handle));
                slot.state = ConnectionState::Connected;
                info!(port = %name, "Serial port connected");
                // Published under the lock so a failing read loop cannot
                // report its teardown ahead of the connect.
                self.notify(TransportEvent::Connected { port: name });
                Ok(())
            }
        }
    }

    fn spawn_link(self: &Arc<Self>, generation: u64, port: PortInfo, handle: DynSerial) -> ActiveLink {
        let (read_half, write_half) = tokio::io::split(handle);
        let (shutdown, _) = watch::channel(false);
        let (writer_tx, writer_rx) = mpsc::channel(self.config.write_queue_depth);

        let reader = tokio::spawn(read_loop(
            read_half,
            shutdown.subscribe(),
            Arc::clone(&self.observer),
            Arc::downgrade(self),
            generation,
            self.config.read_buffer_size,
        ));
        let writer = tokio::spawn(write_loop(
            write_half,
            writer_rx,
            shutdown.subscribe(),
            Arc::downgrade(self),
            generation,
        ));

        ActiveLink {
            port,
            writer_tx,
            shutdown,
            reader,
            writer,
        }
    }

    /// Tear down after a channel failure, unless the link was already replaced.
    ///
    /// `cause` is `None` when the device closed the channel cleanly.
    async fn teardown(&self, generation: u64, cause: Option<LabError>) {
        let link = {
            let mut slot = self.slot.lock().await;
            if slot.generation != generation || slot.state != ConnectionState::Connected {
                return;
            }
            slot.generation += 1;
            slot.state = ConnectionState::Disconnected;
            slot.active.take()
        };

        if let Some(link) = link {
            link.signal_close();
        }
        match &cause {
            Some(err) => {
                error!(error = %err, "Serial channel failed, connection closed");
                self.notify(TransportEvent::from_error(err));
            }
            None => info!("Serial device closed the channel"),
        }
        self.notify(TransportEvent::Disconnected);
    }
}

async fn read_loop(
    mut port: ReadHalf<DynSerial>,
    mut shutdown: watch::Receiver<bool>,
    observer: Arc<RwLock<Option<DataObserver>>>,
    inner: Weak<Inner>,
    generation: u64,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            read = port.read(&mut buf) => match read {
                Ok(0) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.teardown(generation, None).await;
                    }
                    break;
                }
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    debug!(len = n, "Received serial data");
                    if let Some(observer) = observer.read().await.as_ref() {
                        observer(chunk);
                    }
                }
                Err(e) => {
                    if let Some(inner) = inner.upgrade() {
                        inner
                            .teardown(generation, Some(LabError::ReadFailure(e.to_string())))
                            .await;
                    }
                    break;
                }
            }
        }
    }
    debug!("Serial read loop stopped");
}

async fn write_loop(
    mut port: WriteHalf<DynSerial>,
    mut requests: mpsc::Receiver<WriteRequest>,
    mut shutdown: watch::Receiver<bool>,
    inner: Weak<Inner>,
    generation: u64,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.changed() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        debug!(frame = %request.frame, "Sending frame");
        let written = tokio::select! {
            _ = shutdown.changed() => break,
            written = write_frame(&mut port, &request.frame) => written,
        };

        match written {
            Ok(()) => {
                let _ = request.done.send(Ok(()));
            }
            Err(e) => {
                let message = e.to_string();
                let _ = request.done.send(Err(LabError::WriteFailure(message.clone())));
                if let Some(inner) = inner.upgrade() {
                    inner
                        .teardown(generation, Some(LabError::WriteFailure(message)))
                        .await;
                }
                break;
            }
        }
    }
    debug!("Serial write loop stopped");
}

async fn write_frame(port: &mut WriteHalf<DynSerial>, frame: &Frame) -> std::io::Result<()> {
    port.write_all(frame.as_bytes()).await?;
    port.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockFault, MockPortProvider};
    use crate::hardware::port::UnavailablePortProvider;

    #[tokio::test]
    async fn starts_disconnected() {
        let transport = SerialTransport::new(Arc::new(MockPortProvider::new()));
        assert_eq!(transport.state().await, ConnectionState::Disconnected);
        assert!(transport.port_name().await.is_none());
    }

    #[tokio::test]
    async fn connect_reports_unavailable_host() {
        let transport = SerialTransport::new(Arc::new(UnavailablePortProvider));
        let mut events = transport.subscribe();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, LabError::TransportUnavailable));
        assert_eq!(transport.state().await, ConnectionState::Disconnected);
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::Error { recoverable: true, .. }
        ));
    }

    #[tokio::test]
    async fn cancelled_request_leaves_transport_disconnected() {
        let provider = Arc::new(MockPortProvider::new().with_fault(MockFault::NoDevice));
        let transport = SerialTransport::new(provider.clone());

        assert!(matches!(
            transport.connect().await,
            Err(LabError::PortNotFound)
        ));
        assert_eq!(transport.state().await, ConnectionState::Disconnected);
        assert_eq!(provider.open_count(), 0);
    }

    #[tokio::test]
    async fn connect_uses_bench_line_settings() {
        let provider = Arc::new(MockPortProvider::new());
        let transport = SerialTransport::new(provider.clone());
        transport.connect().await.unwrap();

        assert_eq!(provider.last_settings().await, Some(LineSettings::BENCH));
        assert_eq!(transport.port_name().await.as_deref(), Some("mock0"));
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn connect_while_connected_is_a_no_op() {
        let provider = Arc::new(MockPortProvider::new());
        let transport = SerialTransport::new(provider.clone());
        transport.connect().await.unwrap();
        transport.connect().await.unwrap();
        assert_eq!(provider.open_count(), 1);
        transport.disconnect().await;
    }

    #[test]
    fn zero_sized_tuning_is_raised_to_one() {
        let transport = SerialTransport::with_config(
            Arc::new(MockPortProvider::new()),
            TransportConfig {
                read_buffer_size: 0,
                write_queue_depth: 0,
            },
        );
        assert_eq!(transport.inner.config.read_buffer_size, 1);
        assert_eq!(transport.inner.config.write_queue_depth, 1);
    }
}
