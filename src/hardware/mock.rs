//! Mock Serial Ports
//!
//! In-memory stand-ins for a bench instrument, so the transport and the
//! controllers can be exercised without hardware. All timing uses
//! `tokio::time::sleep`, never `std::thread::sleep`.
//!
//! # Available Mocks
//!
//! - [`MockPortProvider`]: hands out `tokio::io::duplex` pipes; the far end of
//!   each pipe is the "instrument" and can be taken with
//!   [`MockPortProvider::next_device`].
//! - [`MockFault`]: makes the provider fail the way a real host or device does.
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = Arc::new(MockPortProvider::new());
//! let transport = SerialTransport::new(provider.clone());
//! transport.connect().await?;
//!
//! let mut device = provider.next_device().await.unwrap();
//! transport.send(Command::ScopeStart.encode()).await?;
//! let mut frame = [0u8; 4];
//! device.read_exact(&mut frame).await?;
//! ```

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, Mutex};

use super::port::{DynSerial, LineSettings, PortInfo, PortProvider};
use crate::error::{AppResult, LabError};

/// Name reported for mock devices.
pub const MOCK_PORT_NAME: &str = "mock0";

/// Failure injected by [`MockPortProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockFault {
    /// Everything works.
    #[default]
    None,
    /// Host has no serial capability.
    Unavailable,
    /// User cancelled the device chooser.
    NoDevice,
    /// Host refused access.
    PermissionDenied,
    /// Port opens, but every write fails.
    WriteError,
    /// Port opens, but the first read fails.
    ReadError,
}

/// Port provider backed by in-memory pipes.
pub struct MockPortProvider {
    fault: MockFault,
    open_delay: Duration,
    pipe_capacity: usize,
    opened: AtomicUsize,
    opening: AtomicUsize,
    peak_opening: AtomicUsize,
    last_settings: Mutex<Option<LineSettings>>,
    devices_tx: mpsc::UnboundedSender<DuplexStream>,
    devices_rx: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
}

impl MockPortProvider {
    /// Healthy provider with instant opens.
    pub fn new() -> Self {
        let (devices_tx, devices_rx) = mpsc::unbounded_channel();
        Self {
            fault: MockFault::None,
            open_delay: Duration::ZERO,
            pipe_capacity: 256,
            opened: AtomicUsize::new(0),
            opening: AtomicUsize::new(0),
            peak_opening: AtomicUsize::new(0),
            last_settings: Mutex::new(None),
            devices_tx,
            devices_rx: Mutex::new(devices_rx),
        }
    }

    /// Inject `fault`.
    pub fn with_fault(mut self, fault: MockFault) -> Self {
        self.fault = fault;
        self
    }

    /// Delay every open by `delay`, like a slow USB enumeration.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Number of ports opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Most opens ever in progress at the same time.
    pub fn max_concurrent_opens(&self) -> usize {
        self.peak_opening.load(Ordering::SeqCst)
    }

    /// Line settings of the most recent open.
    pub async fn last_settings(&self) -> Option<LineSettings> {
        *self.last_settings.lock().await
    }

    /// Instrument end of the next opened pipe.
    ///
    /// Returns `None` once the provider is dropped and no pipes remain.
    pub async fn next_device(&self) -> Option<DuplexStream> {
        self.devices_rx.lock().await.recv().await
    }
}

impl Default for MockPortProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortProvider for MockPortProvider {
    async fn request_port(&self) -> AppResult<PortInfo> {
        match self.fault {
            MockFault::Unavailable => Err(LabError::TransportUnavailable),
            MockFault::NoDevice => Err(LabError::PortNotFound),
            _ => Ok(PortInfo {
                name: MOCK_PORT_NAME.to_string(),
                description: Some("In-memory bench instrument".to_string()),
            }),
        }
    }

    async fn open(&self, port: &PortInfo, settings: LineSettings) -> AppResult<DynSerial> {
        let in_flight = self.opening.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_opening.fetch_max(in_flight, Ordering::SeqCst);
        let result = self.open_pipe(port, settings).await;
        self.opening.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl MockPortProvider {
    async fn open_pipe(&self, port: &PortInfo, settings: LineSettings) -> AppResult<DynSerial> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        *self.last_settings.lock().await = Some(settings);

        match self.fault {
            MockFault::Unavailable => return Err(LabError::TransportUnavailable),
            MockFault::NoDevice => return Err(LabError::PortNotFound),
            MockFault::PermissionDenied => {
                return Err(LabError::PermissionDenied(port.name.clone()))
            }
            MockFault::WriteError => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                return Ok(Box::new(FaultyPort { fail_reads: false }));
            }
            MockFault::ReadError => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                return Ok(Box::new(FaultyPort { fail_reads: true }));
            }
            MockFault::None => {}
        }

        let (host, device) = tokio::io::duplex(self.pipe_capacity);
        self.opened.fetch_add(1, Ordering::SeqCst);
        // Receiver lives as long as the provider
        let _ = self.devices_tx.send(device);
        Ok(Box::new(host))
    }
}

/// Port whose writes always fail. Reads either fail at once or never complete.
struct FaultyPort {
    fail_reads: bool,
}

impl AsyncRead for FaultyPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.fail_reads {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device stopped responding",
            )))
        } else {
            Poll::Pending
        }
    }
}

impl AsyncWrite for FaultyPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "mock device rejected write",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
