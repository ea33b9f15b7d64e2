//! Where instrument actions go besides the simulation.
//!
//! Controllers always update and read the simulated circuit. The backend
//! decides what else happens: [`SimulatedBackend`] does nothing more,
//! [`HardwareBackend`] also sends the matching frame when the serial transport
//! is connected. The two effects are never reconciled: a failed send leaves
//! the simulation as it is.

use std::fmt;

use async_trait::async_trait;

use crate::config::BackendMode;
use crate::error::LabError;
use crate::hardware::{Command, Frame, SerialTransport};

/// Outcome of dispatching a command to the backend.
#[derive(Debug)]
pub enum Dispatch {
    /// Nothing was sent: simulated backend, no connection, or no frame for
    /// the action.
    Skipped,
    /// The frame was written.
    Sent(Frame),
    /// The write failed. The transport has already torn the connection down.
    Failed(LabError),
}

impl Dispatch {
    /// The written frame, if any.
    pub fn frame(&self) -> Option<Frame> {
        match self {
            Dispatch::Sent(frame) => Some(*frame),
            _ => None,
        }
    }

    /// True when the write failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Dispatch::Failed(_))
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Skipped => f.write_str("not sent"),
            Dispatch::Sent(frame) => write!(f, "sent {frame}"),
            Dispatch::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Destination for instrument commands.
#[async_trait]
pub trait InstrumentBackend: Send + Sync {
    /// Which backend this is.
    fn mode(&self) -> BackendMode;

    /// Best-effort delivery of `command`. Never blocks on a missing connection.
    async fn dispatch(&self, command: Command) -> Dispatch;

    /// Dispatch an optional command, skipping `None`.
    async fn dispatch_opt(&self, command: Option<Command>) -> Dispatch {
        match command {
            Some(command) => self.dispatch(command).await,
            None => Dispatch::Skipped,
        }
    }
}

/// Simulation only.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedBackend;

#[async_trait]
impl InstrumentBackend for SimulatedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Simulated
    }

    async fn dispatch(&self, command: Command) -> Dispatch {
        tracing::trace!(?command, "Simulated backend, command not sent");
        Dispatch::Skipped
    }
}

/// Simulation plus frame dispatch over a shared [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct HardwareBackend {
    transport: SerialTransport,
}

impl HardwareBackend {
    /// Backend sending through `transport`.
    pub fn new(transport: SerialTransport) -> Self {
        Self { transport }
    }

    /// The transport frames go through.
    pub fn transport(&self) -> &SerialTransport {
        &self.transport
    }
}

#[async_trait]
impl InstrumentBackend for HardwareBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Hardware
    }

    async fn dispatch(&self, command: Command) -> Dispatch {
        let frame = command.encode();
        match self.transport.send(frame).await {
            Ok(()) => Dispatch::Sent(frame),
            Err(LabError::NotConnected) => {
                tracing::debug!(%frame, "No serial connection, frame not sent");
                Dispatch::Skipped
            }
            Err(err) => {
                tracing::warn!(%frame, error = %err, "Frame dispatch failed");
                Dispatch::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockPortProvider;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn simulated_backend_never_sends() {
        let dispatch = SimulatedBackend.dispatch(Command::ScopeStart).await;
        assert!(matches!(dispatch, Dispatch::Skipped));
        assert_eq!(SimulatedBackend.mode(), BackendMode::Simulated);
    }

    #[tokio::test]
    async fn hardware_backend_skips_without_connection() {
        let transport = SerialTransport::new(Arc::new(MockPortProvider::new()));
        let backend = HardwareBackend::new(transport);
        assert!(matches!(
            backend.dispatch(Command::ResistanceMode).await,
            Dispatch::Skipped
        ));
    }

    #[tokio::test]
    async fn hardware_backend_sends_when_connected() {
        let provider = Arc::new(MockPortProvider::new());
        let transport = SerialTransport::new(provider.clone());
        transport.connect().await.unwrap();
        let mut device = provider.next_device().await.unwrap();

        let backend = HardwareBackend::new(transport.clone());
        let dispatch = backend.dispatch(Command::ContinuityMode).await;
        assert_eq!(dispatch.frame(), Some(Command::ContinuityMode.encode()));

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x03, 0x00, 0x02, 0xFE]);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn missing_command_is_skipped() {
        let dispatch = SimulatedBackend.dispatch_opt(None).await;
        assert_eq!(dispatch.to_string(), "not sent");
    }
}
