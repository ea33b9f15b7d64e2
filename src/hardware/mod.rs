//! Serial Hardware Layer
//!
//! Everything that touches the physical instrument:
//!
//! - [`protocol`]: logical commands and their 4-byte frames
//! - [`port`]: the host serial capability behind the [`PortProvider`] seam
//! - [`transport`]: the connection manager owning the single serial channel
//! - [`mock`]: in-memory ports for tests and demos

pub mod mock;
pub mod port;
pub mod protocol;
pub mod transport;

pub use mock::{MockFault, MockPortProvider};
pub use port::{
    default_provider, list_ports, DynSerial, LineSettings, Parity, PortInfo, PortProvider,
    SerialPortIO, UnavailablePortProvider,
};
#[cfg(feature = "instrument_serial")]
pub use port::NativePortProvider;
pub use protocol::{Command, FrequencyTier, Frame, FrameError, HardwareWaveform};
pub use transport::{
    ConnectionState, DataObserver, SerialTransport, TransportConfig, TransportEvent,
};
