//! Host serial capability.
//!
//! The transport never opens ports itself. It asks a [`PortProvider`] to pick
//! a device (the host's "request port" step) and then to open it with the bench
//! line settings. Providers:
//!
//! - `NativePortProvider`: real ports through `tokio-serial` (feature
//!   `instrument_serial`)
//! - [`UnavailablePortProvider`]: hosts without a serial stack
//! - [`MockPortProvider`](super::mock::MockPortProvider): in-memory ports for
//!   tests and demos

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{AppResult, LabError};

/// Anything that behaves like an open serial port.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Boxed open port, the handle the transport owns while connected.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Serial line parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Bits per second.
    pub baud_rate: u32,
    /// Data bits per character.
    pub data_bits: u8,
    /// Stop bits per character.
    pub stop_bits: u8,
    /// Parity mode.
    pub parity: Parity,
}

impl LineSettings {
    /// 115200 baud, 8 data bits, 1 stop bit, no parity.
    pub const BENCH: LineSettings = LineSettings {
        baud_rate: 115_200,
        data_bits: 8,
        stop_bits: 1,
        parity: Parity::None,
    };
}

impl Default for LineSettings {
    fn default() -> Self {
        Self::BENCH
    }
}

/// A device the host offered for connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS path or name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub name: String,
    /// Human-readable description, when the host provides one.
    pub description: Option<String>,
}

impl PortInfo {
    /// Port with no description.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Host-side access to serial devices.
#[async_trait]
pub trait PortProvider: Send + Sync {
    /// Ask the host for a device to use.
    ///
    /// # Errors
    /// - `TransportUnavailable` if the host has no serial capability
    /// - `PortNotFound` if no device was offered or the request was cancelled
    async fn request_port(&self) -> AppResult<PortInfo>;

    /// Open `port` with `settings`.
    ///
    /// # Errors
    /// - `PortNotFound` if the device disappeared
    /// - `PermissionDenied` if the host refused access
    /// - `OpenFailed` for any other open error
    async fn open(&self, port: &PortInfo, settings: LineSettings) -> AppResult<DynSerial>;
}

/// Provider for hosts without any serial stack. Every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailablePortProvider;

#[async_trait]
impl PortProvider for UnavailablePortProvider {
    async fn request_port(&self) -> AppResult<PortInfo> {
        Err(LabError::TransportUnavailable)
    }

    async fn open(&self, _port: &PortInfo, _settings: LineSettings) -> AppResult<DynSerial> {
        Err(LabError::TransportUnavailable)
    }
}

#[cfg(feature = "instrument_serial")]
pub use native::NativePortProvider;

#[cfg(feature = "instrument_serial")]
mod native {
    use super::*;
    use tokio::task::spawn_blocking;
    use serialport::SerialPortType;
    use tokio_serial::SerialPortBuilderExt;

    /// Real serial ports through `tokio-serial`.
    ///
    /// Without a preferred port, `request_port` picks the first USB serial
    /// device, falling back to the first port of any kind.
    #[derive(Debug, Default, Clone)]
    pub struct NativePortProvider {
        preferred: Option<String>,
    }

    impl NativePortProvider {
        /// Provider that auto-selects a device.
        pub fn new() -> Self {
            Self::default()
        }

        /// Provider that always offers `port`.
        pub fn with_port(port: impl Into<String>) -> Self {
            Self {
                preferred: Some(port.into()),
            }
        }

        /// Enumerate ports visible to the host.
        pub fn list_ports() -> AppResult<Vec<PortInfo>> {
            let ports = serialport::available_ports().map_err(|e| {
                tracing::warn!(error = %e, "Serial port enumeration failed");
                LabError::TransportUnavailable
            })?;
            Ok(ports
                .into_iter()
                .map(|p| {
                    let description = match p.port_type {
                        SerialPortType::UsbPort(usb) => Some(format!(
                            "USB {:04x}:{:04x} {}",
                            usb.vid,
                            usb.pid,
                            usb.product.unwrap_or_default()
                        )),
                        SerialPortType::PciPort => Some("PCI".to_string()),
                        SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                        SerialPortType::Unknown => None,
                    };
                    PortInfo {
                        name: p.port_name,
                        description,
                    }
                })
                .collect())
        }
    }

    #[async_trait]
    impl PortProvider for NativePortProvider {
        async fn request_port(&self) -> AppResult<PortInfo> {
            if let Some(name) = &self.preferred {
                return Ok(PortInfo::named(name.clone()));
            }

            let ports = spawn_blocking(Self::list_ports)
                .await
                .map_err(|e| LabError::Io(std::io::Error::other(e)))??;

            ports
                .iter()
                .find(|p| p.description.as_deref().is_some_and(|d| d.starts_with("USB")))
                .or_else(|| ports.first())
                .cloned()
                .ok_or(LabError::PortNotFound)
        }

        async fn open(&self, port: &PortInfo, settings: LineSettings) -> AppResult<DynSerial> {
            let name = port.name.clone();

            // Use spawn_blocking to avoid blocking the async runtime
            let opened = spawn_blocking(move || {
                tokio_serial::new(&name, settings.baud_rate)
                    .data_bits(data_bits(settings.data_bits))
                    .parity(parity(settings.parity))
                    .stop_bits(stop_bits(settings.stop_bits))
                    .flow_control(tokio_serial::FlowControl::None)
                    .open_native_async()
                    .map_err(|e| open_error(&name, e))
            })
            .await
            .map_err(|e| LabError::Io(std::io::Error::other(e)))??;

            Ok(Box::new(opened))
        }
    }

    fn open_error(port: &str, err: serialport::Error) -> LabError {
        use std::io::ErrorKind as Io;
        use serialport::ErrorKind;

        match err.kind {
            ErrorKind::NoDevice | ErrorKind::Io(Io::NotFound) => LabError::PortNotFound,
            ErrorKind::Io(Io::PermissionDenied) => LabError::PermissionDenied(port.to_string()),
            _ => LabError::OpenFailed {
                port: port.to_string(),
                reason: err.description,
            },
        }
    }

    fn data_bits(bits: u8) -> tokio_serial::DataBits {
        match bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(bits: u8) -> tokio_serial::StopBits {
        if bits == 2 {
            tokio_serial::StopBits::Two
        } else {
            tokio_serial::StopBits::One
        }
    }

    fn parity(parity: Parity) -> tokio_serial::Parity {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn permission_errors_are_classified() {
            let err = serialport::Error::new(
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
                "denied",
            );
            assert!(matches!(
                open_error("/dev/ttyUSB0", err),
                LabError::PermissionDenied(port) if port == "/dev/ttyUSB0"
            ));
        }

        #[test]
        fn missing_devices_are_classified() {
            let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
            assert!(matches!(open_error("COM9", err), LabError::PortNotFound));
        }

        #[test]
        fn other_errors_keep_description() {
            let err =
                serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud rate");
            match open_error("COM3", err) {
                LabError::OpenFailed { port, reason } => {
                    assert_eq!(port, "COM3");
                    assert_eq!(reason, "bad baud rate");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn preferred_port_is_offered_without_enumeration() {
            let provider = NativePortProvider::with_port("/dev/ttyACM0");
            let port = provider.request_port().await.unwrap();
            assert_eq!(port, PortInfo::named("/dev/ttyACM0"));
        }
    }
}

/// Ports visible to the host, or `SerialFeatureDisabled` without native support.
pub fn list_ports() -> AppResult<Vec<PortInfo>> {
    #[cfg(feature = "instrument_serial")]
    {
        NativePortProvider::list_ports()
    }
    #[cfg(not(feature = "instrument_serial"))]
    {
        Err(LabError::SerialFeatureDisabled)
    }
}

/// Provider used when none is injected: native ports if compiled in.
pub fn default_provider(preferred_port: Option<String>) -> std::sync::Arc<dyn PortProvider> {
    #[cfg(feature = "instrument_serial")]
    {
        match preferred_port {
            Some(port) => std::sync::Arc::new(NativePortProvider::with_port(port)),
            None => std::sync::Arc::new(NativePortProvider::new()),
        }
    }
    #[cfg(not(feature = "instrument_serial"))]
    {
        let _ = preferred_port;
        std::sync::Arc::new(UnavailablePortProvider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_line_settings_are_8n1_at_115200() {
        let settings = LineSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 1);
        assert_eq!(settings.parity, Parity::None);
    }

    #[tokio::test]
    async fn unavailable_provider_refuses_everything() {
        let provider = UnavailablePortProvider;
        assert!(matches!(
            provider.request_port().await,
            Err(LabError::TransportUnavailable)
        ));
        assert!(matches!(
            provider
                .open(&PortInfo::named("COM1"), LineSettings::BENCH)
                .await,
            Err(LabError::TransportUnavailable)
        ));
    }
}
