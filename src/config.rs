//! Bench configuration using Figment.
//!
//! Configuration is layered:
//! 1. `config/lab_bench.toml` (or any path given to [`LabConfig::load_from`])
//! 2. Environment variables prefixed with `LAB_BENCH_`, nested with `__`
//!
//! Every field has a default, so a missing file yields a usable simulated
//! bench.
//!
//! # Example
//! ```no_run
//! use lab_bench::config::LabConfig;
//!
//! let config = LabConfig::load()?;
//! config.validate()?;
//! println!("Backend: {:?}", config.backend.mode);
//! # Ok::<(), lab_bench::error::LabError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, LabError};
use crate::hardware::TransportConfig;
use crate::simulation::{CircuitPatch, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/lab_bench.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LAB_BENCH_";

/// Top-level bench configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Instrument backend selection.
    pub backend: BackendConfig,
    /// Serial transport settings.
    pub serial: SerialConfig,
    /// Display refresh periods.
    pub refresh: RefreshConfig,
    /// Initial circuit parameters, merged over the power-on defaults.
    pub circuit: CircuitPatch,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Lab Bench".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where instrument actions go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Simulation only, no frames are sent.
    #[default]
    Simulated,
    /// Simulation plus frame dispatch over the serial transport.
    Hardware,
}

/// Backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Selected backend.
    pub mode: BackendMode,
}

/// Serial transport configuration. Line settings are fixed at 115200 8N1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device to open instead of auto-selecting one.
    pub port: Option<String>,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Frames allowed to wait in the writer queue.
    pub write_queue_depth: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            port: None,
            read_buffer_size: transport.read_buffer_size,
            write_queue_depth: transport.write_queue_depth,
        }
    }
}

impl SerialConfig {
    /// Transport tuning derived from this section.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            read_buffer_size: self.read_buffer_size,
            write_queue_depth: self.write_queue_depth,
        }
    }
}

/// Display refresh periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Multimeter refresh period in milliseconds.
    pub multimeter_ms: u64,
    /// Oscilloscope refresh period in milliseconds.
    pub oscilloscope_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            multimeter_ms: 500,
            oscilloscope_ms: 100,
        }
    }
}

impl RefreshConfig {
    /// Multimeter refresh period.
    pub fn multimeter(&self) -> Duration {
        Duration::from_millis(self.multimeter_ms)
    }

    /// Oscilloscope refresh period.
    pub fn oscilloscope(&self) -> Duration {
        Duration::from_millis(self.oscilloscope_ms)
    }
}

impl LabConfig {
    /// Load from `config/lab_bench.toml` and the environment.
    ///
    /// Environment variables override the file, e.g.
    /// `LAB_BENCH_BACKEND__MODE=hardware` or `LAB_BENCH_SERIAL__PORT=/dev/ttyUSB0`.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref()).extract().map_err(LabError::from)
    }

    /// Layered provider, exposed so callers can add their own layers.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.read_buffer_size == 0 {
            return Err(LabError::Configuration(
                "serial.read_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.serial.write_queue_depth == 0 {
            return Err(LabError::Configuration(
                "serial.write_queue_depth must be greater than 0".to_string(),
            ));
        }

        if self.refresh.multimeter_ms == 0 || self.refresh.oscilloscope_ms == 0 {
            return Err(LabError::Configuration(
                "refresh periods must be greater than 0 ms".to_string(),
            ));
        }

        if let Some(hz) = self.circuit.frequency {
            if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
                return Err(LabError::Configuration(format!(
                    "circuit.frequency {hz} Hz is outside {MIN_FREQUENCY_HZ}-{MAX_FREQUENCY_HZ} Hz"
                )));
            }
        }
        if let Some(volts) = self.circuit.amplitude {
            if !volts.is_finite() || volts < 0.0 {
                return Err(LabError::Configuration(format!(
                    "circuit.amplitude {volts} V must be a non-negative number"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{CircuitKind, WaveType};
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = LabConfig::default();
        assert_eq!(config.backend.mode, BackendMode::Simulated);
        assert_eq!(config.refresh.multimeter(), Duration::from_millis(500));
        assert_eq!(config.refresh.oscilloscope(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
name = "Bench A"
log_level = "debug"

[backend]
mode = "hardware"

[serial]
port = "/dev/ttyUSB1"

[circuit]
kind = "rl"
wave_type = "square"
frequency = 440.0
"#
        )
        .unwrap();

        let config = LabConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "Bench A");
        assert_eq!(config.backend.mode, BackendMode::Hardware);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.serial.write_queue_depth, 32);
        assert_eq!(config.circuit.wave_type, Some(WaveType::Square));
        assert_eq!(config.circuit.frequency, Some(440.0));
        assert_eq!(config.circuit.amplitude, None);
        assert_eq!(config.circuit.kind, Some(CircuitKind::Rl));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LabConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.application.log_level, "info");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nmode = \"quantum\"").unwrap();
        assert!(matches!(
            LabConfig::load_from(file.path()),
            Err(LabError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LabConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(LabError::Configuration(_))
        ));
    }

    #[test]
    fn zero_refresh_period_is_rejected() {
        let mut config = LabConfig::default();
        config.refresh.oscilloscope_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_frequency_is_rejected() {
        let mut config = LabConfig::default();
        config.circuit.frequency = Some(5000.0);
        assert!(config.validate().is_err());
    }
}
