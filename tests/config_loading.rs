//! Configuration layering tests
//!
//! `figment::Jail` gives each test its own working directory and environment.

use figment::Jail;
use lab_bench::config::{BackendMode, LabConfig};
use lab_bench::simulation::WaveType;

fn load() -> figment::error::Result<LabConfig> {
    LabConfig::load().map_err(|e| figment::Error::from(e.to_string()))
}

#[test]
fn test_file_then_env_layering() {
    Jail::expect_with(|jail| {
        jail.create_dir("config")?;
        jail.create_file(
            "config/lab_bench.toml",
            r#"
                [backend]
                mode = "simulated"

                [refresh]
                multimeter_ms = 250
            "#,
        )?;
        jail.set_env("LAB_BENCH_BACKEND__MODE", "hardware");
        jail.set_env("LAB_BENCH_SERIAL__PORT", "/dev/ttyACM3");
        jail.set_env("LAB_BENCH_CIRCUIT__WAVE_TYPE", "triangle");

        let config = load()?;
        assert_eq!(config.backend.mode, BackendMode::Hardware);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM3"));
        assert_eq!(config.refresh.multimeter_ms, 250);
        assert_eq!(config.refresh.oscilloscope_ms, 100);
        assert_eq!(config.circuit.wave_type, Some(WaveType::Triangle));
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn test_no_file_means_simulated_defaults() {
    Jail::expect_with(|_jail| {
        let config = load()?;
        assert_eq!(config, LabConfig::default());
        Ok(())
    });
}

#[test]
fn test_env_values_are_validated() {
    Jail::expect_with(|jail| {
        jail.set_env("LAB_BENCH_SERIAL__WRITE_QUEUE_DEPTH", "0");
        let config = load()?;
        assert!(config.validate().is_err());
        Ok(())
    });
}
