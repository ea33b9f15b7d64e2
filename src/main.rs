//! CLI Entry Point for lab_bench
//!
//! Provides command-line access to the bench:
//! - listing serial ports
//! - running the simulated multimeter and oscilloscope
//! - encoding and sending single instrument commands
//!
//! # Usage
//!
//! ```bash
//! lab_bench ports
//! lab_bench multimeter --mode ac-voltage --ticks 5
//! lab_bench scope --wave square --frequency 500 --samples
//! lab_bench scope --circuit rlc
//! lab_bench encode voltage 10
//! lab_bench send --port /dev/ttyUSB0 scope-start
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lab_bench::config::{LabConfig, DEFAULT_CONFIG_PATH};
use lab_bench::hardware::{self, Command, SerialTransport};
use lab_bench::logging::{self, OutputFormat, TracingConfig};
use lab_bench::simulation::{CircuitKind, MeasurementType, WaveType};
use lab_bench::Bench;

#[derive(Parser)]
#[command(name = "lab_bench")]
#[command(about = "Virtual lab bench with simulated and serial-attached instruments", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports visible to this host
    Ports,

    /// Run the multimeter and print its readings
    Multimeter {
        /// Measurement type (dc-voltage, ac-voltage, dc-current, ac-current, resistance, continuity)
        #[arg(long, default_value = "dcVoltage")]
        mode: MeasurementType,

        /// Number of readings to print
        #[arg(long, default_value = "5")]
        ticks: usize,
    },

    /// Print one oscilloscope trace
    Scope {
        /// Circuit preset (rc, rl, rlc, diode), applied before --wave and --frequency
        #[arg(long)]
        circuit: Option<CircuitKind>,

        /// Wave type (sine, square, triangle, sawtooth)
        #[arg(long)]
        wave: Option<WaveType>,

        /// Source frequency in Hz
        #[arg(long)]
        frequency: Option<f64>,

        /// Time base in ms/div
        #[arg(long, default_value = "1.0")]
        time_base: f64,

        /// Vertical scale in V/div
        #[arg(long, default_value = "1.0")]
        vertical_scale: f64,

        /// Print every sample instead of only the readout
        #[arg(long)]
        samples: bool,
    },

    /// Connect, send one command and disconnect
    Send {
        /// Serial port (defaults to the configured or first USB port)
        #[arg(long)]
        port: Option<String>,

        /// Keep the port open this long and print received bytes
        #[arg(long, default_value = "0")]
        listen_ms: u64,

        #[command(subcommand)]
        action: Action,
    },

    /// Print the frame for a command without any I/O
    Encode {
        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum Action {
    /// Multimeter power off
    PowerOff,
    /// Resistance mode
    Resistance,
    /// Continuity mode
    Continuity,
    /// DC voltage mode
    DcVoltage,
    /// AC voltage mode
    AcVoltage,
    /// DC current mode
    DcCurrent,
    /// Oscilloscope stop
    ScopeStop,
    /// Oscilloscope start
    ScopeStart,
    /// Power-supply output voltage
    Voltage {
        /// Volts
        volts: f64,
    },
    /// Power-supply output off
    SupplyOff,
    /// Power-supply current limit
    Current {
        /// Amps
        amps: f64,
    },
    /// Waveform generator family and frequency tier
    Waveform {
        /// Wave type (sine, square, triangle)
        wave: WaveType,
        /// Frequency in Hz, selects the tier
        frequency: f64,
    },
}

impl Action {
    fn command(self) -> Result<Command> {
        Ok(match self {
            Action::PowerOff => Command::PowerOff,
            Action::Resistance => Command::ResistanceMode,
            Action::Continuity => Command::ContinuityMode,
            Action::DcVoltage => Command::DcVoltageMode,
            Action::AcVoltage => Command::AcVoltageMode,
            Action::DcCurrent => Command::DcCurrentMode,
            Action::ScopeStop => Command::ScopeStop,
            Action::ScopeStart => Command::ScopeStart,
            Action::Voltage { volts } => Command::PowerSupplyVoltage(volts),
            Action::SupplyOff => Command::PowerSupplyOff,
            Action::Current { amps } => Command::PowerSupplyCurrent(amps),
            Action::Waveform { wave, frequency } => Command::for_waveform(wave, frequency)
                .ok_or_else(|| anyhow!("the hardware generator has no {wave} waveform"))?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    logging::init(TracingConfig::from_lab_config(&config)?.with_format(cli.log_format))?;

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Multimeter { mode, ticks } => run_multimeter(&config, mode, ticks).await,
        Commands::Scope {
            circuit,
            wave,
            frequency,
            time_base,
            vertical_scale,
            samples,
        } => {
            run_scope(
                &config,
                circuit,
                wave,
                frequency,
                time_base,
                vertical_scale,
                samples,
            )
            .await
        }
        Commands::Send {
            port,
            listen_ms,
            action,
        } => send_once(&config, port, listen_ms, action).await,
        Commands::Encode { action } => {
            println!("{}", action.command()?.encode());
            Ok(())
        }
    }
}

fn list_ports() -> Result<()> {
    let ports = hardware::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}\t{}", port.name, description),
            None => println!("{}", port.name),
        }
    }
    Ok(())
}

async fn run_multimeter(config: &LabConfig, mode: MeasurementType, ticks: usize) -> Result<()> {
    let mut bench = Bench::from_config(config);
    bench.multimeter.select_mode(mode).await;
    bench.multimeter.start();

    let mut readings = bench.multimeter.subscribe();
    for _ in 0..ticks {
        readings.changed().await?;
        let display = readings.borrow_and_update().clone();
        println!("{:<11} {}", display.mode.to_string(), display.text());
    }

    bench.shutdown().await;
    Ok(())
}

async fn run_scope(
    config: &LabConfig,
    circuit: Option<CircuitKind>,
    wave: Option<WaveType>,
    frequency: Option<f64>,
    time_base: f64,
    vertical_scale: f64,
    samples: bool,
) -> Result<()> {
    let mut bench = Bench::from_config(config);
    if let Some(kind) = circuit {
        bench.store.select_circuit(kind);
    }
    let scope = &mut bench.oscilloscope;
    if let Some(wave) = wave {
        scope.set_wave_type(wave).await;
    }
    if let Some(hz) = frequency {
        scope.set_frequency(hz).await;
    }
    scope.set_time_base(time_base);
    scope.set_vertical_scale(vertical_scale);
    scope.start().await;

    println!("{}", scope.readout());
    if samples {
        for sample in scope.trace().unwrap_or_default() {
            println!("{:.4}\t{:.4}", sample.x, sample.y);
        }
    }

    bench.shutdown().await;
    Ok(())
}

async fn send_once(
    config: &LabConfig,
    port: Option<String>,
    listen_ms: u64,
    action: Action,
) -> Result<()> {
    let command = action.command()?;
    let provider = hardware::default_provider(port.or_else(|| config.serial.port.clone()));
    let transport = SerialTransport::with_config(provider, config.serial.transport_config());

    transport
        .set_observer(Arc::new(|chunk: bytes::Bytes| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
            println!("<- {}", hex.join(" "));
        }))
        .await;

    transport.connect().await?;
    let frame = command.encode();
    let sent = transport.send(frame).await;
    if sent.is_ok() {
        println!("-> {frame}");
        if listen_ms > 0 {
            tokio::time::sleep(Duration::from_millis(listen_ms)).await;
        }
    }
    transport.disconnect().await;
    sent?;
    Ok(())
}
