//! # Lab Bench Core Library
//!
//! Control and simulation layer for a virtual electronics bench: an
//! oscilloscope, a multimeter and a power supply that run against a
//! simulated circuit and, optionally, a physical instrument on a serial link.
//!
//! ## Crate Structure
//!
//! - **`simulation`**: the circuit store and the engine deriving waveforms
//!   and meter readings from it. Pure, never fails.
//! - **`hardware`**: the 4-byte command protocol, the host serial seam and the
//!   connection manager owning the single serial channel.
//! - **`instruments`**: per-instrument controllers, their periodic refresh
//!   tasks and the simulated or hardware backend they dispatch through.
//! - **`bench`**: wires the above together from configuration.
//! - **`config`**: figment configuration (TOML file plus `LAB_BENCH_` env).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: the crate-wide `LabError`.

pub mod bench;
pub mod config;
pub mod error;
pub mod hardware;
pub mod instruments;
pub mod logging;
pub mod simulation;

pub use bench::Bench;
pub use error::{AppResult, LabError};
