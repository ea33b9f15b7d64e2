//! Circuit Simulation Engine
//!
//! Holds the simulated circuit parameters and derives what the instruments
//! display from them:
//!
//! - [`CircuitStore`] owns the single [`CircuitParameters`] value of a bench and
//!   merges partial updates into it.
//! - [`CircuitParameters::generate_wave_data`] produces one 200-sample
//!   oscilloscope generation.
//! - [`CircuitParameters::measurement`] produces multimeter readings.
//!
//! # Example
//!
//! ```
//! use lab_bench::simulation::{CircuitPatch, CircuitStore, MeasurementType, SimulationEngine, WaveType};
//!
//! let store = CircuitStore::default();
//! store.update(CircuitPatch::new().wave_type(WaveType::Square).frequency(500.0));
//!
//! let engine = SimulationEngine::new(store);
//! let trace = engine.generate_wave_data(1.0, 1.0);
//! assert_eq!(trace.len(), 200);
//! assert_eq!(engine.get_measurement(MeasurementType::Resistance), 1000.0);
//! ```

pub mod circuit;
pub mod engine;

pub use circuit::{
    clamp_frequency, CircuitKind, CircuitParameters, CircuitPatch, CircuitStore, WaveType,
    MAX_FREQUENCY_HZ,
    MIN_FREQUENCY_HZ,
};
pub use engine::{
    apply_display_jitter, MeasurementType, SimulationEngine, WaveSample, CONTINUITY_CLOSED,
    CONTINUITY_OPEN, WAVE_SAMPLES,
};
