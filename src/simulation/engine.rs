//! Waveform and measurement derivation.
//!
//! Everything here is a function of [`CircuitParameters`]. The engine never
//! touches the transport and never fails: callers clamp time base and vertical
//! scale before asking for samples.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::circuit::{CircuitParameters, CircuitStore, WaveType};

/// Samples per waveform generation.
pub const WAVE_SAMPLES: usize = 200;

/// Samples per horizontal division; ten divisions span the screen.
const SAMPLES_PER_DIVISION: f64 = 20.0;

/// Simulated resistance of the circuit under test, in ohms.
pub const SIMULATED_RESISTANCE_OHMS: f64 = 1000.0;

/// Continuity reading when the probes are connected.
pub const CONTINUITY_CLOSED: f64 = 0.05;
/// Continuity reading when the circuit is open.
pub const CONTINUITY_OPEN: f64 = 1.0;

/// Half-width of the cosmetic display jitter, relative to the base value.
pub const DISPLAY_JITTER: f64 = 0.01;

const RMS_FACTOR: f64 = 0.707;
const DC_FACTOR: f64 = 0.95;
const LOAD_OHMS: f64 = 10.0;

/// One point on the oscilloscope trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveSample {
    /// Position on the time axis, in divisions scaled by the time base.
    pub x: f64,
    /// Amplitude normalised by the vertical scale.
    pub y: f64,
}

/// Quantities the multimeter can measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementType {
    /// DC voltage.
    #[default]
    DcVoltage,
    /// AC voltage (RMS).
    AcVoltage,
    /// DC current.
    DcCurrent,
    /// AC current (RMS).
    AcCurrent,
    /// Resistance.
    Resistance,
    /// Continuity test.
    Continuity,
}

impl MeasurementType {
    /// All measurement types.
    pub const ALL: [MeasurementType; 6] = [
        MeasurementType::DcVoltage,
        MeasurementType::AcVoltage,
        MeasurementType::DcCurrent,
        MeasurementType::AcCurrent,
        MeasurementType::Resistance,
        MeasurementType::Continuity,
    ];

    /// Camel-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementType::DcVoltage => "dcVoltage",
            MeasurementType::AcVoltage => "acVoltage",
            MeasurementType::DcCurrent => "dcCurrent",
            MeasurementType::AcCurrent => "acCurrent",
            MeasurementType::Resistance => "resistance",
            MeasurementType::Continuity => "continuity",
        }
    }

    /// Unit shown next to readings of this type.
    pub fn unit(self) -> &'static str {
        match self {
            MeasurementType::DcVoltage | MeasurementType::AcVoltage => "V",
            MeasurementType::DcCurrent | MeasurementType::AcCurrent => "A",
            MeasurementType::Resistance | MeasurementType::Continuity => "Ω",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '-' && *c != '_').collect();
        MeasurementType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown measurement type '{s}'"))
    }
}

impl CircuitParameters {
    /// One generation of oscilloscope samples.
    ///
    /// Sample `i` sits at `x = i / 20 * time_base`; `y` follows the wave
    /// family, scaled by `amplitude / vertical_scale`.
    pub fn generate_wave_data(&self, time_base: f64, vertical_scale: f64) -> Vec<WaveSample> {
        (0..WAVE_SAMPLES)
            .map(|i| {
                let x = i as f64 / SAMPLES_PER_DIVISION * time_base;
                WaveSample {
                    x,
                    y: self.amplitude * self.unit_wave(x) / vertical_scale,
                }
            })
            .collect()
    }

    /// Unit-amplitude wave value at time-axis position `x` (milliseconds).
    fn unit_wave(&self, x: f64) -> f64 {
        let f = self.frequency;
        match self.wave_type {
            WaveType::Sine => (2.0 * PI * f * x / 1000.0).sin(),
            WaveType::Square => {
                if (2.0 * PI * f * x / 1000.0).sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveType::Triangle => {
                2.0 * ((x * f / 1000.0).rem_euclid(1.0) - 0.5).abs() - 0.5
            }
            WaveType::Sawtooth => (x * f / 500.0).rem_euclid(1.0) - 0.5,
        }
    }

    /// Scalar reading for `kind`.
    ///
    /// Every type is deterministic except continuity, which is simulated
    /// noise: 0.05 or 1 with equal odds, drawn from `rng`. It says nothing
    /// about a real device.
    pub fn measurement_with<R: Rng + ?Sized>(&self, kind: MeasurementType, rng: &mut R) -> f64 {
        let a = self.amplitude;
        match kind {
            MeasurementType::DcVoltage => a * DC_FACTOR,
            MeasurementType::AcVoltage => a * RMS_FACTOR,
            MeasurementType::DcCurrent => a / LOAD_OHMS,
            MeasurementType::AcCurrent => a / LOAD_OHMS * RMS_FACTOR,
            MeasurementType::Resistance => SIMULATED_RESISTANCE_OHMS,
            MeasurementType::Continuity => {
                if rng.gen_bool(0.5) {
                    CONTINUITY_CLOSED
                } else {
                    CONTINUITY_OPEN
                }
            }
        }
    }

    /// [`measurement_with`](Self::measurement_with) using the thread RNG.
    pub fn measurement(&self, kind: MeasurementType) -> f64 {
        self.measurement_with(kind, &mut rand::thread_rng())
    }
}

/// Add ±1 % presentation jitter to a reading. The result is for display only.
pub fn apply_display_jitter<R: Rng + ?Sized>(base: f64, rng: &mut R) -> f64 {
    let offset: f64 = rng.gen_range(-DISPLAY_JITTER..=DISPLAY_JITTER);
    base + offset * base
}

/// Read-only view over a [`CircuitStore`] that derives display data.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    store: CircuitStore,
}

impl SimulationEngine {
    /// Engine reading from `store`.
    pub fn new(store: CircuitStore) -> Self {
        Self { store }
    }

    /// Underlying parameter store.
    pub fn store(&self) -> &CircuitStore {
        &self.store
    }

    /// Fresh sample generation from the current parameters.
    pub fn generate_wave_data(&self, time_base: f64, vertical_scale: f64) -> Vec<WaveSample> {
        self.store
            .snapshot()
            .generate_wave_data(time_base, vertical_scale)
    }

    /// Scalar reading from the current parameters.
    pub fn get_measurement(&self, kind: MeasurementType) -> f64 {
        self.store.snapshot().measurement(kind)
    }
}
