//! Simulated circuit parameters and the store that owns them.
//!
//! There is exactly one `CircuitParameters` value per bench. It lives in a
//! [`CircuitStore`], a cheap-to-clone handle that every instrument controller
//! receives at construction. Reads take a snapshot; writes merge a
//! [`CircuitPatch`] into the current value and notify watchers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lowest frequency the simulated source produces.
pub const MIN_FREQUENCY_HZ: f64 = 10.0;
/// Highest frequency the simulated source produces.
pub const MAX_FREQUENCY_HZ: f64 = 2000.0;

const SEED_POINTS: usize = 100;

/// Waveform family used by the simulated signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveType {
    /// `sin(2πft)`
    #[default]
    Sine,
    /// Sign of the sine.
    Square,
    /// Linear ramp up and down.
    Triangle,
    /// Linear ramp with a reset.
    Sawtooth,
}

impl WaveType {
    /// All families, in display order.
    pub const ALL: [WaveType; 4] = [
        WaveType::Sine,
        WaveType::Square,
        WaveType::Triangle,
        WaveType::Sawtooth,
    ];

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            WaveType::Sine => "sine",
            WaveType::Square => "square",
            WaveType::Triangle => "triangle",
            WaveType::Sawtooth => "sawtooth",
        }
    }
}

impl fmt::Display for WaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaveType::ALL
            .into_iter()
            .find(|wave| wave.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown wave type '{s}' (sine, square, triangle, sawtooth)"))
    }
}

/// Circuit under test on the bench.
///
/// Selecting one presets the source waveform and frequency the circuit is
/// usually measured with; both stay adjustable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitKind {
    /// Resistor-capacitor network.
    Rc,
    /// Resistor-inductor network.
    Rl,
    /// Series resonant circuit.
    Rlc,
    /// Diode rectifier.
    Diode,
}

impl CircuitKind {
    /// All circuits, in selector order.
    pub const ALL: [CircuitKind; 4] = [
        CircuitKind::Rc,
        CircuitKind::Rl,
        CircuitKind::Rlc,
        CircuitKind::Diode,
    ];

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitKind::Rc => "rc",
            CircuitKind::Rl => "rl",
            CircuitKind::Rlc => "rlc",
            CircuitKind::Diode => "diode",
        }
    }

    /// Source waveform and frequency (Hz) preset for this circuit.
    pub fn source(self) -> (WaveType, f64) {
        match self {
            CircuitKind::Rc => (WaveType::Square, 1000.0),
            CircuitKind::Rl => (WaveType::Square, 500.0),
            CircuitKind::Rlc => (WaveType::Sine, 1500.0),
            CircuitKind::Diode => (WaveType::Sine, 800.0),
        }
    }

    /// Patch selecting this circuit.
    pub fn patch(self) -> CircuitPatch {
        CircuitPatch {
            kind: Some(self),
            ..CircuitPatch::default()
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircuitKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown circuit '{s}' (rc, rl, rlc, diode)"))
    }
}

/// Current state of the simulated circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitParameters {
    /// Selected circuit, `None` until one is chosen.
    pub kind: Option<CircuitKind>,
    /// Waveform family of the source.
    pub wave_type: WaveType,
    /// Source frequency in Hz, always within `[10, 2000]`.
    pub frequency: f64,
    /// Peak amplitude in volts.
    pub amplitude: f64,
    /// Static voltage trace used to seed circuit diagrams.
    pub voltage_points: Vec<f64>,
    /// Static current trace used to seed circuit diagrams.
    pub current_points: Vec<f64>,
}

impl Default for CircuitParameters {
    fn default() -> Self {
        Self {
            kind: None,
            wave_type: WaveType::Sine,
            frequency: 1000.0,
            amplitude: 5.0,
            voltage_points: seed_trace(5.0),
            current_points: seed_trace(0.5),
        }
    }
}

fn seed_trace(peak: f64) -> Vec<f64> {
    (0..SEED_POINTS)
        .map(|i| peak * (i as f64 * 0.1).sin())
        .collect()
}

/// Partial update for [`CircuitParameters`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitPatch {
    /// Circuit to select. Its source preset is applied before the other
    /// fields, so explicit values win.
    pub kind: Option<CircuitKind>,
    /// New waveform family.
    pub wave_type: Option<WaveType>,
    /// New frequency, clamped into `[10, 2000]` Hz.
    pub frequency: Option<f64>,
    /// New amplitude, negative values become 0.
    pub amplitude: Option<f64>,
    /// Replacement voltage seed trace.
    pub voltage_points: Option<Vec<f64>>,
    /// Replacement current seed trace.
    pub current_points: Option<Vec<f64>>,
}

impl CircuitPatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the waveform family.
    pub fn wave_type(mut self, wave_type: WaveType) -> Self {
        self.wave_type = Some(wave_type);
        self
    }

    /// Set the frequency.
    pub fn frequency(mut self, hz: f64) -> Self {
        self.frequency = Some(hz);
        self
    }

    /// Set the amplitude.
    pub fn amplitude(mut self, volts: f64) -> Self {
        self.amplitude = Some(volts);
        self
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl CircuitParameters {
    /// Merge a patch into these parameters, clamping numeric fields.
    ///
    /// Non-finite numbers are ignored so the engine never sees them.
    pub fn apply(&mut self, patch: CircuitPatch) {
        if let Some(kind) = patch.kind {
            let (wave_type, hz) = kind.source();
            self.kind = Some(kind);
            self.wave_type = wave_type;
            self.frequency = clamp_frequency(hz);
        }
        if let Some(wave_type) = patch.wave_type {
            self.wave_type = wave_type;
        }
        if let Some(hz) = patch.frequency.filter(|hz| hz.is_finite()) {
            self.frequency = clamp_frequency(hz);
        }
        if let Some(volts) = patch.amplitude.filter(|v| v.is_finite()) {
            self.amplitude = volts.max(0.0);
        }
        if let Some(points) = patch.voltage_points {
            self.voltage_points = points;
        }
        if let Some(points) = patch.current_points {
            self.current_points = points;
        }
    }
}

/// Clamp a frequency into the simulated source range.
pub fn clamp_frequency(hz: f64) -> f64 {
    hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
}

/// Shared owner of the bench's circuit parameters.
///
/// Cloning the store clones the handle, not the parameters.
#[derive(Clone)]
pub struct CircuitStore {
    tx: Arc<watch::Sender<CircuitParameters>>,
}

impl CircuitStore {
    /// Store holding `initial`, after clamping it like any other update.
    pub fn new(initial: CircuitParameters) -> Self {
        let mut params = CircuitParameters::default();
        params.apply(CircuitPatch {
            kind: None,
            wave_type: Some(initial.wave_type),
            frequency: Some(initial.frequency),
            amplitude: Some(initial.amplitude),
            voltage_points: Some(initial.voltage_points),
            current_points: Some(initial.current_points),
        });
        params.kind = initial.kind;
        let (tx, _rx) = watch::channel(params);
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current parameters.
    pub fn snapshot(&self) -> CircuitParameters {
        self.tx.borrow().clone()
    }

    /// Merge `patch` into the current parameters and return the result.
    pub fn update(&self, patch: CircuitPatch) -> CircuitParameters {
        if patch.is_empty() {
            return self.snapshot();
        }
        self.tx.send_modify(|params| params.apply(patch));
        let params = self.snapshot();
        tracing::debug!(
            wave = %params.wave_type,
            frequency = params.frequency,
            amplitude = params.amplitude,
            "Circuit parameters updated"
        );
        params
    }

    /// Select `kind` and apply its source preset.
    pub fn select_circuit(&self, kind: CircuitKind) -> CircuitParameters {
        tracing::info!(circuit = %kind, "Circuit selected");
        self.update(kind.patch())
    }

    /// Receiver that wakes on every update.
    pub fn subscribe(&self) -> watch::Receiver<CircuitParameters> {
        self.tx.subscribe()
    }
}

impl Default for CircuitStore {
    fn default() -> Self {
        Self::new(CircuitParameters::default())
    }
}

impl fmt::Debug for CircuitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitStore")
            .field("params", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bench_power_on_state() {
        let params = CircuitParameters::default();
        assert_eq!(params.wave_type, WaveType::Sine);
        assert_eq!(params.frequency, 1000.0);
        assert_eq!(params.amplitude, 5.0);
        assert_eq!(params.voltage_points.len(), 100);
        assert_eq!(params.current_points.len(), 100);
        assert!((params.voltage_points[10] - 5.0 * 1.0f64.sin()).abs() < 1e-12);
    }

    #[test]
    fn patch_merges_only_set_fields() {
        let store = CircuitStore::default();
        let params = store.update(CircuitPatch::new().wave_type(WaveType::Square));
        assert_eq!(params.wave_type, WaveType::Square);
        assert_eq!(params.frequency, 1000.0);
        assert_eq!(params.amplitude, 5.0);
    }

    #[test]
    fn frequency_is_clamped() {
        let store = CircuitStore::default();
        assert_eq!(store.update(CircuitPatch::new().frequency(5.0)).frequency, 10.0);
        assert_eq!(store.update(CircuitPatch::new().frequency(9000.0)).frequency, 2000.0);
        assert_eq!(store.update(CircuitPatch::new().frequency(f64::NAN)).frequency, 2000.0);
    }

    #[test]
    fn negative_amplitude_becomes_zero() {
        let store = CircuitStore::default();
        assert_eq!(store.update(CircuitPatch::new().amplitude(-3.0)).amplitude, 0.0);
    }

    #[test]
    fn initial_parameters_are_clamped() {
        let store = CircuitStore::new(CircuitParameters {
            frequency: 1.0,
            ..CircuitParameters::default()
        });
        assert_eq!(store.snapshot().frequency, MIN_FREQUENCY_HZ);
    }

    #[test]
    fn clones_share_state() {
        let store = CircuitStore::default();
        let other = store.clone();
        other.update(CircuitPatch::new().amplitude(2.5));
        assert_eq!(store.snapshot().amplitude, 2.5);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let store = CircuitStore::default();
        let mut rx = store.subscribe();
        store.update(CircuitPatch::new().frequency(250.0));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().frequency, 250.0);
    }

    #[test]
    fn circuit_presets_set_source() {
        let store = CircuitStore::default();
        let cases = [
            (CircuitKind::Rc, WaveType::Square, 1000.0),
            (CircuitKind::Rl, WaveType::Square, 500.0),
            (CircuitKind::Rlc, WaveType::Sine, 1500.0),
            (CircuitKind::Diode, WaveType::Sine, 800.0),
        ];
        for (kind, wave, hz) in cases {
            let params = store.select_circuit(kind);
            assert_eq!(params.kind, Some(kind));
            assert_eq!(params.wave_type, wave, "{kind}");
            assert_eq!(params.frequency, hz, "{kind}");
            assert_eq!(params.amplitude, 5.0);
        }
    }

    #[test]
    fn explicit_fields_override_circuit_preset() {
        let store = CircuitStore::default();
        let mut patch = CircuitKind::Rl.patch();
        patch.frequency = Some(120.0);
        let params = store.update(patch);
        assert_eq!(params.kind, Some(CircuitKind::Rl));
        assert_eq!(params.wave_type, WaveType::Square);
        assert_eq!(params.frequency, 120.0);

        // Later slider moves keep the circuit selected
        let params = store.update(CircuitPatch::new().frequency(700.0));
        assert_eq!(params.kind, Some(CircuitKind::Rl));
    }

    #[test]
    fn circuit_kind_parses_case_insensitively() {
        assert_eq!("RLC".parse::<CircuitKind>(), Ok(CircuitKind::Rlc));
        assert!("bjt".parse::<CircuitKind>().is_err());
    }

    #[test]
    fn wave_type_parses_case_insensitively() {
        assert_eq!("Square".parse::<WaveType>(), Ok(WaveType::Square));
        assert!("noise".parse::<WaveType>().is_err());
    }
}
