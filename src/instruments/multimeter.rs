//! Multimeter controller.
//!
//! While measuring, a refresh task reads the simulated circuit every period
//! (500 ms by default), adds ±1 % display jitter and publishes the result on
//! a watch channel. Mode changes also go to the backend as mode-select frames.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::backend::{Dispatch, InstrumentBackend};
use super::refresh::RefreshTask;
use crate::hardware::Command;
use crate::simulation::{apply_display_jitter, MeasurementType, SimulationEngine};

/// Text shown while the meter is not measuring.
pub const IDLE_TEXT: &str = "----";

/// Default refresh period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);

/// Continuity readings below this many ohms count as a closed circuit.
const CONTINUITY_THRESHOLD: f64 = 0.5;

/// What the multimeter screen shows.
#[derive(Debug, Clone, PartialEq)]
pub struct MultimeterDisplay {
    /// Whether readings are being refreshed.
    pub measuring: bool,
    /// Selected measurement.
    pub mode: MeasurementType,
    /// Latest reading, after jitter.
    pub value: f64,
}

impl MultimeterDisplay {
    /// Screen text: the formatted reading, or `----` when stopped.
    pub fn text(&self) -> String {
        if self.measuring {
            format_reading(self.mode, self.value)
        } else {
            IDLE_TEXT.to_string()
        }
    }
}

impl Default for MultimeterDisplay {
    fn default() -> Self {
        Self {
            measuring: false,
            mode: MeasurementType::DcVoltage,
            value: 0.0,
        }
    }
}

/// Format a reading with the unit prefix the meter would pick.
///
/// Voltages above 1 V show in V, otherwise mV. Currents above 0.1 A show in
/// A, otherwise mA. Resistances above 1 kΩ show in kΩ.
pub fn format_reading(kind: MeasurementType, value: f64) -> String {
    match kind {
        MeasurementType::DcVoltage | MeasurementType::AcVoltage => {
            if value > 1.0 {
                format!("{value:.2} V")
            } else {
                format!("{:.1} mV", value * 1000.0)
            }
        }
        MeasurementType::DcCurrent | MeasurementType::AcCurrent => {
            if value > 0.1 {
                format!("{value:.3} A")
            } else {
                format!("{:.1} mA", value * 1000.0)
            }
        }
        MeasurementType::Resistance => {
            if value > 1000.0 {
                format!("{:.2} kΩ", value / 1000.0)
            } else {
                format!("{value:.1} Ω")
            }
        }
        MeasurementType::Continuity => {
            if value < CONTINUITY_THRESHOLD {
                format!("SHORT {value:.2} Ω")
            } else {
                "OPEN".to_string()
            }
        }
    }
}

/// Multimeter state machine.
pub struct Multimeter {
    engine: SimulationEngine,
    backend: Arc<dyn InstrumentBackend>,
    period: Duration,
    display: Arc<watch::Sender<MultimeterDisplay>>,
    refresh: Option<RefreshTask>,
}

impl Multimeter {
    /// Stopped meter in DC voltage mode.
    pub fn new(engine: SimulationEngine, backend: Arc<dyn InstrumentBackend>) -> Self {
        let (display, _) = watch::channel(MultimeterDisplay::default());
        Self {
            engine,
            backend,
            period: DEFAULT_PERIOD,
            display: Arc::new(display),
            refresh: None,
        }
    }

    /// Use `period` for display refresh. Takes effect on the next start.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Current screen state.
    pub fn display(&self) -> MultimeterDisplay {
        self.display.borrow().clone()
    }

    /// Receiver woken on every screen update.
    pub fn subscribe(&self) -> watch::Receiver<MultimeterDisplay> {
        self.display.subscribe()
    }

    /// True while measuring.
    pub fn is_measuring(&self) -> bool {
        self.display.borrow().measuring
    }

    /// Selected measurement.
    pub fn mode(&self) -> MeasurementType {
        self.display.borrow().mode
    }

    /// Switch measurement and send the mode-select frame.
    ///
    /// AC current has no hardware mode and is simulated only.
    pub async fn select_mode(&mut self, mode: MeasurementType) -> Dispatch {
        self.display.send_modify(|d| d.mode = mode);
        if self.is_measuring() {
            self.refresh_now();
        }
        tracing::info!(%mode, "Multimeter mode selected");
        self.backend
            .dispatch_opt(Command::for_measurement(mode))
            .await
    }

    /// Start measuring. No-op when already measuring.
    pub fn start(&mut self) {
        if self.refresh.is_some() {
            return;
        }
        self.display.send_modify(|d| d.measuring = true);

        let engine = self.engine.clone();
        let display = Arc::clone(&self.display);
        self.refresh = Some(RefreshTask::spawn("multimeter", self.period, move || {
            update_reading(&engine, &display)
        }));
        tracing::info!("Multimeter measuring");
    }

    /// Stop measuring. The screen shows `----` until the next start.
    pub async fn stop(&mut self) {
        self.display.send_modify(|d| d.measuring = false);
        if let Some(task) = self.refresh.take() {
            task.stop().await;
            tracing::info!("Multimeter stopped");
        }
    }

    /// Reset the displayed value to 0. The next refresh shows the live
    /// reading again; the circuit is not touched.
    pub fn zero(&mut self) {
        self.display.send_modify(|d| d.value = 0.0);
        tracing::debug!(mode = %self.mode(), "Multimeter zeroed");
    }

    /// Stop measuring and send the power-off frame.
    pub async fn power_off(&mut self) -> Dispatch {
        self.stop().await;
        self.backend.dispatch(Command::PowerOff).await
    }

    /// Take one reading immediately, outside the refresh schedule.
    pub fn refresh_now(&self) {
        update_reading(&self.engine, &self.display);
    }
}

impl std::fmt::Debug for Multimeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multimeter")
            .field("display", &*self.display.borrow())
            .field("backend", &self.backend.mode())
            .field("period", &self.period)
            .finish()
    }
}

fn update_reading(engine: &SimulationEngine, display: &watch::Sender<MultimeterDisplay>) {
    let mode = display.borrow().mode;
    let base = engine.get_measurement(mode);
    let value = apply_display_jitter(base, &mut rand::thread_rng());
    display.send_if_modified(|d| {
        // Mode may have changed since the reading was taken
        if !d.measuring || d.mode != mode {
            return false;
        }
        d.value = value;
        true
    });
}
