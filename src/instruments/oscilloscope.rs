//! Oscilloscope controller.
//!
//! Wave type and frequency live in the shared circuit store, so changing them
//! here also changes what the multimeter reads. Time base, vertical scale and
//! trigger level are screen settings local to the scope.
//!
//! While running, a refresh task regenerates the 200-sample trace every
//! period (100 ms by default).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::backend::{Dispatch, InstrumentBackend};
use super::refresh::RefreshTask;
use crate::hardware::Command;
use crate::simulation::{CircuitPatch, SimulationEngine, WaveSample, WaveType};

/// Default refresh period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

/// Time base range in ms/div.
pub const TIME_BASE_RANGE: (f64, f64) = (0.1, 10.0);
/// Vertical scale range in V/div.
pub const VERTICAL_SCALE_RANGE: (f64, f64) = (0.1, 5.0);
/// Trigger level range in V.
pub const TRIGGER_RANGE: (f64, f64) = (-5.0, 5.0);

/// Screen settings that never leave the scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeSettings {
    /// Horizontal scale, ms/div.
    pub time_base: f64,
    /// Vertical scale, V/div.
    pub vertical_scale: f64,
    /// Trigger line, V.
    pub trigger_level: f64,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            time_base: 1.0,
            vertical_scale: 1.0,
            trigger_level: 0.0,
        }
    }
}

/// What the scope screen shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeDisplay {
    /// Whether the trace is refreshing.
    pub running: bool,
    /// Local screen settings.
    pub settings: ScopeSettings,
    /// Latest trace. Empty while stopped.
    pub trace: Vec<WaveSample>,
}

/// Oscilloscope state machine.
pub struct Oscilloscope {
    engine: SimulationEngine,
    backend: Arc<dyn InstrumentBackend>,
    period: Duration,
    display: Arc<watch::Sender<ScopeDisplay>>,
    refresh: Option<RefreshTask>,
}

impl Oscilloscope {
    /// Stopped scope with default screen settings.
    pub fn new(engine: SimulationEngine, backend: Arc<dyn InstrumentBackend>) -> Self {
        let (display, _) = watch::channel(ScopeDisplay::default());
        Self {
            engine,
            backend,
            period: DEFAULT_PERIOD,
            display: Arc::new(display),
            refresh: None,
        }
    }

    /// Use `period` for trace refresh. Takes effect on the next start.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Current screen state.
    pub fn display(&self) -> ScopeDisplay {
        self.display.borrow().clone()
    }

    /// Receiver woken on every screen update.
    pub fn subscribe(&self) -> watch::Receiver<ScopeDisplay> {
        self.display.subscribe()
    }

    /// True while the trace refreshes.
    pub fn is_running(&self) -> bool {
        self.display.borrow().running
    }

    /// Screen settings.
    pub fn settings(&self) -> ScopeSettings {
        self.display.borrow().settings
    }

    /// Latest trace, or `None` while stopped.
    pub fn trace(&self) -> Option<Vec<WaveSample>> {
        let display = self.display.borrow();
        display.running.then(|| display.trace.clone())
    }

    /// Status line: settings and source frequency, or `----` while stopped.
    pub fn readout(&self) -> String {
        let display = self.display.borrow();
        if !display.running {
            return "----".to_string();
        }
        let params = self.engine.store().snapshot();
        format!(
            "{} ms/div  {} V/div  {} Hz  {}",
            display.settings.time_base, display.settings.vertical_scale, params.frequency, params.wave_type
        )
    }

    /// Start acquisition and send the start frame. Refresh starts only once.
    pub async fn start(&mut self) -> Dispatch {
        if self.refresh.is_none() {
            self.display.send_modify(|d| d.running = true);
            self.redraw();
            let engine = self.engine.clone();
            let display = Arc::clone(&self.display);
            self.refresh = Some(RefreshTask::spawn("oscilloscope", self.period, move || {
                update_trace(&engine, &display)
            }));
            tracing::info!("Oscilloscope running");
        }
        self.backend.dispatch(Command::ScopeStart).await
    }

    /// Stop acquisition and send the stop frame.
    pub async fn stop(&mut self) -> Dispatch {
        self.display.send_modify(|d| {
            d.running = false;
            d.trace.clear();
        });
        if let Some(task) = self.refresh.take() {
            task.stop().await;
            tracing::info!("Oscilloscope stopped");
        }
        self.backend.dispatch(Command::ScopeStop).await
    }

    /// Change the source wave type and send the waveform frame.
    ///
    /// Sawtooth exists only in simulation and is never sent.
    pub async fn set_wave_type(&mut self, wave_type: WaveType) -> Dispatch {
        let params = self
            .engine
            .store()
            .update(CircuitPatch::new().wave_type(wave_type));
        self.redraw();
        self.backend
            .dispatch_opt(Command::for_waveform(params.wave_type, params.frequency))
            .await
    }

    /// Change the source frequency, clamped to 10–2000 Hz, and send the
    /// waveform frame for the resulting tier.
    pub async fn set_frequency(&mut self, hz: f64) -> Dispatch {
        let params = self.engine.store().update(CircuitPatch::new().frequency(hz));
        self.redraw();
        self.backend
            .dispatch_opt(Command::for_waveform(params.wave_type, params.frequency))
            .await
    }

    /// Set the time base, clamped to 0.1–10 ms/div. Returns the applied value.
    pub fn set_time_base(&mut self, ms_per_div: f64) -> f64 {
        self.adjust(ms_per_div, TIME_BASE_RANGE, |s| &mut s.time_base)
    }

    /// Set the vertical scale, clamped to 0.1–5 V/div. Returns the applied value.
    pub fn set_vertical_scale(&mut self, volts_per_div: f64) -> f64 {
        self.adjust(volts_per_div, VERTICAL_SCALE_RANGE, |s| &mut s.vertical_scale)
    }

    /// Set the trigger level, clamped to ±5 V. Returns the applied value.
    pub fn set_trigger_level(&mut self, volts: f64) -> f64 {
        self.adjust(volts, TRIGGER_RANGE, |s| &mut s.trigger_level)
    }

    fn adjust(
        &mut self,
        value: f64,
        (min, max): (f64, f64),
        field: impl Fn(&mut ScopeSettings) -> &mut f64,
    ) -> f64 {
        let mut applied = 0.0;
        self.display.send_modify(|d| {
            let slot = field(&mut d.settings);
            if value.is_finite() {
                *slot = value.clamp(min, max);
            }
            applied = *slot;
        });
        self.redraw();
        applied
    }

    /// Regenerate the trace now if running.
    fn redraw(&self) {
        update_trace(&self.engine, &self.display);
    }
}

impl std::fmt::Debug for Oscilloscope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let display = self.display.borrow();
        f.debug_struct("Oscilloscope")
            .field("running", &display.running)
            .field("settings", &display.settings)
            .field("backend", &self.backend.mode())
            .field("period", &self.period)
            .finish()
    }
}

fn update_trace(engine: &SimulationEngine, display: &watch::Sender<ScopeDisplay>) {
    let settings = display.borrow().settings;
    let trace = engine.generate_wave_data(settings.time_base, settings.vertical_scale);
    display.send_if_modified(|d| {
        if !d.running {
            return false;
        }
        d.trace = trace;
        true
    });
}
