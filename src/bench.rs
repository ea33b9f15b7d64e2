//! Bench assembly.
//!
//! Builds one circuit store, one serial transport, the configured backend and
//! the three instrument controllers, all sharing the same store.

use std::sync::Arc;

use crate::config::{BackendMode, LabConfig};
use crate::hardware::{default_provider, PortProvider, SerialTransport};
use crate::instruments::{
    Dispatch, HardwareBackend, InstrumentBackend, Multimeter, Oscilloscope, PowerSupply,
    SimulatedBackend,
};
use crate::simulation::{CircuitParameters, CircuitStore, SimulationEngine};

/// A fully wired virtual bench.
pub struct Bench {
    /// Shared circuit parameters.
    pub store: CircuitStore,
    /// The bench's serial channel. Connected on demand.
    pub transport: SerialTransport,
    /// Backend all controllers dispatch through.
    pub backend: Arc<dyn InstrumentBackend>,
    /// Multimeter controller.
    pub multimeter: Multimeter,
    /// Oscilloscope controller.
    pub oscilloscope: Oscilloscope,
    /// Power-supply controller.
    pub power_supply: PowerSupply,
}

impl Bench {
    /// Bench using the host's serial ports.
    pub fn from_config(config: &LabConfig) -> Self {
        Self::with_provider(config, default_provider(config.serial.port.clone()))
    }

    /// Bench using `provider` for serial access.
    pub fn with_provider(config: &LabConfig, provider: Arc<dyn PortProvider>) -> Self {
        let mut initial = CircuitParameters::default();
        initial.apply(config.circuit.clone());
        let store = CircuitStore::new(initial);

        let transport =
            SerialTransport::with_config(provider, config.serial.transport_config());
        let backend: Arc<dyn InstrumentBackend> = match config.backend.mode {
            BackendMode::Simulated => Arc::new(SimulatedBackend),
            BackendMode::Hardware => Arc::new(HardwareBackend::new(transport.clone())),
        };

        let engine = SimulationEngine::new(store.clone());
        let multimeter = Multimeter::new(engine.clone(), Arc::clone(&backend))
            .with_period(config.refresh.multimeter());
        let oscilloscope = Oscilloscope::new(engine, Arc::clone(&backend))
            .with_period(config.refresh.oscilloscope());
        let power_supply = PowerSupply::new(Arc::clone(&backend));

        tracing::info!(
            backend = ?config.backend.mode,
            wave = %store.snapshot().wave_type,
            frequency = store.snapshot().frequency,
            "Bench assembled"
        );

        Self {
            store,
            transport,
            backend,
            multimeter,
            oscilloscope,
            power_supply,
        }
    }

    /// Put the bench in its power-on state: the multimeter measuring and the
    /// oscilloscope running. Returns the oscilloscope start dispatch.
    pub async fn activate(&mut self) -> Dispatch {
        self.multimeter.start();
        self.oscilloscope.start().await
    }

    /// Stop both refresh tasks and close the serial port.
    pub async fn shutdown(&mut self) {
        self.multimeter.stop().await;
        self.oscilloscope.stop().await;
        self.transport.disconnect().await;
    }
}

impl std::fmt::Debug for Bench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bench")
            .field("store", &self.store)
            .field("backend", &self.backend.mode())
            .finish_non_exhaustive()
    }
}
