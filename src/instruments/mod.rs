//! Instrument Controllers
//!
//! Per-instrument state machines sitting between the user and the bench.
//! Every action does up to three independent things:
//!
//! 1. updates the controller's own state
//! 2. updates or reads the simulated circuit
//! 3. dispatches a frame through the [`InstrumentBackend`] when connected
//!
//! A failed dispatch is reported in the returned [`Dispatch`] and never
//! rolls back steps 1 and 2.

pub mod backend;
pub mod multimeter;
pub mod oscilloscope;
pub mod power_supply;
pub mod refresh;

pub use backend::{Dispatch, HardwareBackend, InstrumentBackend, SimulatedBackend};
pub use multimeter::{format_reading, Multimeter, MultimeterDisplay};
pub use oscilloscope::{Oscilloscope, ScopeDisplay, ScopeSettings};
pub use power_supply::{PowerSupply, PowerSupplyState};
pub use refresh::RefreshTask;
