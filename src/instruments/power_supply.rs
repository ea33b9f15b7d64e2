//! Power-supply controller.
//!
//! The supply has no simulated counterpart: it keeps its own setpoints and
//! forwards them to the backend. Setpoints are clamped to what a frame can
//! carry (10 mV and 1 mA resolution, 16-bit range).

use std::sync::Arc;

use super::backend::{Dispatch, InstrumentBackend};
use crate::hardware::Command;

/// Largest voltage a frame can carry.
pub const MAX_VOLTAGE: f64 = u16::MAX as f64 / 100.0;
/// Largest current limit a frame can carry.
pub const MAX_CURRENT: f64 = u16::MAX as f64 / 1000.0;

/// Power-supply setpoints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerSupplyState {
    /// Output enabled.
    pub output_on: bool,
    /// Output voltage in volts.
    pub voltage: f64,
    /// Current limit in amps.
    pub current_limit: f64,
}

/// Power-supply state machine.
pub struct PowerSupply {
    backend: Arc<dyn InstrumentBackend>,
    state: PowerSupplyState,
}

impl PowerSupply {
    /// Supply with output off and zero setpoints.
    pub fn new(backend: Arc<dyn InstrumentBackend>) -> Self {
        Self {
            backend,
            state: PowerSupplyState::default(),
        }
    }

    /// Current setpoints.
    pub fn state(&self) -> PowerSupplyState {
        self.state
    }

    /// Set the output voltage and enable the output.
    ///
    /// Negative or non-finite values become 0 V. A 0 V setpoint is the same
    /// frame as "off", so it also disables the output.
    pub async fn set_voltage(&mut self, volts: f64) -> Dispatch {
        let volts = sanitize(volts, MAX_VOLTAGE);
        self.state.voltage = volts;
        self.state.output_on = volts > 0.0;
        tracing::info!(volts, "Power supply voltage set");
        self.backend.dispatch(Command::PowerSupplyVoltage(volts)).await
    }

    /// Set the current limit.
    pub async fn set_current(&mut self, amps: f64) -> Dispatch {
        let amps = sanitize(amps, MAX_CURRENT);
        self.state.current_limit = amps;
        tracing::info!(amps, "Power supply current limit set");
        self.backend.dispatch(Command::PowerSupplyCurrent(amps)).await
    }

    /// Disable the output. The voltage setpoint is kept for display.
    pub async fn off(&mut self) -> Dispatch {
        self.state.output_on = false;
        tracing::info!("Power supply output off");
        self.backend.dispatch(Command::PowerSupplyOff).await
    }
}

impl std::fmt::Debug for PowerSupply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerSupply")
            .field("state", &self.state)
            .field("backend", &self.backend.mode())
            .finish()
    }
}

fn sanitize(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MockPortProvider, SerialTransport};
    use crate::instruments::backend::{HardwareBackend, SimulatedBackend};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn setpoints_are_tracked() {
        let mut supply = PowerSupply::new(Arc::new(SimulatedBackend));
        supply.set_voltage(5.0).await;
        supply.set_current(0.25).await;
        assert_eq!(
            supply.state(),
            PowerSupplyState {
                output_on: true,
                voltage: 5.0,
                current_limit: 0.25,
            }
        );

        supply.off().await;
        assert!(!supply.state().output_on);
        assert_eq!(supply.state().voltage, 5.0);
    }

    #[tokio::test]
    async fn out_of_range_setpoints_are_clamped() {
        let mut supply = PowerSupply::new(Arc::new(SimulatedBackend));
        supply.set_voltage(-3.0).await;
        assert_eq!(supply.state().voltage, 0.0);
        assert!(!supply.state().output_on);
        supply.set_voltage(1000.0).await;
        assert_eq!(supply.state().voltage, MAX_VOLTAGE);
        supply.set_current(f64::INFINITY).await;
        assert_eq!(supply.state().current_limit, 0.0);
    }

    #[tokio::test]
    async fn frames_reach_the_device() {
        let provider = Arc::new(MockPortProvider::new());
        let transport = SerialTransport::new(provider.clone());
        transport.connect().await.unwrap();
        let mut device = provider.next_device().await.unwrap();

        let mut supply = PowerSupply::new(Arc::new(HardwareBackend::new(transport.clone())));
        supply.set_voltage(10.0).await;
        supply.set_current(1.5).await;
        supply.off().await;

        let mut wire = [0u8; 12];
        device.read_exact(&mut wire).await.unwrap();
        assert_eq!(
            wire,
            [
                0x09, 0x03, 0xE8, 0xFE, // 10.00 V
                0x0B, 0x05, 0xDC, 0xFE, // 1.500 A
                0x09, 0x00, 0x00, 0xFE, // off
            ]
        );
        transport.disconnect().await;
    }
}
