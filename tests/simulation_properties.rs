//! Property checks for the circuit simulation engine

use lab_bench::hardware::Command;
use lab_bench::simulation::{
    CircuitParameters, CircuitPatch, CircuitStore, MeasurementType, SimulationEngine, WaveType,
    CONTINUITY_CLOSED, CONTINUITY_OPEN, WAVE_SAMPLES,
};

fn engine_with(wave_type: WaveType, frequency: f64, amplitude: f64) -> SimulationEngine {
    let store = CircuitStore::default();
    store.update(
        CircuitPatch::new()
            .wave_type(wave_type)
            .frequency(frequency)
            .amplitude(amplitude),
    );
    SimulationEngine::new(store)
}

#[test]
fn test_every_generation_has_200_ordered_samples() {
    for wave in WaveType::ALL {
        for frequency in [10.0, 99.0, 100.0, 440.0, 1000.0, 2000.0] {
            for time_base in [0.1, 1.0, 10.0] {
                let trace = engine_with(wave, frequency, 5.0).generate_wave_data(time_base, 1.0);
                assert_eq!(trace.len(), WAVE_SAMPLES);
                assert!(
                    trace.windows(2).all(|w| w[0].x <= w[1].x),
                    "{wave} @ {frequency} Hz not ordered"
                );
            }
        }
    }
}

#[test]
fn test_samples_stay_within_amplitude_over_scale() {
    for wave in WaveType::ALL {
        for (amplitude, scale) in [(5.0, 1.0), (2.0, 0.1), (10.0, 5.0)] {
            let bound = amplitude / scale + 1e-9;
            let trace = engine_with(wave, 730.0, amplitude).generate_wave_data(0.7, scale);
            assert!(
                trace.iter().all(|s| s.y.abs() <= bound),
                "{wave}: sample exceeds {bound}"
            );
        }
    }
}

#[test]
fn test_square_wave_starts_high() {
    let trace = engine_with(WaveType::Square, 500.0, 5.0).generate_wave_data(1.0, 1.0);
    assert_eq!(trace[0].y, 5.0);
}

#[test]
fn test_resistance_is_exactly_one_kilohm() {
    for wave in WaveType::ALL {
        let engine = engine_with(wave, 123.0, 7.5);
        for _ in 0..10 {
            assert_eq!(engine.get_measurement(MeasurementType::Resistance), 1000.0);
        }
    }
}

#[test]
fn test_continuity_is_one_of_two_values() {
    let engine = SimulationEngine::new(CircuitStore::default());
    let mut closed = 0;
    for _ in 0..500 {
        let value = engine.get_measurement(MeasurementType::Continuity);
        assert!(value == CONTINUITY_CLOSED || value == CONTINUITY_OPEN, "{value}");
        if value == CONTINUITY_CLOSED {
            closed += 1;
        }
    }
    // ~50/50, far from either extreme
    assert!((100..=400).contains(&closed), "closed {closed} of 500");
}

#[test]
fn test_default_measurements() {
    let engine = SimulationEngine::new(CircuitStore::new(CircuitParameters::default()));
    let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
    assert!(close(engine.get_measurement(MeasurementType::DcVoltage), 4.75));
    assert!(close(engine.get_measurement(MeasurementType::AcVoltage), 3.535));
    assert!(close(engine.get_measurement(MeasurementType::DcCurrent), 0.5));
    assert!(close(engine.get_measurement(MeasurementType::AcCurrent), 0.3535));
}

#[test]
fn test_power_supply_voltage_scaling() {
    assert_eq!(
        Command::PowerSupplyVoltage(10.0).encode().as_bytes(),
        &[0x09, 0x03, 0xE8, 0xFE]
    );
    assert_eq!(
        Command::PowerSupplyVoltage(1.0).encode().as_bytes(),
        &[0x09, 0x00, 0x64, 0xFE]
    );
    assert_eq!(
        Command::PowerSupplyVoltage(0.1).encode().as_bytes(),
        &[0x09, 0x00, 0x0A, 0xFE]
    );
    assert_eq!(
        Command::PowerSupplyVoltage(0.01).encode().as_bytes(),
        &[0x09, 0x00, 0x01, 0xFE]
    );
}
