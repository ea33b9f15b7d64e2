//! Bench Instrument Command Protocol
//!
//! Protocol Overview:
//! - Format: fixed 4-byte binary frames `[opcode, param_hi, param_lo, 0xFE]`
//! - Baud: 115200, 8N1, no flow control
//! - Numeric parameters: scaled to an integer, sent as big-endian u16
//! - Direction: host → instrument only. Inbound bytes are passed through raw.
//!
//! | Action                   | Frame                         |
//! |--------------------------|-------------------------------|
//! | Multimeter power off     | `01 00 00 FE`                 |
//! | Resistance mode          | `02 00 01 FE`                 |
//! | Continuity mode          | `03 00 02 FE`                 |
//! | DC voltage mode          | `04 00 03 FE`                 |
//! | AC voltage mode          | `04 00 04 FE`                 |
//! | DC current mode          | `06 00 05 FE`                 |
//! | Oscilloscope stop        | `07 00 00 FE`                 |
//! | Oscilloscope start       | `08 00 01 FE`                 |
//! | Power-supply output (V)  | `09 hi lo FE`, `round(V*100)` |
//! | Power-supply off         | `09 00 00 FE`                 |
//! | Waveform select          | `0A family tier FE`           |
//! | Power-supply current (A) | `0B hi lo FE`, `round(I*1000)`|
//!
//! # Example
//!
//! ```
//! use lab_bench::hardware::protocol::Command;
//!
//! let frame = Command::PowerSupplyVoltage(10.0).encode();
//! assert_eq!(frame.as_bytes(), &[0x09, 0x03, 0xE8, 0xFE]);
//! ```

use std::fmt;

use crate::simulation::{MeasurementType, WaveType};

/// Sentinel byte closing every frame.
pub const FRAME_TERMINATOR: u8 = 0xFE;

/// Length of every frame on the wire.
pub const FRAME_LEN: usize = 4;

/// Opcodes, one per command family.
pub mod opcode {
    /// Multimeter power off.
    pub const POWER_OFF: u8 = 0x01;
    /// Resistance measurement mode.
    pub const RESISTANCE: u8 = 0x02;
    /// Continuity test mode.
    pub const CONTINUITY: u8 = 0x03;
    /// DC and AC voltage modes share this opcode.
    pub const VOLTAGE: u8 = 0x04;
    /// DC current mode.
    pub const DC_CURRENT: u8 = 0x06;
    /// Oscilloscope stop.
    pub const SCOPE_STOP: u8 = 0x07;
    /// Oscilloscope start.
    pub const SCOPE_START: u8 = 0x08;
    /// Power-supply output voltage (and off).
    pub const SUPPLY_VOLTAGE: u8 = 0x09;
    /// Waveform generator family and tier.
    pub const WAVEFORM: u8 = 0x0A;
    /// Power-supply current limit.
    pub const SUPPLY_CURRENT: u8 = 0x0B;
}

/// A complete command frame. Always 4 bytes, always terminated by `0xFE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Build a frame from an opcode and a 16-bit parameter.
    pub const fn new(opcode: u8, param: u16) -> Self {
        let [hi, lo] = param.to_be_bytes();
        Frame([opcode, hi, lo, FRAME_TERMINATOR])
    }

    /// Build a frame from an opcode and two independent parameter bytes.
    pub const fn from_parts(opcode: u8, param_high: u8, param_low: u8) -> Self {
        Frame([opcode, param_high, param_low, FRAME_TERMINATOR])
    }

    /// First byte, identifying the command family.
    pub const fn opcode(&self) -> u8 {
        self.0[0]
    }

    /// Parameter bytes combined as a big-endian u16.
    pub const fn param(&self) -> u16 {
        u16::from_be_bytes([self.0[1], self.0[2]])
    }

    /// Raw bytes as written to the channel.
    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Space-separated upper-case hex, e.g. `09 03 E8 FE`.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02X} {b:02X} {c:02X} {d:02X}")
    }
}

/// Rejected byte sequence when parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Wrong number of bytes.
    #[error("frame must be 4 bytes, got {0}")]
    Length(usize),
    /// Last byte is not the sentinel.
    #[error("frame terminator must be 0xFE, got 0x{0:02X}")]
    Terminator(u8),
}

impl TryFrom<&[u8]> for Frame {
    type Error = FrameError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| FrameError::Length(bytes.len()))?;
        if raw[3] != FRAME_TERMINATOR {
            return Err(FrameError::Terminator(raw[3]));
        }
        Ok(Frame(raw))
    }
}

/// Waveform families the hardware generator understands. It has no sawtooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareWaveform {
    /// Sine output.
    Sine,
    /// Triangle output.
    Triangle,
    /// Square output.
    Square,
}

impl HardwareWaveform {
    /// Family code byte.
    pub const fn code(self) -> u8 {
        match self {
            HardwareWaveform::Sine => 0x01,
            HardwareWaveform::Triangle => 0x02,
            HardwareWaveform::Square => 0x03,
        }
    }

    /// Hardware counterpart of a simulated wave type, if one exists.
    pub fn from_wave_type(wave: WaveType) -> Option<Self> {
        match wave {
            WaveType::Sine => Some(HardwareWaveform::Sine),
            WaveType::Triangle => Some(HardwareWaveform::Triangle),
            WaveType::Square => Some(HardwareWaveform::Square),
            WaveType::Sawtooth => None,
        }
    }
}

/// Coarse frequency selector for the hardware generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyTier {
    /// 1 Hz range.
    OneHertz,
    /// 100 Hz range.
    HundredHertz,
}

impl FrequencyTier {
    /// Tier code byte.
    pub const fn code(self) -> u8 {
        match self {
            FrequencyTier::OneHertz => 0x00,
            FrequencyTier::HundredHertz => 0x01,
        }
    }

    /// Frequencies from 100 Hz up use the 100 Hz tier.
    pub fn for_frequency(frequency_hz: f64) -> Self {
        if frequency_hz >= 100.0 {
            FrequencyTier::HundredHertz
        } else {
            FrequencyTier::OneHertz
        }
    }
}

/// Logical instrument actions. Every variant encodes to exactly one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Turn the multimeter off.
    PowerOff,
    /// Resistance measurement.
    ResistanceMode,
    /// Continuity test.
    ContinuityMode,
    /// DC voltage measurement.
    DcVoltageMode,
    /// AC voltage measurement.
    AcVoltageMode,
    /// DC current measurement.
    DcCurrentMode,
    /// Stop oscilloscope acquisition.
    ScopeStop,
    /// Start oscilloscope acquisition.
    ScopeStart,
    /// Power-supply output voltage in volts (10 mV resolution).
    PowerSupplyVoltage(f64),
    /// Power-supply output off.
    PowerSupplyOff,
    /// Power-supply current limit in amps (1 mA resolution).
    PowerSupplyCurrent(f64),
    /// Waveform generator family and frequency tier.
    Waveform {
        /// Family to generate.
        family: HardwareWaveform,
        /// Frequency tier.
        tier: FrequencyTier,
    },
}

impl Command {
    /// Encode into the wire frame.
    pub fn encode(&self) -> Frame {
        match *self {
            Command::PowerOff => Frame::new(opcode::POWER_OFF, 0x0000),
            Command::ResistanceMode => Frame::new(opcode::RESISTANCE, 0x0001),
            Command::ContinuityMode => Frame::new(opcode::CONTINUITY, 0x0002),
            Command::DcVoltageMode => Frame::new(opcode::VOLTAGE, 0x0003),
            Command::AcVoltageMode => Frame::new(opcode::VOLTAGE, 0x0004),
            Command::DcCurrentMode => Frame::new(opcode::DC_CURRENT, 0x0005),
            Command::ScopeStop => Frame::new(opcode::SCOPE_STOP, 0x0000),
            Command::ScopeStart => Frame::new(opcode::SCOPE_START, 0x0001),
            Command::PowerSupplyVoltage(volts) => {
                Frame::new(opcode::SUPPLY_VOLTAGE, scale_to_u16(volts, 100.0))
            }
            Command::PowerSupplyOff => Frame::new(opcode::SUPPLY_VOLTAGE, 0x0000),
            Command::PowerSupplyCurrent(amps) => {
                Frame::new(opcode::SUPPLY_CURRENT, scale_to_u16(amps, 1000.0))
            }
            Command::Waveform { family, tier } => {
                Frame::from_parts(opcode::WAVEFORM, family.code(), tier.code())
            }
        }
    }

    /// Mode-select command for a multimeter measurement.
    ///
    /// AC current has no hardware mode and returns `None`.
    pub fn for_measurement(kind: MeasurementType) -> Option<Self> {
        match kind {
            MeasurementType::DcVoltage => Some(Command::DcVoltageMode),
            MeasurementType::AcVoltage => Some(Command::AcVoltageMode),
            MeasurementType::DcCurrent => Some(Command::DcCurrentMode),
            MeasurementType::AcCurrent => None,
            MeasurementType::Resistance => Some(Command::ResistanceMode),
            MeasurementType::Continuity => Some(Command::ContinuityMode),
        }
    }

    /// Waveform-select command for a simulated wave, if the hardware has that family.
    pub fn for_waveform(wave: WaveType, frequency_hz: f64) -> Option<Self> {
        HardwareWaveform::from_wave_type(wave).map(|family| Command::Waveform {
            family,
            tier: FrequencyTier::for_frequency(frequency_hz),
        })
    }
}

impl From<Command> for Frame {
    fn from(command: Command) -> Self {
        command.encode()
    }
}

/// `round(value * scale)` saturated into `0..=u16::MAX`. NaN maps to 0.
fn scale_to_u16(value: f64, scale: f64) -> u16 {
    let scaled = (value * scale).round();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        scaled as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(command: Command) -> [u8; 4] {
        *command.encode().as_bytes()
    }

    #[test]
    fn mode_frames_match_wire_table() {
        assert_eq!(bytes(Command::PowerOff), [0x01, 0x00, 0x00, 0xFE]);
        assert_eq!(bytes(Command::ResistanceMode), [0x02, 0x00, 0x01, 0xFE]);
        assert_eq!(bytes(Command::ContinuityMode), [0x03, 0x00, 0x02, 0xFE]);
        assert_eq!(bytes(Command::DcVoltageMode), [0x04, 0x00, 0x03, 0xFE]);
        assert_eq!(bytes(Command::AcVoltageMode), [0x04, 0x00, 0x04, 0xFE]);
        assert_eq!(bytes(Command::DcCurrentMode), [0x06, 0x00, 0x05, 0xFE]);
        assert_eq!(bytes(Command::ScopeStop), [0x07, 0x00, 0x00, 0xFE]);
        assert_eq!(bytes(Command::ScopeStart), [0x08, 0x00, 0x01, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyOff), [0x09, 0x00, 0x00, 0xFE]);
    }

    #[test]
    fn supply_voltage_is_centivolts_big_endian() {
        assert_eq!(bytes(Command::PowerSupplyVoltage(10.0)), [0x09, 0x03, 0xE8, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyVoltage(1.0)), [0x09, 0x00, 0x64, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyVoltage(0.1)), [0x09, 0x00, 0x0A, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyVoltage(0.01)), [0x09, 0x00, 0x01, 0xFE]);
        // 3.3 * 100 = 329.99999999999994 before rounding
        assert_eq!(bytes(Command::PowerSupplyVoltage(3.3)), [0x09, 0x01, 0x4A, 0xFE]);
    }

    #[test]
    fn supply_current_is_milliamps_big_endian() {
        assert_eq!(bytes(Command::PowerSupplyCurrent(0.5)), [0x0B, 0x01, 0xF4, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyCurrent(2.0)), [0x0B, 0x07, 0xD0, 0xFE]);
        assert_eq!(bytes(Command::PowerSupplyCurrent(0.0004)), [0x0B, 0x00, 0x00, 0xFE]);
    }

    #[test]
    fn scaled_values_saturate() {
        assert_eq!(Command::PowerSupplyVoltage(-5.0).encode().param(), 0);
        assert_eq!(Command::PowerSupplyVoltage(1000.0).encode().param(), u16::MAX);
        assert_eq!(Command::PowerSupplyCurrent(f64::NAN).encode().param(), 0);
    }

    #[test]
    fn waveform_frames_carry_family_and_tier() {
        let sine_fast = Command::for_waveform(WaveType::Sine, 1000.0).unwrap();
        assert_eq!(bytes(sine_fast), [0x0A, 0x01, 0x01, 0xFE]);

        let square_slow = Command::for_waveform(WaveType::Square, 10.0).unwrap();
        assert_eq!(bytes(square_slow), [0x0A, 0x03, 0x00, 0xFE]);

        let triangle = Command::for_waveform(WaveType::Triangle, 100.0).unwrap();
        assert_eq!(bytes(triangle), [0x0A, 0x02, 0x01, 0xFE]);

        assert!(Command::for_waveform(WaveType::Sawtooth, 500.0).is_none());
    }

    #[test]
    fn every_frame_is_terminated() {
        let commands = [
            Command::PowerOff,
            Command::ResistanceMode,
            Command::ContinuityMode,
            Command::DcVoltageMode,
            Command::AcVoltageMode,
            Command::DcCurrentMode,
            Command::ScopeStop,
            Command::ScopeStart,
            Command::PowerSupplyVoltage(12.34),
            Command::PowerSupplyOff,
            Command::PowerSupplyCurrent(1.5),
            Command::Waveform {
                family: HardwareWaveform::Triangle,
                tier: FrequencyTier::OneHertz,
            },
        ];
        for command in commands {
            let frame = command.encode();
            assert_eq!(frame.as_bytes().len(), FRAME_LEN);
            assert_eq!(frame.as_bytes()[3], FRAME_TERMINATOR, "{command:?}");
        }
    }

    #[test]
    fn measurement_modes_map_to_commands() {
        assert_eq!(
            Command::for_measurement(MeasurementType::DcVoltage),
            Some(Command::DcVoltageMode)
        );
        assert_eq!(
            Command::for_measurement(MeasurementType::Continuity),
            Some(Command::ContinuityMode)
        );
        assert_eq!(Command::for_measurement(MeasurementType::AcCurrent), None);
    }

    #[test]
    fn frame_display_is_hex() {
        assert_eq!(Command::PowerSupplyVoltage(10.0).encode().to_string(), "09 03 E8 FE");
    }

    #[test]
    fn parse_rejects_malformed_frames() {
        assert_eq!(
            Frame::try_from(&[0x09, 0x00][..]),
            Err(FrameError::Length(2))
        );
        assert_eq!(
            Frame::try_from(&[0x09, 0x00, 0x00, 0x00][..]),
            Err(FrameError::Terminator(0x00))
        );
        let frame = Frame::try_from(&[0x08, 0x00, 0x01, 0xFE][..]).unwrap();
        assert_eq!(frame, Command::ScopeStart.encode());
        assert_eq!(frame.opcode(), opcode::SCOPE_START);
    }
}
