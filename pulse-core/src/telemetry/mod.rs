//! Battery and charging telemetry reported by the device.
//!
//! The device answers a battery query with a text line such as `Batt: 3.95`
//! or `Batt:3.95V`, and a charging query with a three-byte frame whose last
//! byte is ASCII `0` or `1`. Anything else is reported as a
//! [`TelemetryError`] and leaves the last known readings in place.

use core::fmt;

use winnow::ascii::space0;
use winnow::combinator::preceded;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

/// Leading bytes of a charging-status frame. The third byte carries the
/// charging flag in its low bit (`0x30` idle, `0x31` charging).
pub const CHARGING_FRAME_PREFIX: [u8; 2] = [0x75, 0x01];

const BATTERY_PREFIX: &str = "Batt:";

/// Voltages mapped to 0 % and 100 %.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryThresholds {
    pub empty_volts: f64,
    pub full_volts: f64,
}

impl BatteryThresholds {
    pub const DEFAULT: Self = Self {
        empty_volts: 2.5,
        full_volts: 3.95,
    };

    /// Linear charge estimate rounded to a whole percent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage(&self, volts: f64) -> u8 {
        if volts >= self.full_volts {
            return 100;
        }
        if volts <= self.empty_volts {
            return 0;
        }
        let span = self.full_volts - self.empty_volts;
        let percent = libm::round((volts - self.empty_volts) / span * 100.0);
        percent.clamp(0.0, 100.0) as u8
    }
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Parsed device notification.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryFrame {
    Battery { volts: f64 },
    Charging(bool),
}

/// Reasons a notification could not be interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    Empty,
    UnrecognizedFrame,
    MalformedVoltage,
    NonPositiveVoltage,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Empty => f.write_str("empty notification"),
            TelemetryError::UnrecognizedFrame => f.write_str("unrecognized notification"),
            TelemetryError::MalformedVoltage => f.write_str("battery line has no voltage"),
            TelemetryError::NonPositiveVoltage => f.write_str("battery voltage must be positive"),
        }
    }
}

/// Interprets one inbound notification.
pub fn parse_notification(bytes: &[u8]) -> Result<TelemetryFrame, TelemetryError> {
    if bytes.is_empty() {
        return Err(TelemetryError::Empty);
    }

    if let Some(rest) = bytes.strip_prefix(&CHARGING_FRAME_PREFIX) {
        return rest
            .first()
            .map(|flag| TelemetryFrame::Charging(flag & 1 == 1))
            .ok_or(TelemetryError::UnrecognizedFrame);
    }

    let text = core::str::from_utf8(bytes).map_err(|_| TelemetryError::UnrecognizedFrame)?;
    parse_battery_line(text.trim())
}

fn parse_battery_line(line: &str) -> Result<TelemetryFrame, TelemetryError> {
    if !line.starts_with(BATTERY_PREFIX) {
        return Err(TelemetryError::UnrecognizedFrame);
    }

    let mut input = line;
    let volts = battery_volts
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| TelemetryError::MalformedVoltage)?;

    if volts > 0.0 {
        Ok(TelemetryFrame::Battery { volts })
    } else {
        Err(TelemetryError::NonPositiveVoltage)
    }
}

/// `Batt:` followed by optional spaces and a decimal number; any unit suffix
/// is left unconsumed.
fn battery_volts(input: &mut &str) -> ModalResult<f64, ContextError> {
    preceded(
        (BATTERY_PREFIX, space0),
        take_while(1.., |c: char| c.is_ascii_digit() || c == '.').parse_to::<f64>(),
    )
    .parse_next(input)
}

/// Last known battery and charging readings.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DeviceTelemetry {
    volts: Option<f64>,
    percent: Option<u8>,
    charging: Option<bool>,
}

impl DeviceTelemetry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            volts: None,
            percent: None,
            charging: None,
        }
    }

    pub fn apply(&mut self, frame: TelemetryFrame, thresholds: &BatteryThresholds) {
        match frame {
            TelemetryFrame::Battery { volts } => {
                self.volts = Some(volts);
                self.percent = Some(thresholds.percentage(volts));
            }
            TelemetryFrame::Charging(charging) => self.charging = Some(charging),
        }
    }

    /// Forgets every reading, as after the link drops.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub const fn volts(&self) -> Option<f64> {
        self.volts
    }

    #[must_use]
    pub const fn battery_percent(&self) -> Option<u8> {
        self.percent
    }

    #[must_use]
    pub const fn charging(&self) -> Option<bool> {
        self.charging
    }
}

impl fmt::Display for DeviceTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.percent, self.volts) {
            (Some(percent), Some(volts)) => write!(f, "battery {percent}% ({volts:.2}V)")?,
            _ => f.write_str("battery unknown")?,
        }
        match self.charging {
            Some(true) => f.write_str(", charging"),
            Some(false) => f.write_str(", not charging"),
            None => Ok(()),
        }
    }
}
