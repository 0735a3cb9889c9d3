//! Bilateral stimulation oscillating one step around the base strength.

use crate::command::{Command, Commands, Intensity};

use super::waveform::sine_offset;
use super::{Channel, DeviceState, ModeEngine, ModeTickResult, status_text};

/// Length of one full oscillation.
pub const DEFAULT_PERIOD_SECS: u32 = 30;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PainRelief {
    period_secs: u32,
}

/// Intensity last sent to the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PainReliefState {
    pub level: Intensity,
}

impl PainRelief {
    #[must_use]
    pub const fn new(period_secs: u32) -> Self {
        Self { period_secs }
    }

    #[must_use]
    pub fn offset(&self, elapsed: u32) -> i32 {
        sine_offset(elapsed, self.period_secs)
    }

    #[must_use]
    pub fn level(&self, elapsed: u32, base: Intensity) -> Intensity {
        base.offset(self.offset(elapsed))
    }
}

impl Default for PainRelief {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_SECS)
    }
}

impl ModeEngine for PainRelief {
    type State = PainReliefState;

    fn start(&self, base: Intensity, total: u32) -> (PainReliefState, Commands) {
        (
            self.resume_state(0, total, base),
            self.reconnect(0, total, base),
        )
    }

    fn tick(
        &self,
        state: PainReliefState,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (PainReliefState, ModeTickResult) {
        let offset = self.offset(elapsed);
        let level = base.offset(offset);

        let mut commands = Commands::new();
        if level != state.level {
            let _ = commands.push(Command::SetIntensity(level));
        }

        let trend = match offset {
            1.. => "Rising",
            0 => "Base",
            _ => "Falling",
        };
        let status = status_text(format_args!("Bilateral · {trend} wave"));
        let device = self.device_state(elapsed, total, base);

        (
            PainReliefState { level },
            ModeTickResult::describing(device, base, status).with_commands(commands),
        )
    }

    fn device_state(&self, elapsed: u32, _total: u32, base: Intensity) -> DeviceState {
        DeviceState::Stimulating {
            channel: Channel::Bilateral,
            intensity: self.level(elapsed, base),
        }
    }

    fn resume_state(&self, elapsed: u32, _total: u32, base: Intensity) -> PainReliefState {
        PainReliefState {
            level: self.level(elapsed, base),
        }
    }
}
