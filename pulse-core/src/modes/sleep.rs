//! Channel rotation across five equal phases with a fade over the final fifth.

use crate::command::{Command, Commands, Intensity};

use super::{Channel, DeviceState, ModeEngine, ModeTickResult, status_text};

const PHASE_COUNT: u32 = 5;

const PHASES: [Channel; PHASE_COUNT as usize] = [
    Channel::Bilateral,
    Channel::Left,
    Channel::Bilateral,
    Channel::Right,
    Channel::Bilateral,
];

const LAST_PHASE: u32 = PHASE_COUNT - 1;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Sleep;

/// Phase index and intensity last sent to the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SleepState {
    pub phase: u8,
    pub level: Intensity,
}

impl Sleep {
    /// Index into the rotation; sessions too short to split stay on phase 0.
    #[must_use]
    pub const fn phase_index(elapsed: u32, total: u32) -> u32 {
        let phase_len = total / PHASE_COUNT;
        if phase_len == 0 {
            return 0;
        }
        let index = elapsed / phase_len;
        if index > LAST_PHASE { LAST_PHASE } else { index }
    }

    /// Intensity after the fade, never below the device minimum.
    #[must_use]
    pub const fn faded_level(elapsed: u32, total: u32, base: Intensity) -> Intensity {
        let fade_start = total * 4 / 5;
        if elapsed < fade_start || total <= fade_start {
            return base;
        }

        let fade_elapsed = elapsed - fade_start;
        let fade_mid = (total - fade_start) / 2;
        if fade_elapsed < fade_mid {
            base.offset(-1)
        } else {
            base.offset(-2)
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn phase_state(elapsed: u32, total: u32, base: Intensity) -> SleepState {
        SleepState {
            phase: Self::phase_index(elapsed, total) as u8,
            level: Self::faded_level(elapsed, total, base),
        }
    }
}

impl ModeEngine for Sleep {
    type State = SleepState;

    fn start(&self, base: Intensity, total: u32) -> (SleepState, Commands) {
        (
            self.resume_state(0, total, base),
            self.reconnect(0, total, base),
        )
    }

    fn tick(
        &self,
        state: SleepState,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (SleepState, ModeTickResult) {
        let next = Self::phase_state(elapsed, total, base);
        let channel = PHASES[next.phase as usize];

        let mut commands = Commands::new();
        if next.phase != state.phase {
            let _ = commands.push(channel.activate());
        }
        if next.level != state.level {
            let _ = commands.push(Command::SetIntensity(next.level));
        }

        let fading = if next.level < base { " · Fading" } else { "" };
        let status = status_text(format_args!("{} channel{fading}", channel.label()));
        let device = self.device_state(elapsed, total, base);
        let result = ModeTickResult::describing(device, base, status).with_commands(commands);

        (next, result)
    }

    fn device_state(&self, elapsed: u32, total: u32, base: Intensity) -> DeviceState {
        let state = Self::phase_state(elapsed, total, base);
        DeviceState::Stimulating {
            channel: PHASES[state.phase as usize],
            intensity: state.level,
        }
    }

    fn resume_state(&self, elapsed: u32, total: u32, base: Intensity) -> SleepState {
        Self::phase_state(elapsed, total, base)
    }
}
