//! Duty-cycled left-channel stimulation with an optional midpoint bump.

use crate::command::{Command, Commands, Intensity};

use super::waveform::cycle_position;
use super::{Channel, DeviceState, ModeEngine, ModeTickResult, status_text};

/// On/off timing and the one-time intensity bump applied at the midpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FocusSchedule {
    pub cycle_secs: u32,
    pub on_secs: u32,
    pub midpoint_bump: Option<u8>,
}

impl FocusSchedule {
    /// 30 s on, 30 s off, +1 once half the session has elapsed.
    pub const WITH_MIDPOINT_BUMP: Self = Self {
        cycle_secs: 60,
        on_secs: 30,
        midpoint_bump: Some(1),
    };

    /// Same duty cycle at constant intensity.
    pub const CONSTANT: Self = Self {
        cycle_secs: 60,
        on_secs: 30,
        midpoint_bump: None,
    };
}

impl Default for FocusSchedule {
    fn default() -> Self {
        Self::WITH_MIDPOINT_BUMP
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Focus {
    schedule: FocusSchedule,
}

/// Whether the output was last switched on, and at which level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FocusState {
    pub on: bool,
    pub level: Intensity,
}

impl Focus {
    #[must_use]
    pub const fn new(schedule: FocusSchedule) -> Self {
        Self { schedule }
    }

    #[must_use]
    pub const fn schedule(&self) -> FocusSchedule {
        self.schedule
    }

    #[must_use]
    pub const fn is_on(&self, elapsed: u32) -> bool {
        cycle_position(elapsed, self.schedule.cycle_secs) < self.schedule.on_secs
    }

    /// Level in force at `elapsed`, including the bump once past the midpoint.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn level(&self, elapsed: u32, total: u32, base: Intensity) -> Intensity {
        match self.schedule.midpoint_bump {
            Some(bump) if elapsed >= total / 2 => base.offset(bump as i32),
            _ => base,
        }
    }

    const fn secs_left_in_phase(&self, elapsed: u32) -> u32 {
        let position = cycle_position(elapsed, self.schedule.cycle_secs);
        if position < self.schedule.on_secs {
            self.schedule.on_secs - position
        } else {
            self.schedule.cycle_secs - position
        }
    }
}

impl Default for Focus {
    fn default() -> Self {
        Self::new(FocusSchedule::default())
    }
}

impl ModeEngine for Focus {
    type State = FocusState;

    fn start(&self, base: Intensity, total: u32) -> (FocusState, Commands) {
        (
            self.resume_state(0, total, base),
            self.reconnect(0, total, base),
        )
    }

    fn tick(
        &self,
        state: FocusState,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (FocusState, ModeTickResult) {
        let on = self.is_on(elapsed);
        let level = self.level(elapsed, total, base);

        let mut commands = Commands::new();
        let next = if on {
            if !state.on {
                let _ = commands.push(Channel::Left.activate());
                let _ = commands.push(Command::SetIntensity(level));
            } else if level != state.level {
                let _ = commands.push(Command::SetIntensity(level));
            }
            FocusState { on, level }
        } else {
            if state.on {
                let _ = commands.push(Command::Deactivate);
            }
            FocusState {
                on,
                level: state.level,
            }
        };

        let secs_left = self.secs_left_in_phase(elapsed);
        let status = if on {
            status_text(format_args!("Left channel · On ({secs_left}s)"))
        } else {
            status_text(format_args!("Resting · Off ({secs_left}s)"))
        };

        let device = self.device_state(elapsed, total, base);
        let mut result = ModeTickResult::describing(device, base, status).with_commands(commands);
        if !on {
            result.effective_strength = Some(0);
        }

        (next, result)
    }

    fn device_state(&self, elapsed: u32, total: u32, base: Intensity) -> DeviceState {
        if self.is_on(elapsed) {
            DeviceState::Stimulating {
                channel: Channel::Left,
                intensity: self.level(elapsed, total, base),
            }
        } else {
            DeviceState::Idle
        }
    }

    fn resume_state(&self, elapsed: u32, total: u32, base: Intensity) -> FocusState {
        FocusState {
            on: self.is_on(elapsed),
            level: self.level(elapsed, total, base),
        }
    }
}
