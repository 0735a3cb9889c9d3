//! Breathing-gated stimulation: off while inhaling, on from the hold or
//! exhale boundary until the next inhale.

use crate::command::{Commands, Intensity};

use super::waveform::{cycle_position, progress};
use super::{BreathingPhase, Channel, DeviceState, ModeEngine, ModeTickResult, status_text};

/// Sub-phase lengths of one breathing cycle, in seconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalmSchedule {
    pub inhale_secs: u32,
    /// Stimulation starts here so the device ramp completes before exhale.
    pub hold_secs: Option<u32>,
    pub exhale_secs: u32,
}

impl CalmSchedule {
    /// 15 s cycle: 5 s inhale, 3 s hold, 7 s exhale.
    pub const THREE_PHASE: Self = Self {
        inhale_secs: 5,
        hold_secs: Some(3),
        exhale_secs: 7,
    };

    /// 10 s cycle: 4 s inhale, 6 s exhale.
    pub const TWO_PHASE: Self = Self {
        inhale_secs: 4,
        hold_secs: None,
        exhale_secs: 6,
    };

    #[must_use]
    pub const fn cycle_secs(&self) -> u32 {
        let hold = match self.hold_secs {
            Some(hold) => hold,
            None => 0,
        };
        self.inhale_secs + hold + self.exhale_secs
    }

    /// Breathing phase and linear progress at `elapsed`.
    #[must_use]
    pub fn phase_at(&self, elapsed: u32) -> BreathingPhase {
        let position = cycle_position(elapsed, self.cycle_secs());
        if position < self.inhale_secs {
            return BreathingPhase::Inhale(progress(position, self.inhale_secs));
        }

        let position = position - self.inhale_secs;
        match self.hold_secs {
            Some(hold) if position < hold => BreathingPhase::Hold(progress(position, hold)),
            Some(hold) => BreathingPhase::Exhale(progress(position - hold, self.exhale_secs)),
            None => BreathingPhase::Exhale(progress(position, self.exhale_secs)),
        }
    }

    #[must_use]
    pub const fn is_stimulating(&self, elapsed: u32) -> bool {
        cycle_position(elapsed, self.cycle_secs()) >= self.inhale_secs
    }
}

impl Default for CalmSchedule {
    fn default() -> Self {
        Self::THREE_PHASE
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Calm {
    schedule: CalmSchedule,
}

/// Whether stimulation was last switched on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalmState {
    pub stimulating: bool,
}

impl Calm {
    #[must_use]
    pub const fn new(schedule: CalmSchedule) -> Self {
        Self { schedule }
    }

    #[must_use]
    pub const fn schedule(&self) -> CalmSchedule {
        self.schedule
    }
}

impl Default for Calm {
    fn default() -> Self {
        Self::new(CalmSchedule::default())
    }
}

impl ModeEngine for Calm {
    type State = CalmState;

    /// Sessions open on an inhale, so nothing is sent yet.
    fn start(&self, _base: Intensity, _total: u32) -> (CalmState, Commands) {
        (CalmState { stimulating: false }, Commands::new())
    }

    fn tick(
        &self,
        state: CalmState,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (CalmState, ModeTickResult) {
        let stimulating = self.schedule.is_stimulating(elapsed);
        let device = self.device_state(elapsed, total, base);

        let commands = if stimulating == state.stimulating {
            Commands::new()
        } else {
            device.restore_commands()
        };

        let phase = self.schedule.phase_at(elapsed);
        let status = match phase {
            BreathingPhase::Inhale(_) => status_text(format_args!("Inhale · Paused")),
            BreathingPhase::Hold(_) => status_text(format_args!("Hold · Ramping")),
            BreathingPhase::Exhale(_) => status_text(format_args!("Exhale · Stimulating")),
        };

        let mut result = ModeTickResult::describing(device, base, status).with_commands(commands);
        result.breathing_phase = Some(phase);

        (CalmState { stimulating }, result)
    }

    fn device_state(&self, elapsed: u32, _total: u32, base: Intensity) -> DeviceState {
        if self.schedule.is_stimulating(elapsed) {
            DeviceState::Stimulating {
                channel: Channel::Bilateral,
                intensity: base,
            }
        } else {
            DeviceState::Idle
        }
    }

    fn resume_state(&self, elapsed: u32, _total: u32, _base: Intensity) -> CalmState {
        CalmState {
            stimulating: self.schedule.is_stimulating(elapsed),
        }
    }
}
