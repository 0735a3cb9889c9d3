//! Command-level mirror of the stimulator's output state.
//!
//! The mirror tracks only what the command stream implies: the selected
//! channel, whether output is enabled, and the last intensity set. Host tools
//! use it as a simulated device and tests use it to compare command streams
//! by their effect rather than their exact bytes.

use crate::command::{Command, DecodeError, Intensity};
use crate::modes::{Channel, DeviceState};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceMirror {
    channel: Option<Channel>,
    intensity: Option<Intensity>,
    commands_applied: u32,
}

impl DeviceMirror {
    /// Mirror of a device whose state is unknown.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel: None,
            intensity: None,
            commands_applied: 0,
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Deactivate => self.channel = None,
            Command::ActivateLeft => self.channel = Some(Channel::Left),
            Command::ActivateRight => self.channel = Some(Channel::Right),
            Command::ActivateBilateral | Command::ActivateRamp => {
                self.channel = Some(Channel::Bilateral);
            }
            Command::SetIntensity(level) => self.intensity = Some(level),
            Command::QueryBattery | Command::QueryCharging => return,
        }
        self.commands_applied = self.commands_applied.saturating_add(1);
    }

    pub fn apply_all<'a>(&mut self, commands: impl IntoIterator<Item = &'a Command>) {
        for command in commands {
            self.apply(*command);
        }
    }

    /// Decodes and applies one wire frame.
    pub fn apply_bytes(&mut self, frame: &[u8]) -> Result<Command, DecodeError> {
        let command = Command::decode(frame)?;
        self.apply(command);
        Ok(command)
    }

    /// Output state implied by the commands seen so far.
    ///
    /// An active channel with no known intensity reports idle, since the
    /// device would not be stimulating at a level the controller chose.
    #[must_use]
    pub const fn state(&self) -> DeviceState {
        match (self.channel, self.intensity) {
            (Some(channel), Some(intensity)) => DeviceState::Stimulating { channel, intensity },
            _ => DeviceState::Idle,
        }
    }

    #[must_use]
    pub const fn intensity(&self) -> Option<Intensity> {
        self.intensity
    }

    /// Number of output-affecting commands applied.
    #[must_use]
    pub const fn commands_applied(&self) -> u32 {
        self.commands_applied
    }
}
