//! Continuous bilateral stimulation at the base strength.

use crate::command::{Commands, Intensity};

use super::{Channel, DeviceState, ModeEngine, ModeTickResult, status_text};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StressRelief;

impl ModeEngine for StressRelief {
    type State = ();

    fn start(&self, base: Intensity, total: u32) -> ((), Commands) {
        ((), self.reconnect(0, total, base))
    }

    fn tick(&self, (): (), elapsed: u32, total: u32, base: Intensity) -> ((), ModeTickResult) {
        let device = self.device_state(elapsed, total, base);
        let result =
            ModeTickResult::describing(device, base, status_text(format_args!("Bilateral · Continuous")));
        ((), result)
    }

    fn device_state(&self, _elapsed: u32, _total: u32, base: Intensity) -> DeviceState {
        DeviceState::Stimulating {
            channel: Channel::Bilateral,
            intensity: base,
        }
    }

    fn resume_state(&self, _elapsed: u32, _total: u32, _base: Intensity) {}
}
