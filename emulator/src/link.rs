//! Simulated radio link and stimulator.
//!
//! Commands are encoded to wire frames and decoded again by the simulated
//! device, so the emulator exercises the same codec a real link would. Battery
//! and charging queries are answered with notifications the session delivers
//! back to the controller.

use std::collections::VecDeque;

use pulse_core::command::Command;
use pulse_core::device::DeviceMirror;
use pulse_core::telemetry::CHARGING_FRAME_PREFIX;
use pulse_core::transport::Transport;

const DEFAULT_BATTERY_VOLTS: f64 = 3.82;

pub struct SimulatedLink {
    connected: bool,
    ready: bool,
    device: DeviceMirror,
    battery_volts: f64,
    charging: bool,
    wire: Vec<Command>,
    inbox: VecDeque<Vec<u8>>,
    rejected_frames: usize,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            connected: false,
            ready: false,
            device: DeviceMirror::new(),
            battery_volts: DEFAULT_BATTERY_VOLTS,
            charging: false,
            wire: Vec::new(),
            inbox: VecDeque::new(),
            rejected_frames: 0,
        }
    }

    /// Brings the link up. The device keeps whatever state it had.
    pub fn connect(&mut self) {
        self.connected = true;
        self.ready = true;
    }

    /// Drops the link; unanswered notifications are lost with it.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.ready = false;
        self.inbox.clear();
    }

    pub fn is_up(&self) -> bool {
        self.connected
    }

    pub fn device(&self) -> &DeviceMirror {
        &self.device
    }

    pub fn set_battery_volts(&mut self, volts: f64) {
        self.battery_volts = volts;
    }

    pub fn set_charging(&mut self, charging: bool) {
        self.charging = charging;
    }

    pub fn rejected_frames(&self) -> usize {
        self.rejected_frames
    }

    /// Commands written since the last drain, in send order.
    pub fn drain_wire(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.wire)
    }

    pub fn next_notification(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop_front()
    }

    fn answer(&mut self, command: Command) {
        match command {
            Command::QueryBattery => {
                let line = format!("Batt: {:.2}V\r\n", self.battery_volts);
                self.inbox.push_back(line.into_bytes());
            }
            Command::QueryCharging => {
                let flag = if self.charging { b'1' } else { b'0' };
                let mut frame = CHARGING_FRAME_PREFIX.to_vec();
                frame.push(flag);
                self.inbox.push_back(frame);
            }
            _ => {}
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn send(&mut self, command: Command) {
        if !self.connected {
            return;
        }
        self.wire.push(command);
        match self.device.apply_bytes(&command.frame()) {
            Ok(decoded) => self.answer(decoded),
            Err(_) => self.rejected_frames += 1,
        }
    }
}
