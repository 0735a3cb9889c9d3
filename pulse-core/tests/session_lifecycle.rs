use core::ops::Add;
use core::time::Duration;

use pulse_core::command::{Command, Intensity};
use pulse_core::device::DeviceMirror;
use pulse_core::modes::{ActiveChannel, Engine, ModeSettings, StimulationMode};
use pulse_core::session::{
    ControllerSettings, EndReason, JournalEvent, Lifecycle, SessionController, SessionError,
    TimerKind,
};
use pulse_core::transport::{LinkEvent, Transport};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
struct MockInstant(u64);

impl MockInstant {
    fn secs(value: u64) -> Self {
        Self(value * 1_000)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.as_millis() as u64)
    }
}

/// Records every command and feeds it through a mirrored device.
#[derive(Default)]
struct RecordingTransport {
    connected: bool,
    ready: bool,
    sent: Vec<Command>,
    device: DeviceMirror,
}

impl RecordingTransport {
    fn ready() -> Self {
        Self {
            connected: true,
            ready: true,
            ..Self::default()
        }
    }

    fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.sent)
    }

    fn drop_link(&mut self) {
        self.connected = false;
        self.ready = false;
    }

    fn restore_link(&mut self) {
        self.connected = true;
        self.ready = true;
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn send(&mut self, command: Command) {
        assert!(self.connected, "sent {command} while disconnected");
        self.device
            .apply_bytes(&command.frame())
            .expect("every command encodes to a decodable frame");
        self.sent.push(command);
    }
}

type Controller = SessionController<RecordingTransport, MockInstant>;

fn level(value: i32) -> Command {
    Command::SetIntensity(Intensity::clamped(value))
}

fn controller(mode: StimulationMode) -> Controller {
    let mut controller = Controller::new(RecordingTransport::ready(), ControllerSettings::default());
    controller.select_mode(mode).unwrap();
    controller
}

/// Polls once per second over `seconds`, the way a foreground host would.
fn tick_through(controller: &mut Controller, seconds: std::ops::RangeInclusive<u64>) {
    for second in seconds {
        controller.poll(MockInstant::secs(second));
    }
}

fn journal_events(controller: &Controller) -> Vec<JournalEvent> {
    controller
        .journal()
        .oldest_first()
        .map(|record| record.event)
        .collect()
}

#[test]
fn start_requires_a_ready_link() {
    let mut controller = Controller::new(RecordingTransport::default(), ControllerSettings::default());

    assert_eq!(
        controller.start(MockInstant::secs(0)),
        Err(SessionError::TransportNotReady)
    );
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert!(controller.transport().sent.is_empty());
    assert!(!controller.scheduler().is_armed(TimerKind::Countdown));
}

#[test]
fn custom_session_holds_bilateral_at_base_until_expiry() {
    let mut controller = controller(StimulationMode::Custom);
    for _ in 0..9 {
        controller.decrease_timer().unwrap();
    }
    assert_eq!(controller.config().timer_minutes, 1);

    controller.start(MockInstant::secs(0)).unwrap();
    assert_eq!(controller.status().text.as_str(), "Bilateral · Continuous");
    assert_eq!(controller.status().active_channel, ActiveChannel::Bilateral);

    tick_through(&mut controller, 1..=59);
    assert_eq!(controller.status().elapsed_secs, 59);
    assert_eq!(controller.lifecycle(), Lifecycle::Running);

    controller.poll(MockInstant::secs(60));
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert_eq!(
        controller.transport_mut().take(),
        [
            Command::ActivateBilateral,
            level(5),
            level(5),
            level(5),
            level(5),
            level(5),
            level(5),
            Command::Deactivate,
            Command::QueryBattery,
            Command::QueryCharging,
        ]
    );
    assert_eq!(
        controller.journal().latest().map(|record| record.event),
        Some(JournalEvent::SessionEnded {
            reason: EndReason::Expired,
            elapsed_secs: 59,
        })
    );
    assert!(!controller.scheduler().is_armed(TimerKind::Keepalive));
}

#[test]
fn pause_freezes_the_clock_and_resume_replays_it() {
    let mut controller = controller(StimulationMode::Sleep);
    controller.start(MockInstant::secs(0)).unwrap();
    tick_through(&mut controller, 1..=130);
    controller.transport_mut().take();

    controller.pause(MockInstant::secs(130)).unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Paused);
    assert_eq!(controller.transport_mut().take(), [Command::Deactivate]);
    assert_eq!(controller.status().active_channel, ActiveChannel::Off);
    assert!(!controller.status().stimulation_active);

    assert_eq!(controller.poll(MockInstant::secs(200)), 0);
    assert_eq!(controller.status().elapsed_secs, 130);

    controller.resume(MockInstant::secs(200)).unwrap();
    assert_eq!(
        controller.transport_mut().take(),
        [Command::ActivateLeft, level(5)]
    );
    assert_eq!(controller.status().active_channel, ActiveChannel::Left);

    controller.poll(MockInstant::secs(201));
    assert_eq!(controller.status().elapsed_secs, 131);
    assert!(controller.transport().sent.is_empty());
}

#[test]
fn lifecycle_operations_reject_the_wrong_state() {
    let mut controller = controller(StimulationMode::StressRelief);
    let now = MockInstant::secs(0);

    assert_eq!(controller.pause(now), Err(SessionError::NoActiveSession));
    assert_eq!(controller.resume(now), Err(SessionError::NoActiveSession));
    assert_eq!(controller.stop(now), Err(SessionError::NoActiveSession));

    controller.start(now).unwrap();
    assert_eq!(controller.start(now), Err(SessionError::SessionActive));
    assert_eq!(controller.resume(now), Err(SessionError::NotPaused));

    controller.pause(now).unwrap();
    assert_eq!(controller.pause(now), Err(SessionError::NotRunning));

    controller.transport_mut().drop_link();
    assert_eq!(controller.resume(now), Err(SessionError::TransportNotReady));
    assert_eq!(controller.lifecycle(), Lifecycle::Paused);
}

#[test]
fn configuration_is_frozen_while_a_session_exists() {
    let mut controller = controller(StimulationMode::Focus);
    controller.start(MockInstant::secs(0)).unwrap();

    assert_eq!(
        controller.select_mode(StimulationMode::Calm),
        Err(SessionError::SessionActive)
    );
    assert_eq!(controller.increase_timer(), Err(SessionError::SessionActive));

    controller.pause(MockInstant::secs(1)).unwrap();
    assert_eq!(controller.decrease_timer(), Err(SessionError::SessionActive));

    controller.stop(MockInstant::secs(2)).unwrap();
    assert_eq!(controller.select_mode(StimulationMode::Calm), Ok(()));
    assert_eq!(controller.config().timer_minutes, 5);
}

#[test]
fn stale_timers_after_stop_do_nothing() {
    let mut controller = controller(StimulationMode::StressRelief);
    controller.start(MockInstant::secs(0)).unwrap();
    let countdown = controller.scheduler().handle(TimerKind::Countdown).unwrap();
    let keepalive = controller.scheduler().handle(TimerKind::Keepalive).unwrap();

    controller.stop(MockInstant::secs(0)).unwrap();
    controller.transport_mut().take();

    controller.on_timer(countdown, MockInstant::secs(1));
    controller.on_timer(keepalive, MockInstant::secs(10));
    assert_eq!(controller.poll(MockInstant::secs(120)), 0);

    assert!(controller.transport().sent.is_empty());
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert_eq!(controller.status().elapsed_secs, 0);
}

#[test]
fn stale_timers_after_pause_do_not_tick() {
    let mut controller = controller(StimulationMode::PainRelief);
    controller.start(MockInstant::secs(0)).unwrap();
    let countdown = controller.scheduler().handle(TimerKind::Countdown).unwrap();

    controller.pause(MockInstant::secs(0)).unwrap();
    controller.resume(MockInstant::secs(0)).unwrap();
    controller.on_timer(countdown, MockInstant::secs(1));

    assert_eq!(controller.status().elapsed_secs, 0);
}

#[test]
fn link_loss_drops_commands_and_ready_replays_the_clock() {
    let mut controller = controller(StimulationMode::PainRelief);
    let engine = Engine::for_mode(StimulationMode::PainRelief, &ModeSettings::default()).unwrap();
    let base = Intensity::clamped(5);
    let total = controller.config().total_secs();

    controller.start(MockInstant::secs(0)).unwrap();
    tick_through(&mut controller, 1..=5);

    controller.transport_mut().drop_link();
    controller.handle_link_event(LinkEvent::Disconnected, MockInstant::secs(5));
    assert!(!controller.scheduler().is_armed(TimerKind::Keepalive));
    controller.transport_mut().take();

    tick_through(&mut controller, 6..=20);
    assert_eq!(controller.lifecycle(), Lifecycle::Running);
    assert_eq!(controller.status().elapsed_secs, 20);
    assert!(
        journal_events(&controller)
            .iter()
            .any(|event| matches!(event, JournalEvent::CommandsDropped { .. }))
    );

    controller.transport_mut().restore_link();
    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(20));

    let mut expected: Vec<Command> = engine.reconnect(20, total, base).to_vec();
    expected.extend([Command::QueryBattery, Command::QueryCharging]);
    assert_eq!(controller.transport_mut().take(), expected);
    assert_eq!(
        controller.transport().device.state(),
        engine.device_state(20, total, base)
    );
    assert!(controller.scheduler().is_armed(TimerKind::Keepalive));
    assert_eq!(
        controller.scheduler().deadline(TimerKind::StatusPoll),
        Some(MockInstant::secs(50))
    );

    for second in 21..=90 {
        controller.poll(MockInstant::secs(second));
        assert_eq!(
            controller.transport().device.state(),
            engine.device_state(controller.status().elapsed_secs, total, base),
            "device diverged at {second}"
        );
    }
}

#[test]
fn repeated_ready_events_replay_the_same_commands() {
    let mut controller = controller(StimulationMode::Sleep);
    controller.start(MockInstant::secs(0)).unwrap();
    controller.poll(MockInstant::secs(250));
    controller.transport_mut().take();

    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(250));
    let first = controller.transport_mut().take();
    let device = controller.transport().device.state();
    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(250));

    assert_eq!(controller.transport_mut().take(), first);
    assert_eq!(controller.transport().device.state(), device);
    assert_eq!(controller.replay_commands().as_slice(), &first[..2]);
}

#[test]
fn ready_while_idle_only_polls_status() {
    let mut controller = controller(StimulationMode::Custom);
    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(0));
    assert_eq!(
        controller.transport_mut().take(),
        [Command::QueryBattery, Command::QueryCharging]
    );

    controller.poll(MockInstant::secs(30));
    assert_eq!(
        controller.transport_mut().take(),
        [Command::QueryBattery, Command::QueryCharging]
    );
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
}

#[test]
fn keepalive_reasserts_the_effective_level() {
    let mut controller = controller(StimulationMode::PainRelief);
    controller.start(MockInstant::secs(0)).unwrap();
    tick_through(&mut controller, 1..=10);

    assert_eq!(controller.status().effective_strength, Some(6));
    assert_eq!(
        controller.transport().sent.last().copied(),
        Some(level(6))
    );
    assert_eq!(
        controller.journal().latest().map(|record| record.event),
        Some(JournalEvent::Keepalive(Intensity::clamped(6)))
    );
}

#[test]
fn keepalive_is_skipped_while_resting() {
    let mut controller = controller(StimulationMode::Focus);
    controller.start(MockInstant::secs(0)).unwrap();
    tick_through(&mut controller, 1..=40);

    assert_eq!(
        controller.transport_mut().take(),
        [
            Command::ActivateLeft,
            level(5),
            level(5),
            level(5),
            Command::Deactivate,
        ]
    );
    assert_eq!(controller.status().effective_strength, Some(0));
}

#[test]
fn manual_strength_is_sent_only_while_stimulating() {
    let mut controller = controller(StimulationMode::Custom);
    controller.start(MockInstant::secs(0)).unwrap();
    controller.transport_mut().take();

    assert_eq!(controller.set_strength(12, MockInstant::secs(1)).get(), 9);
    assert_eq!(controller.transport_mut().take(), [level(9)]);
    assert_eq!(controller.config().strength.get(), 9);

    controller.pause(MockInstant::secs(2)).unwrap();
    controller.transport_mut().take();
    controller.set_strength(3, MockInstant::secs(3));
    assert!(controller.transport().sent.is_empty());

    controller.resume(MockInstant::secs(4)).unwrap();
    assert_eq!(
        controller.transport_mut().take(),
        [Command::ActivateBilateral, level(3)]
    );
}

#[test]
fn calm_starts_silent_and_activates_at_the_hold() {
    let mut controller = controller(StimulationMode::Calm);
    controller.start(MockInstant::secs(0)).unwrap();
    assert!(controller.transport().sent.is_empty());
    assert_eq!(controller.status().text.as_str(), "Inhale · Paused");

    tick_through(&mut controller, 1..=5);
    assert_eq!(
        controller.transport_mut().take(),
        [Command::ActivateBilateral, level(5)]
    );
    assert_eq!(controller.status().text.as_str(), "Hold · Ramping");
    assert!(controller.status().breathing_phase.is_some());
}

#[test]
fn notifications_update_telemetry_and_bad_frames_are_kept_out() {
    let mut controller = controller(StimulationMode::Custom);
    let now = MockInstant::secs(0);

    controller.handle_link_event(LinkEvent::Notification(b"Batt: 3.225"), now);
    controller.handle_link_event(LinkEvent::Notification(&[0x75, 0x01, b'1']), now);
    controller.handle_link_event(LinkEvent::Notification(b"Batt:nonsense"), now);

    assert_eq!(controller.telemetry().battery_percent(), Some(50));
    assert_eq!(controller.telemetry().charging(), Some(true));
    assert!(matches!(
        controller.journal().latest().map(|record| record.event),
        Some(JournalEvent::TelemetryDiscarded(_))
    ));

    controller.handle_link_event(LinkEvent::Disconnected, now);
    assert_eq!(controller.telemetry().battery_percent(), None);
    assert_eq!(controller.telemetry().charging(), None);
}

#[test]
fn late_poll_jumps_the_clock_and_replays_once() {
    let mut controller = controller(StimulationMode::Focus);
    let engine = Engine::for_mode(StimulationMode::Focus, &ModeSettings::default()).unwrap();
    let base = Intensity::clamped(5);
    let total = controller.config().total_secs();

    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(0));
    controller.start(MockInstant::secs(0)).unwrap();
    controller.transport_mut().take();

    assert_eq!(controller.poll(MockInstant::secs(300)), 2);

    let mut expected: Vec<Command> = engine.reconnect(300, total, base).to_vec();
    expected.extend([Command::QueryBattery, Command::QueryCharging]);
    assert_eq!(controller.transport_mut().take(), expected);
    assert_eq!(controller.status().elapsed_secs, 300);
    assert_eq!(
        controller.transport().device.state(),
        engine.device_state(300, total, base)
    );
    assert!(journal_events(&controller).contains(&JournalEvent::ClockSkipped {
        from_secs: 0,
        to_secs: 300,
    }));
    assert_eq!(
        controller.scheduler().deadline(TimerKind::Keepalive),
        Some(MockInstant::secs(310))
    );
    assert_eq!(
        controller.scheduler().deadline(TimerKind::StatusPoll),
        Some(MockInstant::secs(330))
    );

    // Ticking resumes from the jumped clock without repeating the replay.
    tick_through(&mut controller, 301..=340);
    assert_eq!(controller.status().elapsed_secs, 340);
    assert_eq!(
        controller.transport().device.state(),
        engine.device_state(340, total, base)
    );
}

#[test]
fn late_poll_past_the_end_expires_the_session() {
    let mut controller = controller(StimulationMode::Sleep);
    let total = u64::from(controller.config().total_secs());
    controller.start(MockInstant::secs(0)).unwrap();
    controller.transport_mut().take();

    controller.poll(MockInstant::secs(total + 45));

    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert_eq!(
        controller.transport_mut().take(),
        [
            Command::Deactivate,
            Command::QueryBattery,
            Command::QueryCharging,
        ]
    );
    assert_eq!(
        controller.journal().latest().map(|record| record.event),
        Some(JournalEvent::SessionEnded {
            reason: EndReason::Expired,
            elapsed_secs: controller.config().total_secs() - 1,
        })
    );
}

#[test]
fn late_poll_while_disconnected_sends_nothing() {
    let mut controller = controller(StimulationMode::Sleep);
    let engine = Engine::for_mode(StimulationMode::Sleep, &ModeSettings::default()).unwrap();
    let base = Intensity::clamped(5);
    let total = controller.config().total_secs();

    controller.start(MockInstant::secs(0)).unwrap();
    controller.transport_mut().drop_link();
    controller.handle_link_event(LinkEvent::Disconnected, MockInstant::secs(0));
    controller.transport_mut().take();

    controller.poll(MockInstant::secs(200));
    assert_eq!(controller.status().elapsed_secs, 200);
    assert!(!controller.scheduler().is_armed(TimerKind::Keepalive));
    assert_eq!(
        controller.engine_state(),
        Some(engine.resume_state(200, total, base))
    );

    controller.transport_mut().restore_link();
    controller.handle_link_event(LinkEvent::Ready, MockInstant::secs(200));
    assert_eq!(
        controller.transport().device.state(),
        engine.device_state(200, total, base)
    );
}

#[test]
fn live_strength_change_is_not_repeated_by_the_next_tick() {
    let mut controller = controller(StimulationMode::Sleep);
    controller.start(MockInstant::secs(0)).unwrap();
    tick_through(&mut controller, 1..=20);
    controller.transport_mut().take();

    controller.set_strength(6, MockInstant::secs(20));
    tick_through(&mut controller, 21..=21);

    assert_eq!(controller.transport_mut().take(), [level(6)]);
    assert_eq!(
        controller.transport().device.state().intensity(),
        Some(Intensity::clamped(6))
    );
}
