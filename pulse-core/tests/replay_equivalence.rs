use pulse_core::command::{Command, Intensity};
use pulse_core::device::DeviceMirror;
use pulse_core::modes::{
    CalmSchedule, Channel, DeviceState, Engine, FocusSchedule, ModeSettings, StimulationMode,
};

const TOTALS: [u32; 6] = [0, 3, 7, 61, 281, 600];
const BASES: [i32; 3] = [1, 5, 9];

fn engines() -> Vec<(&'static str, Engine)> {
    let defaults = ModeSettings::default();
    let alternate = ModeSettings {
        calm: CalmSchedule::TWO_PHASE,
        focus: FocusSchedule::CONSTANT,
        pain_relief_period: 20,
    };

    let mut engines = Vec::new();
    for mode in StimulationMode::ALL {
        if let Some(engine) = Engine::for_mode(mode, &defaults) {
            engines.push((mode.key(), engine));
        }
    }
    for mode in [
        StimulationMode::Calm,
        StimulationMode::Focus,
        StimulationMode::PainRelief,
    ] {
        if let Some(engine) = Engine::for_mode(mode, &alternate) {
            engines.push((mode.key(), engine));
        }
    }
    engines
}

fn cold_replay(engine: &Engine, elapsed: u32, total: u32, base: Intensity) -> DeviceState {
    let mut mirror = DeviceMirror::new();
    mirror.apply_all(&engine.reconnect(elapsed, total, base));
    mirror.state()
}

#[test]
fn sequential_ticks_and_cold_replay_agree_at_every_second() {
    for (name, engine) in engines() {
        for total in TOTALS {
            for base in BASES.map(Intensity::clamped) {
                let (mut state, start) = engine.start(base, total);
                let mut mirror = DeviceMirror::new();
                mirror.apply_all(&start);
                assert_eq!(
                    mirror.state(),
                    engine.device_state(0, total, base),
                    "{name} total={total} base={base} diverged at start"
                );

                for elapsed in 1..=total {
                    let (next, result) = engine.tick(state, elapsed, total, base);
                    state = next;
                    mirror.apply_all(&result.commands);

                    let expected = engine.device_state(elapsed, total, base);
                    assert_eq!(
                        mirror.state(),
                        expected,
                        "{name} total={total} base={base} ticked state diverged at {elapsed}"
                    );
                    assert_eq!(
                        cold_replay(&engine, elapsed, total, base),
                        expected,
                        "{name} total={total} base={base} replay diverged at {elapsed}"
                    );
                    assert_eq!(result.stimulation_active, expected.is_stimulating());
                    assert_eq!(result.active_channel, expected.active_channel());
                }
            }
        }
    }
}

#[test]
fn ticks_are_silent_while_the_device_state_holds() {
    for (name, engine) in engines() {
        let total = 600;
        let base = Intensity::clamped(5);
        let (mut state, _) = engine.start(base, total);

        for elapsed in 1..=total {
            let (next, result) = engine.tick(state, elapsed, total, base);
            state = next;

            let before = engine.device_state(elapsed - 1, total, base);
            let after = engine.device_state(elapsed, total, base);
            if before == after {
                assert!(
                    result.commands.is_empty(),
                    "{name} emitted {:?} at {elapsed} with no state change",
                    result.commands
                );
            } else {
                assert!(!result.commands.is_empty(), "{name} missed a change at {elapsed}");
            }
        }
    }
}

#[test]
fn replay_after_a_gap_restores_the_clock_state() {
    for (name, engine) in engines() {
        let total = 360;
        let base = Intensity::clamped(4);
        let (mut state, start) = engine.start(base, total);
        let mut mirror = DeviceMirror::new();
        mirror.apply_all(&start);

        for elapsed in 1..=total {
            let (next, result) = engine.tick(state, elapsed, total, base);
            state = next;

            // Link is down for 97..=211; whatever the engine emitted is lost.
            if (97..=211).contains(&elapsed) {
                continue;
            }
            if elapsed == 212 {
                mirror.apply_all(&engine.reconnect(elapsed, total, base));
                state = engine.resume_state(elapsed, total, base);
            } else {
                mirror.apply_all(&result.commands);
            }

            assert_eq!(
                mirror.state(),
                engine.device_state(elapsed, total, base),
                "{name} diverged at {elapsed} after recovery"
            );
        }
    }
}

#[test]
fn replay_is_idempotent() {
    for (name, engine) in engines() {
        let base = Intensity::clamped(6);
        for elapsed in [0, 14, 45, 299, 480, 599] {
            let first = engine.reconnect(elapsed, 600, base);
            let mut mirror = DeviceMirror::new();
            mirror.apply_all(&first);
            let once = mirror.state();
            mirror.apply_all(&engine.reconnect(elapsed, 600, base));

            assert_eq!(mirror.state(), once, "{name} replay at {elapsed} accumulated");
            assert_eq!(first, engine.reconnect(elapsed, 600, base));
        }
    }
}

#[test]
fn sleep_rotates_channels_and_fades() {
    let engine = Engine::for_mode(StimulationMode::Sleep, &ModeSettings::default()).unwrap();
    let base = Intensity::clamped(5);

    let channels: Vec<_> = [10, 130, 250, 370, 490]
        .into_iter()
        .map(|elapsed| match engine.device_state(elapsed, 600, base) {
            DeviceState::Stimulating { channel, .. } => Some(channel),
            DeviceState::Idle => None,
        })
        .collect();
    assert_eq!(
        channels,
        [
            Some(Channel::Bilateral),
            Some(Channel::Left),
            Some(Channel::Bilateral),
            Some(Channel::Right),
            Some(Channel::Bilateral),
        ]
    );

    let level = |elapsed, base: i32| {
        engine
            .device_state(elapsed, 600, Intensity::clamped(base))
            .intensity()
            .map(Intensity::get)
    };
    assert_eq!(level(479, 5), Some(5));
    assert_eq!(level(480, 5), Some(4));
    assert_eq!(level(540, 5), Some(3));
    assert_eq!(level(540, 1), Some(1));
    assert_eq!(level(599, 2), Some(1));
}

#[test]
fn focus_replay_past_midpoint_applies_the_bump() {
    let engine = Engine::for_mode(StimulationMode::Focus, &ModeSettings::default()).unwrap();
    let base = Intensity::clamped(5);

    for elapsed in 0..360 {
        let expected_on = elapsed % 60 < 30;
        assert_eq!(
            engine.device_state(elapsed, 360, base).is_stimulating(),
            expected_on,
            "duty cycle wrong at {elapsed}"
        );
    }

    assert_eq!(
        engine.reconnect(190, 360, base).as_slice(),
        &[Command::ActivateLeft, Command::SetIntensity(Intensity::clamped(6))]
    );
    assert_eq!(
        engine.reconnect(40, 360, base).as_slice(),
        &[Command::Deactivate]
    );
}

#[test]
fn pain_relief_stays_in_range_at_the_extremes() {
    let engine = Engine::for_mode(StimulationMode::PainRelief, &ModeSettings::default()).unwrap();

    for elapsed in 0..30 {
        let high = engine.device_state(elapsed, 480, Intensity::clamped(9));
        let low = engine.device_state(elapsed, 480, Intensity::clamped(1));
        assert!(high.intensity().is_some_and(|level| level.get() <= 9));
        assert!(low.intensity().is_some_and(|level| level.get() >= 1));
    }
}

#[test]
fn calm_replay_follows_the_breathing_window() {
    let base = Intensity::clamped(5);
    let activate = [Command::ActivateBilateral, Command::SetIntensity(base)];

    let three_phase = Engine::for_mode(StimulationMode::Calm, &ModeSettings::default()).unwrap();
    assert!(three_phase.start(base, 300).1.is_empty());
    for elapsed in [0, 4, 15, 19, 30] {
        assert_eq!(
            three_phase.reconnect(elapsed, 300, base).as_slice(),
            &[Command::Deactivate],
            "inhale at {elapsed}"
        );
    }
    for elapsed in [5, 7, 8, 14, 20, 29] {
        assert_eq!(
            three_phase.reconnect(elapsed, 300, base).as_slice(),
            &activate,
            "stimulating at {elapsed}"
        );
    }

    let settings = ModeSettings {
        calm: CalmSchedule::TWO_PHASE,
        ..ModeSettings::default()
    };
    let two_phase = Engine::for_mode(StimulationMode::Calm, &settings).unwrap();
    assert_eq!(
        two_phase.reconnect(3, 300, base).as_slice(),
        &[Command::Deactivate]
    );
    assert_eq!(two_phase.reconnect(4, 300, base).as_slice(), &activate);
    assert_eq!(
        two_phase.reconnect(10, 300, base).as_slice(),
        &[Command::Deactivate]
    );
}
