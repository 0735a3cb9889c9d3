//! Session lifecycle, ticking and link recovery.
//!
//! [`SessionController`] owns the session clock and the active engine. A
//! once-per-second countdown advances `elapsed`, ticks the engine and forwards
//! whatever it emits. Commands computed while the link is down are dropped;
//! when the link comes back the controller rebuilds the device state from the
//! clock with [`Engine::reconnect`] instead of replaying history.
//!
//! Time is supplied by the caller. Hosts drive [`SessionController::poll`]
//! with their own monotonic instant; tests use a mock.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use crate::command::{Command, Commands, Intensity, commands_from};
use crate::modes::{
    ActiveChannel, BreathingPhase, DeviceState, Engine, EngineState, Feeling, ModeSettings,
    StatusText, StimulationMode, status_text,
};
use crate::telemetry::{BatteryThresholds, DeviceTelemetry, parse_notification};
use crate::transport::{LinkEvent, Transport};

pub mod journal;
pub mod scheduler;

pub use journal::{EndReason, EventId, JournalEvent, JournalRecord, SessionJournal};
pub use scheduler::{Scheduler, TimerHandle, TimerKind};

/// Session clock cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Interval between intensity re-assertions while stimulating.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
/// Interval between battery and charging queries while the link is up.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Timing and engine parameters fixed for the controller's lifetime.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControllerSettings {
    pub tick_interval: Duration,
    pub keepalive_interval: Duration,
    pub status_poll_interval: Duration,
    pub modes: ModeSettings,
    pub battery: BatteryThresholds,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
            status_poll_interval: STATUS_POLL_INTERVAL,
            modes: ModeSettings::default(),
            battery: BatteryThresholds::default(),
        }
    }
}

/// Operator choices made before a session starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    pub mode: StimulationMode,
    pub feeling: Option<Feeling>,
    pub timer_minutes: u16,
    pub strength: Intensity,
}

impl SessionConfig {
    /// Selects `mode` and adopts its catalog defaults.
    pub fn select_mode(&mut self, mode: StimulationMode) {
        let profile = mode.profile();
        self.mode = mode;
        self.feeling = None;
        self.timer_minutes = profile.default_minutes;
        self.strength = profile.default_strength;
    }

    /// Selects the primary mode for `feeling` and remembers the feeling.
    pub fn select_feeling(&mut self, feeling: Feeling) {
        self.select_mode(feeling.primary_mode());
        self.feeling = Some(feeling);
    }

    pub fn increase_timer(&mut self) {
        self.timer_minutes = self.timer_minutes.saturating_add(1);
    }

    /// Shortens the timer; one minute is the floor.
    pub fn decrease_timer(&mut self) {
        if self.timer_minutes > 1 {
            self.timer_minutes -= 1;
        }
    }

    pub fn set_strength(&mut self, value: i32) -> Intensity {
        self.strength = Intensity::clamped(value);
        self.strength
    }

    #[must_use]
    pub const fn total_secs(&self) -> u32 {
        self.timer_minutes as u32 * 60
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let profile = StimulationMode::Custom.profile();
        Self {
            mode: StimulationMode::Custom,
            feeling: None,
            timer_minutes: profile.default_minutes,
            strength: profile.default_strength,
        }
    }
}

/// Where the controller is in the session lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lifecycle {
    Idle,
    Running,
    Paused,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Idle => f.write_str("idle"),
            Lifecycle::Running => f.write_str("running"),
            Lifecycle::Paused => f.write_str("paused"),
        }
    }
}

/// Operations the controller refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// The link cannot take commands yet.
    TransportNotReady,
    /// Configuration is frozen while a session is running or paused.
    SessionActive,
    NoActiveSession,
    NotRunning,
    NotPaused,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::TransportNotReady => f.write_str("device link is not ready"),
            SessionError::SessionActive => f.write_str("a session is already active"),
            SessionError::NoActiveSession => f.write_str("no session is active"),
            SessionError::NotRunning => f.write_str("session is not running"),
            SessionError::NotPaused => f.write_str("session is not paused"),
        }
    }
}

/// Display-facing view of the session, republished after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    pub lifecycle: Lifecycle,
    pub mode: StimulationMode,
    pub elapsed_secs: u32,
    pub total_secs: u32,
    pub stimulation_active: bool,
    pub effective_strength: Option<u8>,
    pub breathing_phase: Option<BreathingPhase>,
    pub active_channel: ActiveChannel,
    pub text: StatusText,
}

impl SessionStatus {
    fn idle(config: &SessionConfig) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            mode: config.mode,
            elapsed_secs: 0,
            total_secs: config.total_secs(),
            stimulation_active: false,
            effective_strength: None,
            breathing_phase: None,
            active_channel: ActiveChannel::Off,
            text: StatusText::new(),
        }
    }

    #[must_use]
    pub const fn remaining_secs(&self) -> u32 {
        self.total_secs.saturating_sub(self.elapsed_secs)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let remaining = self.remaining_secs();
        write!(
            f,
            "{} {} {:02}:{:02} channel={}",
            self.lifecycle,
            self.mode,
            remaining / 60,
            remaining % 60,
            self.active_channel
        )?;
        if let Some(level) = self.effective_strength {
            write!(f, " effective={level}")?;
        }
        if let Some(phase) = self.breathing_phase {
            write!(f, " breathing={phase}")?;
        }
        if !self.text.is_empty() {
            write!(f, " [{}]", self.text)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
struct ActiveSession {
    mode: StimulationMode,
    total_secs: u32,
    elapsed_secs: u32,
    base: Intensity,
    paused: bool,
    engine: Option<(Engine, EngineState)>,
}

impl ActiveSession {
    fn replay_commands(&self) -> Commands {
        match &self.engine {
            Some((engine, _)) => engine.reconnect(self.elapsed_secs, self.total_secs, self.base),
            None => manual_commands(self.base),
        }
    }

    /// Points the engine cache at the device state for the current second.
    fn resync(&mut self) {
        if let Some((engine, state)) = self.engine.as_mut() {
            *state = engine.resume_state(self.elapsed_secs, self.total_secs, self.base);
        }
    }

    /// Returns `true` if the engine wants `level` on the device right now.
    fn engine_holds(&self, level: Intensity) -> bool {
        match &self.engine {
            Some((engine, _)) => matches!(
                engine.device_state(self.elapsed_secs, self.total_secs, self.base),
                DeviceState::Stimulating { intensity, .. } if intensity == level
            ),
            None => false,
        }
    }
}

fn manual_commands(base: Intensity) -> Commands {
    commands_from(&[Command::ActivateBilateral, Command::SetIntensity(base)])
}

fn saturating_count(len: usize) -> u8 {
    u8::try_from(len).unwrap_or(u8::MAX)
}

/// Drives one stimulation session at a time against a [`Transport`].
pub struct SessionController<T, I, const JOURNAL: usize = { journal::JOURNAL_CAPACITY }>
where
    I: Copy,
{
    transport: T,
    settings: ControllerSettings,
    config: SessionConfig,
    session: Option<ActiveSession>,
    status: SessionStatus,
    scheduler: Scheduler<I>,
    telemetry: DeviceTelemetry,
    journal: SessionJournal<I, JOURNAL>,
}

impl<T, I, const JOURNAL: usize> SessionController<T, I, JOURNAL>
where
    T: Transport,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    pub fn new(transport: T, settings: ControllerSettings) -> Self {
        Self::with_config(transport, settings, SessionConfig::default())
    }

    pub fn with_config(transport: T, settings: ControllerSettings, config: SessionConfig) -> Self {
        Self {
            transport,
            settings,
            status: SessionStatus::idle(&config),
            config,
            session: None,
            scheduler: Scheduler::new(),
            telemetry: DeviceTelemetry::new(),
            journal: SessionJournal::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn telemetry(&self) -> &DeviceTelemetry {
        &self.telemetry
    }

    pub fn journal(&self) -> &SessionJournal<I, JOURNAL> {
        &self.journal
    }

    pub fn scheduler(&self) -> &Scheduler<I> {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &self.session {
            None => Lifecycle::Idle,
            Some(session) if session.paused => Lifecycle::Paused,
            Some(_) => Lifecycle::Running,
        }
    }

    /// Cache the active engine holds for the device, if any.
    pub fn engine_state(&self) -> Option<EngineState> {
        self.session
            .as_ref()
            .and_then(|session| session.engine.map(|(_, state)| state))
    }

    pub fn select_mode(&mut self, mode: StimulationMode) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.config.select_mode(mode);
        self.status = SessionStatus::idle(&self.config);
        Ok(())
    }

    pub fn select_feeling(&mut self, feeling: Feeling) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.config.select_feeling(feeling);
        self.status = SessionStatus::idle(&self.config);
        Ok(())
    }

    pub fn increase_timer(&mut self) -> Result<u16, SessionError> {
        self.ensure_idle()?;
        self.config.increase_timer();
        self.status.total_secs = self.config.total_secs();
        Ok(self.config.timer_minutes)
    }

    pub fn decrease_timer(&mut self) -> Result<u16, SessionError> {
        self.ensure_idle()?;
        self.config.decrease_timer();
        self.status.total_secs = self.config.total_secs();
        Ok(self.config.timer_minutes)
    }

    /// Starts a session with the current configuration.
    pub fn start(&mut self, now: I) -> Result<(), SessionError> {
        self.ensure_idle()?;
        if !self.transport.is_ready() {
            return Err(SessionError::TransportNotReady);
        }

        let total_secs = self.config.total_secs();
        let base = self.config.strength;
        let mode = self.config.mode;

        let (engine, commands) = match Engine::for_mode(mode, &self.settings.modes) {
            Some(engine) => {
                let (state, commands) = engine.start(base, total_secs);
                (Some((engine, state)), commands)
            }
            None => (None, manual_commands(base)),
        };

        self.session = Some(ActiveSession {
            mode,
            total_secs,
            elapsed_secs: 0,
            base,
            paused: false,
            engine,
        });

        self.journal.record(
            JournalEvent::SessionStarted {
                mode,
                total_secs,
                strength: base,
            },
            now,
        );
        self.forward(&commands, now);
        self.refresh_status();

        self.scheduler
            .schedule_every(TimerKind::Countdown, now, self.settings.tick_interval);
        self.scheduler
            .schedule_every(TimerKind::Keepalive, now, self.settings.keepalive_interval);
        Ok(())
    }

    /// Switches stimulation off and freezes the session clock.
    pub fn pause(&mut self, now: I) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoActiveSession)?;
        if session.paused {
            return Err(SessionError::NotRunning);
        }
        session.paused = true;
        let elapsed_secs = session.elapsed_secs;

        self.scheduler.cancel(TimerKind::Countdown);
        self.scheduler.cancel(TimerKind::Keepalive);
        if self.transport.is_connected() {
            self.transport.send(Command::Deactivate);
        }

        self.journal
            .record(JournalEvent::SessionPaused { elapsed_secs }, now);
        self.refresh_status();
        Ok(())
    }

    /// Rebuilds the device state at the frozen clock and restarts ticking.
    pub fn resume(&mut self, now: I) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoActiveSession)?;
        if !session.paused {
            return Err(SessionError::NotPaused);
        }
        if !self.transport.is_ready() {
            return Err(SessionError::TransportNotReady);
        }
        session.paused = false;
        let elapsed_secs = session.elapsed_secs;

        self.journal
            .record(JournalEvent::SessionResumed { elapsed_secs }, now);
        self.replay(now);
        self.scheduler
            .schedule_every(TimerKind::Countdown, now, self.settings.tick_interval);
        Ok(())
    }

    /// Ends the session on operator request.
    pub fn stop(&mut self, now: I) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        self.end(EndReason::Stopped, now);
        Ok(())
    }

    /// Changes the base strength, live if stimulation is currently on.
    ///
    /// When the engine's own level for this second matches the one sent, its
    /// cache is resynchronised so the next tick does not repeat it.
    pub fn set_strength(&mut self, value: i32, now: I) -> Intensity {
        let level = self.config.set_strength(value);
        let running = match self.session.as_mut() {
            Some(session) => {
                session.base = level;
                !session.paused
            }
            None => false,
        };

        self.journal.record(JournalEvent::StrengthChanged(level), now);
        if running && self.transport.is_connected() && self.status.stimulation_active {
            self.transport.send(Command::SetIntensity(level));
            if let Some(session) = self
                .session
                .as_mut()
                .filter(|session| session.engine_holds(level))
            {
                session.resync();
            }
            self.refresh_status();
        }
        level
    }

    /// Commands that would rebuild the device state right now.
    pub fn replay_commands(&self) -> Commands {
        self.session
            .as_ref()
            .map_or_else(Commands::new, ActiveSession::replay_commands)
    }

    pub fn handle_link_event(&mut self, event: LinkEvent<'_>, now: I) {
        match event {
            LinkEvent::Disconnected => {
                self.scheduler.cancel(TimerKind::Keepalive);
                self.scheduler.cancel(TimerKind::StatusPoll);
                self.telemetry.clear();
                self.journal.record(JournalEvent::LinkLost, now);
            }
            LinkEvent::Ready => {
                self.journal.record(JournalEvent::LinkReady, now);
                self.scheduler.schedule_every(
                    TimerKind::StatusPoll,
                    now,
                    self.settings.status_poll_interval,
                );
                if self.lifecycle() == Lifecycle::Running {
                    self.replay(now);
                }
                self.query_status();
            }
            LinkEvent::Notification(bytes) => match parse_notification(bytes) {
                Ok(frame) => {
                    self.telemetry.apply(frame, &self.settings.battery);
                    self.journal
                        .record(JournalEvent::TelemetryUpdated(frame), now);
                }
                Err(error) => {
                    self.journal
                        .record(JournalEvent::TelemetryDiscarded(error), now);
                }
            },
        }
    }

    /// Dispatches every timer due at `now`. Returns the number dispatched.
    pub fn poll(&mut self, now: I) -> usize {
        let mut dispatched = 0;
        while let Some(handle) = self.scheduler.next_due(now) {
            self.on_timer(handle, now);
            dispatched += 1;
        }
        dispatched
    }

    /// Handles one timer firing. Stale handles are ignored.
    ///
    /// A countdown that fell more than one period behind is not replayed
    /// tick by tick: the clock jumps to the current second and the device
    /// state is rebuilt once.
    pub fn on_timer(&mut self, handle: TimerHandle, now: I) {
        let Some(periods) = self.scheduler.fire(handle, now) else {
            return;
        };
        match handle.kind {
            TimerKind::Countdown if periods > 1 => self.catch_up(periods, now),
            TimerKind::Countdown => self.countdown(now),
            TimerKind::Keepalive => self.keepalive(now),
            TimerKind::StatusPoll => self.query_status(),
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.session.is_some() {
            Err(SessionError::SessionActive)
        } else {
            Ok(())
        }
    }

    fn countdown(&mut self, now: I) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.paused {
            return;
        }

        if session.total_secs.saturating_sub(session.elapsed_secs) <= 1 {
            self.end(EndReason::Expired, now);
            return;
        }
        session.elapsed_secs += 1;

        let commands = match session.engine.as_mut() {
            Some((engine, state)) => {
                let (next, result) =
                    engine.tick(*state, session.elapsed_secs, session.total_secs, session.base);
                *state = next;
                self.status.stimulation_active = result.stimulation_active;
                self.status.effective_strength = result.effective_strength;
                self.status.breathing_phase = result.breathing_phase;
                self.status.active_channel = result.active_channel;
                self.status.text = result.status;
                result.commands
            }
            None => Commands::new(),
        };
        self.status.elapsed_secs = session.elapsed_secs;

        self.forward(&commands, now);
    }

    fn catch_up(&mut self, periods: u32, now: I) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.paused {
            return;
        }

        let from_secs = session.elapsed_secs;
        let target = from_secs.saturating_add(periods);
        let expired = target >= session.total_secs;
        let to_secs = if expired {
            session.total_secs.saturating_sub(1).max(from_secs)
        } else {
            target
        };
        session.elapsed_secs = to_secs;
        self.status.elapsed_secs = to_secs;
        self.journal
            .record(JournalEvent::ClockSkipped { from_secs, to_secs }, now);

        if expired {
            self.end(EndReason::Expired, now);
        } else if self.transport.is_connected() {
            self.replay(now);
        } else {
            session.resync();
            self.refresh_status();
        }
    }

    fn keepalive(&mut self, now: I) {
        if self.lifecycle() != Lifecycle::Running
            || !self.transport.is_connected()
            || !self.status.stimulation_active
        {
            return;
        }
        let level = match self.status.effective_strength.and_then(Intensity::new) {
            Some(level) => level,
            None => self.config.strength,
        };
        self.transport.send(Command::SetIntensity(level));
        self.journal.record(JournalEvent::Keepalive(level), now);
    }

    fn query_status(&mut self) {
        if self.transport.is_connected() {
            self.transport.send(Command::QueryBattery);
            self.transport.send(Command::QueryCharging);
        }
    }

    /// Sends the cold-start command set for the current second and resets the
    /// engine cache to match it.
    fn replay(&mut self, now: I) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let commands = session.replay_commands();
        session.resync();
        let elapsed_secs = session.elapsed_secs;

        if self.transport.is_connected() {
            self.journal.record(
                JournalEvent::ReplaySent {
                    elapsed_secs,
                    commands: saturating_count(commands.len()),
                },
                now,
            );
        }
        self.forward(&commands, now);
        self.refresh_status();
        self.scheduler
            .schedule_every(TimerKind::Keepalive, now, self.settings.keepalive_interval);
    }

    fn end(&mut self, reason: EndReason, now: I) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.scheduler.cancel(TimerKind::Countdown);
        self.scheduler.cancel(TimerKind::Keepalive);
        if self.transport.is_connected() {
            self.transport.send(Command::Deactivate);
            self.query_status();
        }

        self.journal.record(
            JournalEvent::SessionEnded {
                reason,
                elapsed_secs: session.elapsed_secs,
            },
            now,
        );
        self.status = SessionStatus::idle(&self.config);
    }

    fn forward(&mut self, commands: &[Command], now: I) {
        if commands.is_empty() {
            return;
        }
        if self.transport.is_connected() {
            for command in commands {
                self.transport.send(*command);
            }
        } else {
            self.journal.record(
                JournalEvent::CommandsDropped {
                    count: saturating_count(commands.len()),
                },
                now,
            );
        }
    }

    /// Recomputes the republished status from the clock, without sending.
    fn refresh_status(&mut self) {
        let Some(session) = self.session.as_ref() else {
            self.status = SessionStatus::idle(&self.config);
            return;
        };

        let mut status = SessionStatus {
            lifecycle: self.lifecycle(),
            mode: session.mode,
            elapsed_secs: session.elapsed_secs,
            total_secs: session.total_secs,
            stimulation_active: false,
            effective_strength: None,
            breathing_phase: None,
            active_channel: ActiveChannel::Off,
            text: StatusText::new(),
        };

        if session.paused {
            status.text = status_text(format_args!("Paused"));
        } else {
            match &session.engine {
                Some((engine, state)) => {
                    let (_, result) =
                        engine.tick(*state, session.elapsed_secs, session.total_secs, session.base);
                    status.stimulation_active = result.stimulation_active;
                    status.effective_strength = result.effective_strength;
                    status.breathing_phase = result.breathing_phase;
                    status.active_channel = result.active_channel;
                    status.text = result.status;
                }
                None => {
                    status.stimulation_active = true;
                    status.active_channel = ActiveChannel::Bilateral;
                    status.text = status_text(format_args!("Bilateral · Continuous"));
                }
            }
        }

        self.status = status;
    }
}
