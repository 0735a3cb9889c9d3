//! Stimulation mode catalog and the time-indexed engines behind each mode.
//!
//! Engines are pure: the logical device state at any second is a function of
//! `(elapsed, total, base)` alone. The only thing an engine remembers between
//! ticks is an explicit [`ModeEngine::State`] value describing what was last
//! told to the device, which lets `tick` suppress repeated commands while
//! `reconnect` rebuilds the device from nothing.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::command::{Command, Commands, Intensity, commands_from};

pub mod calm;
pub mod focus;
pub mod pain_relief;
pub mod sleep;
pub mod stress_relief;
pub mod waveform;

pub use calm::{Calm, CalmSchedule, CalmState};
pub use focus::{Focus, FocusSchedule, FocusState};
pub use pain_relief::{PainRelief, PainReliefState};
pub use sleep::{Sleep, SleepState};
pub use stress_relief::StressRelief;

/// Capacity of the human-readable status line.
pub const STATUS_TEXT_CAPACITY: usize = 48;

/// Status line republished alongside each tick.
pub type StatusText = String<STATUS_TEXT_CAPACITY>;

/// Strength every mode starts from unless the operator changes it.
pub const DEFAULT_STRENGTH: Intensity = match Intensity::new(5) {
    Some(level) => level,
    None => Intensity::MIN,
};

/// Selectable stimulation programs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StimulationMode {
    StressRelief,
    Sleep,
    Focus,
    PainRelief,
    Calm,
    /// Manual bilateral stimulation with no time-based automation.
    Custom,
}

impl StimulationMode {
    /// Every mode in menu order.
    pub const ALL: [StimulationMode; 6] = [
        StimulationMode::StressRelief,
        StimulationMode::Sleep,
        StimulationMode::Focus,
        StimulationMode::PainRelief,
        StimulationMode::Calm,
        StimulationMode::Custom,
    ];

    /// Returns the catalog entry for the mode.
    #[must_use]
    pub const fn profile(self) -> &'static ModeProfile {
        match self {
            StimulationMode::StressRelief => &STRESS_RELIEF_PROFILE,
            StimulationMode::Sleep => &SLEEP_PROFILE,
            StimulationMode::Focus => &FOCUS_PROFILE,
            StimulationMode::PainRelief => &PAIN_RELIEF_PROFILE,
            StimulationMode::Calm => &CALM_PROFILE,
            StimulationMode::Custom => &CUSTOM_PROFILE,
        }
    }

    /// Stable lowercase identifier used by operator tooling.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            StimulationMode::StressRelief => "stress",
            StimulationMode::Sleep => "sleep",
            StimulationMode::Focus => "focus",
            StimulationMode::PainRelief => "pain",
            StimulationMode::Calm => "calm",
            StimulationMode::Custom => "custom",
        }
    }

    /// Looks a mode up by its [`key`](Self::key).
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.key() == key)
    }
}

impl fmt::Display for StimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

/// Research support attached to a mode in the catalog.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EvidenceLevel {
    Strong,
    ModerateStrong,
    Moderate,
    Weak,
    Unrated,
}

impl fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceLevel::Strong => f.write_str("Strong"),
            EvidenceLevel::ModerateStrong => f.write_str("Moderate-Strong"),
            EvidenceLevel::Moderate => f.write_str("Moderate"),
            EvidenceLevel::Weak => f.write_str("Weak"),
            EvidenceLevel::Unrated => Ok(()),
        }
    }
}

/// Immutable defaults for a stimulation mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeProfile {
    pub name: &'static str,
    pub summary: &'static str,
    pub default_minutes: u16,
    pub default_strength: Intensity,
    pub evidence: EvidenceLevel,
}

const STRESS_RELIEF_PROFILE: ModeProfile = ModeProfile {
    name: "Stress Relief",
    summary: "Bilateral stimulation at constant intensity for general vagal toning.",
    default_minutes: 6,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::Strong,
};

const SLEEP_PROFILE: ModeProfile = ModeProfile {
    name: "Sleep",
    summary: "Rotating channels with gentle fade-out to ease into sleep.",
    default_minutes: 10,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::Moderate,
};

const FOCUS_PROFILE: ModeProfile = ModeProfile {
    name: "Focus",
    summary: "Left-side only, 30s on/off cycles with a midpoint intensity boost.",
    default_minutes: 6,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::ModerateStrong,
};

const PAIN_RELIEF_PROFILE: ModeProfile = ModeProfile {
    name: "Pain Relief",
    summary: "Bilateral with oscillating intensity on a 30-second wave.",
    default_minutes: 8,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::Weak,
};

const CALM_PROFILE: ModeProfile = ModeProfile {
    name: "Calm",
    summary: "Respiratory-gated: stimulates on exhale, pauses on inhale.",
    default_minutes: 5,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::Strong,
};

const CUSTOM_PROFILE: ModeProfile = ModeProfile {
    name: "Custom",
    summary: "Manual control with your own timer and intensity.",
    default_minutes: 10,
    default_strength: DEFAULT_STRENGTH,
    evidence: EvidenceLevel::Unrated,
};

/// How the operator currently feels; each feeling maps to a primary mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Feeling {
    Stressed,
    Anxious,
    /// Can't sleep.
    Wired,
    Foggy,
    Hurting,
}

impl Feeling {
    pub const ALL: [Feeling; 5] = [
        Feeling::Stressed,
        Feeling::Anxious,
        Feeling::Wired,
        Feeling::Foggy,
        Feeling::Hurting,
    ];

    /// Mode recommended for the feeling.
    #[must_use]
    pub const fn primary_mode(self) -> StimulationMode {
        match self {
            Feeling::Stressed => StimulationMode::StressRelief,
            Feeling::Anxious => StimulationMode::Calm,
            Feeling::Wired => StimulationMode::Sleep,
            Feeling::Foggy => StimulationMode::Focus,
            Feeling::Hurting => StimulationMode::PainRelief,
        }
    }

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Feeling::Stressed => "stressed",
            Feeling::Anxious => "anxious",
            Feeling::Wired => "wired",
            Feeling::Foggy => "foggy",
            Feeling::Hurting => "hurting",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feeling| feeling.key() == key)
    }
}

impl fmt::Display for Feeling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feeling::Stressed => f.write_str("Stressed"),
            Feeling::Anxious => f.write_str("Anxious"),
            Feeling::Wired => f.write_str("Can't Sleep"),
            Feeling::Foggy => f.write_str("Foggy"),
            Feeling::Hurting => f.write_str("Hurting"),
        }
    }
}

/// Output channel the device can be driven on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    Bilateral,
    Left,
    Right,
}

impl Channel {
    /// Command that switches the device onto this channel.
    #[must_use]
    pub const fn activate(self) -> Command {
        match self {
            Channel::Bilateral => Command::ActivateBilateral,
            Channel::Left => Command::ActivateLeft,
            Channel::Right => Command::ActivateRight,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Bilateral => "Bilateral",
            Channel::Left => "Left",
            Channel::Right => "Right",
        }
    }
}

/// Channel reported to the display, including the resting state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActiveChannel {
    Bilateral,
    Left,
    Right,
    Off,
}

impl From<Channel> for ActiveChannel {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Bilateral => ActiveChannel::Bilateral,
            Channel::Left => ActiveChannel::Left,
            Channel::Right => ActiveChannel::Right,
        }
    }
}

impl fmt::Display for ActiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveChannel::Bilateral => f.write_str("bilateral"),
            ActiveChannel::Left => f.write_str("left"),
            ActiveChannel::Right => f.write_str("right"),
            ActiveChannel::Off => f.write_str("off"),
        }
    }
}

/// Position inside a guided breathing cycle; progress is in `[0, 1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BreathingPhase {
    Inhale(f32),
    Hold(f32),
    Exhale(f32),
}

impl BreathingPhase {
    #[must_use]
    pub const fn progress(self) -> f32 {
        match self {
            BreathingPhase::Inhale(progress)
            | BreathingPhase::Hold(progress)
            | BreathingPhase::Exhale(progress) => progress,
        }
    }
}

impl fmt::Display for BreathingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, progress) = match self {
            BreathingPhase::Inhale(progress) => ("inhale", progress),
            BreathingPhase::Hold(progress) => ("hold", progress),
            BreathingPhase::Exhale(progress) => ("exhale", progress),
        };
        write!(f, "{label} {:.0}%", progress * 100.0)
    }
}

/// Logical device state an engine wants in force at a given second.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceState {
    Idle,
    Stimulating {
        channel: Channel,
        intensity: Intensity,
    },
}

impl DeviceState {
    /// Commands that force a device in an unknown state into this one.
    #[must_use]
    pub fn restore_commands(self) -> Commands {
        match self {
            DeviceState::Idle => commands_from(&[Command::Deactivate]),
            DeviceState::Stimulating { channel, intensity } => {
                commands_from(&[channel.activate(), Command::SetIntensity(intensity)])
            }
        }
    }

    #[must_use]
    pub const fn is_stimulating(self) -> bool {
        matches!(self, DeviceState::Stimulating { .. })
    }

    #[must_use]
    pub fn active_channel(self) -> ActiveChannel {
        match self {
            DeviceState::Idle => ActiveChannel::Off,
            DeviceState::Stimulating { channel, .. } => channel.into(),
        }
    }

    #[must_use]
    pub const fn intensity(self) -> Option<Intensity> {
        match self {
            DeviceState::Idle => None,
            DeviceState::Stimulating { intensity, .. } => Some(intensity),
        }
    }
}

/// Everything an engine reports for one second of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct ModeTickResult {
    /// Commands needed since the previous tick, in send order.
    pub commands: Commands,
    pub stimulation_active: bool,
    /// Intensity in force when it differs from the base; `Some(0)` while resting.
    pub effective_strength: Option<u8>,
    pub breathing_phase: Option<BreathingPhase>,
    pub active_channel: ActiveChannel,
    pub status: StatusText,
}

impl ModeTickResult {
    /// Builds a result whose reported state mirrors `device`.
    #[must_use]
    pub fn describing(device: DeviceState, base: Intensity, status: StatusText) -> Self {
        let effective_strength = device
            .intensity()
            .filter(|level| *level != base)
            .map(Intensity::get);
        Self {
            commands: Commands::new(),
            stimulation_active: device.is_stimulating(),
            effective_strength,
            breathing_phase: None,
            active_channel: device.active_channel(),
            status,
        }
    }

    #[must_use]
    pub fn with_commands(mut self, commands: Commands) -> Self {
        self.commands = commands;
        self
    }
}

/// Formats a status line, truncating silently at capacity.
#[must_use]
pub fn status_text(args: fmt::Arguments<'_>) -> StatusText {
    let mut text = StatusText::new();
    let _ = text.write_fmt(args);
    text
}

/// Contract shared by every time-indexed stimulation engine.
pub trait ModeEngine {
    /// Cache of what was last sent to the device.
    type State: Copy + Eq + fmt::Debug;

    /// Commands establishing the mode at `elapsed == 0`, with the matching cache.
    fn start(&self, base: Intensity, total: u32) -> (Self::State, Commands);

    /// Advances to `elapsed`, returning only the commands that changed.
    fn tick(
        &self,
        state: Self::State,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (Self::State, ModeTickResult);

    /// Logical device state at `elapsed`, independent of any cache.
    fn device_state(&self, elapsed: u32, total: u32, base: Intensity) -> DeviceState;

    /// Cold-start command set for the device state at `elapsed`.
    fn reconnect(&self, elapsed: u32, total: u32, base: Intensity) -> Commands {
        self.device_state(elapsed, total, base).restore_commands()
    }

    /// Cache value describing the device right after [`reconnect`](Self::reconnect).
    fn resume_state(&self, elapsed: u32, total: u32, base: Intensity) -> Self::State;
}

/// Schedules and wave parameters the engines are built from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeSettings {
    pub calm: CalmSchedule,
    pub focus: FocusSchedule,
    pub pain_relief_period: u32,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            calm: CalmSchedule::default(),
            focus: FocusSchedule::default(),
            pain_relief_period: pain_relief::DEFAULT_PERIOD_SECS,
        }
    }
}

/// Closed set of engines; `Custom` mode has none.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Engine {
    StressRelief(StressRelief),
    Sleep(Sleep),
    Focus(Focus),
    PainRelief(PainRelief),
    Calm(Calm),
}

/// Cache paired with an [`Engine`] variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineState {
    StressRelief,
    Sleep(SleepState),
    Focus(FocusState),
    PainRelief(PainReliefState),
    Calm(CalmState),
}

impl Engine {
    /// Builds the engine for `mode`, or `None` for manual control.
    #[must_use]
    pub const fn for_mode(mode: StimulationMode, settings: &ModeSettings) -> Option<Self> {
        match mode {
            StimulationMode::StressRelief => Some(Engine::StressRelief(StressRelief)),
            StimulationMode::Sleep => Some(Engine::Sleep(Sleep)),
            StimulationMode::Focus => Some(Engine::Focus(Focus::new(settings.focus))),
            StimulationMode::PainRelief => Some(Engine::PainRelief(PainRelief::new(
                settings.pain_relief_period,
            ))),
            StimulationMode::Calm => Some(Engine::Calm(Calm::new(settings.calm))),
            StimulationMode::Custom => None,
        }
    }

    pub fn start(&self, base: Intensity, total: u32) -> (EngineState, Commands) {
        match self {
            Engine::StressRelief(engine) => {
                let ((), commands) = engine.start(base, total);
                (EngineState::StressRelief, commands)
            }
            Engine::Sleep(engine) => {
                let (state, commands) = engine.start(base, total);
                (EngineState::Sleep(state), commands)
            }
            Engine::Focus(engine) => {
                let (state, commands) = engine.start(base, total);
                (EngineState::Focus(state), commands)
            }
            Engine::PainRelief(engine) => {
                let (state, commands) = engine.start(base, total);
                (EngineState::PainRelief(state), commands)
            }
            Engine::Calm(engine) => {
                let (state, commands) = engine.start(base, total);
                (EngineState::Calm(state), commands)
            }
        }
    }

    /// Advances the engine. A cache belonging to another engine is treated as
    /// if the device matched the previous second.
    pub fn tick(
        &self,
        state: EngineState,
        elapsed: u32,
        total: u32,
        base: Intensity,
    ) -> (EngineState, ModeTickResult) {
        let state = if self.owns(state) {
            state
        } else {
            self.resume_state(elapsed.saturating_sub(1), total, base)
        };

        match (self, state) {
            (Engine::Sleep(engine), EngineState::Sleep(state)) => {
                let (state, result) = engine.tick(state, elapsed, total, base);
                (EngineState::Sleep(state), result)
            }
            (Engine::Focus(engine), EngineState::Focus(state)) => {
                let (state, result) = engine.tick(state, elapsed, total, base);
                (EngineState::Focus(state), result)
            }
            (Engine::PainRelief(engine), EngineState::PainRelief(state)) => {
                let (state, result) = engine.tick(state, elapsed, total, base);
                (EngineState::PainRelief(state), result)
            }
            (Engine::Calm(engine), EngineState::Calm(state)) => {
                let (state, result) = engine.tick(state, elapsed, total, base);
                (EngineState::Calm(state), result)
            }
            (Engine::StressRelief(engine), _) => {
                let ((), result) = engine.tick((), elapsed, total, base);
                (EngineState::StressRelief, result)
            }
            (engine, state) => {
                // Unreachable once `owns` has normalised the cache.
                let device = engine.device_state(elapsed, total, base);
                (state, ModeTickResult::describing(device, base, StatusText::new()))
            }
        }
    }

    #[must_use]
    pub fn device_state(&self, elapsed: u32, total: u32, base: Intensity) -> DeviceState {
        match self {
            Engine::StressRelief(engine) => engine.device_state(elapsed, total, base),
            Engine::Sleep(engine) => engine.device_state(elapsed, total, base),
            Engine::Focus(engine) => engine.device_state(elapsed, total, base),
            Engine::PainRelief(engine) => engine.device_state(elapsed, total, base),
            Engine::Calm(engine) => engine.device_state(elapsed, total, base),
        }
    }

    #[must_use]
    pub fn reconnect(&self, elapsed: u32, total: u32, base: Intensity) -> Commands {
        match self {
            Engine::StressRelief(engine) => engine.reconnect(elapsed, total, base),
            Engine::Sleep(engine) => engine.reconnect(elapsed, total, base),
            Engine::Focus(engine) => engine.reconnect(elapsed, total, base),
            Engine::PainRelief(engine) => engine.reconnect(elapsed, total, base),
            Engine::Calm(engine) => engine.reconnect(elapsed, total, base),
        }
    }

    #[must_use]
    pub fn resume_state(&self, elapsed: u32, total: u32, base: Intensity) -> EngineState {
        match self {
            Engine::StressRelief(_) => EngineState::StressRelief,
            Engine::Sleep(engine) => EngineState::Sleep(engine.resume_state(elapsed, total, base)),
            Engine::Focus(engine) => EngineState::Focus(engine.resume_state(elapsed, total, base)),
            Engine::PainRelief(engine) => {
                EngineState::PainRelief(engine.resume_state(elapsed, total, base))
            }
            Engine::Calm(engine) => EngineState::Calm(engine.resume_state(elapsed, total, base)),
        }
    }

    const fn owns(&self, state: EngineState) -> bool {
        matches!(
            (self, state),
            (Engine::StressRelief(_), EngineState::StressRelief)
                | (Engine::Sleep(_), EngineState::Sleep(_))
                | (Engine::Focus(_), EngineState::Focus(_))
                | (Engine::PainRelief(_), EngineState::PainRelief(_))
                | (Engine::Calm(_), EngineState::Calm(_))
        )
    }
}
