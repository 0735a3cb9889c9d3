//! Device command vocabulary and its wire encoding.
//!
//! Every command travels as a single ASCII token followed by a newline. The
//! device keeps no acknowledgement protocol, so the controller treats each
//! frame as fire-and-forget and relies on the link delivering them in order.

use core::fmt;

use heapless::Vec;

/// Largest number of commands any single engine step emits, plus headroom.
pub const MAX_COMMANDS_PER_STEP: usize = 4;

/// Bounded command list returned by engines and the controller.
pub type Commands = Vec<Command, MAX_COMMANDS_PER_STEP>;

/// Wire terminator appended to every token.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Stimulation intensity level accepted by the device (1 through 9).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(9);

    /// Returns `Some` when `level` is a valid device intensity.
    #[must_use]
    pub const fn new(level: u8) -> Option<Self> {
        if level >= Self::MIN.0 && level <= Self::MAX.0 {
            Some(Self(level))
        } else {
            None
        }
    }

    /// Clamps any integer into the valid intensity range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn clamped(level: i32) -> Self {
        if level < Self::MIN.0 as i32 {
            Self::MIN
        } else if level > Self::MAX.0 as i32 {
            Self::MAX
        } else {
            Self(level as u8)
        }
    }

    /// Returns the raw level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Applies a signed offset and clamps the result.
    #[must_use]
    pub const fn offset(self, delta: i32) -> Self {
        Self::clamped(self.0 as i32 + delta)
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands understood by the stimulator firmware.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    Deactivate,
    ActivateLeft,
    /// Bilateral activation that ramps gradually up to the current intensity.
    ActivateRamp,
    ActivateRight,
    ActivateBilateral,
    SetIntensity(Intensity),
    QueryBattery,
    QueryCharging,
}

impl Command {
    const DEACTIVATE: u8 = b'0';
    const ACTIVATE_LEFT: u8 = b'A';
    const ACTIVATE_RAMP: u8 = b'B';
    const ACTIVATE_RIGHT: u8 = b'C';
    const ACTIVATE_BILATERAL: u8 = b'D';
    const QUERY_BATTERY: u8 = b'Q';
    const QUERY_CHARGING: u8 = b'u';

    /// Returns the single ASCII token that identifies the command on the wire.
    #[must_use]
    pub const fn token(self) -> u8 {
        match self {
            Command::Deactivate => Self::DEACTIVATE,
            Command::ActivateLeft => Self::ACTIVATE_LEFT,
            Command::ActivateRamp => Self::ACTIVATE_RAMP,
            Command::ActivateRight => Self::ACTIVATE_RIGHT,
            Command::ActivateBilateral => Self::ACTIVATE_BILATERAL,
            Command::SetIntensity(level) => b'0' + level.get(),
            Command::QueryBattery => Self::QUERY_BATTERY,
            Command::QueryCharging => Self::QUERY_CHARGING,
        }
    }

    /// Encodes the command into its newline-terminated wire frame.
    #[must_use]
    pub const fn frame(self) -> [u8; 2] {
        [self.token(), LINE_TERMINATOR]
    }

    /// Returns `true` for commands that change what the device is doing.
    #[must_use]
    pub const fn drives_output(self) -> bool {
        !matches!(self, Command::QueryBattery | Command::QueryCharging)
    }

    /// Decodes a single wire line (with or without its terminator).
    pub fn decode(line: &[u8]) -> Result<Self, DecodeError> {
        let line = match line {
            [rest @ .., b'\r', LINE_TERMINATOR] | [rest @ .., LINE_TERMINATOR] => rest,
            other => other,
        };

        match line {
            [] => Err(DecodeError::Empty),
            [token] => Self::from_token(*token).ok_or(DecodeError::UnknownToken(*token)),
            _ => Err(DecodeError::TrailingBytes { len: line.len() }),
        }
    }

    const fn from_token(token: u8) -> Option<Self> {
        match token {
            Self::DEACTIVATE => Some(Command::Deactivate),
            Self::ACTIVATE_LEFT => Some(Command::ActivateLeft),
            Self::ACTIVATE_RAMP => Some(Command::ActivateRamp),
            Self::ACTIVATE_RIGHT => Some(Command::ActivateRight),
            Self::ACTIVATE_BILATERAL => Some(Command::ActivateBilateral),
            Self::QUERY_BATTERY => Some(Command::QueryBattery),
            Self::QUERY_CHARGING => Some(Command::QueryCharging),
            b'1'..=b'9' => Some(Command::SetIntensity(Intensity(token - b'0'))),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Deactivate => f.write_str("deactivate"),
            Command::ActivateLeft => f.write_str("activate-left"),
            Command::ActivateRamp => f.write_str("activate-ramp"),
            Command::ActivateRight => f.write_str("activate-right"),
            Command::ActivateBilateral => f.write_str("activate-bilateral"),
            Command::SetIntensity(level) => write!(f, "set-intensity {level}"),
            Command::QueryBattery => f.write_str("query-battery"),
            Command::QueryCharging => f.write_str("query-charging"),
        }
    }
}

/// Errors produced while decoding a wire line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    Empty,
    UnknownToken(u8),
    TrailingBytes { len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => f.write_str("empty command line"),
            DecodeError::UnknownToken(token) => write!(f, "unknown command token 0x{token:02x}"),
            DecodeError::TrailingBytes { len } => {
                write!(f, "command line carries {len} bytes, expected one token")
            }
        }
    }
}

/// Builds a [`Commands`] list from a slice, dropping anything past capacity.
#[must_use]
pub fn commands_from(items: &[Command]) -> Commands {
    let mut commands = Commands::new();
    for command in items {
        if commands.push(*command).is_err() {
            break;
        }
    }
    commands
}
