//! Operator console grammar.
//!
//! Lines are lowercased before parsing, so keywords are case-insensitive.
//! Every command is a keyword followed by at most one argument.

use std::fmt;
use std::time::Duration;

use pulse_core::modes::{Feeling, StimulationMode};
use winnow::ascii::{dec_int, digit1, float, space0};
use winnow::combinator::{alt, dispatch, empty, eof, fail, opt, terminated};
use winnow::prelude::*;
use winnow::token::take_while;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("mode", "mode <stress|sleep|focus|pain|calm|custom>  - select a mode and its defaults"),
    ("feel", "feel <stressed|anxious|wired|foggy|hurting>  - select the mode for a feeling"),
    ("timer", "timer <up|down>                 - adjust the session length by one minute"),
    ("strength", "strength <1-9|up|down>          - set the base strength (live while stimulating)"),
    ("start", "start                           - start a session"),
    ("pause", "pause                           - pause stimulation and the clock"),
    ("resume", "resume                          - resume a paused session"),
    ("stop", "stop                            - end the session"),
    ("advance", "advance <n>[s|m]                - advance simulated time, at most one day"),
    ("disconnect", "disconnect                      - drop the device link"),
    ("connect", "connect                         - restore the device link"),
    ("battery", "battery <volts>                 - set the simulated battery voltage"),
    ("charging", "charging <on|off>               - set the simulated charging flag"),
    ("status", "status                          - show session, device and telemetry state"),
    ("journal", "journal [count]                 - show recent controller events"),
    ("help", "help [topic]                    - show help for a command"),
];

#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    Mode(StimulationMode),
    Feel(Feeling),
    Timer(TimerAdjust),
    Strength(StrengthChange),
    Start,
    Pause,
    Resume,
    Stop,
    Advance(Duration),
    Disconnect,
    Connect,
    Battery(f64),
    Charging(bool),
    Status,
    Journal(Option<usize>),
    Help(Option<String>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerAdjust {
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StrengthChange {
    Set(i32),
    Up,
    Down,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    UnknownCommand(String),
    /// A known command with a bad argument; carries its usage line.
    Usage(&'static str),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::UnknownCommand(word) => write!(f, "unknown command `{word}`"),
            ConsoleError::Usage(usage) => write!(f, "usage: {usage}"),
        }
    }
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let lowered = line.trim().to_ascii_lowercase();
    let mut input = lowered.as_str();

    terminated(console_command, (space0, eof))
        .parse_next(&mut input)
        .map_err(|_| classify_failure(&lowered))
}

pub fn help_topic(topic: &str) -> Option<&'static str> {
    HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, usage)| *usage)
}

pub fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn classify_failure(line: &str) -> ConsoleError {
    let word = line.split_whitespace().next().unwrap_or_default();
    match help_topic(word) {
        Some(usage) => ConsoleError::Usage(usage),
        None => ConsoleError::UnknownCommand(word.to_owned()),
    }
}

fn console_command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    dispatch! {terminated(word, space0);
        "mode" => mode_name.map(ConsoleCommand::Mode),
        "feel" => feeling_name.map(ConsoleCommand::Feel),
        "timer" => alt((
            "up".value(TimerAdjust::Up),
            "down".value(TimerAdjust::Down),
        ))
        .map(ConsoleCommand::Timer),
        "strength" => strength_change.map(ConsoleCommand::Strength),
        "start" => empty.value(ConsoleCommand::Start),
        "pause" => empty.value(ConsoleCommand::Pause),
        "resume" => empty.value(ConsoleCommand::Resume),
        "stop" => empty.value(ConsoleCommand::Stop),
        "advance" => advance_by.map(ConsoleCommand::Advance),
        "disconnect" => empty.value(ConsoleCommand::Disconnect),
        "connect" => empty.value(ConsoleCommand::Connect),
        "battery" => float.map(ConsoleCommand::Battery),
        "charging" => alt(("on".value(true), "off".value(false))).map(ConsoleCommand::Charging),
        "status" => empty.value(ConsoleCommand::Status),
        "journal" => opt(digit1.parse_to()).map(ConsoleCommand::Journal),
        "help" => opt(word).map(|topic: Option<&str>| ConsoleCommand::Help(topic.map(str::to_owned))),
        _ => fail,
    }
    .parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-').parse_next(input)
}

fn mode_name(input: &mut &str) -> ModalResult<StimulationMode> {
    word.verify_map(StimulationMode::from_key).parse_next(input)
}

fn feeling_name(input: &mut &str) -> ModalResult<Feeling> {
    word.verify_map(Feeling::from_key).parse_next(input)
}

fn strength_change(input: &mut &str) -> ModalResult<StrengthChange> {
    alt((
        "up".value(StrengthChange::Up),
        "down".value(StrengthChange::Down),
        dec_int.map(StrengthChange::Set),
    ))
    .parse_next(input)
}

/// Longest single `advance`; the session steps through every second of it.
const MAX_ADVANCE_SECS: u64 = 24 * 60 * 60;

/// Whole seconds, optionally suffixed with `s` or `m`.
fn advance_by(input: &mut &str) -> ModalResult<Duration> {
    (
        digit1.parse_to::<u64>(),
        opt(alt(("s".value(1_u64), "m".value(60_u64)))),
    )
        .verify_map(|(count, unit)| {
            count
                .checked_mul(unit.unwrap_or(1))
                .filter(|secs| *secs <= MAX_ADVANCE_SECS)
                .map(Duration::from_secs)
        })
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lifecycle_keywords_case_insensitively() {
        assert_eq!(parse_command("START"), Ok(ConsoleCommand::Start));
        assert_eq!(parse_command("  pause "), Ok(ConsoleCommand::Pause));
        assert_eq!(parse_command("Stop"), Ok(ConsoleCommand::Stop));
    }

    #[test]
    fn parses_mode_and_feeling_names() {
        assert_eq!(
            parse_command("mode pain"),
            Ok(ConsoleCommand::Mode(StimulationMode::PainRelief))
        );
        assert_eq!(
            parse_command("feel Wired"),
            Ok(ConsoleCommand::Feel(Feeling::Wired))
        );
        assert_eq!(
            parse_command("mode turbo"),
            Err(ConsoleError::Usage(help_topic("mode").unwrap()))
        );
    }

    #[test]
    fn parses_strength_changes() {
        assert_eq!(
            parse_command("strength 7"),
            Ok(ConsoleCommand::Strength(StrengthChange::Set(7)))
        );
        assert_eq!(
            parse_command("strength -3"),
            Ok(ConsoleCommand::Strength(StrengthChange::Set(-3)))
        );
        assert_eq!(
            parse_command("strength up"),
            Ok(ConsoleCommand::Strength(StrengthChange::Up))
        );
    }

    #[test]
    fn parses_advance_units() {
        assert_eq!(
            parse_command("advance 90"),
            Ok(ConsoleCommand::Advance(Duration::from_secs(90)))
        );
        assert_eq!(
            parse_command("advance 2m"),
            Ok(ConsoleCommand::Advance(Duration::from_secs(120)))
        );
        assert_eq!(
            parse_command("advance soon"),
            Err(ConsoleError::Usage(help_topic("advance").unwrap()))
        );
    }

    #[test]
    fn rejects_advances_longer_than_a_day() {
        assert_eq!(
            parse_command("advance 1440m"),
            Ok(ConsoleCommand::Advance(Duration::from_secs(86_400)))
        );
        for line in ["advance 1441m", "advance 99999999999m", "advance 99999999999999999999"] {
            assert_eq!(
                parse_command(line),
                Err(ConsoleError::Usage(help_topic("advance").unwrap())),
                "{line}"
            );
        }
    }

    #[test]
    fn parses_optional_arguments() {
        assert_eq!(parse_command("journal"), Ok(ConsoleCommand::Journal(None)));
        assert_eq!(
            parse_command("journal 5"),
            Ok(ConsoleCommand::Journal(Some(5)))
        );
        assert_eq!(
            parse_command("help timer"),
            Ok(ConsoleCommand::Help(Some("timer".to_owned())))
        );
        assert_eq!(
            parse_command("battery 3.6"),
            Ok(ConsoleCommand::Battery(3.6))
        );
    }

    #[test]
    fn rejects_trailing_input_and_unknown_words() {
        assert_eq!(
            parse_command("start now"),
            Err(ConsoleError::Usage(help_topic("start").unwrap()))
        );
        assert_eq!(
            parse_command("reboot"),
            Err(ConsoleError::UnknownCommand("reboot".to_owned()))
        );
    }
}
