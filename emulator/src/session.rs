use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::Duration;

use pulse_core::command::Command;
use pulse_core::modes::DeviceState;
use pulse_core::session::{ControllerSettings, EventId, SessionController};
use pulse_core::transport::LinkEvent;

use crate::console::{
    self, ConsoleCommand, ConsoleError, HELP_TOPICS, StrengthChange, TimerAdjust,
};
use crate::link::SimulatedLink;

const DEFAULT_JOURNAL_LINES: usize = 10;
const SECOND: Duration = Duration::from_secs(1);

/// Simulated monotonic clock, measured from emulator start.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(Duration);

impl SimInstant {
    pub const ZERO: Self = Self(Duration::ZERO);

    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    Sleep,
    Recovery,
    Breathing,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-session.log",
            TranscriptProfile::Sleep => "transcripts/emulator-sleep.log",
            TranscriptProfile::Recovery => "transcripts/emulator-recovery.log",
            TranscriptProfile::Breathing => "transcripts/emulator-breathing.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "Pulse Emulator session transcript",
            TranscriptProfile::Sleep => "Pulse Emulator sleep session transcript",
            TranscriptProfile::Recovery => "Pulse Emulator link recovery transcript",
            TranscriptProfile::Breathing => "Pulse Emulator breathing-gated transcript",
        }
    }
}

/// One operator console bound to a controller and a simulated device.
pub struct Session {
    controller: SessionController<SimulatedLink, SimInstant>,
    clock: SimInstant,
    transcript: TranscriptLogger,
    journal_cursor: EventId,
}

impl Session {
    pub fn new(path: &Path, header: &str) -> io::Result<Self> {
        Ok(Self {
            controller: SessionController::new(SimulatedLink::new(), ControllerSettings::default()),
            clock: SimInstant::ZERO,
            transcript: TranscriptLogger::create(path, header)?,
            journal_cursor: 0,
        })
    }

    pub fn for_profile(profile: TranscriptProfile) -> io::Result<Self> {
        Self::new(Path::new(profile.log_path()), profile.header())
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.clock.since_start();
        self.transcript.operator(elapsed, trimmed)?;

        let mut lines = match console::parse_command(trimmed) {
            Ok(command) => self.execute(command),
            Err(ConsoleError::UnknownCommand(word)) => vec![
                format!("ERR syntax unknown command `{word}`"),
                format!("Available commands: {}", console::help_topic_list()),
            ],
            Err(error) => vec![format!("ERR syntax {error}")],
        };
        lines.extend(self.collect_activity());

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    /// Moves simulated time forward one second at a time.
    pub fn advance(&mut self, by: Duration) -> io::Result<Vec<String>> {
        let elapsed = self.clock.since_start();
        let lines = self.step(by);
        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        let now = self.clock;
        match command {
            ConsoleCommand::Mode(mode) => match self.controller.select_mode(mode) {
                Ok(()) => vec![self.describe_config("mode")],
                Err(error) => vec![format!("ERR mode {error}")],
            },
            ConsoleCommand::Feel(feeling) => match self.controller.select_feeling(feeling) {
                Ok(()) => vec![self.describe_config(&format!("feel {feeling} ->"))],
                Err(error) => vec![format!("ERR feel {error}")],
            },
            ConsoleCommand::Timer(adjust) => {
                let result = match adjust {
                    TimerAdjust::Up => self.controller.increase_timer(),
                    TimerAdjust::Down => self.controller.decrease_timer(),
                };
                match result {
                    Ok(minutes) => vec![format!("OK timer {minutes} min")],
                    Err(error) => vec![format!("ERR timer {error}")],
                }
            }
            ConsoleCommand::Strength(change) => {
                let current = i32::from(self.controller.config().strength.get());
                let requested = match change {
                    StrengthChange::Set(value) => value,
                    StrengthChange::Up => current + 1,
                    StrengthChange::Down => current - 1,
                };
                let applied = self.controller.set_strength(requested, now);
                if i32::from(applied.get()) == requested {
                    vec![format!("OK strength {applied}")]
                } else {
                    vec![format!("OK strength {applied} (clamped from {requested})")]
                }
            }
            ConsoleCommand::Start => self.lifecycle("start", |controller| controller.start(now)),
            ConsoleCommand::Pause => self.lifecycle("pause", |controller| controller.pause(now)),
            ConsoleCommand::Resume => self.lifecycle("resume", |controller| controller.resume(now)),
            ConsoleCommand::Stop => self.lifecycle("stop", |controller| controller.stop(now)),
            ConsoleCommand::Advance(by) => self.step(by),
            ConsoleCommand::Disconnect => {
                self.controller.transport_mut().disconnect();
                self.controller
                    .handle_link_event(LinkEvent::Disconnected, now);
                vec!["OK link down".to_string()]
            }
            ConsoleCommand::Connect => {
                if self.controller.transport().is_up() {
                    return vec!["OK link already up".to_string()];
                }
                self.controller.transport_mut().connect();
                self.controller.handle_link_event(LinkEvent::Ready, now);
                vec!["OK link ready".to_string()]
            }
            ConsoleCommand::Battery(volts) => {
                self.controller.transport_mut().set_battery_volts(volts);
                vec![format!("OK battery {volts:.2}V (reported on next poll)")]
            }
            ConsoleCommand::Charging(charging) => {
                self.controller.transport_mut().set_charging(charging);
                vec![format!("OK charging={charging} (reported on next poll)")]
            }
            ConsoleCommand::Status => self.describe_status(),
            ConsoleCommand::Journal(count) => self.describe_journal(count.unwrap_or(DEFAULT_JOURNAL_LINES)),
            ConsoleCommand::Help(topic) => describe_help(topic.as_deref()),
        }
    }

    fn lifecycle<F, E>(&mut self, label: &str, operation: F) -> Vec<String>
    where
        F: FnOnce(&mut SessionController<SimulatedLink, SimInstant>) -> Result<(), E>,
        E: std::fmt::Display,
    {
        match operation(&mut self.controller) {
            Ok(()) => vec![format!("OK {label} {}", self.controller.status())],
            Err(error) => vec![format!("ERR {label} {error}")],
        }
    }

    fn step(&mut self, by: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..by.as_secs() {
            self.clock = self.clock + SECOND;
            self.controller.poll(self.clock);
            lines.extend(self.collect_activity());
        }
        lines.push(format!(
            "OK t=+{}s {}",
            self.clock.since_start().as_secs(),
            self.controller.status()
        ));
        lines
    }

    /// Delivers pending device notifications, then reports wire traffic and
    /// new journal entries.
    fn collect_activity(&mut self) -> Vec<String> {
        let now = self.clock;
        let mut lines = Vec::new();
        loop {
            let wire = self.controller.transport_mut().drain_wire();
            lines.extend(wire.iter().map(|command| describe_wire(*command)));

            let Some(frame) = self.controller.transport_mut().next_notification() else {
                break;
            };
            self.controller
                .handle_link_event(LinkEvent::Notification(&frame), now);
        }

        for record in self.controller.journal().oldest_first() {
            if record.id >= self.journal_cursor {
                lines.push(format!(
                    "LOG +{}s #{} {}",
                    record.timestamp.since_start().as_secs(),
                    record.id,
                    record.event
                ));
            }
        }
        self.journal_cursor = self.controller.journal().recorded();
        lines
    }

    fn describe_config(&self, label: &str) -> String {
        let config = self.controller.config();
        format!(
            "OK {label} {} timer={} min strength={}",
            config.mode, config.timer_minutes, config.strength
        )
    }

    fn describe_status(&self) -> Vec<String> {
        let controller = &self.controller;
        let link = controller.transport();
        let config = controller.config();
        vec![
            format!("session: {}", controller.status()),
            format!(
                "config: mode={} timer={} min strength={}",
                config.mode, config.timer_minutes, config.strength
            ),
            format!(
                "link: {} rejected-frames={}",
                if link.is_up() { "ready" } else { "down" },
                link.rejected_frames()
            ),
            format!("device: {}", describe_device(link.device().state())),
            format!("telemetry: {}", controller.telemetry()),
        ]
    }

    fn describe_journal(&self, count: usize) -> Vec<String> {
        let journal = self.controller.journal();
        let skip = journal.len().saturating_sub(count);
        let mut lines: Vec<String> = journal
            .oldest_first()
            .skip(skip)
            .map(|record| {
                format!(
                    "+{}s #{} {}",
                    record.timestamp.since_start().as_secs(),
                    record.id,
                    record.event
                )
            })
            .collect();
        if lines.is_empty() {
            lines.push("journal empty".to_string());
        }
        lines
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript.output(elapsed, line)?;
        }
        Ok(())
    }
}

fn describe_wire(command: Command) -> String {
    format!("TX {} ({command})", char::from(command.token()))
}

fn describe_device(state: DeviceState) -> String {
    match state {
        DeviceState::Idle => "idle".to_string(),
        DeviceState::Stimulating { channel, intensity } => {
            format!("{} @ {intensity}", channel.label())
        }
    }
}

fn describe_help(topic: Option<&str>) -> Vec<String> {
    match topic {
        Some(target) if !target.is_empty() => match console::help_topic(target) {
            Some(usage) => vec![usage.to_string()],
            None => vec![
                format!("No help available for `{target}`."),
                format!("Available topics: {}", console::help_topic_list()),
            ],
        },
        _ => {
            let mut lines = vec!["Available commands:".to_string()];
            lines.extend(HELP_TOPICS.iter().map(|(_, usage)| format!("  {usage}")));
            lines.push("Type `help <topic>` for a specific command.".to_string());
            lines
        }
    }
}

/// Transcript of one emulator run, stamped with the simulated session clock.
struct TranscriptLogger {
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# {header}")?;
        writeln!(
            writer,
            "# mm:ss is simulated time; OP operator, TX link frame, LOG journal, RE reply"
        )?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    fn operator(&mut self, at: Duration, line: &str) -> io::Result<()> {
        self.write(at, TranscriptRole::Operator, line)
    }

    fn output(&mut self, at: Duration, line: &str) -> io::Result<()> {
        let (role, text) = TranscriptRole::classify(line);
        self.write(at, role, text)
    }

    fn write(&mut self, at: Duration, role: TranscriptRole, text: &str) -> io::Result<()> {
        let secs = at.as_secs();
        writeln!(
            self.writer,
            "{:02}:{:02} {:<3} {text}",
            secs / 60,
            secs % 60,
            role.tag()
        )?;
        self.writer.flush()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TranscriptRole {
    Operator,
    Wire,
    Journal,
    Reply,
}

impl TranscriptRole {
    /// Splits a console line into its role and the text after the role marker.
    fn classify(line: &str) -> (Self, &str) {
        if let Some(frame) = line.strip_prefix("TX ") {
            (TranscriptRole::Wire, frame)
        } else if let Some(entry) = line.strip_prefix("LOG ") {
            (TranscriptRole::Journal, entry)
        } else {
            (TranscriptRole::Reply, line)
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            TranscriptRole::Operator => "OP",
            TranscriptRole::Wire => "TX",
            TranscriptRole::Journal => "LOG",
            TranscriptRole::Reply => "RE",
        }
    }
}
