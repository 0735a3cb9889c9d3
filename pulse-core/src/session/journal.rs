//! Fixed-capacity journal of controller events.
//!
//! The journal is the structured record of what the controller decided and
//! why: lifecycle transitions, link changes, replays and dropped commands.
//! With the `defmt` feature each entry is also logged as it is written.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::Intensity;
use crate::modes::StimulationMode;
use crate::telemetry::{TelemetryError, TelemetryFrame};

/// Number of journal entries retained in memory.
pub const JOURNAL_CAPACITY: usize = 64;

/// Monotonic identifier assigned to each journal entry.
pub type EventId = u32;

/// Why a session ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndReason {
    Stopped,
    Expired,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => f.write_str("stopped"),
            EndReason::Expired => f.write_str("expired"),
        }
    }
}

/// Controller events worth keeping.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JournalEvent {
    SessionStarted {
        mode: StimulationMode,
        total_secs: u32,
        strength: Intensity,
    },
    SessionPaused {
        elapsed_secs: u32,
    },
    SessionResumed {
        elapsed_secs: u32,
    },
    SessionEnded {
        reason: EndReason,
        elapsed_secs: u32,
    },
    LinkLost,
    LinkReady,
    /// Missed countdown periods were folded into a single clock jump.
    ClockSkipped {
        from_secs: u32,
        to_secs: u32,
    },
    /// Device state was rebuilt from the session clock.
    ReplaySent {
        elapsed_secs: u32,
        commands: u8,
    },
    /// Commands computed while the link was down.
    CommandsDropped {
        count: u8,
    },
    Keepalive(Intensity),
    StrengthChanged(Intensity),
    TelemetryUpdated(TelemetryFrame),
    TelemetryDiscarded(TelemetryError),
}

impl JournalEvent {
    /// Returns `true` for events that indicate degraded operation.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            JournalEvent::LinkLost
                | JournalEvent::ClockSkipped { .. }
                | JournalEvent::CommandsDropped { .. }
                | JournalEvent::TelemetryDiscarded(_)
        )
    }
}

impl fmt::Display for JournalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalEvent::SessionStarted {
                mode,
                total_secs,
                strength,
            } => write!(f, "session-started {mode} {total_secs}s strength={strength}"),
            JournalEvent::SessionPaused { elapsed_secs } => {
                write!(f, "session-paused at {elapsed_secs}s")
            }
            JournalEvent::SessionResumed { elapsed_secs } => {
                write!(f, "session-resumed at {elapsed_secs}s")
            }
            JournalEvent::SessionEnded {
                reason,
                elapsed_secs,
            } => write!(f, "session-ended {reason} at {elapsed_secs}s"),
            JournalEvent::LinkLost => f.write_str("link-lost"),
            JournalEvent::LinkReady => f.write_str("link-ready"),
            JournalEvent::ClockSkipped { from_secs, to_secs } => {
                write!(f, "clock-skipped {from_secs}s -> {to_secs}s")
            }
            JournalEvent::ReplaySent {
                elapsed_secs,
                commands,
            } => write!(f, "replay-sent {commands} commands at {elapsed_secs}s"),
            JournalEvent::CommandsDropped { count } => write!(f, "commands-dropped {count}"),
            JournalEvent::Keepalive(level) => write!(f, "keepalive {level}"),
            JournalEvent::StrengthChanged(level) => write!(f, "strength-changed {level}"),
            JournalEvent::TelemetryUpdated(TelemetryFrame::Battery { volts }) => {
                write!(f, "telemetry battery {volts:.2}V")
            }
            JournalEvent::TelemetryUpdated(TelemetryFrame::Charging(charging)) => {
                write!(f, "telemetry charging={charging}")
            }
            JournalEvent::TelemetryDiscarded(error) => write!(f, "telemetry-discarded: {error}"),
        }
    }
}

/// Entry stored in the journal ring.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JournalRecord<I>
where
    I: Copy,
{
    pub id: EventId,
    pub timestamp: I,
    pub event: JournalEvent,
}

/// Ring of the most recent controller events.
pub struct SessionJournal<I, const CAPACITY: usize = JOURNAL_CAPACITY>
where
    I: Copy,
{
    ring: HistoryBuf<JournalRecord<I>, CAPACITY>,
    next_event_id: EventId,
}

impl<I, const CAPACITY: usize> SessionJournal<I, CAPACITY>
where
    I: Copy,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event, evicting the oldest entry once full.
    pub fn record(&mut self, event: JournalEvent, timestamp: I) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        emit_log(&event);
        self.ring.write(JournalRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    /// Entries in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, JournalRecord<I>> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&JournalRecord<I>> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of events ever recorded, including evicted ones.
    #[must_use]
    pub const fn recorded(&self) -> EventId {
        self.next_event_id
    }
}

impl<I, const CAPACITY: usize> Default for SessionJournal<I, CAPACITY>
where
    I: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
fn emit_log(event: &JournalEvent) {
    if event.is_warning() {
        defmt::warn!("session: {}", event);
    } else {
        defmt::info!("session: {}", event);
    }
}

#[cfg(not(feature = "defmt"))]
fn emit_log(_: &JournalEvent) {}
