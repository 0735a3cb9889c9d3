//! Cancellable periodic timers driven by an external clock.
//!
//! The scheduler never sleeps. Callers pass the current instant to
//! [`Scheduler::next_due`] and dispatch whatever comes back. Every arm or
//! cancel bumps the slot's generation, so a [`TimerHandle`] captured before a
//! lifecycle change is recognisably stale when it is finally delivered.

use core::ops::Add;
use core::time::Duration;

const TIMER_KIND_COUNT: usize = 3;

/// Periodic callbacks owned by the session controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// One-second session clock.
    Countdown,
    /// Re-asserts the current intensity against the device's idle timeout.
    Keepalive,
    /// Re-requests battery and charging telemetry.
    StatusPoll,
}

impl TimerKind {
    pub const ALL: [TimerKind; TIMER_KIND_COUNT] = [
        TimerKind::Countdown,
        TimerKind::Keepalive,
        TimerKind::StatusPoll,
    ];

    const fn index(self) -> usize {
        match self {
            TimerKind::Countdown => 0,
            TimerKind::Keepalive => 1,
            TimerKind::StatusPoll => 2,
        }
    }
}

/// Identifies one arming of a timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle {
    pub kind: TimerKind,
    pub generation: u32,
}

#[derive(Copy, Clone, Debug)]
struct TimerSlot<I> {
    deadline: Option<I>,
    period: Duration,
    generation: u32,
}

impl<I> TimerSlot<I> {
    const fn idle() -> Self {
        Self {
            deadline: None,
            period: Duration::ZERO,
            generation: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Scheduler<I> {
    slots: [TimerSlot<I>; TIMER_KIND_COUNT],
}

impl<I> Scheduler<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Creates a scheduler with every timer disarmed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [TimerSlot::idle(), TimerSlot::idle(), TimerSlot::idle()],
        }
    }

    /// Arms `kind` to fire every `period`, first at `now + period`.
    ///
    /// Re-arming an armed timer replaces it; the previous handle goes stale.
    /// A zero period leaves the timer disarmed.
    pub fn schedule_every(&mut self, kind: TimerKind, now: I, period: Duration) -> TimerHandle {
        let slot = &mut self.slots[kind.index()];
        slot.generation = slot.generation.wrapping_add(1);
        slot.period = period;
        slot.deadline = if period.is_zero() {
            None
        } else {
            Some(now + period)
        };
        TimerHandle {
            kind,
            generation: slot.generation,
        }
    }

    /// Disarms `kind`. Handles issued before the call go stale.
    pub fn cancel(&mut self, kind: TimerKind) {
        let slot = &mut self.slots[kind.index()];
        if slot.deadline.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            slot.deadline = None;
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self, kind: TimerKind) -> Option<I> {
        self.slots[kind.index()].deadline
    }

    /// Handle for the current arming of `kind`, if armed.
    #[must_use]
    pub fn handle(&self, kind: TimerKind) -> Option<TimerHandle> {
        let slot = &self.slots[kind.index()];
        slot.deadline.map(|_| TimerHandle {
            kind,
            generation: slot.generation,
        })
    }

    /// Returns `true` if `handle` refers to the live arming of its timer.
    #[must_use]
    pub fn is_current(&self, handle: TimerHandle) -> bool {
        let slot = &self.slots[handle.kind.index()];
        slot.deadline.is_some() && slot.generation == handle.generation
    }

    /// Earliest timer whose deadline is at or before `now`.
    #[must_use]
    pub fn next_due(&self, now: I) -> Option<TimerHandle> {
        TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let slot = &self.slots[kind.index()];
                slot.deadline
                    .filter(|deadline| *deadline <= now)
                    .map(|deadline| (deadline, kind, slot.generation))
            })
            .min_by_key(|(deadline, kind, _)| (*deadline, kind.index()))
            .map(|(_, kind, generation)| TimerHandle { kind, generation })
    }

    /// Consumes the firing of `handle` due at `now`.
    ///
    /// Every period that elapsed by `now` is folded into this one firing and
    /// the deadline moves to the first period boundary after `now`. Returns
    /// the number of periods consumed (at least one), or `None` for stale
    /// handles, which callers must ignore.
    pub fn fire(&mut self, handle: TimerHandle, now: I) -> Option<u32> {
        if !self.is_current(handle) {
            return None;
        }
        let slot = &mut self.slots[handle.kind.index()];
        let mut deadline = slot.deadline?;
        let mut periods = 0_u32;
        loop {
            deadline = deadline + slot.period;
            periods = periods.saturating_add(1);
            if deadline > now {
                break;
            }
        }
        slot.deadline = Some(deadline);
        Some(periods)
    }
}

impl<I> Default for Scheduler<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new()
    }
}
