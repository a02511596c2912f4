//! Per-slot retransmission timers.
//!
//! The sender never schedules anything itself.  It asks a [`TimerService`]
//! to arm or cancel the timer of one window slot, and the harness calls
//! [`crate::sender::SrSender::on_timer`] back when that timer fires.
//!
//! Contract for every implementation:
//! - Timers are keyed by slot index (`seq mod W`).
//! - Arming a slot that is already armed **replaces** the old deadline; two
//!   fires for the same slot are never stacked.
//! - Cancelling affects exactly one slot.
//! - Each arm fires at most once.
//!
//! Two implementations ship with the crate: the virtual-clock service inside
//! [`crate::simulator`], and [`SlotDeadlines`] for the tokio event loops in
//! [`crate::link`].

use std::time::Duration;

use tokio::time::Instant;

/// Start/stop interface the sender uses for its per-slot timers.
pub trait TimerService {
    /// Arm (or re-arm) the timer for `slot` to fire after `after`.
    fn arm(&mut self, slot: usize, after: Duration);

    /// Disarm the timer for `slot`.  A no-op when it is not armed.
    fn cancel(&mut self, slot: usize);
}

/// Deadline table with one entry per window slot, driven by a tokio clock.
///
/// The owning event loop sleeps until [`next_deadline`](Self::next_deadline)
/// and then collects the expired slots with [`take_due`](Self::take_due).
#[derive(Debug, Clone)]
pub struct SlotDeadlines {
    deadlines: Vec<Option<Instant>>,
}

impl SlotDeadlines {
    pub fn new(slots: usize) -> Self {
        Self {
            deadlines: vec![None; slots],
        }
    }

    /// Earliest pending deadline, or `None` when no slot is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every slot whose deadline is at or before `now`,
    /// in slot order.
    pub fn take_due(&mut self, now: Instant) -> Vec<usize> {
        let mut due = Vec::new();
        for (slot, deadline) in self.deadlines.iter_mut().enumerate() {
            if deadline.is_some_and(|d| d <= now) {
                *deadline = None;
                due.push(slot);
            }
        }
        due
    }

    /// Number of armed slots.
    pub fn armed(&self) -> usize {
        self.deadlines.iter().filter(|d| d.is_some()).count()
    }
}

impl TimerService for SlotDeadlines {
    fn arm(&mut self, slot: usize, after: Duration) {
        if let Some(deadline) = self.deadlines.get_mut(slot) {
            *deadline = Some(Instant::now() + after);
        }
    }

    fn cancel(&mut self, slot: usize) {
        if let Some(deadline) = self.deadlines.get_mut(slot) {
            *deadline = None;
        }
    }
}
