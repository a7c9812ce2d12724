//! Pending one-shot timers. The event loop polls the queue on its tick and
//! feeds fired timers back into dispatch; nothing runs concurrently.

use crate::ModeId;
use chrono::NaiveDateTime;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    AutoAdvance,
    PaceOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub id: TimerId,
    pub owner: ModeId,
    pub due: NaiveDateTime,
    pub kind: TimerKind,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: TimerId,
    pending: Vec<Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, owner: ModeId, due: NaiveDateTime, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.push(Timer {
            id,
            owner,
            due,
            kind,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.id != id);
        self.pending.len() != before
    }

    /// Drops every timer a mode owns. Called when the mode leaves the stack.
    pub fn cancel_owner(&mut self, owner: ModeId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.owner != owner);
        before - self.pending.len()
    }

    /// Removes and returns the timers due at `now`, earliest first.
    pub fn take_due(&mut self, now: NaiveDateTime) -> Vec<Timer> {
        let (mut fired, rest): (Vec<Timer>, Vec<Timer>) =
            self.pending.drain(..).partition(|timer| timer.due <= now);
        self.pending = rest;
        fired.sort_by_key(|timer| (timer.due, timer.id));
        fired
    }

    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.pending.iter().map(|timer| timer.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid date")
            + Duration::seconds(secs)
    }

    #[test]
    fn fires_in_due_order() {
        let mut queue = TimerQueue::new();
        let late = queue.schedule(ModeId(1), at(10), TimerKind::AutoAdvance);
        let early = queue.schedule(ModeId(1), at(5), TimerKind::PaceOpen);
        assert!(queue.take_due(at(4)).is_empty());
        let fired: Vec<TimerId> = queue.take_due(at(10)).iter().map(|t| t.id).collect();
        assert_eq!(fired, vec![early, late]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_owner_only_drops_that_mode() {
        let mut queue = TimerQueue::new();
        queue.schedule(ModeId(1), at(1), TimerKind::AutoAdvance);
        queue.schedule(ModeId(2), at(1), TimerKind::PaceOpen);
        queue.schedule(ModeId(2), at(2), TimerKind::PaceOpen);
        assert_eq!(queue.cancel_owner(ModeId(2)), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(at(1)));
    }

    #[test]
    fn cancel_by_id() {
        let mut queue = TimerQueue::new();
        let id = queue.schedule(ModeId(1), at(1), TimerKind::AutoAdvance);
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
    }
}
