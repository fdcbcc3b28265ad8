//! Ordered timer map driven by [`Runtime::run`](crate::Runtime::run).
//!
//! Entries are keyed by `(deadline, seq)` so timers with the same deadline fire
//! in the order they were scheduled. Deadlines use [`tokio::time::Instant`], which
//! follows tokio's paused clock in tests.

use std::collections::BTreeMap;

use tokio::time::Instant;

use super::runtime::Job;

/// Handle used to cancel a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerKey {
    at: Instant,
    seq: u64,
}

#[derive(Default)]
pub(crate) struct Timers {
    seq: u64,
    entries: BTreeMap<TimerKey, Job>,
}

impl Timers {
    pub(crate) fn insert(&mut self, at: Instant, job: Job) -> TimerKey {
        self.seq += 1;
        let key = TimerKey { at, seq: self.seq };
        self.entries.insert(key, job);
        key
    }

    pub(crate) fn cancel(&mut self, key: TimerKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|k| k.at)
    }

    /// Removes and returns every job whose deadline is `<= now`, in firing order.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<Job> {
        let later = self.entries.split_off(&TimerKey {
            at: now,
            seq: u64::MAX,
        });
        let due = std::mem::replace(&mut self.entries, later);
        due.into_values().collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::Runtime;

    fn noop() -> Job {
        Box::new(|_: &Runtime| {})
    }

    #[test]
    fn test_pop_due_keeps_future_entries() {
        let now = Instant::now();
        let mut t = Timers::default();
        t.insert(now + Duration::from_millis(10), noop());
        t.insert(now, noop());
        t.insert(now + Duration::from_millis(20), noop());

        assert_eq!(t.pop_due(now).len(), 1);
        assert_eq!(t.next_deadline(), Some(now + Duration::from_millis(10)));
        assert_eq!(t.pop_due(now + Duration::from_millis(15)).len(), 1);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_cancel_removes_entry() {
        let now = Instant::now();
        let mut t = Timers::default();
        let key = t.insert(now, noop());
        assert!(t.cancel(key));
        assert!(!t.cancel(key));
        assert_eq!(t.next_deadline(), None);
    }
}
