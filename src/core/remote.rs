//! Thread-safe wake queue for routines parked on foreign futures.
//!
//! The runtime itself is single-threaded, but a foreign future awaited inside a
//! routine (a tokio timer, a oneshot receiver, ...) may be woken from any thread.
//! Its waker is a [`RoutineWaker`] that records `(routine, seq)` in [`Remote`] and
//! notifies the run loop; the runtime drains the queue when its job queue is empty.
//!
//! ## Rules
//! - A wake is matched against the routine's current park sequence; stale wakes
//!   (the routine moved on, was stopped or restarted) are discarded.
//! - `notify_one` stores a permit, so a wake that lands before the run loop parks
//!   is not lost.

use std::sync::Arc;
use std::task::Wake;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::routine::RoutineId;

#[derive(Default)]
pub(crate) struct Remote {
    woken: Mutex<Vec<(RoutineId, u64)>>,
    pub(crate) notify: Notify,
}

impl Remote {
    pub(crate) fn wake(&self, id: RoutineId, seq: u64) {
        self.woken.lock().push((id, seq));
        self.notify.notify_one();
    }

    pub(crate) fn drain(&self) -> Vec<(RoutineId, u64)> {
        std::mem::take(&mut *self.woken.lock())
    }
}

pub(crate) struct RoutineWaker {
    pub(crate) remote: Arc<Remote>,
    pub(crate) id: RoutineId,
    pub(crate) seq: u64,
}

impl Wake for RoutineWaker {
    fn wake(self: Arc<Self>) {
        self.remote.wake(self.id, self.seq);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.remote.wake(self.id, self.seq);
    }
}

#[cfg(test)]
mod tests {
    use std::task::Waker;

    use super::*;

    #[test]
    fn test_waker_records_routine_and_seq() {
        let remote = Arc::new(Remote::default());
        let id = RoutineId::from_raw(3, 1);
        let waker = Waker::from(Arc::new(RoutineWaker {
            remote: remote.clone(),
            id,
            seq: 7,
        }));

        waker.wake_by_ref();
        std::thread::spawn(move || waker.wake()).join().expect("thread");

        assert_eq!(remote.drain(), vec![(id, 7), (id, 7)]);
        assert!(remote.drain().is_empty());
    }
}
