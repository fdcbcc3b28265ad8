//! # Routine arena: generational slots holding routine records.
//!
//! The routine tree (parent, children) is stored as ids into this arena rather
//! than as owning pointers, so stopping a subtree is an iterative walk and a
//! stale id (a routine that already finished) simply misses.
//!
//! ## Rules
//! - `remove` bumps the slot generation; ids handed out before it never resolve again.
//! - Freed slots are reused LIFO.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use tokio_util::sync::CancellationToken;

use super::cx::Cx;
use super::ops::Op;
use crate::coordinator::Unsubscribe;
use crate::core::Runtime;
use crate::error::RoutineError;

/// Stable identity of a routine: arena index plus slot generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoutineId {
    index: u32,
    generation: u32,
}

impl RoutineId {
    pub(crate) fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}v{}", self.index, self.generation)
    }
}

/// How a routine body ended one run.
pub(crate) enum Completion {
    /// Finished; the thunk delivers the result to whoever asked for it.
    Done(Option<Box<dyn FnOnce(&Runtime)>>),
    /// Asked to be run again from the start.
    Restart,
    /// Failed with nobody to receive the error.
    Failed(RoutineError),
}

pub(crate) type Body = LocalBoxFuture<'static, Completion>;
pub(crate) type Start = Rc<dyn Fn(Cx) -> Body>;
/// Turns an error raised outside the body (restart limit) into a completion.
pub(crate) type Reject = Rc<dyn Fn(RoutineError) -> Completion>;

/// What a routine is parked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Waiting {
    /// Scheduled for a poll.
    Ready,
    /// Being polled.
    Running,
    /// An operation descriptor yielded at the given park sequence.
    Op(u64),
    /// A foreign future that will wake the routine through its waker.
    External(u64),
}

pub(crate) struct Record {
    pub(crate) name: Arc<str>,
    pub(crate) parent: Option<RoutineId>,
    pub(crate) children: Vec<RoutineId>,
    pub(crate) waiting: Waiting,
    pub(crate) seq: u64,
    pub(crate) body: Option<Body>,
    pub(crate) start: Start,
    pub(crate) reject: Reject,
    pub(crate) yielded: Rc<RefCell<Option<Op>>>,
    pub(crate) pending: Option<Unsubscribe>,
    pub(crate) on_stop: Option<Box<dyn FnOnce(&Runtime)>>,
    pub(crate) token: CancellationToken,
    pub(crate) restarts: u32,
}

struct Slot {
    generation: u32,
    record: Option<Record>,
}

#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Arena {
    pub(crate) fn insert(&mut self, record: Record) -> RoutineId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return RoutineId::from_raw(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        RoutineId::from_raw(index, 0)
    }

    pub(crate) fn get(&self, id: RoutineId) -> Option<&Record> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.record.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: RoutineId) -> Option<&mut Record> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.record.as_mut())
    }

    pub(crate) fn contains(&self, id: RoutineId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: RoutineId) -> Option<Record> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(record)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if some routine is parked on a foreign future.
    pub(crate) fn has_external(&self) -> bool {
        self.slots
            .iter()
            .filter_map(|s| s.record.as_ref())
            .any(|r| matches!(r.waiting, Waiting::External(_)))
    }
}
