//! # Operation descriptors.
//!
//! A routine never touches channels or timers directly while suspended. It builds a
//! [`Descriptor`] through its [`Cx`](super::Cx) and awaits it:
//!
//! ```text
//! body: cx.take(&ch)?.await
//!   poll #1 ─► slot empty ─► move Op into the routine's `yielded` cell ─► Pending
//!   scheduler ─► sees yielded Op ─► runs its effect (registers on the channel)
//!   channel resolves ─► Fill::fill(value) ─► slot = value, Resume ─► job queue
//!   scheduler ─► resume (seq matches) ─► poll #2 ─► slot full ─► Ready(value)
//! ```
//!
//! ## Rules
//! - One descriptor is awaited at a time; descriptors are not meant to be joined.
//! - A resume is tagged with the park sequence it was issued for; the scheduler
//!   discards it if the routine has moved on, restarted or been stopped.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::arena::RoutineId;
use super::scheduler;
use crate::coordinator::Unsubscribe;
use crate::core::{Runtime, WeakRuntime};

/// Kind of an operation descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpTag {
    Put,
    Take,
    Read,
    Sleep,
    Stop,
    CallRoutine,
    ForkRoutine,
    Noop,
}

impl OpTag {
    pub fn as_label(&self) -> &'static str {
        match self {
            OpTag::Put => "put",
            OpTag::Take => "take",
            OpTag::Read => "read",
            OpTag::Sleep => "sleep",
            OpTag::Stop => "stop",
            OpTag::CallRoutine => "call_routine",
            OpTag::ForkRoutine => "fork_routine",
            OpTag::Noop => "noop",
        }
    }
}

/// Runs the operation. Returns a handle the scheduler cancels if the routine
/// is stopped while the operation is pending.
pub(crate) type Effect = Box<dyn FnOnce(&Runtime, Resume) -> Option<Unsubscribe>>;

pub(crate) struct Op {
    pub(crate) tag: OpTag,
    /// `None` for [`OpTag::Stop`], which the scheduler handles itself.
    pub(crate) effect: Option<Effect>,
}

/// Wakes a routine parked on an operation.
#[derive(Clone)]
pub(crate) struct Resume {
    pub(crate) rt: WeakRuntime,
    pub(crate) id: RoutineId,
    pub(crate) seq: u64,
}

impl Resume {
    pub(crate) fn resume(&self) {
        if let Some(rt) = self.rt.upgrade() {
            let (id, seq) = (self.id, self.seq);
            rt.defer(move |rt| scheduler::resume(rt, id, seq));
        }
    }
}

/// Fills a descriptor's slot and resumes its routine.
pub(crate) struct Fill<V> {
    slot: Rc<RefCell<Option<V>>>,
    resume: Resume,
}

impl<V> Clone for Fill<V> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            resume: self.resume.clone(),
        }
    }
}

impl<V> Fill<V> {
    pub(crate) fn fill(&self, value: V) {
        *self.slot.borrow_mut() = Some(value);
        self.resume.resume();
    }
}

/// Awaitable operation produced by [`Cx`](super::Cx).
///
/// Resolves with the operation's result once the scheduler resumes the routine.
/// Awaiting it anywhere but inside the routine that created it never resolves.
#[must_use = "descriptors do nothing unless awaited"]
pub struct Descriptor<V> {
    tag: OpTag,
    op: Option<Op>,
    slot: Rc<RefCell<Option<V>>>,
    yielded: Rc<RefCell<Option<Op>>>,
}

impl<V: 'static> Descriptor<V> {
    pub(crate) fn new(
        tag: OpTag,
        yielded: Rc<RefCell<Option<Op>>>,
        run: impl FnOnce(&Runtime, Fill<V>) -> Option<Unsubscribe> + 'static,
    ) -> Self {
        let slot = Rc::new(RefCell::new(None));
        let fill_slot = slot.clone();
        let effect: Effect = Box::new(move |rt, resume| {
            run(
                rt,
                Fill {
                    slot: fill_slot,
                    resume,
                },
            )
        });
        Self {
            tag,
            op: Some(Op {
                tag,
                effect: Some(effect),
            }),
            slot,
            yielded,
        }
    }

    pub(crate) fn stop(yielded: Rc<RefCell<Option<Op>>>) -> Self {
        Self {
            tag: OpTag::Stop,
            op: Some(Op {
                tag: OpTag::Stop,
                effect: None,
            }),
            slot: Rc::new(RefCell::new(None)),
            yielded,
        }
    }
}

impl<V> Descriptor<V> {
    #[inline]
    pub fn tag(&self) -> OpTag {
        self.tag
    }
}

impl<V> fmt::Debug for Descriptor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("tag", &self.tag)
            .field("yielded", &self.op.is_none())
            .finish()
    }
}

impl<V> Future for Descriptor<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<V> {
        let this = self.get_mut();
        if let Some(value) = this.slot.borrow_mut().take() {
            return Poll::Ready(value);
        }
        if let Some(op) = this.op.take() {
            *this.yielded.borrow_mut() = Some(op);
        }
        Poll::Pending
    }
}
