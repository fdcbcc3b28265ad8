//! # Channels.
//!
//! [`Chan`] couples one [`Buffer`](super::buffer::Buffer) to a lifecycle state, a list of
//! readers (non-consuming subscribers) and a list of taps (mult targets).
//!
//! ## Architecture
//! ```text
//! put(item, cb) ──► state ≠ Open ? ──yes──► cb(terminal state)
//!                        │ no
//!                        ├──► live readers get a copy of item (one-shot readers dropped)
//!                        └──► buffer.put ──► Settled ──► runtime job queue
//!
//! take(cb) ─────► Ended / Closed+empty ──► cb(Ended)            (Closed → Ended)
//!                        │ otherwise
//!                        └──► buffer.take ──► Settled ──► runtime job queue
//! ```
//!
//! ## Rules
//! - Resolvers are never called while the channel is borrowed: the buffer collects
//!   them and the channel defers them onto the runtime after releasing its borrow.
//! - `close()` is idempotent; it resolves every pending put/take with the terminal
//!   state, notifies every reader with it, clears the readers and deregisters.
//! - `reset()` reopens the channel and clears the buffer; readers and taps survive.
//! - `unread_all()` drops this channel's readers without cancelling their calls,
//!   so a multi-channel listen keeps firing from its other channels.
//! - A channel only holds a weak reference to its runtime.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::buffer::{Buffer, PutResolver, Settled, TakeResolver};
use super::claim::{Claim, Ticket};
use super::signal::{ChannelState, Signal};
use crate::coordinator::Unsubscribe;
use crate::core::{Node, NodeId, Runtime, WeakRuntime};
use crate::events::{Event, EventKind};
use crate::policies::BufferPolicy;

/// Identity of a channel within its runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

pub(crate) type Notify<T> = Rc<dyn Fn(Signal<T>)>;

pub(crate) struct Reader<T> {
    ticket: Ticket,
    notify: Notify<T>,
}

pub(crate) struct Core<T> {
    pub(crate) state: ChannelState,
    pub(crate) buffer: Buffer<T>,
    pub(crate) readers: Vec<Reader<T>>,
    pub(crate) taps: Vec<Chan<T>>,
    pub(crate) pump: Option<Unsubscribe>,
}

impl<T: Clone> Core<T> {
    fn notify_readers(&mut self, item: &T, notes: &mut Vec<(Notify<T>, Signal<T>)>) {
        let mut kept = Vec::with_capacity(self.readers.len());
        for r in self.readers.drain(..) {
            if r.ticket.try_claim() {
                notes.push((r.notify.clone(), Signal::Value(item.clone())));
            }
            if r.ticket.is_live() {
                kept.push(r);
            }
        }
        self.readers = kept;
    }

    fn remove(&mut self, key: u64) {
        self.buffer.remove(key);
        self.readers.retain(|r| r.ticket.key != key);
    }
}

struct Meta {
    id: ChannelId,
    name: Arc<str>,
    parent: Option<NodeId>,
    rt: WeakRuntime,
}

/// A channel carrying values of type `T`.
///
/// Cheap to clone: clones share the same channel.
pub struct Chan<T> {
    core: Rc<RefCell<Core<T>>>,
    meta: Rc<Meta>,
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> fmt::Debug for Chan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.try_borrow().map(|c| c.state).ok();
        f.debug_struct("Chan")
            .field("id", &self.meta.id)
            .field("name", &self.meta.name)
            .field("state", &state)
            .finish()
    }
}

/// Non-owning channel handle; see [`Chan::downgrade`].
pub struct WeakChan<T> {
    core: Weak<RefCell<Core<T>>>,
    meta: Rc<Meta>,
}

impl<T> Clone for WeakChan<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> WeakChan<T> {
    pub fn upgrade(&self) -> Option<Chan<T>> {
        self.core.upgrade().map(|core| Chan {
            core,
            meta: self.meta.clone(),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.meta.id
    }
}

impl<T: Clone + 'static> Chan<T> {
    pub(crate) fn new(
        rt: &Runtime,
        name: Option<Arc<str>>,
        policy: BufferPolicy,
        parent: Option<NodeId>,
    ) -> Self {
        let id = ChannelId(rt.next_channel());
        let name = name.unwrap_or_else(|| id.to_string().into());
        let chan = Self {
            core: Rc::new(RefCell::new(Core {
                state: ChannelState::Open,
                buffer: Buffer::new(policy),
                readers: Vec::new(),
                taps: Vec::new(),
                pump: None,
            })),
            meta: Rc::new(Meta {
                id,
                name,
                parent,
                rt: rt.downgrade(),
            }),
        };
        rt.registry().add(chan.node());
        chan
    }

    #[inline]
    pub fn id(&self) -> ChannelId {
        self.meta.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.meta.name.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.core.borrow().state
    }

    pub fn policy(&self) -> BufferPolicy {
        self.core.borrow().buffer.policy()
    }

    pub fn is_empty(&self) -> bool {
        self.core.borrow().buffer.is_empty()
    }

    /// Snapshot of the buffered values, oldest first.
    pub fn contents(&self) -> Vec<T> {
        self.core.borrow().buffer.contents().cloned().collect()
    }

    /// Number of producers waiting for space.
    pub fn pending_puts(&self) -> usize {
        self.core.borrow().buffer.pending_puts()
    }

    /// Number of consumers waiting for a value.
    pub fn pending_takes(&self) -> usize {
        self.core.borrow().buffer.pending_takes()
    }

    /// Number of live readers (one-shot and persistent).
    pub fn readers(&self) -> usize {
        self.core
            .borrow()
            .readers
            .iter()
            .filter(|r| r.ticket.is_live())
            .count()
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.meta.rt.upgrade()
    }

    pub(crate) fn weak_runtime(&self) -> &WeakRuntime {
        &self.meta.rt
    }

    pub fn downgrade(&self) -> WeakChan<T> {
        WeakChan {
            core: Rc::downgrade(&self.core),
            meta: self.meta.clone(),
        }
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_channel(&self, other: &Chan<T>) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn core(&self) -> &Rc<RefCell<Core<T>>> {
        &self.core
    }

    /// Puts `item`; `callback` receives `Value(true)` once stored or handed off,
    /// `Value(false)` if a dropping buffer discarded it, or the terminal state.
    pub fn put(&self, item: T, callback: impl FnOnce(Signal<bool>) + 'static) -> Unsubscribe {
        let Some(rt) = self.runtime() else {
            return Unsubscribe::default();
        };
        let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
        let handle = self.unsubscribe_for(&ticket);
        self.put_ticket(&rt, ticket, item, Box::new(callback));
        rt.flush();
        handle
    }

    /// Takes one value; `callback` receives it or the terminal state.
    pub fn take(&self, callback: impl FnOnce(Signal<T>) + 'static) -> Unsubscribe {
        let Some(rt) = self.runtime() else {
            return Unsubscribe::default();
        };
        let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
        let handle = self.unsubscribe_for(&ticket);
        self.take_ticket(&rt, ticket, Box::new(callback));
        rt.flush();
        handle
    }

    /// Reads the next value without consuming it.
    ///
    /// With `Config::read_initial_call` (default) a buffered head fires immediately.
    pub fn read(&self, callback: impl FnOnce(Signal<T>) + 'static) -> Unsubscribe {
        let Some(rt) = self.runtime() else {
            return Unsubscribe::default();
        };
        let once = Cell::new(Some(callback));
        let notify: Notify<T> = Rc::new(move |signal| {
            if let Some(cb) = once.take() {
                cb(signal);
            }
        });
        let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
        let handle = self.unsubscribe_for(&ticket);
        self.read_ticket(&rt, ticket, rt.config().read_initial_call, notify);
        rt.flush();
        handle
    }

    /// Calls `callback` for every value put on the channel (and once with the
    /// terminal state on close) until unsubscribed.
    pub fn listen(&self, callback: impl Fn(Signal<T>) + 'static) -> Unsubscribe {
        let Some(rt) = self.runtime() else {
            return Unsubscribe::default();
        };
        let ticket = Ticket::new(rt.next_key(), Claim::shared());
        let handle = self.unsubscribe_for(&ticket);
        self.read_ticket(&rt, ticket, rt.config().read_initial_call, Rc::new(callback));
        rt.flush();
        handle
    }

    /// Closes the channel. No-op if it is already closed or ended.
    pub fn close(&self) {
        let Some(rt) = self.runtime() else {
            return;
        };
        let mut settled = Vec::new();
        let mut notes = Vec::new();
        let state = {
            let mut core = self.core.borrow_mut();
            if core.state.is_terminal() {
                return;
            }
            let state = if core.buffer.is_empty() {
                ChannelState::Ended
            } else {
                ChannelState::Closed
            };
            core.state = state;
            core.buffer.close(state, &mut settled);
            for r in core.readers.drain(..) {
                if r.ticket.try_claim() {
                    notes.push((r.notify, Signal::terminal(state)));
                }
            }
            state
        };
        dispatch_settled(&rt, settled);
        dispatch_notes(&rt, notes);

        rt.registry().remove(NodeId::Channel(self.id()));
        rt.registry().emit(
            Event::new(EventKind::ChannelClosed)
                .with_node(NodeId::Channel(self.id()))
                .with_name(self.name_arc())
                .with_reason(state.as_label()),
        );
        rt.flush();
    }

    /// Reopens the channel with an empty buffer. Pending puts and takes are dropped
    /// unresolved; readers and taps are kept and a tapped channel is pumped again.
    pub fn reset(&self) {
        let Some(rt) = self.runtime() else {
            return;
        };
        let (stale, tapped) = {
            let mut core = self.core.borrow_mut();
            core.state = ChannelState::Open;
            core.pump = None;
            (core.buffer.reset(), !core.taps.is_empty())
        };
        drop(stale);
        if tapped {
            crate::compose::pump(&rt, self);
        }

        rt.registry().add(self.node());
        rt.registry().emit(
            Event::new(EventKind::ChannelReset)
                .with_node(NodeId::Channel(self.id()))
                .with_name(self.name_arc()),
        );
        rt.flush();
    }

    /// Removes every reader of this channel. Returns how many were live.
    pub fn unread_all(&self) -> usize {
        let dropped = std::mem::take(&mut self.core.borrow_mut().readers);
        dropped.iter().filter(|r| r.ticket.is_live()).count()
    }

    pub(crate) fn put_ticket(&self, rt: &Runtime, ticket: Ticket, item: T, resolver: PutResolver) {
        let mut notes = Vec::new();
        let mut settled = Vec::new();
        {
            let mut core = self.core.borrow_mut();
            if core.state.is_terminal() {
                if ticket.try_claim() {
                    settled.push(Settled::Put(resolver, Signal::terminal(core.state)));
                }
            } else {
                core.notify_readers(&item, &mut notes);
                core.buffer.put(ticket, item, resolver, &mut settled);
            }
        }
        dispatch_notes(rt, notes);
        dispatch_settled(rt, settled);
    }

    pub(crate) fn take_ticket(&self, rt: &Runtime, ticket: Ticket, resolver: TakeResolver<T>) {
        let mut settled = Vec::new();
        {
            let mut core = self.core.borrow_mut();
            let drained = core.state == ChannelState::Ended
                || (core.state == ChannelState::Closed && core.buffer.is_empty());
            if drained {
                core.state = ChannelState::Ended;
                if ticket.try_claim() {
                    settled.push(Settled::Take(resolver, Signal::Ended));
                }
            } else {
                core.buffer.take(ticket, resolver, &mut settled);
                if core.state == ChannelState::Closed && core.buffer.is_empty() {
                    core.state = ChannelState::Ended;
                }
            }
        }
        dispatch_settled(rt, settled);
    }

    pub(crate) fn read_ticket(&self, rt: &Runtime, ticket: Ticket, initial_call: bool, notify: Notify<T>) {
        let mut notes = Vec::new();
        {
            let mut core = self.core.borrow_mut();
            let drained = core.state == ChannelState::Ended
                || (core.state == ChannelState::Closed && core.buffer.is_empty());
            if drained {
                core.state = ChannelState::Ended;
                if ticket.try_claim() {
                    notes.push((notify, Signal::Ended));
                }
            } else {
                if initial_call {
                    if let Some(head) = core.buffer.head().cloned() {
                        if ticket.try_claim() {
                            notes.push((notify.clone(), Signal::Value(head)));
                        }
                    }
                }
                if ticket.is_live() {
                    core.readers.push(Reader { ticket, notify });
                }
            }
        }
        dispatch_notes(rt, notes);
    }

    #[cfg(test)]
    pub(crate) fn queued_takes(&self) -> usize {
        self.core.borrow().buffer.queued_takes()
    }

    /// Returns `true` if the channel has a consumer waiting for a value.
    pub(crate) fn has_live_takers(&self) -> bool {
        self.core.borrow().buffer.has_live_takers()
    }

    pub(crate) fn unsubscribe_for(&self, ticket: &Ticket) -> Unsubscribe {
        let mut handle = Unsubscribe::default();
        handle.push_claim(ticket.claim.clone());
        handle.push_detach(self.detach(ticket.key));
        handle
    }

    pub(crate) fn detach(&self, key: u64) -> Box<dyn FnOnce()> {
        let weak = Rc::downgrade(&self.core);
        Box::new(move || {
            if let Some(core) = weak.upgrade() {
                if let Ok(mut core) = core.try_borrow_mut() {
                    core.remove(key);
                }
            }
        })
    }

    fn node(&self) -> Node {
        Node {
            id: NodeId::Channel(self.meta.id),
            name: self.meta.name.clone(),
            parent: self.meta.parent,
        }
    }
}

pub(crate) fn dispatch_notes<T: 'static>(rt: &Runtime, notes: Vec<(Notify<T>, Signal<T>)>) {
    for (notify, signal) in notes {
        rt.defer(move |_| notify(signal));
    }
}

pub(crate) fn dispatch_settled<T: 'static>(rt: &Runtime, settled: Vec<Settled<T>>) {
    for s in settled {
        rt.defer(move |_| s.fire());
    }
}

impl Runtime {
    /// Creates a channel with the given buffer policy.
    pub fn chan<T: Clone + 'static>(&self, policy: BufferPolicy) -> Chan<T> {
        Chan::new(self, None, policy, None)
    }

    /// Creates a channel with `Config::default_buffer`.
    pub fn chan_default<T: Clone + 'static>(&self) -> Chan<T> {
        Chan::new(self, None, self.config().default_buffer, None)
    }

    /// Creates a named channel with the given buffer policy.
    pub fn named_chan<T: Clone + 'static>(&self, name: impl Into<Arc<str>>, policy: BufferPolicy) -> Chan<T> {
        Chan::new(self, Some(name.into()), policy, None)
    }

    /// Shorthand for `chan(BufferPolicy::Fixed(capacity))`.
    pub fn fixed<T: Clone + 'static>(&self, capacity: usize) -> Chan<T> {
        self.chan(BufferPolicy::Fixed(capacity))
    }

    /// Shorthand for `chan(BufferPolicy::Dropping(capacity))`.
    pub fn dropping<T: Clone + 'static>(&self, capacity: usize) -> Chan<T> {
        self.chan(BufferPolicy::Dropping(capacity))
    }

    /// Shorthand for `chan(BufferPolicy::Sliding(capacity))`.
    pub fn sliding<T: Clone + 'static>(&self, capacity: usize) -> Chan<T> {
        self.chan(BufferPolicy::Sliding(capacity))
    }
}
