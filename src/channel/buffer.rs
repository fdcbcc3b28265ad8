//! # Channel buffer: storage plus pending producers and consumers.
//!
//! [`Buffer`] is pure bookkeeping. It never calls a resolver itself: every
//! operation pushes [`Settled`] entries onto an output vector, and the owning
//! channel dispatches them through the runtime job queue **after** releasing its
//! own borrow. This keeps resolver re-entrancy (a take's callback issuing the next
//! put) off the stack.
//!
//! ## Rules
//! - Pending puts and pending takes are both served FIFO.
//! - A pending put only exists while `contents` is full (Fixed policy).
//! - A pending take only exists while `contents` is empty.
//! - When a take frees space, the oldest pending put is admitted and its resolver
//!   is settled **before** the take's resolver.
//! - Cancelled registrations (dead [`Ticket`]s) are skipped and pruned.
//!
//! ## Policy behavior
//! ```text
//! put(item)            Fixed(n)               Dropping(n)          Sliding(n)
//! ─────────────────────────────────────────────────────────────────────────────
//! live taker waiting   hand off, true         hand off, true       hand off, true
//! len < capacity       store, true            store, true          store, true
//! full                 queue put              discard, false       evict oldest, true
//! ```

use std::collections::VecDeque;

use super::claim::Ticket;
use super::signal::{ChannelState, Signal};
use crate::policies::BufferPolicy;

pub(crate) type PutResolver = Box<dyn FnOnce(Signal<bool>)>;
pub(crate) type TakeResolver<T> = Box<dyn FnOnce(Signal<T>)>;

/// A resolver paired with the signal it must receive.
pub(crate) enum Settled<T> {
    Put(PutResolver, Signal<bool>),
    Take(TakeResolver<T>, Signal<T>),
}

impl<T> Settled<T> {
    pub(crate) fn fire(self) {
        match self {
            Settled::Put(resolver, signal) => resolver(signal),
            Settled::Take(resolver, signal) => resolver(signal),
        }
    }
}

struct PendingPut<T> {
    ticket: Ticket,
    item: T,
    resolver: PutResolver,
}

struct PendingTake<T> {
    ticket: Ticket,
    resolver: TakeResolver<T>,
}

pub(crate) struct Buffer<T> {
    policy: BufferPolicy,
    contents: VecDeque<T>,
    puts: VecDeque<PendingPut<T>>,
    takes: VecDeque<PendingTake<T>>,
}

impl<T> Buffer<T> {
    pub(crate) fn new(policy: BufferPolicy) -> Self {
        Self {
            policy,
            contents: VecDeque::new(),
            puts: VecDeque::new(),
            takes: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn policy(&self) -> BufferPolicy {
        self.policy
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<&T> {
        self.contents.front()
    }

    pub(crate) fn contents(&self) -> impl Iterator<Item = &T> {
        self.contents.iter()
    }

    pub(crate) fn pending_puts(&self) -> usize {
        self.puts.iter().filter(|p| p.ticket.is_live()).count()
    }

    pub(crate) fn pending_takes(&self) -> usize {
        self.takes.iter().filter(|t| t.ticket.is_live()).count()
    }

    pub(crate) fn has_live_takers(&self) -> bool {
        self.takes.iter().any(|t| t.ticket.is_live())
    }

    pub(crate) fn put(
        &mut self,
        ticket: Ticket,
        item: T,
        resolver: PutResolver,
        out: &mut Vec<Settled<T>>,
    ) {
        if let Some(taker) = self.pop_live_taker() {
            out.push(Settled::Take(taker, Signal::Value(item)));
            settle_put(&ticket, resolver, Signal::Value(true), out);
            return;
        }

        let cap = self.policy.effective_capacity();
        match self.policy {
            BufferPolicy::Fixed(_) => {
                if self.contents.len() < cap {
                    self.contents.push_back(item);
                    settle_put(&ticket, resolver, Signal::Value(true), out);
                } else {
                    self.puts.push_back(PendingPut {
                        ticket,
                        item,
                        resolver,
                    });
                }
            }
            BufferPolicy::Dropping(_) => {
                if self.contents.len() < cap {
                    self.contents.push_back(item);
                    settle_put(&ticket, resolver, Signal::Value(true), out);
                } else {
                    settle_put(&ticket, resolver, Signal::Value(false), out);
                }
            }
            BufferPolicy::Sliding(_) => {
                while self.contents.len() >= cap {
                    self.contents.pop_front();
                }
                self.contents.push_back(item);
                settle_put(&ticket, resolver, Signal::Value(true), out);
            }
        }
    }

    pub(crate) fn take(&mut self, ticket: Ticket, resolver: TakeResolver<T>, out: &mut Vec<Settled<T>>) {
        self.puts.retain(|p| p.ticket.is_live());

        if self.contents.is_empty() {
            if self.puts.is_empty() {
                if ticket.is_live() {
                    self.takes.push_back(PendingTake { ticket, resolver });
                }
                return;
            }
            if !ticket.try_claim() {
                return;
            }
            if let Some(p) = self.puts.pop_front() {
                settle_put(&p.ticket, p.resolver, Signal::Value(true), out);
                out.push(Settled::Take(resolver, Signal::Value(p.item)));
            }
            return;
        }

        if !ticket.try_claim() {
            return;
        }
        let Some(value) = self.contents.pop_front() else {
            return;
        };
        if self.contents.len() < self.policy.effective_capacity() {
            if let Some(p) = self.puts.pop_front() {
                self.contents.push_back(p.item);
                settle_put(&p.ticket, p.resolver, Signal::Value(true), out);
            }
        }
        out.push(Settled::Take(resolver, Signal::Value(value)));
    }

    /// Drops a pending registration. Returns `true` if one was found.
    pub(crate) fn remove(&mut self, key: u64) -> bool {
        let before = self.puts.len() + self.takes.len();
        self.puts.retain(|p| p.ticket.key != key);
        self.takes.retain(|t| t.ticket.key != key);
        before != self.puts.len() + self.takes.len()
    }

    /// Resolves every pending put and take with the terminal `state`.
    pub(crate) fn close(&mut self, state: ChannelState, out: &mut Vec<Settled<T>>) {
        for p in self.puts.drain(..) {
            settle_put(&p.ticket, p.resolver, Signal::terminal(state), out);
        }
        for t in self.takes.drain(..) {
            if t.ticket.try_claim() {
                out.push(Settled::Take(t.resolver, Signal::terminal(state)));
            }
        }
    }

    /// Empties the buffer and returns what it held. The returned resolvers are
    /// never fired; the caller drops them once it released its borrow.
    pub(crate) fn reset(&mut self) -> Buffer<T> {
        std::mem::replace(self, Buffer::new(self.policy))
    }

    /// Queued takes, cancelled ones included.
    #[cfg(test)]
    pub(crate) fn queued_takes(&self) -> usize {
        self.takes.len()
    }

    fn pop_live_taker(&mut self) -> Option<TakeResolver<T>> {
        while let Some(t) = self.takes.pop_front() {
            if t.ticket.try_claim() {
                return Some(t.resolver);
            }
        }
        None
    }
}

fn settle_put<T>(ticket: &Ticket, resolver: PutResolver, signal: Signal<bool>, out: &mut Vec<Settled<T>>) {
    if ticket.try_claim() {
        out.push(Settled::Put(resolver, signal));
    }
}
