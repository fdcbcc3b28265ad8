//! # Fan-out.
//!
//! A source with taps is consumed by a single pump. Each value the pump takes is
//! one broadcast round:
//!
//! ```text
//! source ── take ──► Value(v) ──► for tap in taps:
//!                                   Open && has a waiting taker ? ──► put(v.clone())
//!                                   otherwise                     ──► skipped
//!                 └─► taps left ? ──► take again
//! ```
//!
//! ## Rules
//! - A channel is tapped at most once per source; tapping a source into itself
//!   is a [`UsageError::SelfTap`].
//! - Once the last tap is removed the pending pump take is cancelled and the
//!   source is no longer consumed.
//! - A terminal signal from the source stops the pump. Taps are kept, and
//!   resetting the source starts a new pump.

use crate::channel::{Chan, ChannelState, Claim, Signal, Ticket};
use crate::core::Runtime;
use crate::error::UsageError;

impl<T: Clone + 'static> Chan<T> {
    /// Taps `targets` into this channel.
    pub fn mult(&self, targets: &[Chan<T>]) -> Result<(), UsageError> {
        let rt = self.runtime().ok_or(UsageError::RuntimeGone)?;
        for target in targets {
            if !rt.owns(target.weak_runtime()) {
                return Err(UsageError::ForeignChannel {
                    channel: target.name_arc(),
                });
            }
            if target.same_channel(self) {
                return Err(UsageError::SelfTap {
                    channel: self.name_arc(),
                });
            }
        }

        let start = {
            let mut core = self.core().borrow_mut();
            for target in targets {
                if !core.taps.iter().any(|t| t.same_channel(target)) {
                    core.taps.push(target.clone());
                }
            }
            !core.taps.is_empty() && core.pump.is_none()
        };
        if start {
            pump(&rt, self);
        }
        rt.flush();
        Ok(())
    }

    /// Removes one tap. Returns `false` if `target` was not tapped.
    pub fn unmult(&self, target: &Chan<T>) -> bool {
        let (removed, idle) = {
            let mut core = self.core().borrow_mut();
            let before = core.taps.len();
            core.taps.retain(|t| !t.same_channel(target));
            let removed = core.taps.len() != before;
            let idle = if core.taps.is_empty() {
                core.pump.take()
            } else {
                None
            };
            (removed, idle)
        };
        if let Some(pending) = idle {
            pending.unsubscribe();
        }
        removed
    }

    /// Removes every tap and stops consuming the source.
    pub fn unmult_all(&self) {
        let pending = {
            let mut core = self.core().borrow_mut();
            core.taps.clear();
            core.pump.take()
        };
        if let Some(pending) = pending {
            pending.unsubscribe();
        }
    }

    /// Currently tapped channels, in tap order.
    pub fn taps(&self) -> Vec<Chan<T>> {
        self.core().borrow().taps.clone()
    }
}

pub(crate) fn pump<T: Clone + 'static>(rt: &Runtime, source: &Chan<T>) {
    let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
    let pending = source.unsubscribe_for(&ticket);
    source.core().borrow_mut().pump = Some(pending);

    let weak = source.downgrade();
    source.take_ticket(
        rt,
        ticket,
        Box::new(move |signal| {
            let Some(source) = weak.upgrade() else {
                return;
            };
            let taps = {
                let mut core = source.core().borrow_mut();
                core.pump = None;
                core.taps.clone()
            };
            let Signal::Value(item) = signal else {
                return;
            };
            let Some(rt) = source.runtime() else {
                return;
            };
            for tap in taps
                .iter()
                .filter(|t| t.state() == ChannelState::Open && t.has_live_takers())
            {
                let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
                tap.put_ticket(&rt, ticket, item.clone(), Box::new(|_| {}));
            }
            let again = {
                let core = source.core().borrow();
                !core.taps.is_empty() && core.pump.is_none()
            };
            if again {
                pump(&rt, &source);
            }
        }),
    );
}
