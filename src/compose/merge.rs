//! # Fan-in.
//!
//! Every source runs its own forwarder: take one value, put it into the merged
//! channel, take again once the put settled.
//!
//! ```text
//! src A ── take ──► Value(v) ──► merged Open ? ──► put(v) ──► Value(_) ──► take again
//! src B ── take ──► ...                │ no              └─ terminal ──► stop
//!                                      └─► drop v, stop
//! ```
//!
//! A forwarder stops on the first terminal signal from either side. The merged
//! channel stays alive while any forwarder is still parked on its source.

use std::sync::Arc;

use crate::channel::{Chan, ChannelState, Claim, Signal, Ticket, WeakChan};
use crate::coordinator;
use crate::core::Runtime;
use crate::error::UsageError;

impl Runtime {
    /// Returns a new channel receiving every value taken from `sources`.
    ///
    /// Values arrive in the order the sources yield them. Closing the merged
    /// channel stops forwarding; closing a source stops only its forwarder.
    pub fn merge<T: Clone + 'static>(&self, sources: &[Chan<T>]) -> Result<Chan<T>, UsageError> {
        coordinator::check(self, sources)?;
        let merged = Chan::new(
            self,
            Some(Arc::from("merge")),
            self.config().default_buffer,
            None,
        );
        for source in sources {
            forward(self, source.downgrade(), merged.clone());
        }
        self.flush();
        Ok(merged)
    }
}

fn forward<T: Clone + 'static>(rt: &Runtime, source: WeakChan<T>, merged: Chan<T>) {
    let Some(src) = source.upgrade() else {
        return;
    };
    let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
    src.take_ticket(
        rt,
        ticket,
        Box::new(move |signal| {
            let Signal::Value(item) = signal else {
                return;
            };
            if merged.state() != ChannelState::Open {
                return;
            }
            let Some(rt) = merged.runtime() else {
                return;
            };
            let target = merged.downgrade();
            let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
            merged.put_ticket(
                &rt,
                ticket,
                item,
                Box::new(move |put| {
                    if !put.is_value() {
                        return;
                    }
                    let Some(merged) = target.upgrade() else {
                        return;
                    };
                    if let Some(rt) = merged.runtime() {
                        forward(&rt, source, merged);
                    }
                }),
            );
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::core::Config;
    use crate::policies::BufferPolicy;

    use super::*;

    #[test]
    fn test_merge_forwards_in_arrival_order() {
        let rt = Runtime::new(Config::default());
        let a: Chan<&'static str> = rt.chan(BufferPolicy::Fixed(0));
        let b: Chan<&'static str> = rt.chan(BufferPolicy::Fixed(0));
        let merged = rt.merge(&[a.clone(), b.clone()]).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _keep = merged.listen(move |s| sink.borrow_mut().push(s));

        a.put("a1", |_| {});
        b.put("b1", |_| {});
        a.put("a2", |_| {});

        let got: Vec<_> = (0..3)
            .map(|_| {
                let slot = Rc::new(RefCell::new(None));
                let out = slot.clone();
                merged.take(move |s| *out.borrow_mut() = Some(s));
                slot.take()
            })
            .collect();
        assert_eq!(
            got,
            vec![
                Some(Signal::Value("a1")),
                Some(Signal::Value("b1")),
                Some(Signal::Value("a2")),
            ]
        );
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_merge_stops_once_merged_channel_closed() {
        let rt = Runtime::new(Config::default());
        let a: Chan<i32> = rt.chan(BufferPolicy::Fixed(4));
        let merged = rt.merge(std::slice::from_ref(&a)).unwrap();

        a.put(1, |_| {});
        assert_eq!(merged.pending_puts(), 1);

        let got = Rc::new(RefCell::new(None));
        let out = got.clone();
        merged.take(move |s| *out.borrow_mut() = Some(s));
        assert_eq!(*got.borrow(), Some(Signal::Value(1)));

        merged.close();
        assert_eq!(merged.state(), ChannelState::Ended);
        a.put(2, |_| {});
        a.put(3, |_| {});

        // The forwarder consumed 2, saw the merged channel ended and stopped.
        assert_eq!(a.contents(), vec![3]);
    }

    #[test]
    fn test_merge_needs_sources() {
        let rt = Runtime::new(Config::default());
        let err = rt.merge::<i32>(&[]).unwrap_err();
        assert!(matches!(err, UsageError::NoChannels));
    }
}
