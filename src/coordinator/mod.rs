//! # Take coordinator: takes, reads and listens across several channels.
//!
//! One call registers on every channel it names and resolves through a shared
//! [`Group`](group::Group) according to its [`Strategy`].
//!
//! ## Claims
//! ```text
//! call kind                    claim per registration
//! ───────────────────────────────────────────────────────────────
//! listen                       one shared claim (never consumed)
//! one-shot OneOf               one exclusive claim shared by all channels
//! one-shot AllRequired         one exclusive claim per channel
//! ```
//! A one-shot `OneOf` call therefore consumes at most one value: the first
//! channel to deliver consumes the claim and the remaining registrations are
//! detached from their channels. Registration stops early if the claim is
//! consumed synchronously (a buffered value on an earlier channel).
//!
//! ## Rules
//! - Channels must be non-empty and belong to the calling runtime
//!   ([`UsageError`] otherwise).
//! - The callback runs from the runtime job queue, never on the registering frame.
//! - [`Transform::Routine`] results are computed by a routine spawned under the
//!   calling routine (if any) and delivered when it completes. A failing
//!   transform goes to [`TakeOptions::on_error`], or is reported as unhandled.

mod group;
mod options;
mod unsubscribe;

pub use options::{Resolution, Strategy, TakeOptions, Transform};
pub use unsubscribe::Unsubscribe;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::channel::{Chan, Claim, Signal, Ticket};
use crate::core::{Runtime, WeakRuntime};
use crate::error::{RoutineError, UsageError};
use crate::routine::{scheduler, RoutineId, RoutineResult};
use group::Group;

/// Checks that `chans` is non-empty and owned by `rt`.
pub(crate) fn check<T: Clone + 'static>(rt: &Runtime, chans: &[Chan<T>]) -> Result<(), UsageError> {
    if chans.is_empty() {
        return Err(UsageError::NoChannels);
    }
    for ch in chans {
        if !rt.owns(ch.weak_runtime()) {
            return Err(UsageError::ForeignChannel {
                channel: ch.name_arc(),
            });
        }
    }
    Ok(())
}

struct Sink<T> {
    rt: WeakRuntime,
    parent: Option<RoutineId>,
    transform: Option<Transform<T>>,
    on_error: Option<Rc<dyn Fn(RoutineError)>>,
    callback: Rc<dyn Fn(Resolution<T>)>,
}

impl<T: Clone + 'static> Sink<T> {
    fn deliver(&self, res: Resolution<T>) {
        match &self.transform {
            None => (self.callback)(res),
            Some(Transform::Map(f)) => (self.callback)(f(res)),
            Some(Transform::Routine(f)) => {
                let Some(rt) = self.rt.upgrade() else {
                    return;
                };
                let routine = f(res);
                let name: Arc<str> = routine.name().into();
                let callback = self.callback.clone();
                let on_error = self.on_error.clone();
                scheduler::spawn(
                    &rt,
                    self.parent,
                    routine,
                    Some(Box::new(move |rt: &Runtime, result: RoutineResult<Resolution<T>>| match result {
                        Ok(res) => callback(res),
                        Err(err) => match on_error {
                            Some(on_error) => on_error(err),
                            None => rt.report(name, None, err),
                        },
                    })),
                    None,
                );
            }
        }
    }
}

/// Registers a coordinated take / read / listen. Channels must already be checked.
pub(crate) fn register<T: Clone + 'static>(
    rt: &Runtime,
    parent: Option<RoutineId>,
    chans: &[Chan<T>],
    opts: TakeOptions<T>,
    callback: Rc<dyn Fn(Resolution<T>)>,
) -> Unsubscribe {
    let read = opts.is_read();
    let TakeOptions {
        strategy,
        listen,
        initial_call,
        transform,
        on_error,
        ..
    } = opts;
    let initial_call = initial_call.unwrap_or(rt.config().read_initial_call);

    let group = Rc::new(RefCell::new(Group::new(strategy, listen, chans.len())));
    let sink = Rc::new(Sink {
        rt: rt.downgrade(),
        parent,
        transform,
        on_error,
        callback,
    });
    let shared = if listen {
        Some(Claim::shared())
    } else if strategy == Strategy::OneOf {
        Some(Claim::exclusive())
    } else {
        None
    };

    // One-shot OneOf: the winner detaches the other channels' registrations.
    let siblings: Option<Rc<RefCell<Vec<Box<dyn FnOnce()>>>>> =
        (strategy == Strategy::OneOf && !listen).then(Default::default);

    let mut handle = Unsubscribe::default();
    for (idx, ch) in chans.iter().enumerate() {
        let claim = shared.clone().unwrap_or_else(Claim::exclusive);
        if !claim.is_live() {
            break;
        }
        let ticket = Ticket::new(rt.next_key(), claim);
        handle.extend(ch.unsubscribe_for(&ticket));
        if let Some(siblings) = &siblings {
            siblings.borrow_mut().push(ch.detach(ticket.key));
        }

        let group = group.clone();
        let sink = sink.clone();
        let siblings = siblings.clone();
        let on_signal = move |signal: Signal<T>| {
            let res = group.borrow_mut().offer(idx, signal);
            if let Some(res) = res {
                if let Some(siblings) = &siblings {
                    let detach: Vec<_> = siblings.borrow_mut().drain(..).collect();
                    for d in detach {
                        d();
                    }
                }
                sink.deliver(res);
            }
        };
        if read {
            ch.read_ticket(rt, ticket, initial_call, Rc::new(on_signal));
        } else {
            ch.take_ticket(rt, ticket, Box::new(on_signal));
        }
    }
    handle
}

/// Puts `item` into every channel; `done` receives one signal per channel.
pub(crate) fn put_all<T: Clone + 'static>(
    rt: &Runtime,
    chans: &[Chan<T>],
    item: T,
    done: Box<dyn FnOnce(Vec<Signal<bool>>)>,
) -> Unsubscribe {
    struct PutAll {
        slots: Vec<Option<Signal<bool>>>,
        done: Option<Box<dyn FnOnce(Vec<Signal<bool>>)>>,
    }

    let state = Rc::new(RefCell::new(PutAll {
        slots: vec![None; chans.len()],
        done: Some(done),
    }));
    let mut handle = Unsubscribe::default();
    for (idx, ch) in chans.iter().enumerate() {
        let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
        handle.extend(ch.unsubscribe_for(&ticket));

        let state = state.clone();
        let resolver = Box::new(move |signal: Signal<bool>| {
            let finished = {
                let mut st = state.borrow_mut();
                st.slots[idx] = Some(signal);
                if st.slots.iter().all(Option::is_some) {
                    let results: Vec<Signal<bool>> = st.slots.drain(..).flatten().collect();
                    st.done.take().map(|done| (done, results))
                } else {
                    None
                }
            };
            if let Some((done, results)) = finished {
                done(results);
            }
        });
        ch.put_ticket(rt, ticket, item.clone(), resolver);
    }
    handle
}

impl Runtime {
    /// Coordinated take, read or listen over `chans`.
    ///
    /// # Errors
    /// [`UsageError::NoChannels`] or [`UsageError::ForeignChannel`].
    pub fn take_with<T: Clone + 'static>(
        &self,
        chans: &[Chan<T>],
        opts: TakeOptions<T>,
        callback: impl Fn(Resolution<T>) + 'static,
    ) -> Result<Unsubscribe, UsageError> {
        check(self, chans)?;
        let handle = register(self, None, chans, opts, Rc::new(callback));
        self.flush();
        Ok(handle)
    }

    /// Puts a copy of `item` into every channel of `chans`.
    ///
    /// `callback` fires once, after every put resolved, with one signal per channel.
    pub fn put_all<T: Clone + 'static>(
        &self,
        chans: &[Chan<T>],
        item: T,
        callback: impl FnOnce(Vec<Signal<bool>>) + 'static,
    ) -> Result<Unsubscribe, UsageError> {
        check(self, chans)?;
        let handle = put_all(self, chans, item, Box::new(callback));
        self.flush();
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use crate::routine::{Cx, Exit, RoutineFn};

    type Seen = Rc<RefCell<Vec<Resolution<i32>>>>;

    fn recorder() -> (Seen, impl Fn(Resolution<i32>) + 'static) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        (seen, move |res| s.borrow_mut().push(res))
    }

    #[test]
    fn test_all_required_fires_after_every_channel() {
        let rt = Runtime::default();
        let (a, b) = (rt.fixed::<i32>(1), rt.fixed::<i32>(1));
        let (seen, cb) = recorder();
        rt.take_with(&[a.clone(), b.clone()], TakeOptions::new(), cb)
            .expect("take");

        a.put(1, |_| {});
        assert!(seen.borrow().is_empty());
        b.put(2, |_| {});

        assert_eq!(
            *seen.borrow(),
            vec![Resolution::All(vec![Signal::Value(1), Signal::Value(2)])]
        );
    }

    #[test]
    fn test_one_of_consumes_a_single_value() {
        let rt = Runtime::default();
        let (a, b) = (rt.fixed::<i32>(1), rt.fixed::<i32>(1));
        let (seen, cb) = recorder();
        rt.take_with(&[a.clone(), b.clone()], TakeOptions::new().one_of(), cb)
            .expect("take");

        b.put(10, |_| {});
        a.put(20, |_| {});

        assert_eq!(*seen.borrow(), vec![Resolution::OneOf(Signal::Value(10), 1)]);
        assert_eq!(a.contents(), vec![20]);
        assert_eq!(a.pending_takes(), 0);
    }

    #[test]
    fn test_one_of_stops_registering_after_buffered_hit() {
        let rt = Runtime::default();
        let (a, b) = (rt.fixed::<i32>(1), rt.fixed::<i32>(1));
        a.put(5, |_| {});
        let (seen, cb) = recorder();
        let handle = rt
            .take_with(&[a.clone(), b.clone()], TakeOptions::new().one_of(), cb)
            .expect("take");

        assert_eq!(*seen.borrow(), vec![Resolution::OneOf(Signal::Value(5), 0)]);
        assert_eq!(b.pending_takes(), 0);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_listen_all_required_refires_with_latest() {
        let rt = Runtime::default();
        let (a, b) = (rt.dropping::<i32>(1), rt.dropping::<i32>(1));
        let (seen, cb) = recorder();
        let handle = rt
            .take_with(&[a.clone(), b.clone()], TakeOptions::new().listen(), cb)
            .expect("listen");

        a.put(1, |_| {});
        b.put(2, |_| {});
        a.put(3, |_| {});
        handle.unsubscribe();
        b.put(4, |_| {});

        assert_eq!(
            *seen.borrow(),
            vec![
                Resolution::All(vec![Signal::Value(1), Signal::Value(2)]),
                Resolution::All(vec![Signal::Value(3), Signal::Value(2)]),
            ]
        );
    }

    #[test]
    fn test_read_on_drained_closed_channel_ends_it() {
        let rt = Runtime::default();
        let ch = rt.fixed::<i32>(1);
        ch.put(1, |_| {});
        ch.close();
        ch.take(|_| {});
        assert_eq!(ch.state(), ChannelState::Ended);

        let (seen, cb) = recorder();
        rt.take_with(&[ch.clone()], TakeOptions::new().read(), cb)
            .expect("read");
        assert_eq!(*seen.borrow(), vec![Resolution::One(Signal::Ended)]);
    }

    #[test]
    fn test_map_transform_runs_before_callback() {
        let rt = Runtime::default();
        let ch = rt.fixed::<i32>(1);
        ch.put(20, |_| {});
        let (seen, cb) = recorder();
        let opts = TakeOptions::new().map(|res| Resolution::One(res.into_first().map(|v| v + 1)));
        rt.take_with(&[ch], opts, cb).expect("take");
        assert_eq!(*seen.borrow(), vec![Resolution::One(Signal::Value(21))]);
    }

    #[test]
    fn test_unsubscribe_detaches_every_channel() {
        let rt = Runtime::default();
        let (a, b) = (rt.fixed::<i32>(0), rt.fixed::<i32>(0));
        let (seen, cb) = recorder();
        let handle = rt
            .take_with(&[a.clone(), b.clone()], TakeOptions::new(), cb)
            .expect("take");
        assert_eq!(a.pending_takes() + b.pending_takes(), 2);

        handle.unsubscribe();
        a.put(1, |_| {});
        assert_eq!(a.pending_takes() + b.pending_takes(), 0);
        assert_eq!(a.pending_puts(), 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_put_all_reports_each_channel() {
        let rt = Runtime::default();
        let (a, b) = (rt.fixed::<i32>(1), rt.fixed::<i32>(1));
        b.close();
        let out = Rc::new(RefCell::new(Vec::new()));
        let o = out.clone();
        rt.put_all(&[a.clone(), b], 7, move |res| *o.borrow_mut() = res)
            .expect("put_all");

        assert_eq!(*out.borrow(), vec![Signal::Value(true), Signal::Ended]);
        assert_eq!(a.contents(), vec![7]);
    }

    #[test]
    fn test_one_of_detaches_losing_registrations() {
        let rt = Runtime::default();
        let (data, quit) = (rt.fixed::<i32>(0), rt.fixed::<i32>(0));
        let (seen, cb) = recorder();
        let cb = Rc::new(cb);

        for i in 0..100 {
            let cb = cb.clone();
            rt.take_with(&[data.clone(), quit.clone()], TakeOptions::new().one_of(), move |res| cb(res))
                .expect("take");
            data.put(i, |_| {});
        }

        assert_eq!(seen.borrow().len(), 100);
        assert_eq!(seen.borrow()[99], Resolution::OneOf(Signal::Value(99), 0));
        assert_eq!(quit.queued_takes(), 0);
        assert_eq!(data.queued_takes(), 0);
    }

    #[test]
    fn test_one_of_listen_keeps_every_channel_live() {
        let rt = Runtime::default();
        let (a, b) = (rt.dropping::<i32>(1), rt.dropping::<i32>(1));
        let (seen, cb) = recorder();
        let handle = rt
            .take_with(&[a.clone(), b.clone()], TakeOptions::new().one_of().listen(), cb)
            .expect("listen");

        a.put(1, |_| {});
        b.put(2, |_| {});
        a.put(3, |_| {});

        assert_eq!(
            *seen.borrow(),
            vec![
                Resolution::OneOf(Signal::Value(1), 0),
                Resolution::OneOf(Signal::Value(2), 1),
                Resolution::OneOf(Signal::Value(3), 0),
            ]
        );
        assert!(handle.is_active());
        assert_eq!(a.readers() + b.readers(), 2);
    }

    #[test]
    fn test_unread_all_leaves_other_channels_listening() {
        let rt = Runtime::default();
        let (a, b) = (rt.dropping::<i32>(1), rt.dropping::<i32>(1));
        let (seen, cb) = recorder();
        let _handle = rt
            .take_with(&[a.clone(), b.clone()], TakeOptions::new().one_of().listen(), cb)
            .expect("listen");

        assert_eq!(a.unread_all(), 1);
        a.put(1, |_| {});
        b.put(2, |_| {});

        assert_eq!(*seen.borrow(), vec![Resolution::OneOf(Signal::Value(2), 1)]);
    }

    #[test]
    fn test_failing_transform_goes_to_on_error() {
        let rt = Runtime::default();
        let ch = rt.fixed::<i32>(1);
        ch.put(1, |_| {});
        let errors = Rc::new(RefCell::new(Vec::new()));

        let e = errors.clone();
        let opts = TakeOptions::new()
            .transform_with(|_res: Resolution<i32>| {
                RoutineFn::rc("reject", |_cx: Cx| async {
                    Err::<Exit<Resolution<i32>>, _>(RoutineError::failed("bad value"))
                })
            })
            .on_error(move |err| e.borrow_mut().push(err.as_label()));
        let (seen, cb) = recorder();
        rt.take_with(&[ch], opts, cb).expect("take");

        assert!(seen.borrow().is_empty());
        assert_eq!(*errors.borrow(), vec!["routine_failed"]);
        assert!(rt.take_failures().is_empty());
    }

    #[test]
    fn test_failing_transform_without_handler_is_unhandled() {
        let rt = Runtime::default();
        let ch = rt.fixed::<i32>(1);
        ch.put(1, |_| {});
        let opts = TakeOptions::new().transform_with(|_res: Resolution<i32>| {
            RoutineFn::rc("reject", |_cx: Cx| async {
                Err::<Exit<Resolution<i32>>, _>(RoutineError::failed("bad value"))
            })
        });
        rt.take_with(&[ch], opts, |_| {}).expect("take");

        assert_eq!(rt.take_failures().len(), 1);
    }

    #[test]
    fn test_usage_errors_are_synchronous() {
        let rt = Runtime::default();
        let other = Runtime::default();
        let foreign = other.named_chan::<i32>("elsewhere", crate::BufferPolicy::Fixed(0));

        let err = rt.take_with::<i32>(&[], TakeOptions::new(), |_| {}).expect_err("empty");
        assert_eq!(err, UsageError::NoChannels);

        let err = rt
            .take_with(&[foreign], TakeOptions::new(), |_| {})
            .expect_err("foreign");
        assert_eq!(err.as_label(), "usage_foreign_channel");
    }
}
