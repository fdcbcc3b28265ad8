//! # Scheduler: drives routine bodies through their operation descriptors.
//!
//! Every entry point here runs as a job on the runtime queue (or from a public
//! operation that flushes right after), so routine polls never nest.
//!
//! ## Lifecycle
//! ```text
//! spawn ──► Record{Ready} ──defer──► poll
//!                                     │
//!       ┌─────────────────────────────┼───────────────────────────────┐
//!       ▼                             ▼                               ▼
//!  Pending + Op               Pending, no Op                    Ready(Completion)
//!  waiting = Op(seq)          waiting = External(seq)           Done ─► retire, deliver on_done
//!  start_op(effect)           (foreign waker ─► wake)           Failed ─► retire, report
//!       │                                                       Restart ─► rerun (limit checked)
//!       └─► Fill ─► Resume ─► resume(seq) ─► poll
//!
//! stop(id): pre-order walk of the subtree; each routine is removed, its token
//!           cancelled, its pending registration unsubscribed, its on_stop run.
//! ```
//!
//! ## Rules
//! - A resume or wake carries the park sequence it was issued for; anything else
//!   (stopped, restarted, moved on) is discarded.
//! - Bodies are polled with no arena borrow held; every borrow is re-taken after.
//! - Children of a completed routine are re-parented to its parent; children of a
//!   restarted routine are stopped.
//! - A routine record is dropped outside the arena borrow.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use super::arena::{Body, Completion, Record, Reject, RoutineId, Start, Waiting};
use super::cx::Cx;
use super::handle::RoutineHandle;
use super::ops::{Op, OpTag, Resume};
use super::routine::{Exit, RoutineRef, RoutineResult};
use crate::core::{Node, NodeId, RoutineWaker, Runtime};
use crate::error::RoutineError;
use crate::events::{Event, EventKind};

pub(crate) type OnDone<R> = Box<dyn FnOnce(&Runtime, RoutineResult<R>)>;
pub(crate) type OnStop = Box<dyn FnOnce(&Runtime)>;

/// Registers a routine (under `parent` if it is alive) and schedules its first poll.
pub(crate) fn spawn<R: 'static>(
    rt: &Runtime,
    parent: Option<RoutineId>,
    routine: RoutineRef<R>,
    on_done: Option<OnDone<R>>,
    on_stop: Option<OnStop>,
) -> RoutineHandle {
    let name: Arc<str> = routine.name().into();
    let (start, reject) = erase(routine, on_done);

    let (id, parent) = {
        let mut arena = rt.inner.routines.borrow_mut();
        let parent_token = parent.and_then(|p| arena.get(p).map(|r| r.token.clone()));
        let parent = parent.filter(|_| parent_token.is_some());
        let token = parent_token.unwrap_or_else(|| rt.inner.token.clone()).child_token();
        let id = arena.insert(Record {
            name: name.clone(),
            parent,
            children: Vec::new(),
            waiting: Waiting::Ready,
            seq: 0,
            body: None,
            start,
            reject,
            yielded: Rc::new(RefCell::new(None)),
            pending: None,
            on_stop,
            token,
            restarts: 0,
        });
        if let Some(p) = parent {
            if let Some(rec) = arena.get_mut(p) {
                rec.children.push(id);
            }
        }
        (id, parent)
    };

    let node = NodeId::Routine(id);
    let parent = parent.map(NodeId::Routine);
    rt.registry().add(Node {
        id: node,
        name: name.clone(),
        parent,
    });
    rt.registry().emit(
        Event::new(EventKind::RoutineStarted)
            .with_node(node)
            .with_name(name.clone())
            .with_parent(parent),
    );
    rt.defer(move |rt| poll(rt, id));
    RoutineHandle::new(id, name, rt.downgrade())
}

fn erase<R: 'static>(routine: RoutineRef<R>, on_done: Option<OnDone<R>>) -> (Start, Reject) {
    let on_done = Rc::new(Cell::new(on_done));
    let rejected = on_done.clone();
    let reject: Reject = Rc::new(move |err| conclude(&rejected, Err(err)));
    let start: Start = Rc::new(move |cx: Cx| -> Body {
        let routine = routine.clone();
        let on_done = on_done.clone();
        Box::pin(async move {
            match routine.run(cx).await {
                Ok(Exit::Restart) => Completion::Restart,
                Ok(Exit::Done(value)) => conclude(&on_done, Ok(value)),
                Err(err) => conclude(&on_done, Err(err)),
            }
        })
    });
    (start, reject)
}

fn conclude<R: 'static>(on_done: &Cell<Option<OnDone<R>>>, result: RoutineResult<R>) -> Completion {
    match on_done.take() {
        Some(on_done) => Completion::Done(Some(Box::new(move |rt: &Runtime| on_done(rt, result)))),
        None => match result {
            Ok(_) => Completion::Done(None),
            Err(err) => Completion::Failed(err),
        },
    }
}

/// Polls a routine that is ready to run.
pub(crate) fn poll(rt: &Runtime, id: RoutineId) {
    let (body, start, seq, yielded, name, token) = {
        let mut arena = rt.inner.routines.borrow_mut();
        let Some(rec) = arena.get_mut(id) else {
            return;
        };
        if rec.waiting != Waiting::Ready {
            return;
        }
        rec.waiting = Waiting::Running;
        rec.seq += 1;
        (
            rec.body.take(),
            rec.start.clone(),
            rec.seq,
            rec.yielded.clone(),
            rec.name.clone(),
            rec.token.clone(),
        )
    };

    let mut body = match body {
        Some(body) => body,
        None => start(Cx::new(rt.downgrade(), id, name, token, yielded.clone())),
    };
    let waker = Waker::from(Arc::new(RoutineWaker {
        remote: rt.inner.remote.clone(),
        id,
        seq,
    }));
    let mut task_cx = Context::from_waker(&waker);

    let polled = body.as_mut().poll(&mut task_cx);
    match polled {
        Poll::Ready(done) => {
            drop(body);
            finish(rt, id, seq, done);
        }
        Poll::Pending => {
            let op = yielded.borrow_mut().take();
            let parked = {
                let mut arena = rt.inner.routines.borrow_mut();
                match arena.get_mut(id) {
                    Some(rec) if rec.seq == seq => {
                        rec.body = Some(body);
                        rec.waiting = match op {
                            Some(_) => Waiting::Op(seq),
                            None => Waiting::External(seq),
                        };
                        true
                    }
                    _ => false,
                }
            };
            if let (true, Some(op)) = (parked, op) {
                start_op(rt, id, seq, op);
            }
        }
    }
}

fn start_op(rt: &Runtime, id: RoutineId, seq: u64, op: Op) {
    let effect = match op.effect {
        Some(effect) if op.tag != OpTag::Stop => effect,
        _ => {
            stop(rt, id);
            return;
        }
    };
    let resume = Resume {
        rt: rt.downgrade(),
        id,
        seq,
    };
    let Some(pending) = effect(rt, resume) else {
        return;
    };
    let stale = {
        let mut arena = rt.inner.routines.borrow_mut();
        match arena.get_mut(id) {
            Some(rec) if rec.waiting == Waiting::Op(seq) => {
                rec.pending = Some(pending);
                None
            }
            _ => Some(pending),
        }
    };
    if let Some(pending) = stale {
        pending.unsubscribe();
    }
}

/// Resumes a routine parked on the operation issued at `seq`.
pub(crate) fn resume(rt: &Runtime, id: RoutineId, seq: u64) {
    let pending = {
        let mut arena = rt.inner.routines.borrow_mut();
        let Some(rec) = arena.get_mut(id) else {
            return;
        };
        if rec.waiting != Waiting::Op(seq) {
            return;
        }
        rec.waiting = Waiting::Ready;
        rec.pending.take()
    };
    if let Some(pending) = pending {
        pending.unsubscribe();
    }
    poll(rt, id);
}

/// Resumes a routine parked on a foreign future at `seq`.
pub(crate) fn wake(rt: &Runtime, id: RoutineId, seq: u64) {
    {
        let mut arena = rt.inner.routines.borrow_mut();
        let Some(rec) = arena.get_mut(id) else {
            return;
        };
        if rec.waiting != Waiting::External(seq) {
            return;
        }
        rec.waiting = Waiting::Ready;
    }
    poll(rt, id);
}

fn finish(rt: &Runtime, id: RoutineId, seq: u64, done: Completion) {
    let current = rt
        .inner
        .routines
        .borrow()
        .get(id)
        .is_some_and(|r| r.seq == seq);
    if !current {
        return;
    }
    match done {
        Completion::Restart => {
            rerun(rt, id, true);
        }
        done => settle(rt, id, done),
    }
}

fn settle(rt: &Runtime, id: RoutineId, done: Completion) {
    match done {
        Completion::Done(deliver) => {
            if retire(rt, id, true).is_some() {
                if let Some(deliver) = deliver {
                    deliver(rt);
                }
            }
        }
        Completion::Failed(err) => {
            if let Some(name) = retire(rt, id, false) {
                rt.report(name, Some(NodeId::Routine(id)), err);
            }
        }
        Completion::Restart => {}
    }
}

/// Removes a finished routine, re-parenting its children to its parent.
fn retire(rt: &Runtime, id: RoutineId, ended: bool) -> Option<Arc<str>> {
    let record = {
        let mut arena = rt.inner.routines.borrow_mut();
        let record = arena.remove(id)?;
        for child in &record.children {
            if let Some(c) = arena.get_mut(*child) {
                c.parent = record.parent;
            }
        }
        if let Some(parent) = record.parent {
            if let Some(parent) = arena.get_mut(parent) {
                parent.children.retain(|c| *c != id);
                parent.children.extend(record.children.iter().copied());
            }
        }
        record
    };

    let node = NodeId::Routine(id);
    rt.registry().remove(node);
    if ended {
        rt.registry().emit(
            Event::new(EventKind::RoutineEnded)
                .with_node(node)
                .with_name(record.name.clone())
                .with_parent(record.parent.map(NodeId::Routine)),
        );
    }
    Some(record.name.clone())
}

/// Runs a live routine again from the start.
///
/// `counted` restarts (the body returned [`Exit::Restart`]) are bounded by
/// `Config::restart_limit`; exceeding it settles the routine with
/// [`RoutineError::RestartLimit`].
pub(crate) fn rerun(rt: &Runtime, id: RoutineId, counted: bool) -> bool {
    let limit = rt.config().restart_limit();
    let (children, stale, pending, name, attempt, parent, reject) = {
        let mut arena = rt.inner.routines.borrow_mut();
        let Some(rec) = arena.get_mut(id) else {
            return false;
        };
        if counted {
            rec.restarts += 1;
        }
        rec.seq += 1;
        rec.waiting = Waiting::Ready;
        rec.yielded.borrow_mut().take();
        (
            std::mem::take(&mut rec.children),
            rec.body.take(),
            rec.pending.take(),
            rec.name.clone(),
            rec.restarts,
            rec.parent,
            rec.reject.clone(),
        )
    };
    drop(stale);
    if let Some(pending) = pending {
        pending.unsubscribe();
    }
    for child in children {
        stop(rt, child);
    }

    if let Some(limit) = limit.filter(|l| counted && attempt > *l) {
        settle(rt, id, reject(RoutineError::RestartLimit { routine: name, limit }));
        return false;
    }

    rt.registry().emit(
        Event::new(EventKind::RoutineRerun)
            .with_node(NodeId::Routine(id))
            .with_name(name)
            .with_parent(parent.map(NodeId::Routine))
            .with_attempt(attempt),
    );
    rt.defer(move |rt| poll(rt, id));
    true
}

/// Stops `root` and its subtree, parents before children.
pub(crate) fn stop(rt: &Runtime, root: RoutineId) -> bool {
    let order = {
        let mut arena = rt.inner.routines.borrow_mut();
        let Some(parent) = arena.get(root).map(|r| r.parent) else {
            return false;
        };
        if let Some(p) = parent {
            if let Some(rec) = arena.get_mut(p) {
                rec.children.retain(|c| *c != root);
            }
        }
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(rec) = arena.get(id) {
                order.push(id);
                stack.extend(rec.children.iter().rev().copied());
            }
        }
        order
    };

    for id in order {
        let removed = rt.inner.routines.borrow_mut().remove(id);
        let Some(mut rec) = removed else {
            continue;
        };
        rec.token.cancel();
        if let Some(pending) = rec.pending.take() {
            pending.unsubscribe();
        }
        if let Some(on_stop) = rec.on_stop.take() {
            on_stop(rt);
        }
        let node = NodeId::Routine(id);
        rt.registry().remove(node);
        rt.registry().emit(
            Event::new(EventKind::RoutineStopped)
                .with_node(node)
                .with_name(rec.name.clone())
                .with_parent(rec.parent.map(NodeId::Routine)),
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::channel::{Chan, Signal};
    use crate::coordinator::{Resolution, TakeOptions};
    use crate::core::Config;
    use crate::routine::{RoutineArgs, RoutineFn, RunState};

    fn kinds(rt: &Runtime) -> Rc<RefCell<Vec<EventKind>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _ = rt.registry().on_any(move |ev| s.borrow_mut().push(ev.kind));
        seen
    }

    fn consumer(ch: &Chan<u32>, got: &Rc<RefCell<Vec<u32>>>) -> RoutineRef<()> {
        let (ch, got) = (ch.clone(), got.clone());
        RoutineFn::rc("consumer", move |cx: Cx| {
            let (ch, got) = (ch.clone(), got.clone());
            async move {
                while let Signal::Value(v) = cx.take(&ch)?.await {
                    got.borrow_mut().push(v);
                }
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        })
    }

    #[test]
    fn test_rendezvous_routines_run_to_completion() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(0);
        let got = Rc::new(RefCell::new(Vec::new()));

        let tx = ch.clone();
        rt.go(RoutineFn::rc("producer", move |cx: Cx| {
            let ch = tx.clone();
            async move {
                for i in 0..3 {
                    cx.put(&ch, i)?.await;
                }
                ch.close();
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        rt.go(consumer(&ch, &got));

        assert_eq!(*got.borrow(), vec![0, 1, 2]);
        assert_eq!(rt.routine_count(), 0);
        assert!(rt.take_failures().is_empty());
    }

    #[test]
    fn test_stop_cascades_to_forked_children() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(0);
        let got = Rc::new(RefCell::new(Vec::new()));
        let child_handle = Rc::new(RefCell::new(None));

        let (child, slot) = (consumer(&ch, &got), child_handle.clone());
        let parent = rt.go(RoutineFn::rc("parent", move |cx: Cx| {
            let (child, slot) = (child.clone(), slot.clone());
            async move {
                *slot.borrow_mut() = Some(cx.fork(child).await);
                cx.sleep(Duration::from_secs(60)).await;
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        let child = child_handle.borrow_mut().take().expect("forked");
        assert!(child.is_running());
        assert_eq!(ch.pending_takes(), 1);
        assert_eq!(rt.pending_timers(), 1);

        let seen = kinds(&rt);
        assert!(parent.stop());

        assert_eq!(child.state(), RunState::Stopped);
        assert_eq!(ch.pending_takes(), 0);
        assert_eq!(rt.pending_timers(), 0);
        ch.put(9, |_| {});
        assert!(got.borrow().is_empty());
        assert_eq!(
            *seen.borrow(),
            vec![
                EventKind::NodeRemoved,
                EventKind::RoutineStopped,
                EventKind::NodeRemoved,
                EventKind::RoutineStopped,
            ]
        );
        assert!(!parent.stop());
    }

    #[test]
    fn test_stop_cascades_to_called_children() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(0);
        let got = Rc::new(RefCell::new(Vec::new()));
        let resumed = Rc::new(Cell::new(false));

        let (child, r) = (consumer(&ch, &got), resumed.clone());
        let parent = rt.go(RoutineFn::rc("parent", move |cx: Cx| {
            let (child, r) = (child.clone(), r.clone());
            async move {
                let _ = cx.call(child).await;
                r.set(true);
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        assert_eq!(rt.routine_count(), 2);
        assert_eq!(ch.pending_takes(), 1);

        assert!(parent.stop());
        ch.put(9, |_| {});

        assert_eq!(rt.routine_count(), 0);
        assert_eq!(ch.pending_takes(), 0);
        assert_eq!(ch.pending_puts(), 1);
        assert!(got.borrow().is_empty());
        assert!(!resumed.get());
    }

    #[test]
    fn test_one_of_loop_keeps_idle_channel_queue_bounded() {
        let rt = Runtime::default();
        let (data, quit) = (rt.fixed::<u32>(0), rt.fixed::<u32>(0));
        let got = Rc::new(RefCell::new(Vec::new()));

        let (d, q, g) = (data.clone(), quit.clone(), got.clone());
        rt.go(RoutineFn::rc("selector", move |cx: Cx| {
            let (d, q, g) = (d.clone(), q.clone(), g.clone());
            async move {
                loop {
                    match cx.take_one_of(&[d.clone(), q.clone()])?.await {
                        (Signal::Value(v), 0) => g.borrow_mut().push(v),
                        _ => return Ok::<_, RoutineError>(Exit::Done(())),
                    }
                }
            }
        }));

        for i in 0..200 {
            data.put(i, |_| {});
        }
        assert_eq!(got.borrow().len(), 200);
        assert_eq!(quit.queued_takes(), 1);

        quit.close();
        assert_eq!(rt.routine_count(), 0);
    }

    #[test]
    fn test_call_returns_child_result_and_stopped_error() {
        let rt = Runtime::default();
        let out = Rc::new(RefCell::new(Vec::new()));

        let o = out.clone();
        rt.go(RoutineFn::rc("caller", move |cx: Cx| {
            let o = o.clone();
            async move {
                let double = RoutineArgs::rc("double", 21u32, |cx: Cx, n: u32| async move {
                    cx.noop().await;
                    Ok(Exit::Done(n * 2))
                });
                let quitter = RoutineFn::rc("quitter", |cx: Cx| async move {
                    cx.stop().await;
                    Ok(Exit::Done(0u32))
                });
                o.borrow_mut().push(cx.call(double).await);
                o.borrow_mut().push(cx.call(quitter).await);
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));

        assert_eq!(
            *out.borrow(),
            vec![
                Ok(42),
                Err(RoutineError::Stopped {
                    routine: "quitter".into()
                }),
            ]
        );
        assert_eq!(rt.routine_count(), 0);
    }

    #[test]
    fn test_restart_replays_arguments() {
        let rt = Runtime::default();
        let runs = Rc::new(Cell::new(0u32));
        let result = Rc::new(RefCell::new(None));
        let seen = kinds(&rt);

        let r = runs.clone();
        let routine = RoutineArgs::rc("retry", 3u32, move |_cx: Cx, until: u32| {
            let r = r.clone();
            async move {
                r.set(r.get() + 1);
                if r.get() < until {
                    return Ok(Exit::Restart);
                }
                Ok(Exit::Done(r.get()))
            }
        });
        let res = result.clone();
        rt.spawn(routine, move |out| *res.borrow_mut() = Some(out));

        assert_eq!(runs.get(), 3);
        assert_eq!(*result.borrow(), Some(Ok(3)));
        let reruns = seen
            .borrow()
            .iter()
            .filter(|k| **k == EventKind::RoutineRerun)
            .count();
        assert_eq!(reruns, 2);
    }

    #[test]
    fn test_restart_limit_fails_routine() {
        let rt = Runtime::new(Config {
            restart_limit: 2,
            ..Config::default()
        });
        let runs = Rc::new(Cell::new(0u32));
        let result = Rc::new(RefCell::new(None));

        let r = runs.clone();
        let routine = RoutineFn::rc("forever", move |_cx: Cx| {
            let r = r.clone();
            async move {
                r.set(r.get() + 1);
                Ok::<Exit<()>, RoutineError>(Exit::Restart)
            }
        });
        let res = result.clone();
        rt.spawn(routine, move |out| *res.borrow_mut() = Some(out));

        assert_eq!(runs.get(), 3);
        assert_eq!(
            *result.borrow(),
            Some(Err(RoutineError::RestartLimit {
                routine: "forever".into(),
                limit: 2
            }))
        );
        assert_eq!(rt.routine_count(), 0);
    }

    #[test]
    fn test_rerun_restarts_parked_routine() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(0);
        let runs = Rc::new(Cell::new(0u32));

        let (r, c) = (runs.clone(), ch.clone());
        let handle = rt.go(RoutineFn::rc("waiter", move |cx: Cx| {
            let (r, c) = (r.clone(), c.clone());
            async move {
                r.set(r.get() + 1);
                cx.take(&c)?.await;
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        assert_eq!(runs.get(), 1);
        assert!(handle.rerun());
        assert_eq!(runs.get(), 2);
        assert_eq!(ch.pending_takes(), 1);

        ch.put(1, |_| {});
        assert!(!handle.is_running());
    }

    #[test]
    fn test_completed_parent_leaves_children_running() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(0);
        let got = Rc::new(RefCell::new(Vec::new()));

        let child = consumer(&ch, &got);
        rt.go(RoutineFn::rc("parent", move |cx: Cx| {
            let child = child.clone();
            async move {
                cx.fork(child).await;
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));

        assert_eq!(rt.routine_count(), 1);
        ch.put(5, |_| {});
        assert_eq!(*got.borrow(), vec![5]);
    }

    #[test]
    fn test_unhandled_error_is_reported() {
        let rt = Runtime::default();
        let seen = kinds(&rt);
        rt.go(RoutineFn::rc("broken", |_cx: Cx| async {
            Err::<Exit<()>, _>(RoutineError::failed("boom"))
        }));

        let failures = rt.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].as_label(), "runtime_unhandled");
        assert!(seen.borrow().contains(&EventKind::RoutineFailed));
        assert_eq!(rt.routine_count(), 0);
    }

    #[test]
    fn test_routine_transform_delivers_result() {
        let rt = Runtime::default();
        let ch = rt.fixed::<u32>(1);
        ch.put(4, |_| {});
        let seen = Rc::new(RefCell::new(Vec::new()));

        let opts = TakeOptions::new().transform_with(|res: Resolution<u32>| {
            RoutineArgs::rc("square", res, |cx: Cx, res: Resolution<u32>| async move {
                cx.noop().await;
                Ok(Exit::Done(Resolution::One(res.into_first().map(|v| v * v))))
            })
        });
        let s = seen.clone();
        rt.take_with(&[ch], opts, move |res| s.borrow_mut().push(res))
            .expect("take");

        assert_eq!(*seen.borrow(), vec![Resolution::One(Signal::Value(16))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_resumes_after_delay() {
        let rt = Runtime::default();
        let woke = Rc::new(Cell::new(None));

        let w = woke.clone();
        rt.go(RoutineFn::rc("sleeper", move |cx: Cx| {
            let w = w.clone();
            async move {
                let started = Instant::now();
                cx.sleep(Duration::from_millis(50)).await;
                w.set(Some(started.elapsed()));
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        assert_eq!(woke.get(), None);

        rt.run().await.expect("run");
        let elapsed = woke.get().expect("woke");
        assert!(elapsed >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_deferred_parks_until_foreign_future_settles() {
        let rt = Runtime::default();
        let seen = kinds(&rt);
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let got = Rc::new(Cell::new(None));

        let slot = Rc::new(RefCell::new(Some(rx)));
        let g = got.clone();
        rt.go(RoutineFn::rc("io", move |cx: Cx| {
            let (slot, g) = (slot.clone(), g.clone());
            async move {
                let rx = slot.borrow_mut().take().ok_or_else(|| RoutineError::failed("reused"))?;
                g.set(Some(cx.deferred(rx).await?));
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        assert_eq!(rt.routine_count(), 1);

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(7);
        });
        rt.run().await.expect("run");

        assert_eq!(got.get(), Some(7));
        assert!(seen.borrow().contains(&EventKind::RoutineAsyncBegin));
        assert!(seen.borrow().contains(&EventKind::RoutineAsyncEnd));
    }

    #[tokio::test]
    async fn test_deferred_error_is_recoverable() {
        let rt = Runtime::default();
        let seen = kinds(&rt);
        let out = Rc::new(RefCell::new(None));

        let o = out.clone();
        rt.go(RoutineFn::rc("db", move |cx: Cx| {
            let o = o.clone();
            async move {
                let res = cx.deferred(async { Err::<u32, _>("db down") }).await;
                *o.borrow_mut() = Some(res);
                Ok::<_, RoutineError>(Exit::Done(()))
            }
        }));
        rt.run().await.expect("run");

        assert_eq!(*out.borrow(), Some(Err(RoutineError::failed("db down"))));
        assert!(seen.borrow().contains(&EventKind::RoutineAsyncError));
    }
}
