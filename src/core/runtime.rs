//! # Runtime context: job queue, timers and the run loop.
//!
//! [`Runtime`] is the instance-scoped state every channel and routine hangs off:
//! the trampolined job queue, the timer map, the routine arena, the node registry
//! and the id counters. Several runtimes can live in one process (and one thread);
//! nothing here is global.
//!
//! ## Execution model
//! ```text
//! public op (put / take / close / spawn / ...)
//!     │
//!     ├─► mutate channel / arena state
//!     ├─► defer(callback) ──► jobs: VecDeque<Job>
//!     └─► flush()
//!           └─► loop { pop job ─► job(&rt) }      (may defer more jobs)
//!               when empty: pull remote wakes ──► defer(poll routine)
//!
//! run().await
//!     loop {
//!       flush(); surface unhandled failure
//!       fire due timers ──► defer
//!       park: sleep_until(next deadline) | remote notify
//!       idle (no timers, nothing parked on foreign futures) ──► return Ok
//!     }
//! ```
//!
//! ## Rules
//! - Callbacks never run on the caller's stack frame: they are queued and drained
//!   iteratively, so tight synchronous chains (rendezvous ping-pong, merges) do not
//!   grow the stack.
//! - `flush()` is re-entrancy guarded; a flush requested while draining is a no-op and
//!   the outer drain picks the new jobs up.
//! - Every public operation flushes before returning, so top-level callers observe
//!   callbacks before the call returns.
//! - The runtime is `!Send`: it lives on one thread (a tokio current-thread runtime when
//!   timers or foreign futures are involved).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::builder::RuntimeBuilder;
use super::registry::{NodeId, Registry};
use super::remote::Remote;
use super::timers::{TimerKey, Timers};
use super::Config;
use crate::error::{RoutineError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::routine::{scheduler, Arena};

pub(crate) type Job = Box<dyn FnOnce(&Runtime)>;

pub(crate) struct Inner {
    pub(crate) cfg: Config,
    pub(crate) registry: Registry,
    pub(crate) remote: Arc<Remote>,
    pub(crate) routines: RefCell<Arena>,
    /// Parent of every top-level routine token.
    pub(crate) token: CancellationToken,
    jobs: RefCell<VecDeque<Job>>,
    draining: Cell<bool>,
    timers: RefCell<Timers>,
    failures: RefCell<VecDeque<RuntimeError>>,
    next_key: Cell<u64>,
    next_channel: Cell<u64>,
    /// Stops the subscriber listener task spawned by the builder.
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.token.cancel();
        self.shutdown.cancel();
    }
}

/// Handle to one runtime instance. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<Inner>,
}

/// Non-owning handle to a runtime, held by channels and routine contexts.
#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<Inner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    /// Returns `true` if both handles point at the same runtime.
    pub fn same_runtime(&self, other: &WeakRuntime) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Runtime {
    /// Creates a runtime without event subscribers.
    ///
    /// Does not need a tokio context; one is only required to drive timers
    /// and foreign futures through [`Runtime::run`].
    pub fn new(cfg: Config) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self::from_parts(cfg, bus, CancellationToken::new())
    }

    /// Returns a builder for a runtime with event subscribers.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn from_parts(cfg: Config, bus: Bus, shutdown: CancellationToken) -> Self {
        Self {
            inner: Rc::new(Inner {
                cfg,
                registry: Registry::new(bus),
                remote: Arc::new(Remote::default()),
                routines: RefCell::new(Arena::default()),
                token: CancellationToken::new(),
                jobs: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                timers: RefCell::new(Timers::default()),
                failures: RefCell::new(VecDeque::new()),
                next_key: Cell::new(0),
                next_channel: Cell::new(0),
                shutdown,
            }),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Creates a receiver observing events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.registry.bus().subscribe()
    }

    /// Token cancelled when the runtime is dropped; parent of all routine tokens.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if `other` points at this runtime.
    pub fn owns(&self, other: &WeakRuntime) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.inner), other.inner.as_ptr())
    }

    /// Number of timers still scheduled.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Drains and returns unhandled routine failures not yet surfaced by [`Runtime::run`].
    pub fn take_failures(&self) -> Vec<RuntimeError> {
        self.inner.failures.borrow_mut().drain(..).collect()
    }

    /// Drives timers and foreign futures until nothing can make progress.
    ///
    /// Returns `Err` with the first unhandled routine failure. Routines left waiting
    /// on channels nobody will ever serve do not keep the loop alive.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        loop {
            self.flush();
            let failure = self.inner.failures.borrow_mut().pop_front();
            if let Some(err) = failure {
                return Err(err);
            }

            let due = self.inner.timers.borrow_mut().pop_due(Instant::now());
            if !due.is_empty() {
                self.inner.jobs.borrow_mut().extend(due);
                continue;
            }

            let next = self.inner.timers.borrow().next_deadline();
            let parked = self.inner.routines.borrow().has_external();
            match next {
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = self.inner.remote.notify.notified() => {}
                    }
                }
                None if parked => self.inner.remote.notify.notified().await,
                None => return Ok(()),
            }
        }
    }

    pub(crate) fn defer(&self, job: impl FnOnce(&Runtime) + 'static) {
        self.inner.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Drains the job queue (and remote wakes) until both are empty.
    pub(crate) fn flush(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        let _guard = Draining(&self.inner.draining);
        loop {
            let job = self.inner.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => job(self),
                None => {
                    let woken = self.inner.remote.drain();
                    if woken.is_empty() {
                        break;
                    }
                    for (id, seq) in woken {
                        self.defer(move |rt| scheduler::wake(rt, id, seq));
                    }
                }
            }
        }
    }

    pub(crate) fn next_key(&self) -> u64 {
        let key = self.inner.next_key.get() + 1;
        self.inner.next_key.set(key);
        key
    }

    pub(crate) fn next_channel(&self) -> u64 {
        let id = self.inner.next_channel.get() + 1;
        self.inner.next_channel.set(id);
        id
    }

    pub(crate) fn schedule(&self, after: Duration, job: impl FnOnce(&Runtime) + 'static) -> TimerKey {
        let at = Instant::now() + after;
        self.inner.timers.borrow_mut().insert(at, Box::new(job))
    }

    pub(crate) fn cancel_timer(&self, key: TimerKey) -> bool {
        self.inner.timers.borrow_mut().cancel(key)
    }

    /// Records an unhandled routine failure and emits [`EventKind::RoutineFailed`].
    pub(crate) fn report(&self, routine: Arc<str>, node: Option<NodeId>, error: RoutineError) {
        let mut ev = Event::new(EventKind::RoutineFailed)
            .with_name(routine.clone())
            .with_reason(error.as_message());
        if let Some(node) = node {
            ev = ev.with_node(node);
        }
        self.inner.registry.emit(ev);
        self.inner
            .failures
            .borrow_mut()
            .push_back(RuntimeError::Unhandled { routine, error });
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(Config::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.inner.registry.len())
            .field("routines", &self.inner.routines.borrow().len())
            .field("timers", &self.pending_timers())
            .finish()
    }
}
