//! # Routine context.
//!
//! [`Cx`] is handed to every routine run. It builds the operation descriptors the
//! body awaits and gives access to the routine's identity and cancellation token.
//!
//! | Method                      | Descriptor output              | Tag            |
//! |-----------------------------|--------------------------------|----------------|
//! | `put(&ch, v)`               | `Signal<bool>`                 | `Put`          |
//! | `put_all(&chans, v)`        | `Vec<Signal<bool>>`            | `Put`          |
//! | `take(&ch)`                 | `Signal<T>`                    | `Take`         |
//! | `take_all(&chans)`          | `Vec<Signal<T>>`               | `Take`         |
//! | `take_one_of(&chans)`       | `(Signal<T>, usize)`           | `Take`         |
//! | `read(&ch)`                 | `Signal<T>`                    | `Read`         |
//! | `take_with(&chans, opts)`   | `Resolution<T>`                | `Take`/`Read`  |
//! | `sleep(d)`                  | `()`                           | `Sleep`        |
//! | `stop()`                    | never resolves                 | `Stop`         |
//! | `call(routine)`             | `RoutineResult<R>`             | `CallRoutine`  |
//! | `fork(routine)`             | `RoutineHandle`                | `ForkRoutine`  |
//! | `noop()`                    | `()`                           | `Noop`         |
//!
//! Channel operations check their channels up front and return [`UsageError`]
//! synchronously; a listen option passed to `take_with` is ignored (a descriptor
//! resolves once).

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::arena::RoutineId;
use super::handle::RoutineHandle;
use super::ops::{Descriptor, Op, OpTag};
use super::routine::{RoutineRef, RoutineResult};
use super::scheduler;
use crate::channel::{Chan, Claim, Signal, Ticket};
use crate::coordinator::{self, Resolution, TakeOptions, Unsubscribe};
use crate::core::{NodeId, Runtime, WeakRuntime};
use crate::error::{RoutineError, UsageError};
use crate::events::{Event, EventKind};
use crate::policies::BufferPolicy;

/// Context of one routine run.
#[derive(Clone)]
pub struct Cx {
    rt: WeakRuntime,
    id: RoutineId,
    name: Arc<str>,
    token: CancellationToken,
    yielded: Rc<RefCell<Option<Op>>>,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Cx {
    pub(crate) fn new(
        rt: WeakRuntime,
        id: RoutineId,
        name: Arc<str>,
        token: CancellationToken,
        yielded: Rc<RefCell<Option<Op>>>,
    ) -> Self {
        Self {
            rt,
            id,
            name,
            token,
            yielded,
        }
    }

    #[inline]
    pub fn id(&self) -> RoutineId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token cancelled when this routine is stopped.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.rt.upgrade()
    }

    /// Creates a channel owned by this routine (diagnostic parent only).
    pub fn chan<T: Clone + 'static>(&self, policy: BufferPolicy) -> Result<Chan<T>, UsageError> {
        let rt = self.live()?;
        Ok(Chan::new(&rt, None, policy, Some(NodeId::Routine(self.id))))
    }

    /// Like [`Cx::chan`] with `Config::default_buffer`.
    pub fn chan_default<T: Clone + 'static>(&self) -> Result<Chan<T>, UsageError> {
        let rt = self.live()?;
        let policy = rt.config().default_buffer;
        Ok(Chan::new(&rt, None, policy, Some(NodeId::Routine(self.id))))
    }

    pub fn put<T: Clone + 'static>(&self, ch: &Chan<T>, item: T) -> Result<Descriptor<Signal<bool>>, UsageError> {
        let rt = self.live()?;
        coordinator::check(&rt, std::slice::from_ref(ch))?;
        let ch = ch.clone();
        Ok(Descriptor::new(OpTag::Put, self.yielded.clone(), move |rt, fill| {
            let ticket = Ticket::new(rt.next_key(), Claim::exclusive());
            let handle = ch.unsubscribe_for(&ticket);
            ch.put_ticket(rt, ticket, item, Box::new(move |signal| fill.fill(signal)));
            Some(handle)
        }))
    }

    pub fn put_all<T: Clone + 'static>(
        &self,
        chans: &[Chan<T>],
        item: T,
    ) -> Result<Descriptor<Vec<Signal<bool>>>, UsageError> {
        let rt = self.live()?;
        coordinator::check(&rt, chans)?;
        let chans = chans.to_vec();
        Ok(Descriptor::new(OpTag::Put, self.yielded.clone(), move |rt, fill| {
            Some(coordinator::put_all(
                rt,
                &chans,
                item,
                Box::new(move |signals| fill.fill(signals)),
            ))
        }))
    }

    pub fn take<T: Clone + 'static>(&self, ch: &Chan<T>) -> Result<Descriptor<Signal<T>>, UsageError> {
        self.coordinated(std::slice::from_ref(ch), TakeOptions::new(), Resolution::into_first)
    }

    /// Takes from every channel; resolves once all produced a signal.
    pub fn take_all<T: Clone + 'static>(&self, chans: &[Chan<T>]) -> Result<Descriptor<Vec<Signal<T>>>, UsageError> {
        self.coordinated(chans, TakeOptions::new(), Resolution::into_all)
    }

    /// Takes from whichever channel delivers first.
    pub fn take_one_of<T: Clone + 'static>(
        &self,
        chans: &[Chan<T>],
    ) -> Result<Descriptor<(Signal<T>, usize)>, UsageError> {
        self.coordinated(chans, TakeOptions::new().one_of(), |res: Resolution<T>| {
            let idx = res.index().unwrap_or(0);
            (res.into_first(), idx)
        })
    }

    pub fn read<T: Clone + 'static>(&self, ch: &Chan<T>) -> Result<Descriptor<Signal<T>>, UsageError> {
        self.coordinated(std::slice::from_ref(ch), TakeOptions::new().read(), Resolution::into_first)
    }

    pub fn take_with<T: Clone + 'static>(
        &self,
        chans: &[Chan<T>],
        opts: TakeOptions<T>,
    ) -> Result<Descriptor<Resolution<T>>, UsageError> {
        self.coordinated(chans, opts, |res| res)
    }

    pub fn sleep(&self, after: Duration) -> Descriptor<()> {
        Descriptor::new(OpTag::Sleep, self.yielded.clone(), move |rt, fill| {
            let key = rt.schedule(after, move |_| fill.fill(()));
            let weak = rt.downgrade();
            Some(Unsubscribe::from_fn(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.cancel_timer(key);
                }
            }))
        })
    }

    /// Resumes on the next scheduler turn.
    pub fn noop(&self) -> Descriptor<()> {
        Descriptor::new(OpTag::Noop, self.yielded.clone(), |_, fill| {
            fill.fill(());
            None
        })
    }

    /// Stops this routine and its children. Never resolves.
    pub fn stop(&self) -> Descriptor<()> {
        Descriptor::stop(self.yielded.clone())
    }

    /// Runs `routine` as a child and resumes with its result.
    ///
    /// A child stopped on its own resolves with [`RoutineError::Stopped`].
    pub fn call<R: 'static>(&self, routine: RoutineRef<R>) -> Descriptor<RoutineResult<R>> {
        let parent = self.id;
        Descriptor::new(OpTag::CallRoutine, self.yielded.clone(), move |rt, fill| {
            let name: Arc<str> = routine.name().into();
            let stopped = fill.clone();
            scheduler::spawn(
                rt,
                Some(parent),
                routine,
                Some(Box::new(move |_: &Runtime, result: RoutineResult<R>| fill.fill(result))),
                Some(Box::new(move |_: &Runtime| {
                    stopped.fill(Err(RoutineError::Stopped { routine: name }))
                })),
            );
            None
        })
    }

    /// Starts `routine` as a child and resumes immediately with its handle.
    ///
    /// Errors returned by a forked routine are unhandled failures.
    pub fn fork<R: 'static>(&self, routine: RoutineRef<R>) -> Descriptor<RoutineHandle> {
        let parent = self.id;
        Descriptor::new(OpTag::ForkRoutine, self.yielded.clone(), move |rt, fill| {
            fill.fill(scheduler::spawn(rt, Some(parent), routine, None, None));
            None
        })
    }

    /// Awaits a foreign future, mapping its error into [`RoutineError::Failed`].
    ///
    /// Emits `RoutineAsyncBegin`, then `RoutineAsyncEnd` or `RoutineAsyncError`.
    /// The routine stays parked (and keeps [`Runtime::run`] alive) until the
    /// future settles.
    pub async fn deferred<V, E, F>(&self, fut: F) -> RoutineResult<V>
    where
        E: fmt::Display,
        F: Future<Output = Result<V, E>>,
    {
        self.emit(EventKind::RoutineAsyncBegin, None);
        match fut.await {
            Ok(value) => {
                self.emit(EventKind::RoutineAsyncEnd, None);
                Ok(value)
            }
            Err(e) => {
                let err = RoutineError::failed(e);
                self.emit(EventKind::RoutineAsyncError, Some(err.as_message()));
                Err(err)
            }
        }
    }

    fn coordinated<T, V>(
        &self,
        chans: &[Chan<T>],
        opts: TakeOptions<T>,
        map: impl Fn(Resolution<T>) -> V + 'static,
    ) -> Result<Descriptor<V>, UsageError>
    where
        T: Clone + 'static,
        V: 'static,
    {
        let rt = self.live()?;
        coordinator::check(&rt, chans)?;
        let tag = if opts.is_read() { OpTag::Read } else { OpTag::Take };
        let opts = TakeOptions {
            listen: false,
            read: opts.is_read(),
            ..opts
        };
        let chans = chans.to_vec();
        let parent = self.id;
        Ok(Descriptor::new(tag, self.yielded.clone(), move |rt, fill| {
            Some(coordinator::register(
                rt,
                Some(parent),
                &chans,
                opts,
                Rc::new(move |res| fill.fill(map(res))),
            ))
        }))
    }

    fn live(&self) -> Result<Runtime, UsageError> {
        self.rt.upgrade().ok_or(UsageError::RuntimeGone)
    }

    fn emit(&self, kind: EventKind, reason: Option<String>) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        let mut ev = Event::new(kind)
            .with_node(NodeId::Routine(self.id))
            .with_name(self.name.clone());
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        rt.registry().emit(ev);
    }
}
