//! # Routine abstraction and function-backed implementations.
//!
//! This module defines the [`Routine`] trait (async, single-threaded, restartable)
//! and two function-backed implementations:
//! - [`RoutineFn`] wraps `FnMut(Cx) -> Fut`;
//! - [`RoutineArgs`] wraps `FnMut(Cx, A) -> Fut` and replays the same arguments on
//!   every restart.
//!
//! The common handle type is [`RoutineRef`], an `Rc<dyn Routine>` shared by the
//! scheduler across restarts.

use std::borrow::Cow;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use async_trait::async_trait;

use super::cx::Cx;
use crate::error::RoutineError;

/// Result a routine body (or a callee) produces.
pub type RoutineResult<R> = Result<R, RoutineError>;

/// Shared handle to a routine object.
pub type RoutineRef<R> = Rc<dyn Routine<Output = R>>;

/// How a routine run ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exit<R> {
    /// The routine finished with a value.
    Done(R),
    /// Run the routine again from the start with its original arguments.
    Restart,
}

/// # Cooperative routine.
///
/// A `Routine` has a stable [`name`](Routine::name) and an async
/// [`run`](Routine::run) body that receives its [`Cx`]. The body suspends by
/// awaiting operation descriptors built from the context (`cx.take(..)`,
/// `cx.sleep(..)`, ...) and is driven by the runtime's scheduler.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use rine::{Cx, Exit, Routine, RoutineResult};
///
/// struct Tick;
///
/// #[async_trait(?Send)]
/// impl Routine for Tick {
///     type Output = u32;
///
///     fn name(&self) -> &str { "tick" }
///
///     async fn run(&self, cx: Cx) -> RoutineResult<Exit<u32>> {
///         cx.noop().await;
///         Ok(Exit::Done(1))
///     }
/// }
/// ```
#[async_trait(?Send)]
pub trait Routine: 'static {
    type Output: 'static;

    /// Returns a stable, human-readable routine name.
    fn name(&self) -> &str;

    /// Runs the body once. Called again from scratch on restart.
    async fn run(&self, cx: Cx) -> RoutineResult<Exit<Self::Output>>;
}

/// # Function-backed routine.
///
/// [`RoutineFn`] wraps a closure `Fnc: FnMut(Cx) -> Fut`. The closure sits in a
/// [`RefCell`] so it can be `FnMut`; the borrow is held only while the future is
/// created, never while it runs.
///
/// # Example
/// ```
/// use rine::{Cx, Exit, RoutineFn, RoutineRef};
///
/// let r: RoutineRef<&str> = RoutineFn::rc("hello", |_cx: Cx| async { Ok(Exit::Done("hi")) });
/// assert_eq!(r.name(), "hello");
/// ```
pub struct RoutineFn<Fnc, Fut, R> {
    name: Cow<'static, str>,
    func: RefCell<Fnc>,
    _out: PhantomData<fn() -> (Fut, R)>,
}

impl<Fnc, Fut, R> RoutineFn<Fnc, Fut, R>
where
    Fnc: FnMut(Cx) -> Fut + 'static,
    Fut: Future<Output = RoutineResult<Exit<R>>> + 'static,
    R: 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, func: Fnc) -> Self {
        Self {
            name: name.into(),
            func: RefCell::new(func),
            _out: PhantomData,
        }
    }

    /// Creates the routine and returns it as a shared handle.
    pub fn rc(name: impl Into<Cow<'static, str>>, func: Fnc) -> RoutineRef<R> {
        Rc::new(Self::new(name, func))
    }
}

#[async_trait(?Send)]
impl<Fnc, Fut, R> Routine for RoutineFn<Fnc, Fut, R>
where
    Fnc: FnMut(Cx) -> Fut + 'static,
    Fut: Future<Output = RoutineResult<Exit<R>>> + 'static,
    R: 'static,
{
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: Cx) -> RoutineResult<Exit<R>> {
        let fut = {
            let mut f = self
                .func
                .try_borrow_mut()
                .map_err(|_| RoutineError::failed("routine body re-entered"))?;
            (*f)(cx)
        };
        fut.await
    }
}

/// # Function-backed routine with arguments.
///
/// Like [`RoutineFn`], but the closure also receives a clone of `args` on every
/// run, so a restarted routine sees exactly the arguments it was spawned with.
///
/// # Example
/// ```
/// use rine::{Cx, Exit, RoutineArgs, RoutineRef};
///
/// let r: RoutineRef<u32> = RoutineArgs::rc("double", 21u32, |_cx: Cx, n: u32| async move {
///     Ok(Exit::Done(n * 2))
/// });
/// assert_eq!(r.name(), "double");
/// ```
pub struct RoutineArgs<A, Fnc, Fut, R> {
    name: Cow<'static, str>,
    args: A,
    func: RefCell<Fnc>,
    _out: PhantomData<fn() -> (Fut, R)>,
}

impl<A, Fnc, Fut, R> RoutineArgs<A, Fnc, Fut, R>
where
    A: Clone + 'static,
    Fnc: FnMut(Cx, A) -> Fut + 'static,
    Fut: Future<Output = RoutineResult<Exit<R>>> + 'static,
    R: 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, args: A, func: Fnc) -> Self {
        Self {
            name: name.into(),
            args,
            func: RefCell::new(func),
            _out: PhantomData,
        }
    }

    pub fn rc(name: impl Into<Cow<'static, str>>, args: A, func: Fnc) -> RoutineRef<R> {
        Rc::new(Self::new(name, args, func))
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

#[async_trait(?Send)]
impl<A, Fnc, Fut, R> Routine for RoutineArgs<A, Fnc, Fut, R>
where
    A: Clone + 'static,
    Fnc: FnMut(Cx, A) -> Fut + 'static,
    Fut: Future<Output = RoutineResult<Exit<R>>> + 'static,
    R: 'static,
{
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: Cx) -> RoutineResult<Exit<R>> {
        let fut = {
            let mut f = self
                .func
                .try_borrow_mut()
                .map_err(|_| RoutineError::failed("routine body re-entered"))?;
            (*f)(cx, self.args.clone())
        };
        fut.await
    }
}
