//! # rine
//!
//! **rine** is a cooperative CSP runtime: buffered channels, multi-channel take
//! coordination, channel composition and a scheduler for routines that suspend on
//! channel operations and resume with their result.
//!
//! Everything runs on one logical thread. Routines are `async` bodies that await
//! operation descriptors built from their [`Cx`]; the scheduler interprets the
//! descriptors and resumes the body once the operation settles.
//!
//! ## Architecture
//! ```text
//!   routine body ── cx.take(&ch)?.await ──► Descriptor ──► Scheduler
//!                                                            │ runs effect
//!                                                            ▼
//!   plain callers ── ch.put / ch.take / rt.take_with ──► Take Coordinator
//!                                                            │
//!                                                            ▼
//!                                               Chan ──► Buffer (Fixed/Dropping/Sliding)
//!                                                            │ resolvers
//!                                                            ▼
//!                                                   job queue (trampolined)
//!                                                            │
//!                   Registry ◄── node add/remove, events ────┘
//!                      │
//!                      └──► Bus ──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ### Lifecycle
//! ```text
//! Runtime::spawn(routine) ──► RoutineStarted ──► poll body
//!   loop {
//!     ├─► body awaits a Descriptor ──► effect registered ──► parked
//!     ├─► effect settles ──► resume (stale resumes are discarded)
//!     └─► body returns
//!           ├─ Ok(Exit::Done(v)) ──► RoutineEnded, on_done(Ok(v))
//!           ├─ Ok(Exit::Restart) ──► RoutineRerun, run again (bounded by restart_limit)
//!           └─ Err(e)            ──► on_done(Err(e)) or RoutineFailed (unhandled)
//!   }
//! stop(id) ──► routine and its subtree (pre-order) ──► RoutineStopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Channels**      | Buffered channels with lifecycle states and readers.          | [`Chan`], [`BufferPolicy`], [`Signal`]      |
//! | **Coordination**  | Take/read/listen over many channels, one-of or all-required.  | [`TakeOptions`], [`Resolution`], [`Unsubscribe`] |
//! | **Composition**   | Fan-in, fan-out and timeouts.                                 | [`Runtime::merge`], [`Chan::mult`], [`Runtime::timeout`] |
//! | **Routines**      | Suspendable bodies with restart and cascading stop.           | [`Routine`], [`RoutineFn`], [`Cx`], [`RoutineHandle`] |
//! | **Observability** | Lifecycle registry, events and isolated subscribers.          | [`Registry`], [`Event`], [`Subscribe`]      |
//! | **Errors**        | Typed errors for misuse, routine failures and the runtime.    | [`UsageError`], [`RoutineError`], [`RuntimeError`] |
//! | **Configuration** | Runtime settings.                                             | [`Config`], [`RuntimeBuilder`]              |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use rine::{Config, Cx, Exit, RoutineFn, Runtime, Signal};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::new(Config::default());
//!     let ch = rt.fixed::<&'static str>(0);
//!
//!     let tx = ch.clone();
//!     rt.go(RoutineFn::rc("ping", move |cx: Cx| {
//!         let tx = tx.clone();
//!         async move {
//!             cx.sleep(std::time::Duration::from_millis(10)).await;
//!             cx.put(&tx, "ping")?.await;
//!             Ok(Exit::Done(()))
//!         }
//!     }));
//!
//!     let got = std::rc::Rc::new(std::cell::RefCell::new(None));
//!     let out = got.clone();
//!     ch.take(move |s| *out.borrow_mut() = Some(s));
//!
//!     rt.run().await?;
//!     assert_eq!(*got.borrow(), Some(Signal::Value("ping")));
//!     Ok(())
//! }
//! ```
mod channel;
mod compose;
mod coordinator;
mod core;
mod error;
mod events;
mod policies;
mod routine;
mod subscribers;

// ---- Public re-exports ----

pub use channel::{Chan, ChannelId, ChannelState, Signal, WeakChan};
pub use coordinator::{Resolution, Strategy, TakeOptions, Transform, Unsubscribe};
pub use core::{Config, Node, NodeId, Registry, Runtime, RuntimeBuilder, Unlisten, WeakRuntime};
pub use error::{RoutineError, RuntimeError, UsageError};
pub use events::{Bus, Event, EventKind};
pub use policies::BufferPolicy;
pub use routine::{
    Cx, Descriptor, Exit, OpTag, Routine, RoutineArgs, RoutineFn, RoutineHandle, RoutineId,
    RoutineRef, RoutineResult, RunState,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
