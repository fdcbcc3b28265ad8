//! Runtime core: instance-scoped context, scheduling primitives and bookkeeping.
//!
//! The public API from this module is [`Runtime`] (plus its builder and config) and
//! the [`Registry`] every channel and routine reports to.
//!
//! ## Wiring
//! ```text
//!                ┌──────────────────────────── Runtime (Rc<Inner>) ──────────────────────────┐
//!                │ jobs (trampoline)   timers (BTreeMap)   arena (routines)   registry        │
//!                └──────┬─────────────────────┬──────────────────┬─────────────────┬─────────┘
//!                       │                     │                  │                 │
//! Chan ── defer(resolver) ─┘   Sleep / timeout ──┘   scheduler::poll ──┘    Registry::emit
//!                                                                                  │
//!                                                  local handlers ◄────────────────┤
//!                                                                                  ▼
//!                                          Bus ──► subscriber listener ──► SubscriberSet
//! ```
//!
//! Internal modules:
//! - [`runtime`]: job queue, flush, timers, run loop;
//! - [`timers`]: ordered timer map;
//! - [`remote`]: thread-safe wake queue for foreign futures;
//! - [`registry`]: node table and synchronous event hub;
//! - [`builder`]: runtime construction with subscribers;
//! - [`config`]: runtime configuration.

mod builder;
mod config;
mod registry;
mod remote;
mod runtime;
mod timers;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use registry::{Node, NodeId, Registry, Unlisten};
pub use runtime::{Runtime, WeakRuntime};

pub(crate) use remote::RoutineWaker;
