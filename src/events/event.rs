//! # Runtime events emitted by channels, routines and subscriber workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registry events**: nodes (channels, routines) added to or removed from the registry
//! - **Channel events**: close and reset
//! - **Routine events**: routine lifecycle (started, rerun, ended, stopped, failed) and
//!   foreign asynchronous values (async begin/end/error)
//! - **Subscriber events**: overflow and panics of event subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, node id
//! and name, parent node, reasons and restart attempts.
//!
//! ## Ordering guarantees
//! Each event is stamped by the emitting [`Registry`](crate::Registry) with a sequence
//! number (`seq`) that increases monotonically **per runtime**. Use `seq` to restore the
//! exact order when events are observed out of order (e.g. through a lagging subscriber).
//!
//! ## Example
//! ```rust
//! use rine::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RoutineFailed)
//!     .with_name("worker")
//!     .with_reason("boom")
//!     .with_attempt(3);
//!
//! assert_eq!(ev.kind, EventKind::RoutineFailed);
//! assert_eq!(ev.name.as_deref(), Some("worker"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use crate::core::NodeId;

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Registry events ===
    /// A channel or routine was added to the registry.
    ///
    /// Sets:
    /// - `node`: node id
    /// - `name`: node name
    /// - `parent`: owning node, if any
    NodeAdded,

    /// A channel or routine was removed from the registry.
    ///
    /// Sets:
    /// - `node`: node id
    /// - `name`: node name
    NodeRemoved,

    // === Channel events ===
    /// Channel was closed.
    ///
    /// Sets:
    /// - `node`: channel id
    /// - `name`: channel name
    /// - `reason`: resulting state (`"closed"` or `"ended"`)
    ChannelClosed,

    /// Channel was reset back to open.
    ///
    /// Sets:
    /// - `node`: channel id
    /// - `name`: channel name
    ChannelReset,

    // === Routine lifecycle events ===
    /// Routine was spawned.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    /// - `parent`: parent routine, if any
    RoutineStarted,

    /// Routine returned the restart marker (or was rerun explicitly) and starts over.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    /// - `attempt`: restart count (1-based)
    RoutineRerun,

    /// Routine returned normally.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    RoutineEnded,

    /// Routine was stopped (explicitly, by itself, or by a parent cascade).
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    RoutineStopped,

    /// Routine failed with nobody to receive the error.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    /// - `reason`: error message
    RoutineFailed,

    // === Foreign asynchronous values ===
    /// Routine parked on a foreign future.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    RoutineAsyncBegin,

    /// Foreign future woke the routine up.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    RoutineAsyncEnd,

    /// Deferred value failed; the error is returned into the routine.
    ///
    /// Sets:
    /// - `node`: routine id
    /// - `name`: routine name
    /// - `reason`: error message
    RoutineAsyncError,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::NodeAdded => "node-added",
            EventKind::NodeRemoved => "node-removed",
            EventKind::ChannelClosed => "channel-closed",
            EventKind::ChannelReset => "channel-reset",
            EventKind::RoutineStarted => "routine-started",
            EventKind::RoutineRerun => "routine-rerun",
            EventKind::RoutineEnded => "routine-end",
            EventKind::RoutineStopped => "routine-stopped",
            EventKind::RoutineFailed => "routine-failed",
            EventKind::RoutineAsyncBegin => "routine-async-begin",
            EventKind::RoutineAsyncEnd => "routine-async-end",
            EventKind::RoutineAsyncError => "routine-async-error",
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: per-runtime sequence, stamped on emit
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonically increasing sequence number within one runtime.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Channel or routine the event is about.
    pub node: Option<NodeId>,
    /// Name of the node (or subscriber).
    pub name: Option<Arc<str>>,
    /// Owning node, if any.
    pub parent: Option<NodeId>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Restart count (starting from 1).
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp.
    ///
    /// `seq` is left at 0 until the event is emitted through a registry.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            node: None,
            name: None,
            parent: None,
            reason: None,
            attempt: None,
        }
    }

    /// Attaches the node the event is about.
    #[inline]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attaches a node (or subscriber) name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches the owning node.
    #[inline]
    pub fn with_parent(mut self, parent: Option<NodeId>) -> Self {
        self.parent = parent;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a restart count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
