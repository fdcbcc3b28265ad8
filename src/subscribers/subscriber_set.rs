//! # Per-subscriber delivery lanes.
//!
//! [`SubscriberSet`] gives every subscriber its own lane: a bounded queue and a
//! worker task draining it. The listener only ever calls [`SubscriberSet::emit_arc`],
//! which never waits.
//!
//! ```text
//! emit_arc(ev) ──► lane "log"    [queue] ──► worker ──► on_event
//!              ──► lane "metrics"[queue] ──► worker ──► on_event
//!                        │ full / closed                  │ panic
//!                        ▼                                ▼
//!              SubscriberOverflow (bus)        SubscriberPanicked (bus)
//! ```
//!
//! A lane keeps its own FIFO order; lanes are not ordered against each other.
//! Overflow events are never reported as overflowing themselves.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl Lane {
    /// Queues `ev`; returns the overflow reason if the lane refused it.
    fn offer(&self, ev: &Arc<Event>) -> Option<&'static str> {
        let reason = match self.tx.try_send(Arc::clone(ev)) {
            Ok(()) => return None,
            Err(mpsc::error::TrySendError::Full(_)) => "full",
            Err(mpsc::error::TrySendError::Closed(_)) => "closed",
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        Some(reason)
    }
}

/// Fan-out of runtime events to [`Subscribe`] implementations.
///
/// Owned by the listener task spawned in
/// [`RuntimeBuilder::build`](crate::RuntimeBuilder::build); usable directly when
/// events come from somewhere else.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane {
                    name: sub.name(),
                    tx,
                    dropped: AtomicU64::new(0),
                };
                (lane, tokio::spawn(drain(sub, rx, bus.clone())))
            })
            .unzip();
        Self { lanes, workers, bus }
    }

    /// Clones `event` and emits it.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues `event` on every lane without waiting.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let report = event.kind != EventKind::SubscriberOverflow;
        for lane in &self.lanes {
            if let Some(reason) = lane.offer(&event) {
                if report {
                    self.bus.publish(Event::subscriber_overflow(lane.name, reason));
                }
            }
        }
    }

    /// Events each subscriber missed because its lane was full or closed.
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.lanes
            .iter()
            .map(|l| (l.name, l.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Closes every lane and waits until the workers delivered what was queued.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn drain(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
        if let Err(payload) = delivery.await {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(payload.as_ref())));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    struct Counter {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panics;

    #[async_trait]
    impl Subscribe for Panics {
        async fn on_event(&self, _event: &Event) {
            panic!("subscriber bug");
        }

        fn name(&self) -> &'static str {
            "panics"
        }
    }

    struct Stuck {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _event: &Event) {
            self.gate.notified().await;
        }

        fn name(&self) -> &'static str {
            "stuck"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queues() {
        let seen = Arc::new(AtomicUsize::new(0));
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Counter { seen: seen.clone() })];
        let set = SubscriberSet::new(subs, Bus::new(16));
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::NodeAdded));
        }
        set.shutdown().await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let subs: Vec<Arc<dyn Subscribe>> = vec![
            Arc::new(Panics),
            Arc::new(Counter { seen: seen.clone() }),
        ];
        let set = SubscriberSet::new(subs, bus);
        set.emit(&Event::new(EventKind::RoutineStarted));
        set.emit(&Event::new(EventKind::RoutineEnded));
        set.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.name.as_deref(), Some("panics"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber bug"));
    }

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&7u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_full_queue_publishes_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let gate = Arc::new(Notify::new());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Stuck { gate: gate.clone() })];
        let set = SubscriberSet::new(subs, bus);

        // The worker has not run yet: the queue takes one event, the rest overflow.
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::NodeAdded));
        }
        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.name.as_deref(), Some("stuck"));
        assert_eq!(set.dropped(), vec![("stuck", 2)]);
        gate.notify_waiters();
    }
}
