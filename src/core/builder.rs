use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{runtime::Runtime, Config};
use crate::{
    error::RuntimeError,
    events::{Bus, Event},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Runtime`] with optional event subscribers.
pub struct RuntimeBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (channel and routine lifecycle, failures)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the runtime.
    ///
    /// This consumes the builder and initializes:
    /// - Event bus for broadcasting
    /// - Registry for node lifecycle bookkeeping
    /// - Subscriber workers and their listener task (only when subscribers are set)
    ///
    /// Subscribers need a tokio context; without one this returns
    /// [`RuntimeError::NoReactor`].
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutdown = CancellationToken::new();

        if !self.subscribers.is_empty() {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(RuntimeError::NoReactor);
            }
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(bus.subscribe(), set, shutdown.clone());
        }
        Ok(Runtime::from_parts(self.cfg, bus, shutdown))
    }
}

/// Forwards bus events to the subscriber set until the runtime is dropped.
///
/// Events already queued on the bus at shutdown are still delivered before the
/// subscriber workers are drained.
fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit_arc(Arc::new(ev)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit_arc(Arc::new(ev));
        }
        set.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_need_reactor() {
        struct Quiet;

        #[async_trait::async_trait]
        impl Subscribe for Quiet {
            async fn on_event(&self, _event: &Event) {}
        }

        let err = RuntimeBuilder::new(Config::default())
            .with_subscribers(vec![Arc::new(Quiet)])
            .build()
            .expect_err("no reactor");
        assert!(matches!(err, RuntimeError::NoReactor));
    }

    #[test]
    fn test_build_without_subscribers_needs_nothing() {
        let rt = RuntimeBuilder::new(Config::default()).build().expect("runtime");
        assert!(rt.registry().is_empty());
    }
}
