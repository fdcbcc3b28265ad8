use std::sync::Arc;
use std::time::Duration;

use crate::channel::Chan;
use crate::core::Runtime;

impl Runtime {
    /// Returns a channel that closes itself once `after` has elapsed.
    ///
    /// The channel carries `T` so it can race other channels of the same type in
    /// a one-of take. The pending timer owns the channel, so it closes even when
    /// every caller handle is gone. The timer is driven by [`Runtime::run`].
    pub fn timeout<T: Clone + 'static>(&self, after: Duration) -> Chan<T> {
        let ch = Chan::new(
            self,
            Some(Arc::from("timeout")),
            self.config().default_buffer,
            None,
        );
        let owned = ch.clone();
        self.schedule(after, move |_| owned.close());
        ch
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tokio::time::Instant;

    use crate::channel::{ChannelState, Signal};
    use crate::coordinator::TakeOptions;
    use crate::core::{Config, NodeId};
    use crate::policies::BufferPolicy;
    use crate::routine::{Cx, Exit, RoutineFn};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_closes_after_delay() {
        let rt = Runtime::new(Config::default());
        let t: Chan<()> = rt.timeout(Duration::from_millis(50));

        let got = Rc::new(RefCell::new(None));
        let out = got.clone();
        t.take(move |s| *out.borrow_mut() = Some(s));
        assert!(got.borrow().is_none());

        let started = Instant::now();
        rt.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(*got.borrow(), Some(Signal::Ended));
        assert_eq!(t.state(), ChannelState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_races_a_silent_channel() {
        let rt = Runtime::new(Config::default());
        let data: Chan<i32> = rt.chan(BufferPolicy::Fixed(0));
        let t = rt.timeout(Duration::from_secs(1));

        let got = Rc::new(RefCell::new(None));
        let out = got.clone();
        rt.take_with(&[data.clone(), t], TakeOptions::new().one_of(), move |res| {
            *out.borrow_mut() = Some((res.index(), res.into_first()));
        })
        .unwrap();

        rt.run().await.unwrap();
        assert_eq!(*got.borrow(), Some((Some(1), Signal::Ended)));
        assert_eq!(data.pending_takes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_keeps_unheld_timeout_channel_alive() {
        let rt = Runtime::new(Config::default());
        let weak = rt.timeout::<i32>(Duration::from_millis(10)).downgrade();
        let id = weak.id();
        assert_eq!(rt.pending_timers(), 1);
        assert!(weak.upgrade().is_some());

        rt.run().await.unwrap();
        assert_eq!(rt.pending_timers(), 0);
        assert!(weak.upgrade().is_none());
        assert!(!rt.registry().contains(NodeId::Channel(id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_timeout_race_in_routine() {
        let rt = Runtime::new(Config::default());
        let data: Chan<i32> = rt.chan(BufferPolicy::Fixed(0));
        let got = Rc::new(RefCell::new(None));

        let (d, out) = (data.clone(), got.clone());
        rt.go(RoutineFn::rc("racer", move |cx: Cx| {
            let (d, out) = (d.clone(), out.clone());
            async move {
                let Some(rt) = cx.runtime() else {
                    return Ok(Exit::Done(()));
                };
                let race = [d, rt.timeout(Duration::from_millis(20))];
                drop(rt);
                let res = cx.take_one_of(&race)?.await;
                *out.borrow_mut() = Some(res);
                Ok(Exit::Done(()))
            }
        }));

        rt.run().await.unwrap();
        assert_eq!(*got.borrow(), Some((Signal::Ended, 1)));
        assert_eq!(data.queued_takes(), 0);
    }
}
