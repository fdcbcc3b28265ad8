//! # Channel states and resolution signals.
//!
//! A [`Signal`] is what every channel callback receives: either a value or the
//! terminal state the channel was in when the operation resolved. Terminal
//! states are normal resolutions, callers branch on them.
//!
//! ## Lifecycle
//! ```text
//!            close() on empty buffer
//!   Open ───────────────────────────────► Ended
//!     │                                    ▲
//!     │ close() on non-empty buffer        │ buffer drained
//!     └──────────────► Closed ─────────────┘
//!
//!   reset(): any state ──► Open
//! ```

/// Lifecycle state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Accepts puts and takes.
    Open,
    /// Rejects puts; buffered values can still be drained.
    Closed,
    /// Rejects everything.
    Ended,
}

impl ChannelState {
    /// Returns `true` for [`ChannelState::Closed`] and [`ChannelState::Ended`].
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChannelState::Open)
    }

    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
            ChannelState::Ended => "ended",
        }
    }
}

/// Resolution delivered to channel callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal<T> {
    /// A value was delivered.
    Value(T),
    /// The channel is closed (values may still be buffered).
    Closed,
    /// The channel is ended.
    Ended,
}

impl<T> Signal<T> {
    /// Builds the signal matching a terminal channel state.
    ///
    /// `Open` has no terminal meaning and maps to `Ended`.
    #[inline]
    pub fn terminal(state: ChannelState) -> Self {
        match state {
            ChannelState::Closed => Signal::Closed,
            ChannelState::Open | ChannelState::Ended => Signal::Ended,
        }
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Signal::Value(_))
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.is_value()
    }

    /// Returns the carried value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Signal::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a reference to the carried value, if any.
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Signal::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Maps the carried value, keeping terminal states.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
        match self {
            Signal::Value(v) => Signal::Value(f(v)),
            Signal::Closed => Signal::Closed,
            Signal::Ended => Signal::Ended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_signal_follows_state() {
        assert_eq!(Signal::<u8>::terminal(ChannelState::Closed), Signal::Closed);
        assert_eq!(Signal::<u8>::terminal(ChannelState::Ended), Signal::Ended);
        assert!(ChannelState::Closed.is_terminal());
        assert!(!ChannelState::Open.is_terminal());
    }

    #[test]
    fn test_map_keeps_terminal() {
        assert_eq!(Signal::Value(2).map(|v| v * 2), Signal::Value(4));
        assert_eq!(Signal::<i32>::Closed.map(|v| v * 2), Signal::Closed);
        assert_eq!(Signal::Value("x").value(), Some("x"));
    }
}
