//! # Buffer policies for channels.
//!
//! [`BufferPolicy`] decides what a channel does with a put once its buffer is full.
//!
//! - [`BufferPolicy::Fixed`] the producer waits (put is queued until a take frees space).
//! - [`BufferPolicy::Dropping`] the **new** item is discarded; put resolves `false`.
//! - [`BufferPolicy::Sliding`] the **oldest** item is evicted; put resolves `true`.
//!
//! ## Choosing the right policy
//! ```text
//! Fixed(0)        → pure rendezvous: every put waits for a matching take
//! Fixed(n)        → up to n puts complete without a taker, then producers block
//! Dropping(n)     → producers never block, late items are lost
//! Sliding(n)      → producers never block, stale items are lost
//! ```
//!
//! `Dropping(0)` and `Sliding(0)` behave as capacity 1: a non-blocking channel
//! must be able to hold at least one item.

/// Backpressure policy applied by a channel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Block producers once `capacity` items are stored (`0` = rendezvous).
    Fixed(usize),
    /// Discard the new item once `capacity` items are stored.
    Dropping(usize),
    /// Evict the oldest item once `capacity` items are stored.
    Sliding(usize),
}

impl BufferPolicy {
    /// Returns the configured capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        match *self {
            BufferPolicy::Fixed(n) | BufferPolicy::Dropping(n) | BufferPolicy::Sliding(n) => n,
        }
    }

    /// Returns the number of items the buffer may actually hold.
    ///
    /// Dropping and sliding buffers are clamped to a minimum of 1.
    #[inline]
    pub fn effective_capacity(&self) -> usize {
        match *self {
            BufferPolicy::Fixed(n) => n,
            BufferPolicy::Dropping(n) | BufferPolicy::Sliding(n) => n.max(1),
        }
    }

    /// Returns `true` if producers can be made to wait.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self, BufferPolicy::Fixed(_))
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BufferPolicy::Fixed(_) => "fixed",
            BufferPolicy::Dropping(_) => "dropping",
            BufferPolicy::Sliding(_) => "sliding",
        }
    }
}

impl Default for BufferPolicy {
    /// Returns [`BufferPolicy::Fixed(0)`] (rendezvous).
    fn default() -> Self {
        BufferPolicy::Fixed(0)
    }
}
