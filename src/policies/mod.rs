//! Channel policies.
//!
//! This module groups the knobs that control **what a channel does when it is full**.
//!
//! ## Contents
//! - [`BufferPolicy`] block / drop-new / drop-old backpressure for channel buffers
//!
//! ## Quick wiring
//! ```text
//! Runtime::chan(policy)
//!      └─► channel::Buffer::new(policy) uses:
//!           - effective_capacity() to decide store / queue / drop / evict
//! ```
//!
//! ## Defaults
//! - `BufferPolicy::Fixed(0)` (rendezvous), overridable through `Config::default_buffer`.

mod buffer;

pub use buffer::BufferPolicy;
