//! Channels: buffered queues with lifecycle state and non-consuming readers.
//!
//! - [`Chan`] / [`WeakChan`]: channel handles;
//! - [`Signal`]: what a callback receives (a value or the terminal state);
//! - [`ChannelState`]: `Open` → `Closed` (buffer still holds values) → `Ended`.
//!
//! Internal building blocks:
//! - `buffer`: policy-driven storage plus pending puts and takes;
//! - `claim`: once-only delivery tokens shared by one call's registrations.

mod buffer;
mod chan;
mod claim;
mod signal;

pub use chan::{Chan, ChannelId, WeakChan};
pub use signal::{ChannelState, Signal};

pub(crate) use claim::{Claim, Ticket};
