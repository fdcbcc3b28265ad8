//! # Event subscribers.
//!
//! Runtime events reach subscribers through the [`Bus`](crate::events::Bus):
//!
//! ```text
//! Registry::emit ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                      ├──► worker ──► LogWriter
//!                                                      ├──► worker ──► Metrics
//!                                                      └──► worker ──► Custom ...
//! ```
//!
//! Implement [`Subscribe`] and pass it to
//! [`RuntimeBuilder::with_subscribers`](crate::RuntimeBuilder::with_subscribers).
//! The built-in [`LogWriter`] is available with the `logging` feature.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
