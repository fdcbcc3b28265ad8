//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings for a [`Runtime`](crate::Runtime).
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Runtime::new(config)` / `Runtime::builder(config)`
//! 2. **Operation defaults**: `Runtime::chan_default()`, read `initial_call`
//!
//! ## Sentinel values
//! - `restart_limit = 0` → unlimited restarts through `Exit::Restart`

use crate::policies::BufferPolicy;

/// Configuration for one runtime instance.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `default_buffer`: Buffer policy for channels created without one
/// - `restart_limit`: Restarts allowed per routine (`0` = unlimited)
/// - `read_initial_call`: Whether reads fire immediately with a buffered head
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages skip
    /// older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Buffer policy used by `Runtime::chan_default()` and `Cx::chan_default()`.
    pub default_buffer: BufferPolicy,

    /// Maximum number of restarts a single routine may request.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = the `n + 1`-th restart fails the routine with `RoutineError::RestartLimit`
    pub restart_limit: u32,

    /// Default for `TakeOptions::initial_call` on reads and listens.
    ///
    /// When `true`, a reader registered on a channel that already holds a value
    /// fires immediately with the buffered head.
    pub read_initial_call: bool,
}

impl Config {
    /// Returns the restart limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` restarts per routine
    #[inline]
    pub fn restart_limit(&self) -> Option<u32> {
        if self.restart_limit == 0 {
            None
        } else {
            Some(self.restart_limit)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `default_buffer = BufferPolicy::Fixed(0)` (rendezvous)
    /// - `restart_limit = 0` (unlimited)
    /// - `read_initial_call = true`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            default_buffer: BufferPolicy::default(),
            restart_limit: 0,
            read_initial_call: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_restart_limit_is_unlimited() {
        let mut cfg = Config::default();
        assert_eq!(cfg.restart_limit(), None);
        cfg.restart_limit = 3;
        assert_eq!(cfg.restart_limit(), Some(3));
    }

    #[test]
    fn test_bus_capacity_is_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
