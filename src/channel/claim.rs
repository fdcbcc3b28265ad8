//! Once-only delivery tokens shared by the registrations of one call.
//!
//! Every pending take, put or reader carries a [`Ticket`]. Its [`Claim`] decides
//! whether the registration may still fire:
//!
//! - an **exclusive** claim is consumed by the first delivery, so a one-shot
//!   `ONE_OF` call spread over several channels consumes at most one value;
//! - a **shared** claim (listeners) stays live until it is cancelled.
//!
//! Cancelling a claim is how unsubscribe works: dead registrations are skipped
//! and pruned lazily by the buffer.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct Claim {
    cancelled: Cell<bool>,
    exclusive: bool,
}

impl Claim {
    pub(crate) fn exclusive() -> Rc<Self> {
        Rc::new(Self {
            cancelled: Cell::new(false),
            exclusive: true,
        })
    }

    pub(crate) fn shared() -> Rc<Self> {
        Rc::new(Self {
            cancelled: Cell::new(false),
            exclusive: false,
        })
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        !self.cancelled.get()
    }

    /// Marks one delivery. Returns `false` if the registration must not fire.
    pub(crate) fn try_claim(&self) -> bool {
        if self.cancelled.get() {
            return false;
        }
        if self.exclusive {
            self.cancelled.set(true);
        }
        true
    }

    #[inline]
    pub(crate) fn cancel(&self) {
        self.cancelled.set(true);
    }
}

/// Registration key plus the claim guarding it.
#[derive(Clone, Debug)]
pub(crate) struct Ticket {
    pub(crate) key: u64,
    pub(crate) claim: Rc<Claim>,
}

impl Ticket {
    pub(crate) fn new(key: u64, claim: Rc<Claim>) -> Self {
        Self { key, claim }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.claim.is_live()
    }

    #[inline]
    pub(crate) fn try_claim(&self) -> bool {
        self.claim.try_claim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_claim_fires_once() {
        let c = Claim::exclusive();
        assert!(c.try_claim());
        assert!(!c.try_claim());
        assert!(!c.is_live());
    }

    #[test]
    fn test_shared_claim_fires_until_cancelled() {
        let c = Claim::shared();
        assert!(c.try_claim());
        assert!(c.try_claim());
        c.cancel();
        assert!(!c.try_claim());
    }
}
