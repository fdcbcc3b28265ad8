use std::fmt;
use std::rc::Rc;

use crate::channel::Claim;

/// Handle removing every still-pending registration of one call.
///
/// Returned by every put, take, read and listen. Consuming it cancels the call's
/// claims (so nothing registered by the call fires afterwards) and detaches the
/// registrations from their channels. Dropping it without calling
/// [`Unsubscribe::unsubscribe`] leaves the registrations in place.
#[derive(Default)]
pub struct Unsubscribe {
    claims: Vec<Rc<Claim>>,
    detach: Vec<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    /// A handle with nothing to remove.
    pub fn noop() -> Self {
        Self::default()
    }

    /// A handle running `f` once when unsubscribed.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        let mut handle = Self::default();
        handle.push_claim(Claim::shared());
        handle.push_detach(Box::new(f));
        handle
    }

    /// Returns `true` while at least one registration may still fire.
    pub fn is_active(&self) -> bool {
        self.claims.iter().any(|c| c.is_live())
    }

    pub fn unsubscribe(self) {
        for claim in &self.claims {
            claim.cancel();
        }
        for detach in self.detach {
            detach();
        }
    }

    pub(crate) fn push_claim(&mut self, claim: Rc<Claim>) {
        self.claims.push(claim);
    }

    pub(crate) fn push_detach(&mut self, detach: Box<dyn FnOnce()>) {
        self.detach.push(detach);
    }

    /// Moves `other`'s registrations into this handle.
    pub(crate) fn extend(&mut self, other: Unsubscribe) {
        self.claims.extend(other.claims);
        self.detach.extend(other.detach);
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("registrations", &self.detach.len())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_from_fn_runs_once_and_deactivates() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let handle = Unsubscribe::from_fn(move || h.set(h.get() + 1));
        assert!(handle.is_active());
        handle.unsubscribe();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_noop_is_inactive() {
        let handle = Unsubscribe::noop();
        assert!(!handle.is_active());
        handle.unsubscribe();
    }

    #[test]
    fn test_consumed_claim_reads_inactive() {
        let claim = Claim::exclusive();
        let mut handle = Unsubscribe::default();
        handle.push_claim(claim.clone());
        assert!(handle.is_active());
        assert!(claim.try_claim());
        assert!(!handle.is_active());
    }
}
