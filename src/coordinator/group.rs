use super::options::{Resolution, Strategy};
use crate::channel::Signal;

/// Slot bookkeeping for one coordinated call.
///
/// `offer` records the signal one channel produced and returns the resolution
/// to deliver, if the call is satisfied.
pub(crate) struct Group<T> {
    strategy: Strategy,
    listen: bool,
    slots: Vec<Option<Signal<T>>>,
    fired: bool,
}

impl<T: Clone> Group<T> {
    pub(crate) fn new(strategy: Strategy, listen: bool, channels: usize) -> Self {
        Self {
            strategy,
            listen,
            slots: vec![None; channels],
            fired: false,
        }
    }

    pub(crate) fn offer(&mut self, idx: usize, signal: Signal<T>) -> Option<Resolution<T>> {
        if self.fired && !self.listen {
            return None;
        }
        match self.strategy {
            Strategy::OneOf => {
                self.fired = true;
                Some(Resolution::OneOf(signal, idx))
            }
            Strategy::AllRequired => {
                *self.slots.get_mut(idx)? = Some(signal);
                if self.slots.iter().any(Option::is_none) {
                    return None;
                }
                self.fired = true;
                // Listeners keep the latest value per slot and refire on every change.
                let mut all: Vec<Signal<T>> = if self.listen {
                    self.slots.iter().flatten().cloned().collect()
                } else {
                    self.slots.iter_mut().filter_map(Option::take).collect()
                };
                if all.len() == 1 {
                    all.pop().map(Resolution::One)
                } else {
                    Some(Resolution::All(all))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_required_waits_for_every_slot() {
        let mut g = Group::new(Strategy::AllRequired, false, 2);
        assert_eq!(g.offer(1, Signal::Value("b")), None);
        assert_eq!(
            g.offer(0, Signal::Value("a")),
            Some(Resolution::All(vec![Signal::Value("a"), Signal::Value("b")]))
        );
        assert_eq!(g.offer(0, Signal::Value("late")), None);
    }

    #[test]
    fn test_single_channel_resolves_one() {
        let mut g = Group::new(Strategy::AllRequired, false, 1);
        assert_eq!(g.offer(0, Signal::Ended), Some(Resolution::One(Signal::<u8>::Ended)));
    }

    #[test]
    fn test_one_of_fires_once_unless_listening() {
        let mut once = Group::new(Strategy::OneOf, false, 2);
        assert_eq!(once.offer(1, Signal::Value(1)), Some(Resolution::OneOf(Signal::Value(1), 1)));
        assert_eq!(once.offer(0, Signal::Value(2)), None);

        let mut listen = Group::new(Strategy::OneOf, true, 2);
        assert!(listen.offer(1, Signal::Value(1)).is_some());
        assert_eq!(listen.offer(0, Signal::Value(2)), Some(Resolution::OneOf(Signal::Value(2), 0)));
    }

    #[test]
    fn test_listening_all_required_refires_with_latest() {
        let mut g = Group::new(Strategy::AllRequired, true, 2);
        assert_eq!(g.offer(0, Signal::Value(1)), None);
        assert!(g.offer(1, Signal::Value(2)).is_some());
        assert_eq!(
            g.offer(0, Signal::Value(3)),
            Some(Resolution::All(vec![Signal::Value(3), Signal::Value(2)]))
        );
    }
}
