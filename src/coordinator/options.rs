//! # Take options and resolutions.
//!
//! [`TakeOptions`] selects how a (possibly multi-channel) take, read or listen
//! resolves; [`Resolution`] is what the callback receives.
//!
//! ```text
//! strategy      channels   callback receives
//! ──────────────────────────────────────────────────────────
//! AllRequired   1          Resolution::One(signal)
//! AllRequired   n          Resolution::All([signal; n])   (channel order)
//! OneOf         n          Resolution::OneOf(signal, index)
//! ```

use std::fmt;
use std::rc::Rc;

use crate::channel::Signal;
use crate::error::RoutineError;
use crate::routine::RoutineRef;

/// How a multi-channel call resolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Fire once every channel produced a signal.
    #[default]
    AllRequired,
    /// Fire with the first channel to produce a signal.
    OneOf,
}

impl Strategy {
    pub fn as_label(&self) -> &'static str {
        match self {
            Strategy::AllRequired => "all_required",
            Strategy::OneOf => "one_of",
        }
    }
}

/// Result of a coordinated take, read or listen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Single-channel `AllRequired` result.
    One(Signal<T>),
    /// Multi-channel `AllRequired` result, in channel order.
    All(Vec<Signal<T>>),
    /// `OneOf` result with the index of the channel that fired.
    OneOf(Signal<T>, usize),
}

impl<T> Resolution<T> {
    /// Returns the first signal (the only one for `One` and `OneOf`).
    pub fn into_first(self) -> Signal<T> {
        match self {
            Resolution::One(s) | Resolution::OneOf(s, _) => s,
            Resolution::All(all) => all.into_iter().next().unwrap_or(Signal::Ended),
        }
    }

    /// Returns every signal in channel order.
    pub fn into_all(self) -> Vec<Signal<T>> {
        match self {
            Resolution::One(s) | Resolution::OneOf(s, _) => vec![s],
            Resolution::All(all) => all,
        }
    }

    /// Index of the channel that fired a `OneOf` call.
    pub fn index(&self) -> Option<usize> {
        match self {
            Resolution::OneOf(_, idx) => Some(*idx),
            _ => None,
        }
    }
}

/// Post-processing applied to a resolution before the callback sees it.
pub enum Transform<T> {
    /// Plain function, applied inline.
    Map(Rc<dyn Fn(Resolution<T>) -> Resolution<T>>),
    /// Routine started per resolution; its result is delivered to the callback.
    ///
    /// A failing transform routine goes to [`TakeOptions::on_error`] if set and
    /// is reported as an unhandled failure otherwise.
    Routine(Rc<dyn Fn(Resolution<T>) -> RoutineRef<Resolution<T>>>),
}

impl<T> Clone for Transform<T> {
    fn clone(&self) -> Self {
        match self {
            Transform::Map(f) => Transform::Map(f.clone()),
            Transform::Routine(f) => Transform::Routine(f.clone()),
        }
    }
}

impl<T> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Map(_) => f.write_str("Transform::Map"),
            Transform::Routine(_) => f.write_str("Transform::Routine"),
        }
    }
}

/// Options for [`Runtime::take_with`](crate::Runtime::take_with) and the
/// coordinated routine operations.
///
/// ## Field semantics
/// - `strategy`: see [`Strategy`]
/// - `read`: do not consume; observe values as they are put
/// - `listen`: keep firing until unsubscribed (implies `read`)
/// - `initial_call`: fire with a buffered head at registration
///   (`None` = `Config::read_initial_call`)
/// - `transform`: see [`Transform`]
/// - `on_error`: receives the error of a failing [`Transform::Routine`]
pub struct TakeOptions<T> {
    pub strategy: Strategy,
    pub read: bool,
    pub listen: bool,
    pub initial_call: Option<bool>,
    pub transform: Option<Transform<T>>,
    pub on_error: Option<Rc<dyn Fn(RoutineError)>>,
}

impl<T> Default for TakeOptions<T> {
    fn default() -> Self {
        Self {
            strategy: Strategy::AllRequired,
            read: false,
            listen: false,
            initial_call: None,
            transform: None,
            on_error: None,
        }
    }
}

impl<T> Clone for TakeOptions<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            read: self.read,
            listen: self.listen,
            initial_call: self.initial_call,
            transform: self.transform.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> fmt::Debug for TakeOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TakeOptions")
            .field("strategy", &self.strategy)
            .field("read", &self.read)
            .field("listen", &self.listen)
            .field("initial_call", &self.initial_call)
            .field("transform", &self.transform)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<T: 'static> TakeOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_of(mut self) -> Self {
        self.strategy = Strategy::OneOf;
        self
    }

    pub fn read(mut self) -> Self {
        self.read = true;
        self
    }

    pub fn listen(mut self) -> Self {
        self.read = true;
        self.listen = true;
        self
    }

    pub fn initial_call(mut self, on: bool) -> Self {
        self.initial_call = Some(on);
        self
    }

    pub fn map(mut self, f: impl Fn(Resolution<T>) -> Resolution<T> + 'static) -> Self {
        self.transform = Some(Transform::Map(Rc::new(f)));
        self
    }

    pub fn transform_with(mut self, f: impl Fn(Resolution<T>) -> RoutineRef<Resolution<T>> + 'static) -> Self {
        self.transform = Some(Transform::Routine(Rc::new(f)));
        self
    }

    /// Handles a failing transform routine instead of reporting it as unhandled.
    pub fn on_error(mut self, f: impl Fn(RoutineError) + 'static) -> Self {
        self.on_error = Some(Rc::new(f));
        self
    }

    /// Returns `true` if the call does not consume values.
    #[inline]
    pub fn is_read(&self) -> bool {
        self.read || self.listen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_implies_read() {
        let opts = TakeOptions::<u8>::new().listen();
        assert!(opts.is_read());
        assert!(opts.listen);
        assert_eq!(opts.strategy, Strategy::AllRequired);
    }

    #[test]
    fn test_into_first_and_index() {
        let all = Resolution::All(vec![Signal::Value(1), Signal::Ended]);
        assert_eq!(all.index(), None);
        assert_eq!(all.into_first(), Signal::Value(1));

        let one_of = Resolution::OneOf(Signal::Value(7), 1);
        assert_eq!(one_of.index(), Some(1));
        assert_eq!(one_of.into_all(), vec![Signal::Value(7)]);
    }
}
