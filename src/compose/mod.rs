//! Channel composition: fan-in ([`Runtime::merge`](crate::Runtime::merge)),
//! fan-out ([`Chan::mult`](crate::Chan::mult) and friends) and self-closing
//! timeout channels ([`Runtime::timeout`](crate::Runtime::timeout)).

mod merge;
mod mult;
mod timeout;

pub(crate) use mult::pump;
