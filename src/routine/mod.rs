//! Routines: cooperative bodies suspended on operation descriptors.
//!
//! - [`Routine`], [`RoutineFn`], [`RoutineArgs`]: what runs;
//! - [`Cx`]: per-run context building [`Descriptor`]s;
//! - [`RoutineHandle`] / [`RunState`]: what the caller keeps;
//! - `scheduler`: polls bodies, runs descriptor effects, restarts and stops subtrees;
//! - `arena`: generational storage for the routine tree.

mod arena;
mod cx;
mod handle;
mod ops;
mod routine;
pub(crate) mod scheduler;

pub use arena::RoutineId;
pub use cx::Cx;
pub use handle::{RoutineHandle, RunState};
pub use ops::{Descriptor, OpTag};
pub use routine::{Exit, Routine, RoutineArgs, RoutineFn, RoutineRef, RoutineResult};

pub(crate) use arena::Arena;
