use std::fmt;
use std::sync::Arc;

use super::arena::RoutineId;
use super::routine::{RoutineRef, RoutineResult};
use super::scheduler;
use crate::core::{Runtime, WeakRuntime};

/// Whether a routine is still alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Stopped, completed or failed: the routine no longer exists.
    Stopped,
}

impl RunState {
    pub fn as_label(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        }
    }
}

/// Handle to a spawned routine.
#[derive(Clone)]
pub struct RoutineHandle {
    id: RoutineId,
    name: Arc<str>,
    rt: WeakRuntime,
}

impl RoutineHandle {
    pub(crate) fn new(id: RoutineId, name: Arc<str>, rt: WeakRuntime) -> Self {
        Self { id, name, rt }
    }

    #[inline]
    pub fn id(&self) -> RoutineId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        match self.rt.upgrade() {
            Some(rt) => rt.run_state(self.id),
            None => RunState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Stops the routine and every routine below it. Returns `false` if it was
    /// already gone.
    pub fn stop(&self) -> bool {
        self.rt.upgrade().is_some_and(|rt| rt.stop(self.id))
    }

    /// Restarts the routine from scratch.
    pub fn rerun(&self) -> bool {
        self.rt.upgrade().is_some_and(|rt| rt.rerun(self.id))
    }
}

impl fmt::Debug for RoutineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutineHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Runtime {
    /// Spawns a top-level routine; `on_done` receives its final result.
    pub fn spawn<R: 'static>(
        &self,
        routine: RoutineRef<R>,
        on_done: impl FnOnce(RoutineResult<R>) + 'static,
    ) -> RoutineHandle {
        let handle = scheduler::spawn(
            self,
            None,
            routine,
            Some(Box::new(move |_: &Runtime, result: RoutineResult<R>| on_done(result))),
            None,
        );
        self.flush();
        handle
    }

    /// Spawns a top-level routine whose errors are unhandled failures
    /// (surfaced by [`Runtime::run`]).
    pub fn go<R: 'static>(&self, routine: RoutineRef<R>) -> RoutineHandle {
        let handle = scheduler::spawn(self, None, routine, None, None);
        self.flush();
        handle
    }

    /// Stops a routine and cascades to its children (pre-order).
    pub fn stop(&self, id: RoutineId) -> bool {
        let stopped = scheduler::stop(self, id);
        self.flush();
        stopped
    }

    /// Restarts a live routine from scratch, stopping its children.
    pub fn rerun(&self, id: RoutineId) -> bool {
        let rerun = scheduler::rerun(self, id, false);
        self.flush();
        rerun
    }

    pub fn run_state(&self, id: RoutineId) -> RunState {
        if self.inner.routines.borrow().contains(id) {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    /// Number of live routines.
    pub fn routine_count(&self) -> usize {
        self.inner.routines.borrow().len()
    }
}
