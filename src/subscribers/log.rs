//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints one line per event to stdout.
//!
//! ## Output format
//! ```text
//! [node-added] #1 node=ch1 name=ch1
//! [routine-started] #2 node=r0v0 name=ping
//! [routine-rerun] #7 node=r0v0 name=ping attempt=1
//! [channel-closed] #9 node=ch1 name=ch1 reason=ended
//! [routine-failed] #12 name=worker reason="boom"
//! ```
//!
//! ## Example
//! ```no_run
//! # async fn demo() -> Result<(), rine::RuntimeError> {
//! use std::sync::Arc;
//! use rine::{Config, LogWriter, Runtime};
//!
//! let rt = Runtime::builder(Config::default())
//!     .with_subscribers(vec![Arc::new(LogWriter::new())])
//!     .build()?;
//! rt.run().await
//! # }
//! ```

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Stdout logging subscriber, enabled via the `logging` feature.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render(e: &Event) -> String {
        let mut line = format!("[{}] #{}", e.kind.as_label(), e.seq);
        if let Some(node) = e.node {
            let _ = write!(line, " node={node}");
        }
        if let Some(name) = &e.name {
            let _ = write!(line, " name={name}");
        }
        if let Some(parent) = e.parent {
            let _ = write!(line, " parent={parent}");
        }
        if let Some(attempt) = e.attempt {
            let _ = write!(line, " attempt={attempt}");
        }
        if let Some(reason) = &e.reason {
            match e.kind {
                EventKind::RoutineFailed
                | EventKind::RoutineAsyncError
                | EventKind::SubscriberPanicked => {
                    let _ = write!(line, " reason={reason:?}");
                }
                _ => {
                    let _ = write!(line, " reason={reason}");
                }
            }
        }
        line
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", Self::render(e));
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use crate::core::NodeId;
    use crate::routine::RoutineId;

    use super::*;

    #[test]
    fn test_render_quotes_errors_only() {
        let ev = Event::new(EventKind::RoutineFailed)
            .with_name("worker")
            .with_reason("boom");
        assert_eq!(LogWriter::render(&ev), "[routine-failed] #0 name=worker reason=\"boom\"");

        let ev = Event::new(EventKind::RoutineRerun)
            .with_node(NodeId::Routine(RoutineId::from_raw(0, 0)))
            .with_name("ping")
            .with_attempt(1);
        assert_eq!(
            LogWriter::render(&ev),
            "[routine-rerun] #0 node=r0v0 name=ping attempt=1"
        );
    }
}
