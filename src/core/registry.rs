//! # Node registry - lifecycle bookkeeping for channels and routines.
//!
//! Every channel and routine registers itself on creation and deregisters on
//! close / stop / completion, so external observers (inspectors, a reactive
//! state layer, loggers) can follow the runtime without the concurrency core
//! depending on them.
//!
//! ## Architecture
//! ```text
//! Chan::new / close / reset ──┐
//!                             ├──► Registry::add / remove / emit
//! scheduler spawn / stop  ────┘            │
//!                                          ├──► local handlers (on / on_any), same thread
//!                                          └──► Bus::publish ──► subscriber listener
//! ```
//!
//! ## Rules
//! - The registry is owned by one runtime; there is no process-wide table.
//! - `emit` stamps `Event::seq` from a per-registry counter before delivery.
//! - Local handlers run synchronously in registration order; a handler may
//!   register or drop handlers while being called (changes apply to the next emit).
//! - `add` of an already known node and `remove` of an unknown node are no-ops.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::channel::ChannelId;
use crate::events::{Bus, Event, EventKind};
use crate::routine::RoutineId;

/// Identity of a registered node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Channel(ChannelId),
    Routine(RoutineId),
}

impl NodeId {
    /// Returns `"channel"` or `"routine"`.
    pub fn kind_label(&self) -> &'static str {
        match self {
            NodeId::Channel(_) => "channel",
            NodeId::Routine(_) => "routine",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Channel(id) => write!(f, "{id}"),
            NodeId::Routine(id) => write!(f, "{id}"),
        }
    }
}

/// A registered channel or routine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: Arc<str>,
    /// Owning node (diagnostic only).
    pub parent: Option<NodeId>,
}

type Handler = Rc<dyn Fn(&Event)>;

struct Listener {
    key: u64,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Instance-scoped registry of live nodes plus a synchronous event hub.
pub struct Registry {
    nodes: RefCell<BTreeMap<NodeId, Node>>,
    listeners: Rc<RefCell<Vec<Listener>>>,
    next_key: Cell<u64>,
    seq: Cell<u64>,
    bus: Bus,
}

impl Registry {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            nodes: RefCell::new(BTreeMap::new()),
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_key: Cell::new(0),
            seq: Cell::new(0),
            bus,
        }
    }

    /// Registers a node and emits [`EventKind::NodeAdded`].
    ///
    /// Returns `false` (and emits nothing) if the node is already registered.
    pub fn add(&self, node: Node) -> bool {
        let ev = Event::new(EventKind::NodeAdded)
            .with_node(node.id)
            .with_name(node.name.clone())
            .with_parent(node.parent);
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes.contains_key(&node.id) {
                return false;
            }
            nodes.insert(node.id, node);
        }
        self.emit(ev);
        true
    }

    /// Deregisters a node and emits [`EventKind::NodeRemoved`].
    pub fn remove(&self, id: NodeId) -> Option<Node> {
        let node = self.nodes.borrow_mut().remove(&id)?;
        self.emit(
            Event::new(EventKind::NodeRemoved)
                .with_node(id)
                .with_name(node.name.clone())
                .with_parent(node.parent),
        );
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.nodes.borrow().get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Returns a snapshot of all registered nodes, ordered by id.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.borrow().values().cloned().collect()
    }

    /// Returns the registered nodes owned by `parent`.
    pub fn children(&self, parent: NodeId) -> Vec<Node> {
        self.nodes
            .borrow()
            .values()
            .filter(|n| n.parent == Some(parent))
            .cloned()
            .collect()
    }

    /// Calls `f` for every emitted event of the given kind.
    pub fn on(&self, kind: EventKind, f: impl Fn(&Event) + 'static) -> Unlisten {
        self.listen(Some(kind), Rc::new(f))
    }

    /// Calls `f` for every emitted event.
    pub fn on_any(&self, f: impl Fn(&Event) + 'static) -> Unlisten {
        self.listen(None, Rc::new(f))
    }

    /// Stamps and delivers an event to local handlers, then publishes it to the bus.
    pub fn emit(&self, mut ev: Event) {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        ev.seq = seq;

        let handlers: Vec<Handler> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kind.map_or(true, |k| k == ev.kind))
            .map(|l| l.handler.clone())
            .collect();
        for h in handlers {
            h(&ev);
        }
        self.bus.publish(ev);
    }

    /// Returns the bus events are published to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    fn listen(&self, kind: Option<EventKind>, handler: Handler) -> Unlisten {
        let key = self.next_key.get() + 1;
        self.next_key.set(key);
        self.listeners
            .borrow_mut()
            .push(Listener { key, kind, handler });
        Unlisten {
            listeners: Rc::downgrade(&self.listeners),
            key,
        }
    }
}

/// Handle returned by [`Registry::on`]; drops the handler when consumed.
pub struct Unlisten {
    listeners: Weak<RefCell<Vec<Listener>>>,
    key: u64,
}

impl Unlisten {
    pub fn unlisten(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().retain(|l| l.key != self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u64, name: &str) -> Node {
        Node {
            id: NodeId::Channel(ChannelId::from_raw(n)),
            name: name.into(),
            parent: None,
        }
    }

    fn recorder(reg: &Registry) -> Rc<RefCell<Vec<(u64, EventKind)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _ = reg.on_any(move |ev| s.borrow_mut().push((ev.seq, ev.kind)));
        seen
    }

    #[test]
    fn test_add_and_remove_emit_once() {
        let reg = Registry::new(Bus::new(8));
        let seen = recorder(&reg);

        assert!(reg.add(node(1, "a")));
        assert!(!reg.add(node(1, "a")));
        assert_eq!(reg.len(), 1);
        assert!(reg.remove(NodeId::Channel(ChannelId::from_raw(1))).is_some());
        assert!(reg.remove(NodeId::Channel(ChannelId::from_raw(1))).is_none());

        assert_eq!(
            *seen.borrow(),
            vec![(1, EventKind::NodeAdded), (2, EventKind::NodeRemoved)]
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_on_filters_kind_and_unlisten_detaches() {
        let reg = Registry::new(Bus::new(8));
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let un = reg.on(EventKind::ChannelClosed, move |_| h.set(h.get() + 1));

        reg.emit(Event::new(EventKind::ChannelReset));
        reg.emit(Event::new(EventKind::ChannelClosed));
        un.unlisten();
        reg.emit(Event::new(EventKind::ChannelClosed));

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_handler_may_register_during_emit() {
        let reg = Rc::new(Registry::new(Bus::new(8)));
        let inner_hits = Rc::new(Cell::new(0));
        let r = Rc::downgrade(&reg);
        let ih = inner_hits.clone();
        let _ = reg.on(EventKind::ChannelReset, move |_| {
            if let Some(reg) = r.upgrade() {
                let ih = ih.clone();
                let _ = reg.on(EventKind::ChannelClosed, move |_| ih.set(ih.get() + 1));
            }
        });

        reg.emit(Event::new(EventKind::ChannelReset));
        reg.emit(Event::new(EventKind::ChannelClosed));
        assert_eq!(inner_hits.get(), 1);
    }

    #[test]
    fn test_children_follow_parent() {
        let reg = Registry::new(Bus::new(8));
        let parent = NodeId::Routine(RoutineId::from_raw(0, 0));
        reg.add(Node {
            parent: Some(parent),
            ..node(1, "owned")
        });
        reg.add(node(2, "free"));

        let kids = reg.children(parent);
        assert_eq!(kids.len(), 1);
        assert_eq!(&*kids[0].name, "owned");
    }
}
