//! Edge-facing traits shared by the three node kinds.
//!
//! A *source* is anything a body can read (leaf signals and memos) and
//! keeps the set of its listeners. A *subscriber* is anything that runs a
//! body (memos and effects) and can be recomputed by the scheduler. Memos
//! are both. Leaf signals additionally implement [`Commit`] so the
//! scheduler can apply their pending writes.

use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::graph::{NodeId, NodeKind};

/// Forward edges out of a source, in insertion order.
pub(crate) type ListenerSet = IndexMap<NodeId, Rc<dyn Subscriber>>;

/// A snapshot of listeners, taken so no borrow is held while they run.
pub(crate) type Listeners = SmallVec<[Rc<dyn Subscriber>; 4]>;

/// A node that can be read inside a memo or effect body.
pub(crate) trait Source {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    fn add_listener(&self, listener: Rc<dyn Subscriber>);

    fn remove_listener(&self, id: NodeId);

    fn listeners(&self) -> Listeners;

    fn listener_ids(&self) -> Vec<NodeId> {
        self.listeners()
            .iter()
            .map(|listener| listener.subscriber_id())
            .collect()
    }
}

/// A node whose body is re-run by the scheduler.
pub(crate) trait Subscriber {
    fn subscriber_id(&self) -> NodeId;

    fn subscriber_kind(&self) -> NodeKind;

    /// Re-run the body and relink edges.
    ///
    /// Returns `true` only when the scheduler should continue propagating
    /// past this node, i.e. a memo whose value changed. Effects are
    /// terminal and always return `false`.
    fn recompute(self: Rc<Self>) -> bool;

    /// Unlink from every source read by the last evaluation.
    fn detach(&self);

    /// Whether the node has stopped responding to changes.
    fn is_detached(&self) -> bool {
        false
    }

    /// IDs of the sources read by the last evaluation.
    fn source_ids(&self) -> SmallVec<[NodeId; 4]>;

    /// Listeners to notify when this node changes. Empty for effects.
    fn downstream(&self) -> Listeners;
}

/// A leaf signal as seen by the scheduler's dirty set.
pub(crate) trait Commit: Source {
    /// Apply the pending value. Returns whether the committed value changed.
    fn commit(&self) -> bool;
}

/// Snapshot a listener set without holding the borrow.
pub(crate) fn snapshot(set: &ListenerSet) -> Listeners {
    set.values().cloned().collect()
}
