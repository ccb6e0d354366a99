//! Capture
//!
//! A capture records which sources were read, and which leaf signals were
//! written, during one evaluation of a memo or effect body. After the body
//! returns, the capture's reads become the node's listener edges.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Source, Subscriber};
use crate::graph::NodeId;

/// Reads and writes observed during one evaluation.
#[derive(Default)]
pub struct Capture {
    getters: IndexMap<NodeId, Rc<dyn Source>>,
    setters: IndexMap<NodeId, Rc<dyn Source>>,
}

impl Capture {
    pub(crate) fn record_read(&mut self, source: Rc<dyn Source>) {
        self.getters.entry(source.id()).or_insert(source);
    }

    pub(crate) fn record_write(&mut self, source: Rc<dyn Source>) {
        self.setters.entry(source.id()).or_insert(source);
    }

    /// IDs of the nodes read, in first-read order.
    pub fn read_ids(&self) -> SmallVec<[NodeId; 4]> {
        self.getters.keys().copied().collect()
    }

    /// IDs of the leaf signals written, in first-write order.
    pub fn written_ids(&self) -> SmallVec<[NodeId; 4]> {
        self.setters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty() && self.setters.is_empty()
    }

    /// Add `subscriber` to the listeners of every source read.
    pub(crate) fn link(&self, subscriber: &Rc<dyn Subscriber>) {
        for source in self.getters.values() {
            source.add_listener(Rc::clone(subscriber));
        }
    }

    /// Remove the subscriber with `id` from every source read.
    pub(crate) fn unlink(&self, id: NodeId) {
        for source in self.getters.values() {
            source.remove_listener(id);
        }
    }
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("getters", &self.read_ids())
            .field("setters", &self.written_ids())
            .finish()
    }
}

/// Restores a node's previous edges if its body unwinds mid-recompute.
///
/// The old capture has already been unlinked when the guard is armed. If
/// the guard is dropped without [`disarm`](Self::disarm), the old capture
/// is relinked and put back in `slot`, so the node keeps listening to what
/// it read before the failed run. A node detached by its own body stays
/// unlinked.
pub(crate) struct EdgeRollback<'a> {
    old: Option<Capture>,
    slot: &'a RefCell<Capture>,
    node: Rc<dyn Subscriber>,
}

impl<'a> EdgeRollback<'a> {
    pub(crate) fn arm(old: Capture, slot: &'a RefCell<Capture>, node: Rc<dyn Subscriber>) -> Self {
        Self {
            old: Some(old),
            slot,
            node,
        }
    }

    /// The new evaluation finished; the old edges stay unlinked.
    pub(crate) fn disarm(mut self) {
        self.old = None;
    }
}

impl Drop for EdgeRollback<'_> {
    fn drop(&mut self) {
        if let Some(old) = self.old.take() {
            if self.node.is_detached() {
                return;
            }
            tracing::debug!(node = %self.node.subscriber_id(), "evaluation unwound, restoring previous edges");
            old.link(&self.node);
            *self.slot.borrow_mut() = old;
        }
    }
}
