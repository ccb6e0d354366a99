//! Graph Nodes
//!
//! Node identity, node kinds, and type-erased handles to the three node
//! kinds. The erased handles are what [`collect`](crate::reactive::collect)
//! hands back, since a scope usually constructs signals and memos of many
//! different value types.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::reactive::{Effect, Memo, MemoInner, Signal, SignalInner, Source, Subscriber};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A leaf signal. Roots of the graph: written directly, never computed.
    Source,

    /// A memo. Reads other nodes and can itself be read.
    Derived,

    /// An effect. Reads other nodes but produces no value, so nothing
    /// can depend on it.
    Effect,
}

impl NodeKind {
    /// Whether a memo or effect body can read nodes of this kind.
    pub fn is_readable(self) -> bool {
        matches!(self, NodeKind::Source | NodeKind::Derived)
    }

    /// Whether nodes of this kind accept direct writes.
    pub fn is_writable(self) -> bool {
        self == NodeKind::Source
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Source => "signal",
            NodeKind::Derived => "memo",
            NodeKind::Effect => "effect",
        })
    }
}

// ----------------------------------------------------------------------------
// Type-erased handles
// ----------------------------------------------------------------------------

/// A leaf signal with its value type erased.
#[derive(Clone)]
pub struct AnySignal {
    source: Rc<dyn Source>,
    any: Rc<dyn Any>,
}

impl AnySignal {
    pub fn id(&self) -> NodeId {
        self.source.id()
    }

    pub fn listener_count(&self) -> usize {
        self.source.listeners().len()
    }

    pub fn listener_ids(&self) -> Vec<NodeId> {
        self.source.listener_ids()
    }

    /// Recover the typed handle. Returns `None` if `T` is not the signal's
    /// value type.
    pub fn downcast<T>(&self) -> Option<Signal<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        Rc::clone(&self.any)
            .downcast::<SignalInner<T>>()
            .ok()
            .map(Signal::from_inner)
    }
}

impl<T> From<&Signal<T>> for AnySignal
where
    T: Clone + PartialEq + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        let inner = signal.inner();
        Self {
            source: Rc::clone(inner) as Rc<dyn Source>,
            any: Rc::clone(inner) as Rc<dyn Any>,
        }
    }
}

impl fmt::Debug for AnySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySignal")
            .field("id", &self.id())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

/// A memo with its value type erased.
#[derive(Clone)]
pub struct AnyMemo {
    source: Rc<dyn Source>,
    subscriber: Rc<dyn Subscriber>,
    any: Rc<dyn Any>,
}

impl AnyMemo {
    pub fn id(&self) -> NodeId {
        self.source.id()
    }

    pub fn listener_count(&self) -> usize {
        self.source.listeners().len()
    }

    pub fn listener_ids(&self) -> Vec<NodeId> {
        self.source.listener_ids()
    }

    /// IDs of the nodes read by the most recent evaluation.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.subscriber.source_ids().into_vec()
    }

    /// Re-evaluate now. Returns whether the committed value changed.
    ///
    /// Listeners are not notified; propagation is the scheduler's job.
    pub fn force_recompute(&self) -> bool {
        Rc::clone(&self.subscriber).recompute()
    }

    /// Remove this memo's edges from every node it read.
    pub fn detach(&self) {
        self.subscriber.detach();
    }

    /// Recover the typed handle. Returns `None` if `T` is not the memo's
    /// value type.
    pub fn downcast<T>(&self) -> Option<Memo<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        Rc::clone(&self.any)
            .downcast::<MemoInner<T>>()
            .ok()
            .map(Memo::from_inner)
    }
}

impl<T> From<&Memo<T>> for AnyMemo
where
    T: Clone + PartialEq + 'static,
{
    fn from(memo: &Memo<T>) -> Self {
        let inner = memo.inner();
        Self {
            source: Rc::clone(inner) as Rc<dyn Source>,
            subscriber: Rc::clone(inner) as Rc<dyn Subscriber>,
            any: Rc::clone(inner) as Rc<dyn Any>,
        }
    }
}

impl fmt::Debug for AnyMemo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyMemo")
            .field("id", &self.id())
            .field("dependencies", &self.dependencies())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

/// Any node in the graph.
#[derive(Debug, Clone)]
pub enum AnyNode {
    Signal(AnySignal),
    Memo(AnyMemo),
    Effect(Effect),
}

impl AnyNode {
    pub fn id(&self) -> NodeId {
        match self {
            AnyNode::Signal(signal) => signal.id(),
            AnyNode::Memo(memo) => memo.id(),
            AnyNode::Effect(effect) => effect.id(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            AnyNode::Signal(_) => NodeKind::Source,
            AnyNode::Memo(_) => NodeKind::Derived,
            AnyNode::Effect(_) => NodeKind::Effect,
        }
    }

    /// True for leaf signals and memos.
    pub fn is_readable(&self) -> bool {
        self.kind().is_readable()
    }

    /// True only for leaf signals.
    pub fn is_writable(&self) -> bool {
        self.kind().is_writable()
    }
}

impl From<AnySignal> for AnyNode {
    fn from(signal: AnySignal) -> Self {
        AnyNode::Signal(signal)
    }
}

impl From<AnyMemo> for AnyNode {
    fn from(memo: AnyMemo) -> Self {
        AnyNode::Memo(memo)
    }
}

impl From<Effect> for AnyNode {
    fn from(effect: Effect) -> Self {
        AnyNode::Effect(effect)
    }
}
