//! Scoped collection of constructed nodes.
//!
//! A rendering layer mounts a fragment by running some code that builds
//! signals, memos and effects. [`collect`] records every node built while
//! that code runs, so the fragment can later be torn down with
//! [`Collected::detach_all`].

use super::effect::Effect;
use super::runtime::{try_with_runtime, with_runtime};
use crate::graph::{AnyMemo, AnyNode, AnySignal};

/// Nodes recorded while a collection target is active.
#[derive(Default)]
pub(crate) struct Collection {
    signals: Vec<AnySignal>,
    memos: Vec<AnyMemo>,
    effects: Vec<Effect>,
}

impl Collection {
    pub(crate) fn push(&mut self, node: AnyNode) {
        match node {
            AnyNode::Signal(signal) => self.signals.push(signal),
            AnyNode::Memo(memo) => self.memos.push(memo),
            AnyNode::Effect(effect) => self.effects.push(effect),
        }
    }
}

/// The result of [`collect`]: the callback's value and the nodes it built,
/// per kind, in construction order.
#[derive(Debug)]
pub struct Collected<R> {
    pub result: R,
    pub signals: Vec<AnySignal>,
    pub memos: Vec<AnyMemo>,
    pub effects: Vec<Effect>,
}

impl<R> Collected<R> {
    /// All collected nodes: signals, then memos, then effects.
    pub fn nodes(&self) -> impl Iterator<Item = AnyNode> + '_ {
        self.signals
            .iter()
            .cloned()
            .map(AnyNode::Signal)
            .chain(self.memos.iter().cloned().map(AnyNode::Memo))
            .chain(self.effects.iter().cloned().map(AnyNode::Effect))
    }

    pub fn len(&self) -> usize {
        self.signals.len() + self.memos.len() + self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every collected effect and memo.
    pub fn detach_all(&self) {
        for effect in &self.effects {
            effect.detach();
        }
        for memo in &self.memos {
            memo.detach();
        }
    }
}

/// Swaps the collection target in and restores the previous one on drop.
struct CollectScope {
    saved: Option<Option<Collection>>,
}

impl CollectScope {
    fn enter() -> Self {
        let saved = with_runtime(|rt| rt.swap_collector(Some(Collection::default())));
        Self { saved: Some(saved) }
    }

    fn finish(mut self) -> Collection {
        match self.saved.take() {
            Some(saved) => with_runtime(|rt| rt.swap_collector(saved)).unwrap_or_default(),
            None => Collection::default(),
        }
    }
}

impl Drop for CollectScope {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            try_with_runtime(|rt| rt.swap_collector(saved));
        }
    }
}

/// Run `f` and return its result with every node constructed during it.
///
/// Collections nest: nodes built inside an inner `collect` belong to the
/// inner one only. The previous target is restored even if `f` panics.
///
/// ```rust
/// use ripple_core::reactive::{collect, Memo, Signal};
///
/// let mounted = collect(|| {
///     let x = Signal::new(1).unwrap();
///     let reader = x.clone();
///     let y = Memo::new(move || reader.get() + 1).unwrap();
///     y.get()
/// });
///
/// assert_eq!(mounted.result, 2);
/// assert_eq!(mounted.signals.len(), 1);
/// assert_eq!(mounted.memos.len(), 1);
///
/// mounted.detach_all();
/// assert_eq!(mounted.signals[0].listener_count(), 0);
/// ```
pub fn collect<R>(f: impl FnOnce() -> R) -> Collected<R> {
    let scope = CollectScope::enter();
    let result = f();
    let collection = scope.finish();

    tracing::trace!(
        signals = collection.signals.len(),
        memos = collection.memos.len(),
        effects = collection.effects.len(),
        "collected nodes"
    );

    Collected {
        result,
        signals: collection.signals,
        memos: collection.memos,
        effects: collection.effects,
    }
}
