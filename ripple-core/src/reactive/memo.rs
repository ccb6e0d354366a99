//! Memo Implementation
//!
//! A Memo is a cached derived value computed from other signals and memos.
//!
//! # How Memos Work
//!
//! 1. On construction, the memo runs its computation immediately, records
//!    what it read, and caches the result.
//!
//! 2. Reads return the cached value. They never recompute.
//!
//! 3. When a flush commits a change to something the memo read, the
//!    scheduler recomputes it: old edges are dropped, the computation runs
//!    under a fresh capture, and new edges are added for exactly what it
//!    read this time.
//!
//! 4. If the new value equals the cached one, the memo keeps the old value
//!    and the flush does not go on to its listeners. Its edges are still
//!    refreshed.
//!
//! # Restrictions
//!
//! A memo body must not construct signals, memos or effects; constructors
//! called from one return [`ReentrantConstruction`].
//!
//! [`ReentrantConstruction`]: crate::ReactiveError::ReentrantConstruction

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use smallvec::SmallVec;

use super::capture::{Capture, EdgeRollback};
use super::context::{EvalMode, ReactiveContext};
use super::runtime::with_runtime;
use super::subscriber::{snapshot, ListenerSet, Listeners, Source, Subscriber};
use crate::error::Result;
use crate::graph::{AnyMemo, AnyNode, NodeId, NodeKind};

pub(crate) struct MemoInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T>,
    committed: RefCell<T>,
    previous: RefCell<T>,
    capture: RefCell<Capture>,
    listeners: RefCell<ListenerSet>,
}

impl<T> Source for MemoInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Derived
    }

    fn add_listener(&self, listener: Rc<dyn Subscriber>) {
        self.listeners
            .borrow_mut()
            .insert(listener.subscriber_id(), listener);
    }

    fn remove_listener(&self, id: NodeId) {
        self.listeners.borrow_mut().shift_remove(&id);
    }

    fn listeners(&self) -> Listeners {
        snapshot(&self.listeners.borrow())
    }
}

impl<T> Subscriber for MemoInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn subscriber_id(&self) -> NodeId {
        self.id
    }

    fn subscriber_kind(&self) -> NodeKind {
        NodeKind::Derived
    }

    fn recompute(self: Rc<Self>) -> bool {
        let node: Rc<dyn Subscriber> = Rc::clone(&self) as Rc<dyn Subscriber>;

        let old = self.capture.take();
        old.unlink(self.id);
        let rollback = EdgeRollback::arm(old, &self.capture, Rc::clone(&node));

        let ctx = ReactiveContext::enter(EvalMode::Derived);
        let value = (self.compute)();
        let capture = ctx.finish();
        rollback.disarm();

        capture.link(&node);
        *self.capture.borrow_mut() = capture;

        if *self.committed.borrow() == value {
            return false;
        }
        let old_value = self.committed.replace(value);
        self.previous.replace(old_value);
        true
    }

    fn detach(&self) {
        let capture = self.capture.take();
        capture.unlink(self.id);
        tracing::debug!(node = %self.id, "memo detached");
    }

    fn source_ids(&self) -> SmallVec<[NodeId; 4]> {
        self.capture.borrow().read_ids()
    }

    fn downstream(&self) -> Listeners {
        snapshot(&self.listeners.borrow())
    }
}

/// A cached derived value, recomputed when what it read changes.
///
/// # Type Parameters
///
/// - `T`: The computed value. `PartialEq` decides whether a recompute
///   changed anything worth propagating.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{run_until_idle, Memo, Signal};
///
/// let count = Signal::new(2).unwrap();
/// let reader = count.clone();
/// let doubled = Memo::new(move || reader.get() * 2).unwrap();
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// run_until_idle();
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new memo and evaluate it immediately.
    ///
    /// Fails inside a memo or effect body. A panic in `compute` unwinds out
    /// of this call and no node is created.
    pub fn new<F>(compute: F) -> Result<Self>
    where
        F: Fn() -> T + 'static,
    {
        with_runtime(|rt| rt.context.check_construction(NodeKind::Derived))?;

        let ctx = ReactiveContext::enter(EvalMode::Derived);
        let value = compute();
        let capture = ctx.finish();

        let inner = Rc::new(MemoInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            committed: RefCell::new(value.clone()),
            previous: RefCell::new(value),
            capture: RefCell::new(Capture::default()),
            listeners: RefCell::new(ListenerSet::new()),
        });
        capture.link(&(Rc::clone(&inner) as Rc<dyn Subscriber>));
        *inner.capture.borrow_mut() = capture;

        let memo = Self { inner };
        tracing::trace!(node = %memo.id(), dependencies = ?memo.dependencies(), "memo created");
        with_runtime(|rt| rt.register(|| AnyNode::Memo(AnyMemo::from(&memo))));
        Ok(memo)
    }

    pub(crate) fn from_inner(inner: Rc<MemoInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<MemoInner<T>> {
        &self.inner
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    fn track(&self) {
        with_runtime(|rt| {
            rt.context
                .track_read(|| Rc::clone(&self.inner) as Rc<dyn Source>)
        });
    }

    /// Get the cached value, recording the read in an active capture.
    pub fn get(&self) -> T {
        self.track();
        self.inner.committed.borrow().clone()
    }

    /// Borrow the cached value, recording the read in an active capture.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.committed.borrow())
    }

    /// Get the cached value without recording a read.
    pub fn get_untracked(&self) -> T {
        self.inner.committed.borrow().clone()
    }

    /// The value before the last change.
    pub fn previous(&self) -> T {
        self.inner.previous.borrow().clone()
    }

    /// IDs of the nodes read by the most recent evaluation.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.source_ids().into_vec()
    }

    /// Get the number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// IDs of the memos and effects listening to this memo.
    pub fn listener_ids(&self) -> Vec<NodeId> {
        self.inner.listeners.borrow().keys().copied().collect()
    }

    /// Re-evaluate now and relink edges. Returns whether the value changed.
    ///
    /// Listeners are not notified. Calling this after [`detach`](Self::detach)
    /// relinks the memo to whatever it reads; callers that detach a memo
    /// are expected to stop using it.
    pub fn force_recompute(&self) -> bool {
        Rc::clone(&self.inner).recompute()
    }

    /// Remove this memo from the listeners of everything it read.
    pub fn detach(&self) {
        self.inner.detach();
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("dependencies", &self.dependencies())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{run_until_idle, Signal};
    use std::cell::Cell;

    #[test]
    fn memo_computes_on_construction() {
        let call_count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&call_count);

        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            42
        })
        .unwrap();

        assert_eq!(call_count.get(), 1);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.previous(), 42);
    }

    #[test]
    fn memo_caches_value_between_reads() {
        let call_count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&call_count);

        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            42
        })
        .unwrap();

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn force_recompute_reports_change() {
        let source = Signal::new(1).unwrap();
        let reader = source.clone();
        let memo = Memo::new(move || reader.get() * 10).unwrap();

        assert!(!memo.force_recompute());

        source.set(2);
        // Nothing committed yet.
        assert!(!memo.force_recompute());

        run_until_idle();
        assert_eq!(memo.get(), 20);
        assert_eq!(memo.previous(), 10);
    }

    #[test]
    fn edges_follow_the_branch_taken() {
        let use_left = Signal::new(true).unwrap();
        let left = Signal::new("left").unwrap();
        let right = Signal::new("right").unwrap();

        let (flag, l, r) = (use_left.clone(), left.clone(), right.clone());
        let pick = Memo::new(move || if flag.get() { l.get() } else { r.get() }).unwrap();

        assert_eq!(pick.dependencies(), vec![use_left.id(), left.id()]);
        assert_eq!(left.listener_ids(), vec![pick.id()]);
        assert!(right.listener_ids().is_empty());

        use_left.set(false);
        run_until_idle();

        assert_eq!(pick.get(), "right");
        assert_eq!(pick.dependencies(), vec![use_left.id(), right.id()]);
        assert!(left.listener_ids().is_empty());
        assert_eq!(right.listener_ids(), vec![pick.id()]);
        assert_eq!(use_left.listener_ids(), vec![pick.id()]);
    }

    #[test]
    fn unchanged_value_still_refreshes_edges() {
        let selector = Signal::new(0).unwrap();
        let a = Signal::new(7).unwrap();
        let b = Signal::new(7).unwrap();

        let (s, ra, rb) = (selector.clone(), a.clone(), b.clone());
        let memo = Memo::new(move || if s.get() == 0 { ra.get() } else { rb.get() }).unwrap();

        selector.set(1);
        run_until_idle();

        assert_eq!(memo.get(), 7);
        assert_eq!(memo.dependencies(), vec![selector.id(), b.id()]);
        assert_eq!(a.listener_count(), 0);
        assert_eq!(b.listener_count(), 1);
    }

    #[test]
    fn constructing_inside_a_memo_fails() {
        let attempts = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&attempts);
        let _memo = Memo::new(move || {
            let signal = Signal::new(0).map(|_| ());
            let memo = Memo::new(|| 0).map(|_| ());
            log.borrow_mut().push(signal);
            log.borrow_mut().push(memo);
            1
        })
        .unwrap();

        let attempts = attempts.borrow();
        assert_eq!(attempts.len(), 2);
        for attempt in attempts.iter() {
            assert!(matches!(
                attempt,
                Err(ReactiveError::ReentrantConstruction {
                    mode: EvalMode::Derived,
                    ..
                })
            ));
        }
    }

    #[test]
    fn panicking_recompute_keeps_previous_edges() {
        let source = Signal::new(1).unwrap();
        let reader = source.clone();
        let memo = Memo::new(move || {
            let value = reader.get();
            assert!(value < 100, "value too large");
            value
        })
        .unwrap();

        source.set(500);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(run_until_idle));
        assert!(result.is_err());

        assert_eq!(memo.get(), 1);
        assert_eq!(memo.dependencies(), vec![source.id()]);
        assert_eq!(source.listener_ids(), vec![memo.id()]);
        assert_eq!(crate::reactive::eval_mode(), EvalMode::None);
    }

    #[test]
    fn detach_unlinks_sources() {
        let source = Signal::new(1).unwrap();
        let reader = source.clone();
        let memo = Memo::new(move || reader.get() + 1).unwrap();
        assert_eq!(source.listener_count(), 1);

        memo.detach();
        assert_eq!(source.listener_count(), 0);
        assert!(memo.dependencies().is_empty());

        source.set(10);
        run_until_idle();
        assert_eq!(memo.get(), 2);
    }
}
