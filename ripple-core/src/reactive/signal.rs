//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a leaf cell written
//! directly by application code.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a memo or effect body, the read is
//!    recorded in the active capture and becomes a listener edge once the
//!    body finishes.
//!
//! 2. Writing a signal does not change what readers see. It stores a
//!    pending value and marks the signal dirty with the scheduler.
//!
//! 3. The next flush commits the pending value and re-runs listeners.
//!    Several writes before a flush collapse into the last one.
//!
//! # Memory Layout
//!
//! Each signal keeps three copies of its value: the committed value
//! readers see, the pending value of the next flush, and the value before
//! the last commit.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::with_runtime;
use super::subscriber::{snapshot, Commit, ListenerSet, Listeners, Source, Subscriber};
use crate::error::Result;
use crate::graph::{AnyNode, AnySignal, NodeId, NodeKind};

pub(crate) struct SignalInner<T> {
    id: NodeId,
    committed: RefCell<T>,
    pending: RefCell<T>,
    previous: RefCell<T>,
    listeners: RefCell<ListenerSet>,
}

impl<T> Source for SignalInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Source
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

impl<T> Commit for SignalInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn commit(&self) -> bool {
        let next = {
            let pending = self.pending.borrow();
            if *pending == *self.committed.borrow() {
                return false;
            }
            pending.clone()
        };
        let old = self.committed.replace(next);
        self.previous.replace(old);
        true
    }
}

/// A reactive leaf signal holding a value of type `T`.
///
/// # Type Parameters
///
/// - `T`: The stored value. `PartialEq` decides whether a write or commit
///   changes anything.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{run_until_idle, Signal};
///
/// let count = Signal::new(0).unwrap();
/// count.set(5);
/// assert_eq!(count.get(), 0); // not committed yet
///
/// run_until_idle();
/// assert_eq!(count.get(), 5);
/// assert_eq!(count.previous(), 0);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Fails inside a memo or effect body.
    pub fn new(value: T) -> Result<Self> {
        with_runtime(|rt| rt.context.check_construction(NodeKind::Source))?;

        let signal = Self {
            inner: Rc::new(SignalInner {
                id: NodeId::new(),
                committed: RefCell::new(value.clone()),
                pending: RefCell::new(value.clone()),
                previous: RefCell::new(value),
                listeners: RefCell::new(ListenerSet::new()),
            }),
        };
        tracing::trace!(node = %signal.id(), "signal created");
        with_runtime(|rt| rt.register(|| AnyNode::Signal(AnySignal::from(&signal))));
        Ok(signal)
    }

    pub(crate) fn from_inner(inner: Rc<SignalInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<SignalInner<T>> {
        &self.inner
    }

    pub(crate) fn source(&self) -> Rc<dyn Source> {
        Rc::clone(&self.inner) as Rc<dyn Source>
    }

    pub(crate) fn commit_handle(&self) -> Rc<dyn Commit> {
        Rc::clone(&self.inner) as Rc<dyn Commit>
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    fn track(&self) {
        with_runtime(|rt| rt.context.track_read(|| self.source()));
    }

    /// Get the committed value.
    ///
    /// If called within a memo or effect body, this also records the read.
    pub fn get(&self) -> T {
        self.track();
        self.inner.committed.borrow().clone()
    }

    /// Borrow the committed value.
    ///
    /// `f` must not drive a flush, since the flush would need to replace
    /// the borrowed value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.committed.borrow())
    }

    /// Get the committed value without recording a read.
    pub fn get_untracked(&self) -> T {
        self.inner.committed.borrow().clone()
    }

    /// The value before the last commit.
    pub fn previous(&self) -> T {
        self.inner.previous.borrow().clone()
    }

    /// The value the next flush will commit.
    pub fn pending(&self) -> T {
        self.inner.pending.borrow().clone()
    }

    /// Whether the pending value differs from the committed one.
    pub fn is_dirty(&self) -> bool {
        *self.inner.pending.borrow() != *self.inner.committed.borrow()
    }

    /// Write a new value, to be committed by the next flush.
    ///
    /// Writing the committed value is a no-op: nothing is marked dirty and
    /// no flush is scheduled. The write is still recorded by an active
    /// capture.
    pub fn set(&self, value: T) {
        with_runtime(|rt| rt.context.track_write(|| self.source()));

        if *self.inner.committed.borrow() == value {
            return;
        }
        *self.inner.pending.borrow_mut() = value;
        with_runtime(|rt| rt.mark_dirty(self.commit_handle()));
    }

    /// Write a value computed from the latest written value.
    ///
    /// Successive updates before a flush build on each other.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.pending.borrow());
        self.set(next);
    }

    /// Get the number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// IDs of the memos and effects listening to this signal.
    pub fn listener_ids(&self) -> Vec<NodeId> {
        self.inner.listeners.borrow().keys().copied().collect()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("pending", &self.pending())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
