//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever
//! something it read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When a flush commits a change to a dependency, the scheduler re-runs
//!    the effect. It always runs; there is no value to compare.
//!
//! 3. Before re-running, the effect calls its cleanup (if the last run
//!    returned one), clears its old dependencies, and tracks new ones
//!    during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not, so nothing can depend on an
//!   effect. Effects end every propagation path.
//! - A detached effect is inert: later recompute requests are ignored.
//!   A detached memo has no such guard.
//! - Effect bodies may create nested effects (but not signals or memos).
//!
//! # Cleanup
//!
//! The function may return a [`Cleanup`]. It is called once, right before
//! the next run, or when the effect is detached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::capture::{Capture, EdgeRollback};
use super::context::{EvalMode, ReactiveContext};
use super::runtime::with_runtime;
use super::subscriber::{Listeners, Subscriber};
use crate::error::Result;
use crate::graph::{AnyNode, NodeId, NodeKind};

/// A callback run before an effect's next run, or when it is detached.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Return types an effect function may use.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

pub(crate) struct EffectInner {
    id: NodeId,
    run: Box<dyn Fn() -> Option<Cleanup>>,
    capture: RefCell<Capture>,
    cleanup: RefCell<Option<Cleanup>>,
    deleted: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    /// Run the body under a fresh capture and link what it read.
    fn execute(self: &Rc<Self>) {
        let node: Rc<dyn Subscriber> = Rc::clone(self) as Rc<dyn Subscriber>;

        let old = self.capture.take();
        old.unlink(self.id);
        let rollback = EdgeRollback::arm(old, &self.capture, Rc::clone(&node));

        let ctx = ReactiveContext::enter(EvalMode::Effect);
        let cleanup = (self.run)();
        let capture = ctx.finish();
        rollback.disarm();
        self.run_count.set(self.run_count.get() + 1);

        // The body detached this effect: link nothing and release at once.
        if self.deleted.get() {
            if let Some(cleanup) = cleanup {
                cleanup.run();
            }
            return;
        }

        capture.link(&node);
        *self.capture.borrow_mut() = capture;
        *self.cleanup.borrow_mut() = cleanup;
    }
}

impl Subscriber for EffectInner {
    fn subscriber_id(&self) -> NodeId {
        self.id
    }

    fn subscriber_kind(&self) -> NodeKind {
        NodeKind::Effect
    }

    fn recompute(self: Rc<Self>) -> bool {
        if self.deleted.get() {
            return false;
        }
        self.run_cleanup();
        self.execute();
        false
    }

    fn detach(&self) {
        if self.deleted.get() {
            return;
        }
        self.run_cleanup();
        let capture = self.capture.take();
        capture.unlink(self.id);
        self.deleted.set(true);
        tracing::debug!(node = %self.id, "effect detached");
    }

    fn is_detached(&self) -> bool {
        self.deleted.get()
    }

    fn source_ids(&self) -> SmallVec<[NodeId; 4]> {
        self.capture.borrow().read_ids()
    }

    fn downstream(&self) -> Listeners {
        Listeners::new()
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The graph keeps an effect alive through its edges, so the handle may be
/// dropped; keep it (or use [`collect`](super::collect)) to detach later.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use ripple_core::reactive::{run_until_idle, Effect, Signal};
///
/// let count = Signal::new(0).unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let (reader, log) = (count.clone(), seen.clone());
/// Effect::new(move || log.borrow_mut().push(reader.get())).unwrap();
///
/// count.set(5);
/// run_until_idle();
/// assert_eq!(*seen.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately.
    ///
    /// Fails inside a memo body. Inside an effect body it creates a nested,
    /// independent effect; signals and memos cannot be built there, so
    /// code run from an effect body must receive them from outside.
    pub fn new<F, R>(run: F) -> Result<Self>
    where
        F: Fn() -> R + 'static,
        R: IntoCleanup,
    {
        with_runtime(|rt| rt.context.check_construction(NodeKind::Effect))?;

        let effect = Self {
            inner: Rc::new(EffectInner {
                id: NodeId::new(),
                run: Box::new(move || run().into_cleanup()),
                capture: RefCell::new(Capture::default()),
                cleanup: RefCell::new(None),
                deleted: Cell::new(false),
                run_count: Cell::new(0),
            }),
        };
        // Registered before the first run so nested effects follow their parent.
        with_runtime(|rt| rt.register(|| AnyNode::Effect(effect.clone())));

        effect.inner.execute();
        tracing::trace!(node = %effect.id(), dependencies = ?effect.dependencies(), "effect created");
        Ok(effect)
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run cleanup and re-run the body now, unless detached.
    pub fn force_recompute(&self) {
        Rc::clone(&self.inner).recompute();
    }

    /// Run the pending cleanup, unlink from every source, and stop
    /// responding to changes. Idempotent.
    pub fn detach(&self) {
        self.inner.detach();
    }

    pub fn is_detached(&self) -> bool {
        self.inner.deleted.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// IDs of the nodes read by the most recent run.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.source_ids().into_vec()
    }

    /// IDs of the leaf signals written by the most recent run.
    pub fn writes(&self) -> Vec<NodeId> {
        self.inner.capture.borrow().written_ids().into_vec()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependencies", &self.dependencies())
            .field("detached", &self.is_detached())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
