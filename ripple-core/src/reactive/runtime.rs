//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! and effects. Each thread owns one, holding:
//!
//! - the [`EvaluationContext`] (current capture and evaluation mode),
//! - the [`Scheduler`] (dirty leaf signals and the flush state machine),
//! - the active collection target used by [`collect`](super::collect),
//! - the [`Host`] that runs deferred flushes.
//!
//! # How It Works
//!
//! 1. Writing a leaf signal records a pending value and marks the signal
//!    dirty with the scheduler.
//!
//! 2. The first dirty mark after a flush hands a flush task to the host.
//!    The flush never runs inline, so every write made in the same call
//!    stack lands in the same flush.
//!
//! 3. The flush commits the dirty signals and re-runs the memos and
//!    effects that read them.
//!
//! # Thread Safety
//!
//! None is needed. Nodes are `Rc`-based and confined to the thread that
//! created them; each thread gets an independent runtime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use super::context::{EvalMode, EvaluationContext, UntrackedContext};
use super::scope::Collection;
use super::subscriber::Commit;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{AnyNode, Scheduler};
use crate::host::{Host, HostHandle, ManualHost};

/// Counters describing the work done by flushes on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    /// Flushes run.
    pub flushes: u64,
    /// Rounds run across all flushes. A round commits one dirty set.
    pub rounds: u64,
    /// Leaf commits that changed a value.
    pub commits: u64,
    /// Memo and effect recomputes driven by propagation.
    pub recomputes: u64,
}

/// The per-thread reactive runtime.
pub struct Runtime {
    pub(crate) context: EvaluationContext,
    pub(crate) scheduler: Scheduler,
    collector: RefCell<Option<Collection>>,
    host: RefCell<HostHandle>,
    config: Cell<RuntimeConfig>,
}

impl Runtime {
    fn new() -> Self {
        let config = RuntimeConfig::default();
        Self {
            context: EvaluationContext::default(),
            scheduler: Scheduler::new(config.propagation),
            collector: RefCell::new(None),
            host: RefCell::new(HostHandle::from_kind(config.host)),
            config: Cell::new(config),
        }
    }

    /// Queue a leaf signal for the next flush, scheduling one if idle.
    pub(crate) fn mark_dirty(&self, leaf: Rc<dyn Commit>) {
        if self.scheduler.mark_dirty(leaf) {
            let host = self.host.borrow().clone();
            host.defer(Box::new(|| with_runtime(|rt| rt.scheduler.flush())));
        }
    }

    /// Record a freshly constructed node in the active collection, if any.
    pub(crate) fn register(&self, node: impl FnOnce() -> AnyNode) {
        if let Some(collection) = self.collector.borrow_mut().as_mut() {
            collection.push(node());
        }
    }

    pub(crate) fn swap_collector(&self, collection: Option<Collection>) -> Option<Collection> {
        self.collector.replace(collection)
    }

    fn is_busy(&self) -> bool {
        self.scheduler.is_flush_scheduled()
            || self.scheduler.is_flushing()
            || self.host.borrow().pending() > 0
    }

    fn manual_host(&self) -> Option<Rc<ManualHost>> {
        match &*self.host.borrow() {
            HostHandle::Manual(host) => Some(Rc::clone(host)),
            HostHandle::Custom(_) => None,
        }
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Run `f` with this thread's runtime.
pub fn with_runtime<F, R>(f: F) -> R
where
    F: FnOnce(&Runtime) -> R,
{
    RUNTIME.with(f)
}

/// Like [`with_runtime`], but returns `None` once thread-local storage has
/// been torn down. For use in `Drop` impls.
pub(crate) fn try_with_runtime<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Runtime) -> R,
{
    RUNTIME.try_with(f).ok()
}

/// Run the next deferred task on the manual host.
///
/// Returns `false` if nothing was queued or a non-manual host is installed.
pub fn tick() -> bool {
    match with_runtime(Runtime::manual_host) {
        Some(host) => host.run_next(),
        None => false,
    }
}

/// Run deferred tasks on the manual host until its queue is empty,
/// including tasks queued while draining. Returns how many ran.
pub fn run_until_idle() -> usize {
    match with_runtime(Runtime::manual_host) {
        Some(host) => host.run_until_idle(),
        None => 0,
    }
}

/// Whether a flush has been handed to the host and not yet started.
pub fn flush_pending() -> bool {
    with_runtime(|rt| rt.scheduler.is_flush_scheduled())
}

/// Install `config` on this thread's runtime.
///
/// Fails with [`ReactiveError::RuntimeBusy`] while a flush is pending or
/// running, since the queued flush belongs to the current host.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    with_runtime(|rt| {
        if rt.is_busy() {
            tracing::warn!(?config, "rejected runtime reconfiguration during flush");
            return Err(ReactiveError::RuntimeBusy);
        }
        rt.scheduler.set_propagation(config.propagation);
        *rt.host.borrow_mut() = HostHandle::from_kind(config.host);
        rt.config.set(config);
        tracing::debug!(?config, "runtime configured");
        Ok(())
    })
}

/// The configuration last installed with [`configure`].
pub fn config() -> RuntimeConfig {
    with_runtime(|rt| rt.config.get())
}

/// Install a custom deferred-execution host.
pub fn set_host(host: Rc<dyn Host>) -> Result<()> {
    with_runtime(|rt| {
        if rt.is_busy() {
            tracing::warn!("rejected host replacement during flush");
            return Err(ReactiveError::RuntimeBusy);
        }
        *rt.host.borrow_mut() = HostHandle::Custom(host);
        Ok(())
    })
}

/// Flush counters for this thread.
pub fn stats() -> FlushStats {
    with_runtime(|rt| rt.scheduler.stats())
}

/// Run `f` with dependency capture suspended: reads inside `f` create no
/// edges and writes are not recorded.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = UntrackedContext::enter();
    f()
}

/// Whether reads are currently being captured.
pub fn is_tracking() -> bool {
    with_runtime(|rt| rt.context.is_tracking())
}

/// The kind of body currently evaluating.
pub fn eval_mode() -> EvalMode {
    with_runtime(|rt| rt.context.mode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostKind, Propagation};
    use crate::reactive::{Effect, Signal};

    #[test]
    fn write_defers_flush_to_host() {
        let signal = Signal::new(1).unwrap();

        signal.set(2);
        assert!(flush_pending());
        assert_eq!(signal.get(), 1);

        assert!(tick());
        assert!(!flush_pending());
        assert_eq!(signal.get(), 2);
        assert!(!tick());
    }

    #[test]
    fn configure_rejected_while_flush_pending() {
        let signal = Signal::new(0).unwrap();
        signal.set(1);

        let config = RuntimeConfig {
            propagation: Propagation::Deduplicated,
            host: HostKind::Manual,
        };
        assert!(matches!(configure(config), Err(ReactiveError::RuntimeBusy)));

        run_until_idle();
        configure(config).unwrap();
        assert_eq!(super::config().propagation, Propagation::Deduplicated);

        configure(RuntimeConfig::default()).unwrap();
    }

    #[test]
    fn untrack_suppresses_edges() {
        let tracked = Signal::new(1).unwrap();
        let hidden = Signal::new(2).unwrap();

        let (t, h) = (tracked.clone(), hidden.clone());
        let effect = Effect::new(move || {
            t.get();
            untrack(|| h.get());
        })
        .unwrap();

        assert_eq!(effect.dependencies(), vec![tracked.id()]);
        assert_eq!(hidden.listener_count(), 0);
    }

    #[test]
    fn stats_count_flushes() {
        let signal = Signal::new(0).unwrap();
        let before = stats();

        signal.set(1);
        signal.set(2);
        run_until_idle();

        let after = stats();
        assert_eq!(after.flushes - before.flushes, 1);
        assert_eq!(after.commits - before.commits, 1);
    }
}
