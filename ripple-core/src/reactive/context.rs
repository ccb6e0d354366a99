//! Reactive Context
//!
//! The evaluation context holds the two pieces of ambient state every read
//! and write consults: the active [`Capture`] (if any) and the current
//! [`EvalMode`]. Both are swapped in when a memo or effect body starts and
//! swapped back when it ends.
//!
//! # Implementation
//!
//! The swap is owned by a [`ReactiveContext`] guard. Dropping the guard
//! restores the saved capture and mode, so the context is left intact
//! even when a body panics. Contexts nest by save/restore and never merge:
//! a memo read inside an effect body records into the effect's capture,
//! while the memo's own evaluation records into a fresh one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use super::capture::Capture;
use super::runtime::{try_with_runtime, with_runtime};
use super::subscriber::Source;
use crate::error::{ReactiveError, Result};
use crate::graph::NodeKind;

/// What kind of body is currently evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// No body is running.
    #[default]
    None,
    /// A memo body is running.
    Derived,
    /// An effect body is running.
    Effect,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvalMode::None => "top-level",
            EvalMode::Derived => "memo",
            EvalMode::Effect => "effect",
        })
    }
}

/// The current capture and evaluation mode of one runtime.
#[derive(Default)]
pub(crate) struct EvaluationContext {
    capture: RefCell<Option<Capture>>,
    mode: Cell<EvalMode>,
}

impl EvaluationContext {
    pub(crate) fn mode(&self) -> EvalMode {
        self.mode.get()
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.capture.borrow().is_some()
    }

    /// Record a read against the active capture, if any.
    ///
    /// `source` is only called when a capture is active.
    pub(crate) fn track_read(&self, source: impl FnOnce() -> Rc<dyn Source>) {
        if let Some(capture) = self.capture.borrow_mut().as_mut() {
            capture.record_read(source());
        }
    }

    /// Record a write against the active capture, if any.
    pub(crate) fn track_write(&self, source: impl FnOnce() -> Rc<dyn Source>) {
        if let Some(capture) = self.capture.borrow_mut().as_mut() {
            capture.record_write(source());
        }
    }

    /// Reject construction of `kind` when the current mode forbids it.
    ///
    /// Memo bodies may construct nothing. Effect bodies may construct
    /// nested effects but no signals or memos.
    pub(crate) fn check_construction(&self, kind: NodeKind) -> Result<()> {
        let mode = self.mode.get();
        let forbidden = match mode {
            EvalMode::None => false,
            EvalMode::Derived => true,
            EvalMode::Effect => kind != NodeKind::Effect,
        };
        if forbidden {
            return Err(ReactiveError::ReentrantConstruction { kind, mode });
        }
        Ok(())
    }

    fn swap(&self, capture: Option<Capture>, mode: EvalMode) -> (Option<Capture>, EvalMode) {
        let saved_capture = self.capture.replace(capture);
        let saved_mode = self.mode.replace(mode);
        (saved_capture, saved_mode)
    }
}

/// Guard for one body evaluation.
///
/// While alive, reads and writes record into a fresh capture and the
/// runtime reports `mode`. [`finish`](Self::finish) hands back the capture;
/// dropping the guard without finishing (e.g. during unwinding) discards it.
/// Either way the previous capture and mode are restored.
pub(crate) struct ReactiveContext {
    saved: Option<(Option<Capture>, EvalMode)>,
}

impl ReactiveContext {
    pub(crate) fn enter(mode: EvalMode) -> Self {
        let saved = with_runtime(|rt| rt.context.swap(Some(Capture::default()), mode));
        Self { saved: Some(saved) }
    }

    /// Leave the context and return what it captured.
    pub(crate) fn finish(mut self) -> Capture {
        match self.saved.take() {
            Some((capture, mode)) => {
                let (current, _) = with_runtime(|rt| rt.context.swap(capture, mode));
                current.unwrap_or_default()
            }
            None => Capture::default(),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if let Some((capture, mode)) = self.saved.take() {
            try_with_runtime(|rt| rt.context.swap(capture, mode));
        }
    }
}

/// Guard that suspends capture without changing the mode.
pub(crate) struct UntrackedContext {
    saved: Option<Capture>,
}

impl UntrackedContext {
    pub(crate) fn enter() -> Self {
        let saved = with_runtime(|rt| rt.context.capture.replace(None));
        Self { saved }
    }
}

impl Drop for UntrackedContext {
    fn drop(&mut self) {
        let saved = self.saved.take();
        try_with_runtime(|rt| rt.context.capture.replace(saved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::{eval_mode, is_tracking};
    use crate::reactive::Signal;

    #[test]
    fn context_sets_and_restores_mode() {
        assert_eq!(eval_mode(), EvalMode::None);
        assert!(!is_tracking());

        {
            let _ctx = ReactiveContext::enter(EvalMode::Effect);
            assert_eq!(eval_mode(), EvalMode::Effect);
            assert!(is_tracking());
        }

        assert_eq!(eval_mode(), EvalMode::None);
        assert!(!is_tracking());
    }

    #[test]
    fn finish_returns_recorded_reads() {
        let a = Signal::new(1).unwrap();
        let b = Signal::new(2).unwrap();

        let ctx = ReactiveContext::enter(EvalMode::Derived);
        a.get();
        b.get();
        let capture = ctx.finish();

        assert_eq!(capture.read_ids().as_slice(), &[a.id(), b.id()]);
    }

    #[test]
    fn nested_contexts_do_not_merge() {
        let a = Signal::new(1).unwrap();
        let b = Signal::new(2).unwrap();

        let outer = ReactiveContext::enter(EvalMode::Effect);
        a.get();
        {
            let inner = ReactiveContext::enter(EvalMode::Derived);
            b.get();
            assert_eq!(eval_mode(), EvalMode::Derived);
            assert_eq!(inner.finish().read_ids().as_slice(), &[b.id()]);
        }
        assert_eq!(eval_mode(), EvalMode::Effect);
        assert_eq!(outer.finish().read_ids().as_slice(), &[a.id()]);
    }

    #[test]
    fn context_is_restored_when_body_panics() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(EvalMode::Derived);
            panic!("body failed");
        });

        assert!(result.is_err());
        assert_eq!(eval_mode(), EvalMode::None);
        assert!(!is_tracking());
    }

    #[test]
    fn construction_rules_per_mode() {
        let ctx = EvaluationContext::default();
        assert!(ctx.check_construction(NodeKind::Source).is_ok());

        ctx.swap(None, EvalMode::Derived);
        for kind in [NodeKind::Source, NodeKind::Derived, NodeKind::Effect] {
            assert!(ctx.check_construction(kind).is_err());
        }

        ctx.swap(None, EvalMode::Effect);
        assert!(ctx.check_construction(NodeKind::Source).is_err());
        assert!(ctx.check_construction(NodeKind::Derived).is_err());
        assert!(ctx.check_construction(NodeKind::Effect).is_ok());
    }
}
