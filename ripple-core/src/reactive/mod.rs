//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and
//! effects, plus the per-thread runtime that schedules their updates.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a leaf cell of mutable state. Reading it inside a memo
//! or effect body records a dependency. Writing it queues the new value for
//! the next flush.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It is evaluated
//! eagerly when created and again whenever a flush changes something it
//! read. A recompute that yields an equal value stops there.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation re-run whenever something
//! it read changes, with an optional [`Cleanup`] run before each re-run.
//!
//! # Implementation Notes
//!
//! Dependencies are captured implicitly: each body runs with a fresh
//! capture installed in the thread's runtime, and every read made while it
//! is installed becomes a listener edge. Writes never take effect inline;
//! the runtime defers a flush to its host so that all writes made in one
//! call stack are committed together.

mod capture;
mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use capture::Capture;
pub use context::EvalMode;
pub use effect::{Cleanup, Effect, IntoCleanup};
pub use memo::Memo;
pub use runtime::{
    config, configure, eval_mode, flush_pending, is_tracking, run_until_idle, set_host, stats,
    tick, untrack, with_runtime, FlushStats, Runtime,
};
pub use scope::{collect, Collected};
pub use signal::Signal;

pub(crate) use memo::MemoInner;
pub(crate) use signal::SignalInner;
pub(crate) use subscriber::{Commit, Listeners, Source, Subscriber};
