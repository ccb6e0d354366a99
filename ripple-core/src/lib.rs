//! Ripple Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects) with implicit
//!   dependency capture
//! - A scheduler that coalesces writes into deferred flushes and
//!   propagates changes along listener edges
//! - Scoped collection of constructed nodes, for owners that need to tear
//!   down everything a piece of code built
//!
//! Rendering, diffing and component composition are left to the layers
//! built on top.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, memos, effects, capture and the runtime
//! - `graph`: node identity, type-erased handles, and the scheduler
//! - `host`: deferred-execution hosts that run flushes
//! - `config`: runtime configuration
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use ripple_core::reactive::{run_until_idle, Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(1).unwrap();
//!
//! // Create a derived value
//! let reader = count.clone();
//! let doubled = Memo::new(move || reader.get() * 2).unwrap();
//!
//! // Create an effect
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let (reader, log) = (doubled.clone(), seen.clone());
//! Effect::new(move || log.borrow_mut().push(reader.get())).unwrap();
//!
//! // Update the signal; the flush runs when the host drains its queue
//! count.set(5);
//! run_until_idle();
//!
//! assert_eq!(doubled.get(), 10);
//! assert_eq!(*seen.borrow(), vec![2, 10]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod reactive;

pub use config::{HostKind, Propagation, RuntimeConfig};
pub use error::{ReactiveError, Result};
pub use graph::{AnyMemo, AnyNode, AnySignal, NodeId, NodeKind};
pub use reactive::{collect, Cleanup, Collected, Effect, Memo, Signal};
