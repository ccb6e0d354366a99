//! Dependency Graph
//!
//! The graph is stored as forward edges on the nodes themselves: every
//! signal and memo keeps the set of memos and effects that read it during
//! their most recent evaluation. This module holds node identity, the
//! type-erased node handles, and the scheduler that walks those edges.
//!
//! # Overview
//!
//! - Leaf signals are roots. They have listeners but no dependencies.
//! - Memos have both dependencies and listeners.
//! - Effects have dependencies only, so every propagation path ends at one.
//!
//! Edges are replaced wholesale each time a memo or effect re-runs, so a
//! node's listener set always matches what its listeners read last.

mod node;
mod scheduler;

pub use node::{AnyMemo, AnyNode, AnySignal, NodeId, NodeKind};
pub use scheduler::Scheduler;
