//! Error types for the reactive engine.
//!
//! Only construction and configuration are fallible. A panicking user
//! function (memo body, effect body, cleanup) is not an error value: it
//! unwinds to whoever triggered the evaluation.

use thiserror::Error;

use crate::graph::NodeKind;
use crate::reactive::EvalMode;

/// Errors produced by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A node was constructed while an evaluation that forbids it was running.
    #[error("cannot construct a {kind} node while a {mode} body is evaluating")]
    ReentrantConstruction { kind: NodeKind, mode: EvalMode },

    /// The runtime cannot be reconfigured while a flush is pending or running.
    #[error("runtime is busy: a flush is pending or in progress")]
    RuntimeBusy,

    /// A configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_construction_message_names_kind_and_mode() {
        let err = ReactiveError::ReentrantConstruction {
            kind: NodeKind::Source,
            mode: EvalMode::Derived,
        };
        assert_eq!(
            err.to_string(),
            "cannot construct a signal node while a memo body is evaluating"
        );
    }

    #[test]
    fn config_error_wraps_serde() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: ReactiveError = parse.into();
        assert!(matches!(err, ReactiveError::Config(_)));
        assert!(err.to_string().starts_with("invalid runtime configuration"));
    }
}
