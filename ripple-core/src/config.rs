//! Runtime configuration.
//!
//! ```rust
//! use ripple_core::config::{Propagation, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "propagation": "deduplicated" }"#).unwrap();
//! assert_eq!(config.propagation, Propagation::Deduplicated);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a flush round walks listener edges after committing leaf signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Drain a work stack, most recently pushed node first. A node reachable
    /// along two paths may be recomputed once per path.
    #[default]
    Lifo,

    /// Recompute each reachable node at most once per round, in topological
    /// order, and only if one of its sources changed in that round.
    Deduplicated,
}

/// Which deferred-execution host runs flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// [`ManualHost`](crate::host::ManualHost), drained by the embedder.
    #[default]
    Manual,

    /// [`TokioHost`](crate::host::TokioHost), backed by a tokio `LocalSet`.
    Tokio,
}

/// Settings for one thread's runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub propagation: Propagation,
    pub host: HostKind,
}

impl RuntimeConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.propagation, Propagation::Lifo);
        assert_eq!(config.host, HostKind::Manual);
    }

    #[test]
    fn parses_all_fields() {
        let config =
            RuntimeConfig::from_json(r#"{ "propagation": "deduplicated", "host": "tokio" }"#)
                .unwrap();
        assert_eq!(config.propagation, Propagation::Deduplicated);
        assert_eq!(config.host, HostKind::Tokio);
    }

    #[test]
    fn unknown_strategy_is_a_config_error() {
        let err = RuntimeConfig::from_json(r#"{ "propagation": "breadth_first" }"#).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn serializes_in_snake_case() {
        let config = RuntimeConfig {
            propagation: Propagation::Deduplicated,
            host: HostKind::Manual,
        };
        assert_eq!(
            config.to_json().unwrap(),
            r#"{"propagation":"deduplicated","host":"manual"}"#
        );
    }
}
