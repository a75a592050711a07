//! Rewrite configuration.
//!
//! Names the engine-side wrappers the emitter produces. The evaluator reads
//! the same struct so it recognizes whatever the emitter wrote.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Configuration for rewriting and rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Row-wise wrapper applied to synthesized functions.
    pub by_row: String,
    /// Missing-propagation wrapper.
    pub pass_missing: String,
    /// Sink marker for table collections.
    pub as_table: String,
    /// Joiner used in synthesized sink names.
    pub sink_separator: String,
    /// Split a top-level `begin ... end` argument into separate arguments.
    pub flatten_blocks: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        RewriteConfig {
            by_row: "ByRow".to_string(),
            pass_missing: "passmissing".to_string(),
            as_table: "AsTable".to_string(),
            sink_separator: "_".to_string(),
            flatten_blocks: true,
        }
    }
}

impl RewriteConfig {
    /// Load a configuration from JSON; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_by_row(mut self, name: impl Into<String>) -> Self {
        self.by_row = name.into();
        self
    }

    pub fn with_pass_missing(mut self, name: impl Into<String>) -> Self {
        self.pass_missing = name.into();
        self
    }

    pub fn with_as_table(mut self, name: impl Into<String>) -> Self {
        self.as_table = name.into();
        self
    }

    pub fn with_sink_separator(mut self, sep: impl Into<String>) -> Self {
        self.sink_separator = sep.into();
        self
    }

    pub fn with_flatten_blocks(mut self, flatten: bool) -> Self {
        self.flatten_blocks = flatten;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RewriteConfig::default();
        assert_eq!(config.by_row, "ByRow");
        assert_eq!(config.pass_missing, "passmissing");
        assert_eq!(config.as_table, "AsTable");
        assert_eq!(config.sink_separator, "_");
        assert!(config.flatten_blocks);
    }

    #[test]
    fn test_from_json_partial() {
        let config = RewriteConfig::from_json(r#"{"by_row": "Rowwise", "flatten_blocks": false}"#).unwrap();
        assert_eq!(config.by_row, "Rowwise");
        assert_eq!(config.pass_missing, "passmissing");
        assert!(!config.flatten_blocks);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = RewriteConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builders() {
        let config = RewriteConfig::default()
            .with_as_table("Table")
            .with_sink_separator("__");
        assert_eq!(config.as_table, "Table");
        assert_eq!(config.sink_separator, "__");
    }
}
