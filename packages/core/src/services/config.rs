//! Repository Configuration

use serde::{Deserialize, Serialize};

/// Default collection holding node documents
pub const DEFAULT_NODES_COLLECTION: &str = "nodes";

/// Default number of documents fetched per cursor batch
pub const DEFAULT_CURSOR_BATCH_SIZE: u64 = 100;

/// Configuration for [`NodeRepository`](crate::services::NodeRepository)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Collection holding node documents (default: "nodes")
    pub nodes_collection: String,
    /// Documents fetched per children/subtree cursor round trip (default: 100)
    pub cursor_batch_size: u64,
    /// Check that reference values point at existing referenceable nodes on
    /// write (default: true)
    pub verify_reference_targets: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            nodes_collection: DEFAULT_NODES_COLLECTION.to_string(),
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            verify_reference_targets: true,
        }
    }
}

impl RepositoryConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(json)?;
        // A zero batch would never advance the cursor
        config.cursor_batch_size = config.cursor_batch_size.max(1);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::default();
        assert_eq!(config.nodes_collection, "nodes");
        assert_eq!(config.cursor_batch_size, 100);
        assert!(config.verify_reference_targets);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RepositoryConfig::from_json(r#"{"cursorBatchSize": 10}"#).unwrap();
        assert_eq!(config.cursor_batch_size, 10);
        assert_eq!(config.nodes_collection, "nodes");
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let config = RepositoryConfig::from_json(r#"{"cursorBatchSize": 0}"#).unwrap();
        assert_eq!(config.cursor_batch_size, 1);
    }
}
