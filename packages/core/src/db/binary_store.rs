//! Binary Payload Storage
//!
//! Binary property values never live inside node documents. The document
//! stores only the byte length; the bytes are kept here, keyed by the
//! property path, the workspace and the element index within the property.
//!
//! There is no versioning, no reference counting and no delete: the last
//! `put` for a key wins and blobs outlive the nodes that wrote them.

use crate::models::WorkspaceId;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Location of one binary value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    /// `node_path/property_name`
    pub path: String,
    pub workspace: WorkspaceId,
    /// Position within a multi-valued property, 0 for single values
    pub index: u32,
}

impl BlobKey {
    pub fn new(path: impl Into<String>, workspace: WorkspaceId, index: u32) -> Self {
        Self {
            path: path.into(),
            workspace,
            index,
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.path, self.index, self.workspace)
    }
}

#[async_trait]
pub trait BinaryStore: Send + Sync {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()>;

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Default)]
pub struct MemoryBinaryStore {
    blobs: RwLock<HashMap<BlobKey, Vec<u8>>>,
}

impl MemoryBinaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BinaryStore for MemoryBinaryStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        self.blobs.write().await.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_put_wins() {
        let store = MemoryBinaryStore::new();
        let key = BlobKey::new("/a/data", WorkspaceId::new(1), 0);
        store.put(&key, b"one").await.unwrap();
        store.put(&key, b"two").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_workspace_and_index() {
        let store = MemoryBinaryStore::new();
        store
            .put(&BlobKey::new("/a/data", WorkspaceId::new(1), 0), b"x")
            .await
            .unwrap();
        assert!(store
            .get(&BlobKey::new("/a/data", WorkspaceId::new(2), 0))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get(&BlobKey::new("/a/data", WorkspaceId::new(1), 1))
            .await
            .unwrap()
            .is_none());
    }
}
