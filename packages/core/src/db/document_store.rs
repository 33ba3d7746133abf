//! DocumentStore Trait - Database Abstraction Layer
//!
//! This module defines the `DocumentStore` trait that abstracts the flat
//! document database the content tree is persisted in. The repository only
//! talks to this trait, so any backend offering the same filter and update
//! operators can host the tree.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so both embedded and network
//!    backends fit behind the same trait
//! 2. **Collections by name**: Every call names its collection; the repository
//!    passes the configured node collection
//! 3. **Error Handling**: Uses `anyhow::Result` for flexible error context
//! 4. **No transactions**: Each call is atomic for a single document only
//!
//! # Examples
//!
//! ```rust
//! use treestore_core::db::{DocumentStore, Filter, FindOptions, MemoryDocumentStore};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryDocumentStore::new();
//! let doc = json!({"_id": "1", "path": "/a"}).as_object().unwrap().clone();
//! store.insert_one("nodes", doc).await?;
//!
//! let found = store
//!     .find("nodes", &Filter::eq("path", "/a"), &FindOptions::new())
//!     .await?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```

use crate::db::{Document, Filter, FindOptions, UpdateOp};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over a flat, non-hierarchical document database
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow usage in async contexts where
/// futures may be moved between threads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter` in natural order
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    /// All documents matching `filter`, sorted then paginated per `options`
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    /// Number of documents matching `filter`
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Insert a new document; fails when its `_id` is already taken
    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    /// Overwrite the first document matching `filter`
    ///
    /// Returns the number of documents replaced (0 or 1).
    async fn replace_one(&self, collection: &str, filter: &Filter, document: Document)
        -> Result<u64>;

    /// Apply `ops` to the first document matching `filter`
    ///
    /// Returns the number of documents modified (0 or 1).
    async fn update_one(&self, collection: &str, filter: &Filter, ops: &[UpdateOp])
        -> Result<u64>;

    /// Delete every document matching `filter`, returning how many were removed
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;
}
