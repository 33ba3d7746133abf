//! In-memory DocumentStore
//!
//! Collections are vectors of documents kept in insertion order, which is the
//! natural order `find` returns before any sort is applied. Filters and
//! updates are evaluated with the reference semantics from
//! [`document`](crate::db::document).

use crate::db::document::compare_documents;
use crate::db::{DatabaseError, Document, DocumentStore, Filter, FindOptions, UpdateOp};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

const ID_FIELD: &str = "_id";

/// Thread-safe in-memory document database
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn select(docs: &[Document], filter: &Filter) -> Result<Vec<usize>, DatabaseError> {
    let mut hits = Vec::new();
    for (idx, doc) in docs.iter().enumerate() {
        if filter.matches(doc)? {
            hits.push(idx);
        }
    }
    Ok(hits)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };
        for doc in docs {
            if filter.matches(doc).context("Failed to evaluate filter")? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let hits = select(docs, filter).context("Failed to evaluate filter")?;
        let mut found: Vec<Document> = hits.into_iter().map(|idx| docs[idx].clone()).collect();

        if !options.sort.is_empty() {
            found.sort_by(|a, b| compare_documents(&options.sort, a, b));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };
        let hits = select(docs, filter).context("Failed to evaluate filter")?;
        Ok(hits.len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(id) = document.get(ID_FIELD) {
            if docs.iter().any(|doc| doc.get(ID_FIELD) == Some(id)) {
                return Err(DatabaseError::duplicate_key(collection, id.to_string()).into());
            }
        }
        docs.push(document);
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let hits = select(docs, filter).context("Failed to evaluate filter")?;
        let Some(&idx) = hits.first() else {
            return Ok(0);
        };
        docs[idx] = document;
        Ok(1)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        ops: &[UpdateOp],
    ) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let hits = select(docs, filter).context("Failed to evaluate filter")?;
        let Some(&idx) = hits.first() else {
            return Ok(0);
        };

        // Apply to a copy so a failing operator leaves the stored document untouched
        let mut updated = docs[idx].clone();
        for op in ops {
            op.apply(&mut updated)
                .with_context(|| format!("Failed to apply update to {}", collection))?;
        }
        docs[idx] = updated;
        Ok(1)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        let mut kept = Vec::with_capacity(before);
        for doc in docs.drain(..) {
            if !filter.matches(&doc).context("Failed to evaluate filter")? {
                kept.push(doc);
            }
        }
        *docs = kept;
        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (id, path, rank) in [("1", "/a", 3), ("2", "/a/b", 1), ("3", "/c", 2)] {
            store
                .insert_one("nodes", doc(json!({"_id": id, "path": path, "rank": rank})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = seeded().await;
        let err = store
            .insert_one("nodes", doc(json!({"_id": "1", "path": "/z"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate key"));
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit() {
        let store = seeded().await;
        let options = FindOptions::new()
            .sort_by("rank", SortDirection::Descending)
            .skip(1)
            .limit(1);
        let found = store.find("nodes", &Filter::All, &options).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["path"], json!("/c"));
    }

    #[tokio::test]
    async fn test_natural_order_is_insertion_order() {
        let store = seeded().await;
        let found = store
            .find("nodes", &Filter::All, &FindOptions::new())
            .await
            .unwrap();
        let paths: Vec<_> = found.iter().map(|d| d["path"].clone()).collect();
        assert_eq!(paths, vec![json!("/a"), json!("/a/b"), json!("/c")]);
    }

    #[tokio::test]
    async fn test_update_replace_delete() {
        let store = seeded().await;
        let updated = store
            .update_one("nodes", &Filter::eq("_id", "3"), &[UpdateOp::set("rank", 9)])
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            store.count("nodes", &Filter::eq("rank", 9)).await.unwrap(),
            1
        );

        let replaced = store
            .replace_one("nodes", &Filter::eq("_id", "missing"), Document::new())
            .await
            .unwrap();
        assert_eq!(replaced, 0);

        let deleted = store
            .delete_many("nodes", &Filter::starts_with("path", "/a"))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count("nodes", &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document_unchanged() {
        let store = seeded().await;
        let ops = [
            UpdateOp::set("rank", 7),
            UpdateOp::push("path", json!("x")),
        ];
        assert!(store
            .update_one("nodes", &Filter::eq("_id", "1"), &ops)
            .await
            .is_err());
        assert_eq!(
            store.count("nodes", &Filter::eq("rank", 7)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let store = MemoryDocumentStore::new();
        assert!(store
            .find_one("other", &Filter::All)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.delete_many("other", &Filter::All).await.unwrap(), 0);
    }
}
