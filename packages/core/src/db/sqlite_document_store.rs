//! libsql-backed DocumentStore
//!
//! Every collection shares one table. The node-level fields the repository
//! filters on most are mirrored into indexed columns; the full document is
//! kept as JSON text:
//!
//! ```sql
//! CREATE TABLE documents (
//!     seq INTEGER PRIMARY KEY AUTOINCREMENT,
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     workspace_id INTEGER,
//!     path TEXT,
//!     parent TEXT,
//!     doc TEXT NOT NULL,
//!     UNIQUE (collection, id)
//! )
//! ```
//!
//! Equality on `_id`, `workspace_id`, `path` and `parent`, and `StartsWith`
//! on `path`, found among the top-level conjuncts of a filter become SQL
//! predicates. Every candidate row is then checked with
//! [`Filter::matches`], so the result is the same as the in-memory store's.
//! Rows come back in insertion order (`seq`) before any sort is applied.

use crate::db::document::compare_documents;
use crate::db::schema::{FIELD_ID, FIELD_PARENT, FIELD_PATH, FIELD_WORKSPACE};
use crate::db::{
    CompareOp, DatabaseError, Document, DocumentStore, Filter, FindOptions, UpdateOp,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database, Row, Value as SqlValue};
use serde_json::Value as Json;
use std::path::PathBuf;
use std::sync::Arc;

pub struct LibsqlDocumentStore {
    db: Arc<Database>,
    db_path: PathBuf,
}

/// A stored row: insertion sequence plus the parsed document
struct StoredRow {
    seq: i64,
    document: Document,
}

/// Indexed columns mirrored from a document
struct Columns {
    id: String,
    workspace_id: SqlValue,
    path: SqlValue,
    parent: SqlValue,
}

fn text_or_null(value: Option<&Json>) -> SqlValue {
    match value {
        Some(Json::String(s)) => SqlValue::Text(s.clone()),
        _ => SqlValue::Null,
    }
}

fn columns_of(document: &Document) -> Columns {
    let id = match document.get(FIELD_ID) {
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    Columns {
        id,
        workspace_id: document
            .get(FIELD_WORKSPACE)
            .and_then(Json::as_i64)
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
        path: text_or_null(document.get(FIELD_PATH)),
        parent: text_or_null(document.get(FIELD_PARENT)),
    }
}

/// Collect SQL predicates for the conjuncts of `filter` that map onto columns
///
/// Anything that does not map is left to `Filter::matches`.
fn prefilter(filter: &Filter, clauses: &mut Vec<String>, params: &mut Vec<SqlValue>) {
    match filter {
        Filter::And(conjuncts) => {
            for conjunct in conjuncts {
                prefilter(conjunct, clauses, params);
            }
        }
        Filter::Compare {
            field,
            op: CompareOp::Eq,
            value,
        } => {
            let column = match field.as_str() {
                FIELD_ID => "id",
                FIELD_WORKSPACE => "workspace_id",
                FIELD_PATH => "path",
                FIELD_PARENT => "parent",
                _ => return,
            };
            match (column, value) {
                ("workspace_id", Json::Number(n)) => {
                    if let Some(n) = n.as_i64() {
                        clauses.push("workspace_id = ?".to_string());
                        params.push(SqlValue::Integer(n));
                    }
                }
                ("parent", Json::Null) => clauses.push("parent IS NULL".to_string()),
                (column, Json::String(s)) if column != "workspace_id" => {
                    clauses.push(format!("{} = ?", column));
                    params.push(SqlValue::Text(s.clone()));
                }
                _ => {}
            }
        }
        Filter::StartsWith { field, prefix } if field == FIELD_PATH => {
            clauses.push("substr(path, 1, ?) = ?".to_string());
            params.push(SqlValue::Integer(prefix.chars().count() as i64));
            params.push(SqlValue::Text(prefix.clone()));
        }
        _ => {}
    }
}

impl LibsqlDocumentStore {
    /// Open (or create) the database file and make sure the table exists
    pub async fn open(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("PRAGMA busy_timeout = 5000").await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to set busy timeout: {}", e))
        })?;
        stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to set busy timeout: {}", e))
        })?;
        Ok(conn)
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let statements = [
            "CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                workspace_id INTEGER,
                path TEXT,
                parent TEXT,
                doc TEXT NOT NULL,
                UNIQUE (collection, id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_documents_path
                ON documents (collection, workspace_id, path)",
            "CREATE INDEX IF NOT EXISTS idx_documents_parent
                ON documents (collection, workspace_id, parent)",
        ];
        for sql in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create documents schema: {}",
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn row_to_stored(row: &Row) -> Result<StoredRow> {
        let seq: i64 = row.get(0).context("Failed to get seq")?;
        let doc_json: String = row.get(1).context("Failed to get doc")?;
        let document: Document =
            serde_json::from_str(&doc_json).context("Failed to parse document JSON")?;
        Ok(StoredRow { seq, document })
    }

    /// Rows of `collection` matching `filter`, in insertion order
    async fn select(
        &self,
        conn: &Connection,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredRow>> {
        let mut clauses = vec!["collection = ?".to_string()];
        let mut params = vec![SqlValue::Text(collection.to_string())];
        prefilter(filter, &mut clauses, &mut params);
        let sql = format!(
            "SELECT seq, doc FROM documents WHERE {} ORDER BY seq",
            clauses.join(" AND ")
        );

        let mut rows = conn
            .query(&sql, params)
            .await
            .with_context(|| format!("Failed to scan collection {}", collection))?;

        let mut matched = Vec::new();
        while let Some(row) = rows.next().await.context("Failed to fetch document row")? {
            let stored = Self::row_to_stored(&row)?;
            if filter
                .matches(&stored.document)
                .context("Failed to evaluate filter")?
            {
                matched.push(stored);
            }
        }
        Ok(matched)
    }

    async fn write_row(&self, conn: &Connection, seq: i64, document: &Document) -> Result<()> {
        let columns = columns_of(document);
        let doc_json = serde_json::to_string(document).context("Failed to serialize document")?;
        conn.execute(
            "UPDATE documents SET id = ?, workspace_id = ?, path = ?, parent = ?, doc = ?
             WHERE seq = ?",
            vec![
                SqlValue::Text(columns.id),
                columns.workspace_id,
                columns.path,
                columns.parent,
                SqlValue::Text(doc_json),
                SqlValue::Integer(seq),
            ],
        )
        .await
        .context("Failed to write document")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LibsqlDocumentStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let conn = self.connect_with_timeout().await?;
        let rows = self.select(&conn, collection, filter).await?;
        Ok(rows.into_iter().next().map(|row| row.document))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let conn = self.connect_with_timeout().await?;
        let mut found: Vec<Document> = self
            .select(&conn, collection, filter)
            .await?
            .into_iter()
            .map(|row| row.document)
            .collect();

        if !options.sort.is_empty() {
            found.sort_by(|a, b| compare_documents(&options.sort, a, b));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let conn = self.connect_with_timeout().await?;
        Ok(self.select(&conn, collection, filter).await?.len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let conn = self.connect_with_timeout().await?;
        let columns = columns_of(&document);

        let mut existing = conn
            .query(
                "SELECT 1 FROM documents WHERE collection = ? AND id = ?",
                (collection, columns.id.as_str()),
            )
            .await
            .context("Failed to check for duplicate id")?;
        if existing.next().await.context("Failed to fetch row")?.is_some() {
            return Err(DatabaseError::duplicate_key(collection, columns.id).into());
        }

        let doc_json = serde_json::to_string(&document).context("Failed to serialize document")?;
        conn.execute(
            "INSERT INTO documents (collection, id, workspace_id, path, parent, doc)
             VALUES (?, ?, ?, ?, ?, ?)",
            vec![
                SqlValue::Text(collection.to_string()),
                SqlValue::Text(columns.id),
                columns.workspace_id,
                columns.path,
                columns.parent,
                SqlValue::Text(doc_json),
            ],
        )
        .await
        .with_context(|| format!("Failed to insert into {}", collection))?;
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> Result<u64> {
        let conn = self.connect_with_timeout().await?;
        let Some(row) = self.select(&conn, collection, filter).await?.into_iter().next() else {
            return Ok(0);
        };
        self.write_row(&conn, row.seq, &document).await?;
        Ok(1)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        ops: &[UpdateOp],
    ) -> Result<u64> {
        let conn = self.connect_with_timeout().await?;
        let Some(row) = self.select(&conn, collection, filter).await?.into_iter().next() else {
            return Ok(0);
        };

        let mut updated = row.document;
        for op in ops {
            op.apply(&mut updated)
                .with_context(|| format!("Failed to apply update to {}", collection))?;
        }
        self.write_row(&conn, row.seq, &updated).await?;
        Ok(1)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let conn = self.connect_with_timeout().await?;
        let rows = self.select(&conn, collection, filter).await?;
        for row in &rows {
            conn.execute("DELETE FROM documents WHERE seq = ?", vec![SqlValue::Integer(row.seq)])
                .await
                .with_context(|| format!("Failed to delete from {}", collection))?;
        }
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (LibsqlDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("documents.db");
        let store = LibsqlDocumentStore::open(db_path).await.unwrap();
        (store, temp_dir)
    }

    fn doc(id: &str, workspace: i64, path: &str, parent: Option<&str>, rank: i64) -> Document {
        json!({
            "_id": id,
            "workspace_id": workspace,
            "path": path,
            "parent": parent,
            "props": [{"name": "rank", "value": rank}],
        })
        .as_object()
        .unwrap()
        .clone()
    }

    async fn seeded() -> (LibsqlDocumentStore, TempDir) {
        let (store, temp_dir) = create_test_store().await;
        for d in [
            doc("r", 1, "/", None, 0),
            doc("a", 1, "/a", Some("/"), 3),
            doc("ab", 1, "/a/b", Some("/a"), 1),
            doc("abx", 1, "/abx", Some("/"), 2),
            doc("a2", 2, "/a", Some("/"), 9),
        ] {
            store.insert_one("nodes", d).await.unwrap();
        }
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_prefilters_respect_workspace_and_path_boundary() {
        let (store, _temp_dir) = seeded().await;
        let subtree = Filter::And(vec![
            Filter::eq(FIELD_WORKSPACE, 1),
            Filter::Or(vec![
                Filter::eq(FIELD_PATH, "/a"),
                Filter::starts_with(FIELD_PATH, "/a/"),
            ]),
        ]);
        let found = store
            .find(
                "nodes",
                &subtree,
                &FindOptions::new().sort_by(FIELD_PATH, SortDirection::Ascending),
            )
            .await
            .unwrap();
        let paths: Vec<&str> = found.iter().filter_map(|d| d["path"].as_str()).collect();
        assert_eq!(paths, vec!["/a", "/a/b"]);

        let children = Filter::And(vec![
            Filter::eq(FIELD_WORKSPACE, 1),
            Filter::eq(FIELD_PARENT, "/"),
        ]);
        assert_eq!(store.count("nodes", &children).await.unwrap(), 2);

        let root = Filter::eq(FIELD_PARENT, Json::Null);
        assert_eq!(store.count("nodes", &root).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_column_filters_are_evaluated_on_documents() {
        let (store, _temp_dir) = seeded().await;
        let filter = Filter::And(vec![
            Filter::eq(FIELD_WORKSPACE, 1),
            Filter::elem_match(
                "props",
                Filter::compare("value", CompareOp::Gte, 2),
            ),
        ]);
        let found = store
            .find(
                "nodes",
                &filter,
                &FindOptions::new().skip(0).limit(10),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().filter_map(|d| d["_id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "abx"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let (store, _temp_dir) = seeded().await;
        let err = store
            .insert_one("nodes", doc("a", 3, "/other", Some("/"), 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatabaseError>(),
            Some(DatabaseError::DuplicateKey { .. })
        ));
        // Same id in another collection is fine
        store
            .insert_one("other", doc("a", 1, "/a", Some("/"), 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_replace_and_delete() {
        let (store, _temp_dir) = seeded().await;
        let by_id = Filter::eq(FIELD_ID, "ab");

        let ops = [
            UpdateOp::set(FIELD_PATH, "/moved"),
            UpdateOp::set(FIELD_PARENT, "/"),
        ];
        assert_eq!(store.update_one("nodes", &by_id, &ops).await.unwrap(), 1);
        // The mirrored column follows the document
        let moved = store
            .find_one("nodes", &Filter::eq(FIELD_PATH, "/moved"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved["_id"], json!("ab"));

        let replacement = doc("ab", 1, "/moved", Some("/"), 42);
        assert_eq!(
            store.replace_one("nodes", &by_id, replacement).await.unwrap(),
            1
        );
        let replaced = store.find_one("nodes", &by_id).await.unwrap().unwrap();
        assert_eq!(replaced["props"][0]["value"], json!(42));

        let gone = store
            .delete_many("nodes", &Filter::eq(FIELD_WORKSPACE, 1))
            .await
            .unwrap();
        assert_eq!(gone, 4);
        assert_eq!(store.count("nodes", &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document_unchanged() {
        let (store, _temp_dir) = seeded().await;
        let by_id = Filter::eq(FIELD_ID, "a");
        let ops = [UpdateOp::push(FIELD_PATH, json!("x"))];
        assert!(store.update_one("nodes", &by_id, &ops).await.is_err());
        let unchanged = store.find_one("nodes", &by_id).await.unwrap().unwrap();
        assert_eq!(unchanged["path"], json!("/a"));
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("documents.db");
        {
            let store = LibsqlDocumentStore::open(db_path.clone()).await.unwrap();
            store
                .insert_one("nodes", doc("p", 1, "/p", Some("/"), 5))
                .await
                .unwrap();
        }
        let store = LibsqlDocumentStore::open(db_path).await.unwrap();
        let found = store
            .find_one("nodes", &Filter::eq(FIELD_PATH, "/p"))
            .await
            .unwrap();
        assert_eq!(found.unwrap()["_id"], json!("p"));
    }
}
