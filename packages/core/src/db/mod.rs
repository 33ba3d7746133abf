//! Database Layer
//!
//! This module holds everything that touches storage:
//!
//! - `document` - the JSON document model, filters, updates and sort keys
//! - `DocumentStore` - the flat document database contract, implemented in
//!   memory and on an embedded libsql database
//! - `schema` - the stored shape of a node
//! - `BinaryStore` - out-of-document storage for binary property values,
//!   in memory or in an embedded libsql database
//!
//! # Architecture
//!
//! The content tree is persisted without any native hierarchy: one document
//! per node, keyed by (path, workspace). Parent/child and subtree queries are
//! expressed as path equality and path-prefix filters over that flat
//! collection.

mod binary_store;
pub mod document;
mod document_store;
mod error;
mod memory_store;
pub mod schema;
#[cfg(feature = "libsql")]
mod sqlite_binary_store;
#[cfg(feature = "libsql")]
mod sqlite_document_store;

pub use binary_store::{BinaryStore, BlobKey, MemoryBinaryStore};
pub use document::{
    CompareOp, Document, Filter, FindOptions, SortDirection, SortKey, SortTarget, UpdateOp,
};
pub use document_store::DocumentStore;
pub use error::DatabaseError;
pub use memory_store::MemoryDocumentStore;
pub use schema::{EncodedProperty, NodeDocument};
#[cfg(feature = "libsql")]
pub use sqlite_binary_store::LibsqlBinaryStore;
#[cfg(feature = "libsql")]
pub use sqlite_document_store::LibsqlDocumentStore;
