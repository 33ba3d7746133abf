//! Repository Services
//!
//! This module contains the logic that maps the content tree onto the store:
//!
//! - `NodeRepository` - node CRUD, cursors, subtree copy/move/delete
//! - `PropertyCodec` - typed property encode/decode and multiplicity rules
//! - `ReferenceIndex` - reverse lookup of reference holders
//! - `QueryTranslator` - lowering of query object models to store filters
//!
//! Services coordinate between the database layer and callers, enforcing the
//! tree invariants the flat store cannot express on its own.

pub mod config;
pub mod error;
pub mod node_repository;
pub mod property_codec;
pub mod query_translator;
pub mod reference_index;

pub use config::RepositoryConfig;
pub use error::{RepositoryError, RepositoryResult};
pub use node_repository::{DeleteResult, NodeCursor, NodeRepository, SubtreeResult};
pub use property_codec::{EncodeMode, PropertyCodec};
pub use query_translator::{QueryResult, QueryRow, QueryTranslator};
pub use reference_index::{ReferenceIndex, Referrer};
