//! Treestore Core - Typed Content Tree on a Flat Document Store
//!
//! This crate persists a hierarchical, typed content tree (nodes with ordered,
//! typed, single- or multi-valued properties, binary payloads and
//! cross-references) inside a flat document database.
//!
//! # Architecture
//!
//! - **Document per node**: each node is one document keyed by (path, workspace)
//! - **Prefix scans**: subtree operations are path-prefix filters, never
//!   native hierarchy queries
//! - **Out-of-line binaries**: documents store byte lengths; bytes live in a
//!   `BinaryStore` (in memory or libsql)
//! - **Narrow type contract**: node types come from an external `NodeTypeCatalog`
//!
//! # Modules
//!
//! - [`models`] - Paths, nodes, typed properties, node-type contract, query model
//! - [`db`] - Document model, store traits and implementations
//! - [`services`] - NodeRepository, PropertyCodec, ReferenceIndex, QueryTranslator

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use models::*;
pub use services::*;
