//! Data Models
//!
//! This module contains the core data structures of the content tree:
//!
//! - `NormalizedPath` / `PathPredicate` - path validation and subtree predicates
//! - `Node` - a tree element with identity, path, primary type and properties
//! - `Property` / `Value` - typed single- and multi-valued properties
//! - `NodeTypeCatalog` - the narrow node-type lookup contract
//! - `query` - the structured query object model

mod node;
pub mod node_type;
mod path;
mod property;
pub mod query;

pub use node::{Node, NodeId, WorkspaceId};
pub use node_type::{NodeTypeCatalog, NodeTypeDefinition, PropertyDefinition, StaticNodeTypeCatalog};
pub use path::{NormalizedPath, PathError, PathPredicate};
pub use property::{
    Binary, DateValue, Decimal, Property, PropertyError, PropertyState, PropertyType, Value,
};
