//! Node Data Structures
//!
//! A [`Node`] is one element of the content tree: an identity, an absolute
//! path within one workspace, a primary type and an ordered property list.
//! Each node is persisted as exactly one document keyed by
//! (path, workspace).
//!
//! # Examples
//!
//! ```rust
//! use treestore_core::models::{Node, NormalizedPath, Property, Value, WorkspaceId};
//!
//! let path = NormalizedPath::validate("/content/page").unwrap();
//! let mut node = Node::new(WorkspaceId::new(1), path, "nt:unstructured");
//! node.set_property(Property::new("title", Value::from("Home")));
//!
//! assert_eq!(node.name(), "page");
//! assert_eq!(node.parent_path().unwrap().as_str(), "/content");
//! ```

use crate::models::node_type::JCR_MIXIN_TYPES;
use crate::models::{NormalizedPath, Property, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque node identity (UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Workspace scope of every node document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(i64);

impl WorkspaceId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tree node with its ordered property list
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identity, stable across moves
    pub id: NodeId,

    /// Absolute path, unique within the workspace
    pub path: NormalizedPath,

    pub workspace: WorkspaceId,

    /// Primary node type name (e.g. `nt:unstructured`)
    pub primary_type: String,

    properties: Vec<Property>,
}

impl Node {
    /// Create a node with a freshly generated identity
    pub fn new(
        workspace: WorkspaceId,
        path: NormalizedPath,
        primary_type: impl Into<String>,
    ) -> Self {
        Self::with_id(NodeId::new(), workspace, path, primary_type)
    }

    pub fn with_id(
        id: NodeId,
        workspace: WorkspaceId,
        path: NormalizedPath,
        primary_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path,
            workspace,
            primary_type: primary_type.into(),
            properties: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn parent_path(&self) -> Option<NormalizedPath> {
        self.path.parent()
    }

    /// Properties in insertion order
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    /// Add a property, replacing one with the same name in place
    ///
    /// Replacing a property that was loaded from the store marks the
    /// replacement as modified.
    pub fn set_property(&mut self, mut property: Property) {
        match self.property_mut(property.name()) {
            Some(existing) => {
                if !existing.is_new() {
                    property.mark_replacing();
                }
                *existing = property;
            }
            None => self.properties.push(property),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Property> {
        let idx = self.properties.iter().position(|p| p.name() == name)?;
        Some(self.properties.remove(idx))
    }

    /// Mixin type names from `jcr:mixinTypes`
    pub fn mixin_types(&self) -> Vec<&str> {
        self.property(JCR_MIXIN_TYPES)
            .map(|p| p.values().iter().filter_map(Value::as_text).collect())
            .unwrap_or_default()
    }

    /// Add a mixin type to `jcr:mixinTypes`
    pub fn add_mixin(&mut self, mixin: &str) {
        if self.mixin_types().contains(&mixin) {
            return;
        }
        let mut names: Vec<String> = self.mixin_types().into_iter().map(str::to_string).collect();
        names.push(mixin.to_string());
        match self.property_mut(JCR_MIXIN_TYPES) {
            Some(existing) => existing.set_names(names),
            None => self.properties.push(Property::names(JCR_MIXIN_TYPES, names)),
        }
    }

    /// Primary type followed by mixin types
    pub fn type_names(&self) -> Vec<&str> {
        let mut names = vec![self.primary_type.as_str()];
        names.extend(self.mixin_types());
        names
    }

    pub(crate) fn push_loaded_property(&mut self, property: Property) {
        self.properties.push(property);
    }
}
