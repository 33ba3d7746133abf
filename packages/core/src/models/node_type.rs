//! Node Type Contract
//!
//! The repository never stores or registers node types. It depends only on
//! a narrow capability: given a type name, yield its declared property
//! definitions and declared supertypes ([`NodeTypeCatalog`]).
//!
//! [`StaticNodeTypeCatalog`] is an in-memory catalog preloaded with the
//! built-in types the repository itself relies on.

use crate::models::PropertyType;
use std::collections::{HashMap, HashSet};

/// Identity property, stored as the node-level `_id` field
pub const JCR_UUID: &str = "jcr:uuid";

/// Primary type property, stored as the node-level `type` field
pub const JCR_PRIMARY_TYPE: &str = "jcr:primaryType";

/// Mixin type list, stored as a regular multi-valued name property
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";

/// Pseudo-property exposing a node's path in queries
pub const JCR_PATH: &str = "jcr:path";

/// Capability required of every reference target
pub const MIX_REFERENCEABLE: &str = "mix:referenceable";

pub const NT_BASE: &str = "nt:base";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";

/// Residual definition name, matches any property name
pub const RESIDUAL: &str = "*";

/// A declared property definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    /// `None` means any type (undefined)
    pub required_type: Option<PropertyType>,
    pub multiple: bool,
    pub declaring_type: String,
}

impl PropertyDefinition {
    pub fn is_residual(&self) -> bool {
        self.name == RESIDUAL
    }
}

/// A node type's declared supertypes and property definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeDefinition {
    pub name: String,
    pub supertypes: Vec<String>,
    pub property_definitions: Vec<PropertyDefinition>,
}

impl NodeTypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            property_definitions: Vec::new(),
        }
    }

    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        required_type: Option<PropertyType>,
        multiple: bool,
    ) -> Self {
        self.property_definitions.push(PropertyDefinition {
            name: name.into(),
            required_type,
            multiple,
            declaring_type: self.name.clone(),
        });
        self
    }
}

/// Lookup contract for node type definitions
pub trait NodeTypeCatalog: Send + Sync {
    /// Definition of `name`, or `None` when the type is unknown
    fn node_type(&self, name: &str) -> Option<NodeTypeDefinition>;
}

/// Every type reachable from `type_names` through supertypes, in
/// breadth-first order without duplicates
pub fn type_closure(catalog: &dyn NodeTypeCatalog, type_names: &[&str]) -> Vec<NodeTypeDefinition> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = type_names.iter().map(|s| s.to_string()).collect();
    let mut closure = Vec::new();
    let mut idx = 0;

    while idx < queue.len() {
        let name = queue[idx].clone();
        idx += 1;
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(def) = catalog.node_type(&name) {
            queue.extend(def.supertypes.iter().cloned());
            closure.push(def);
        }
    }

    closure
}

/// True when any of `type_names` is `wanted` or inherits from it
pub fn is_node_type(catalog: &dyn NodeTypeCatalog, type_names: &[&str], wanted: &str) -> bool {
    if type_names.contains(&wanted) {
        return true;
    }
    type_closure(catalog, type_names)
        .iter()
        .any(|def| def.name == wanted || def.supertypes.iter().any(|s| s == wanted))
}

/// Definition that governs `property_name` on a node of `type_names`
///
/// Named definitions win over residual ones. Among residual definitions,
/// the one whose multiplicity matches `multiple` is preferred.
pub fn effective_property_definition(
    catalog: &dyn NodeTypeCatalog,
    type_names: &[&str],
    property_name: &str,
    multiple: bool,
) -> Option<PropertyDefinition> {
    let closure = type_closure(catalog, type_names);
    let all = closure.iter().flat_map(|def| def.property_definitions.iter());

    let mut residual: Option<&PropertyDefinition> = None;
    for def in all {
        if def.name == property_name {
            return Some(def.clone());
        }
        if def.is_residual() {
            match residual {
                Some(current) if current.multiple == multiple => {}
                _ => residual = Some(def),
            }
        }
    }
    residual.cloned()
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticNodeTypeCatalog {
    types: HashMap<String, NodeTypeDefinition>,
}

impl StaticNodeTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the built-in types
    pub fn with_builtin_types() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            NodeTypeDefinition::new(NT_BASE)
                .with_property(JCR_PRIMARY_TYPE, Some(PropertyType::Name), false)
                .with_property(JCR_MIXIN_TYPES, Some(PropertyType::Name), true),
        );
        catalog.register(
            NodeTypeDefinition::new(NT_UNSTRUCTURED)
                .with_supertype(NT_BASE)
                .with_property(RESIDUAL, None, false)
                .with_property(RESIDUAL, None, true),
        );
        catalog.register(
            NodeTypeDefinition::new(MIX_REFERENCEABLE)
                .with_property(JCR_UUID, Some(PropertyType::String), false),
        );
        catalog.register(NodeTypeDefinition::new("nt:hierarchyNode").with_supertype(NT_BASE));
        catalog.register(NodeTypeDefinition::new("nt:folder").with_supertype("nt:hierarchyNode"));
        catalog.register(NodeTypeDefinition::new("nt:file").with_supertype("nt:hierarchyNode"));
        catalog.register(
            NodeTypeDefinition::new("nt:resource")
                .with_supertype(NT_BASE)
                .with_supertype(MIX_REFERENCEABLE)
                .with_property("jcr:data", Some(PropertyType::Binary), false)
                .with_property("jcr:mimeType", Some(PropertyType::String), false)
                .with_property("jcr:lastModified", Some(PropertyType::Date), false),
        );
        catalog.register(
            NodeTypeDefinition::new("rep:root")
                .with_supertype(NT_UNSTRUCTURED),
        );
        catalog
    }

    /// Add or replace a definition
    pub fn register(&mut self, definition: NodeTypeDefinition) {
        self.types.insert(definition.name.clone(), definition);
    }
}

impl NodeTypeCatalog for StaticNodeTypeCatalog {
    fn node_type(&self, name: &str) -> Option<NodeTypeDefinition> {
        self.types.get(name).cloned()
    }
}
