//! Node Document Schema
//!
//! One document per node:
//!
//! ```json
//! {
//!   "_id": "4f1c...",
//!   "path": "/content/page",
//!   "parent": "/content",
//!   "workspace_id": 1,
//!   "type": "nt:unstructured",
//!   "props": [{"name": "title", "type": "String", "multi": false, "value": "Home"}]
//! }
//! ```
//!
//! The root document stores `"parent": null`.

use crate::models::{NodeId, NormalizedPath, PropertyType, WorkspaceId};
use crate::db::Document;
use serde::{Deserialize, Serialize};

pub const FIELD_ID: &str = "_id";
pub const FIELD_PATH: &str = "path";
pub const FIELD_PARENT: &str = "parent";
pub const FIELD_WORKSPACE: &str = "workspace_id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PROPS: &str = "props";

pub const PROP_NAME: &str = "name";
pub const PROP_TYPE: &str = "type";
pub const PROP_MULTI: &str = "multi";
pub const PROP_VALUE: &str = "value";

/// Date values store their instant here
pub const DATE_EPOCH_SECONDS: &str = "epoch_seconds";
pub const DATE_TIMEZONE: &str = "timezone";

/// Decimal values store an order-preserving key next to their canonical text
pub const DECIMAL_SORT_KEY: &str = "sort_key";
pub const DECIMAL_TEXT: &str = "text";

/// Stored shape of one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(rename = "multi")]
    pub multiple: bool,
    /// Scalar for single-valued properties, array for multi-valued ones
    pub value: serde_json::Value,
}

/// Stored shape of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(rename = "_id")]
    pub id: NodeId,
    pub path: NormalizedPath,
    pub parent: Option<NormalizedPath>,
    #[serde(rename = "workspace_id")]
    pub workspace: WorkspaceId,
    #[serde(rename = "type")]
    pub primary_type: String,
    #[serde(default)]
    pub props: Vec<EncodedProperty>,
}

impl NodeDocument {
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            // NodeDocument always serializes to an object
            other => Err(serde::ser::Error::custom(format!(
                "expected object, got {}",
                other
            ))),
        }
    }

    pub fn from_document(document: Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_shape() {
        let doc = NodeDocument {
            id: NodeId::new(),
            path: NormalizedPath::validate("/content/page").unwrap(),
            parent: Some(NormalizedPath::validate("/content").unwrap()),
            workspace: WorkspaceId::new(1),
            primary_type: "nt:unstructured".to_string(),
            props: vec![EncodedProperty {
                name: "title".to_string(),
                property_type: PropertyType::String,
                multiple: false,
                value: json!("Home"),
            }],
        };
        let stored = doc.to_document().unwrap();
        assert_eq!(stored[FIELD_PATH], json!("/content/page"));
        assert_eq!(stored[FIELD_PARENT], json!("/content"));
        assert_eq!(stored[FIELD_WORKSPACE], json!(1));
        assert_eq!(stored[FIELD_TYPE], json!("nt:unstructured"));
        assert_eq!(stored[FIELD_PROPS][0][PROP_TYPE], json!("String"));
        assert_eq!(stored[FIELD_PROPS][0][PROP_MULTI], json!(false));
        assert_eq!(NodeDocument::from_document(stored).unwrap(), doc);
    }

    #[test]
    fn test_root_has_null_parent() {
        let doc = NodeDocument {
            id: NodeId::new(),
            path: NormalizedPath::root(),
            parent: None,
            workspace: WorkspaceId::new(2),
            primary_type: "rep:root".to_string(),
            props: Vec::new(),
        };
        let stored = doc.to_document().unwrap();
        assert_eq!(stored[FIELD_PARENT], serde_json::Value::Null);
    }

    #[test]
    fn test_invalid_stored_path_rejected() {
        let stored = json!({
            "_id": NodeId::new(),
            "path": "relative",
            "parent": null,
            "workspace_id": 1,
            "type": "nt:base",
            "props": []
        });
        let result = NodeDocument::from_document(stored.as_object().unwrap().clone());
        assert!(result.is_err());
    }
}
