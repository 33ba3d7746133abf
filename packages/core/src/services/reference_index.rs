//! Reference Index
//!
//! Reverse lookup of reference holders. There is no separate index
//! structure: the node collection is scanned with an element-match filter on
//! the `props` array, so the answer always reflects the stored documents.

use crate::db::schema::{FIELD_PROPS, FIELD_WORKSPACE, PROP_NAME, PROP_TYPE, PROP_VALUE};
use crate::db::{DocumentStore, Filter, FindOptions, NodeDocument};
use crate::models::{NodeId, NormalizedPath, PropertyType, WorkspaceId};
use crate::services::error::RepositoryResult;
use anyhow::Context;
use serde_json::{json, Value as Json};
use std::collections::HashSet;
use std::sync::Arc;

/// One property holding a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    /// Path of the node holding the reference
    pub path: NormalizedPath,
    pub property_name: String,
    pub referrer_id: NodeId,
}

pub struct ReferenceIndex {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl ReferenceIndex {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Properties referencing `target`
    ///
    /// Strong references are searched unless `weak` is set, in which case
    /// weak references are searched instead. `property_name` narrows the
    /// search to one property name.
    pub async fn find_referrers(
        &self,
        workspace: WorkspaceId,
        target: NodeId,
        property_name: Option<&str>,
        weak: bool,
    ) -> RepositoryResult<Vec<Referrer>> {
        let property_type = if weak {
            PropertyType::WeakReference
        } else {
            PropertyType::Reference
        };
        let targets: HashSet<String> = HashSet::from([target.to_string()]);
        self.scan(workspace, property_type, &targets, property_name)
            .await
    }

    /// Strong references to any of `targets`, from anywhere in the workspace
    pub async fn find_strong_referrers_of_any(
        &self,
        workspace: WorkspaceId,
        targets: &[NodeId],
    ) -> RepositoryResult<Vec<Referrer>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let targets: HashSet<String> = targets.iter().map(NodeId::to_string).collect();
        self.scan(workspace, PropertyType::Reference, &targets, None)
            .await
    }

    async fn scan(
        &self,
        workspace: WorkspaceId,
        property_type: PropertyType,
        targets: &HashSet<String>,
        property_name: Option<&str>,
    ) -> RepositoryResult<Vec<Referrer>> {
        let mut element = vec![
            Filter::eq(PROP_TYPE, property_type.as_str()),
            Filter::in_values(PROP_VALUE, targets.iter().map(|t| json!(t)).collect()),
        ];
        if let Some(name) = property_name {
            element.push(Filter::eq(PROP_NAME, name));
        }
        let filter = Filter::And(vec![
            Filter::eq(FIELD_WORKSPACE, workspace.as_i64()),
            Filter::elem_match(FIELD_PROPS, Filter::And(element)),
        ]);

        let documents = self
            .store
            .find(&self.collection, &filter, &FindOptions::new())
            .await
            .context("Failed to scan for referrers")?;

        let mut referrers = Vec::new();
        for document in documents {
            let node = NodeDocument::from_document(document)?;
            for prop in &node.props {
                if prop.property_type != property_type {
                    continue;
                }
                if property_name.is_some_and(|name| name != prop.name) {
                    continue;
                }
                if holds_any(&prop.value, targets) {
                    referrers.push(Referrer {
                        path: node.path.clone(),
                        property_name: prop.name.clone(),
                        referrer_id: node.id,
                    });
                }
            }
        }
        Ok(referrers)
    }
}

fn holds_any(stored: &Json, targets: &HashSet<String>) -> bool {
    match stored {
        Json::String(id) => targets.contains(id),
        Json::Array(items) => items.iter().any(|item| holds_any(item, targets)),
        _ => false,
    }
}
