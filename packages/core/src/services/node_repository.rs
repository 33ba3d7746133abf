//! Node Repository - Content Tree Operations
//!
//! This module maps the hierarchical content tree onto a flat document store:
//!
//! - CRUD by path and by identity (`insert`, `replace`, `get`, `get_by_id`)
//! - Lazy children and subtree cursors fetched in batches
//! - Subtree copy, move and delete as path-prefix scans
//! - Single-property update and delete
//! - Reverse reference lookup and query execution
//!
//! # Workspaces
//!
//! Every operation takes an explicit [`WorkspaceId`] and every filter it
//! issues is conjoined with the workspace predicate. Only
//! [`copy_subtree`](NodeRepository::copy_subtree) reads from a second
//! workspace.
//!
//! # Consistency
//!
//! Each store call is atomic for one document. Copy, move and delete are
//! sequences of such calls with no cross-document atomicity: a failure part
//! way leaves the already processed documents changed. Store calls within one
//! operation are awaited strictly in sequence and nothing is cached.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use treestore_core::db::{MemoryBinaryStore, MemoryDocumentStore};
//! use treestore_core::models::{Node, NormalizedPath, Property, StaticNodeTypeCatalog, Value, WorkspaceId};
//! use treestore_core::services::NodeRepository;
//!
//! # tokio_test::block_on(async {
//! let repo = NodeRepository::new(
//!     Arc::new(MemoryDocumentStore::new()),
//!     Arc::new(StaticNodeTypeCatalog::with_builtin_types()),
//!     Arc::new(MemoryBinaryStore::new()),
//! );
//! let ws = WorkspaceId::new(1);
//! repo.ensure_root(ws).await?;
//!
//! let mut page = Node::new(ws, NormalizedPath::validate("/page")?, "nt:unstructured");
//! page.set_property(Property::new("title", Value::from("Home")));
//! repo.insert(page).await?;
//!
//! let loaded = repo.get(ws, "/page").await?;
//! assert_eq!(loaded.property("title").and_then(|p| p.value()), Some(&Value::from("Home")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use crate::db::schema::{FIELD_ID, FIELD_PARENT, FIELD_PATH, FIELD_PROPS, FIELD_WORKSPACE, PROP_NAME};
use crate::db::{
    BinaryStore, DocumentStore, Filter, FindOptions, NodeDocument, SortDirection, UpdateOp,
};
use crate::models::query::QueryObjectModel;
use crate::models::{
    Node, NodeId, NodeTypeCatalog, NormalizedPath, PathError, Property, WorkspaceId,
};
use crate::services::config::RepositoryConfig;
use crate::services::error::{RepositoryError, RepositoryResult};
use crate::services::property_codec::{EncodeMode, PropertyCodec};
use crate::services::query_translator::{QueryResult, QueryTranslator};
use crate::services::reference_index::{ReferenceIndex, Referrer};
use anyhow::Context;
use std::collections::VecDeque;
use std::sync::Arc;

/// Primary type given to the root node by [`NodeRepository::ensure_root`]
pub const ROOT_NODE_TYPE: &str = "rep:root";

/// Result of a subtree delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Result of a subtree copy or move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtreeResult {
    /// Identity of the node now at the destination path
    pub root_id: NodeId,
    pub node_count: usize,
}

/// Repository over a flat document store
pub struct NodeRepository {
    store: Arc<dyn DocumentStore>,
    codec: PropertyCodec,
    references: ReferenceIndex,
    queries: QueryTranslator,
    config: RepositoryConfig,
}

fn workspace_filter(workspace: WorkspaceId) -> Filter {
    Filter::eq(FIELD_WORKSPACE, workspace.as_i64())
}

fn path_filter(workspace: WorkspaceId, path: &NormalizedPath) -> Filter {
    Filter::And(vec![
        workspace_filter(workspace),
        Filter::eq(FIELD_PATH, path.as_str()),
    ])
}

fn id_filter(workspace: WorkspaceId, id: NodeId) -> Filter {
    Filter::And(vec![
        workspace_filter(workspace),
        Filter::eq(FIELD_ID, id.to_string()),
    ])
}

fn subtree_filter(workspace: WorkspaceId, path: &NormalizedPath) -> Filter {
    Filter::And(vec![
        workspace_filter(workspace),
        path.prefix_predicate().to_filter(FIELD_PATH),
    ])
}

/// Parents sort before their descendants
fn parents_first() -> FindOptions {
    FindOptions::new().sort_by(FIELD_PATH, SortDirection::Ascending)
}

impl NodeRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn NodeTypeCatalog>,
        binaries: Arc<dyn BinaryStore>,
    ) -> Self {
        Self::with_config(store, catalog, binaries, RepositoryConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn NodeTypeCatalog>,
        binaries: Arc<dyn BinaryStore>,
        config: RepositoryConfig,
    ) -> Self {
        let collection = config.nodes_collection.clone();
        Self {
            codec: PropertyCodec::new(catalog, binaries),
            references: ReferenceIndex::new(store.clone(), collection.clone()),
            queries: QueryTranslator::new(store.clone(), collection),
            store,
            config,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn codec(&self) -> &PropertyCodec {
        &self.codec
    }

    fn collection(&self) -> &str {
        &self.config.nodes_collection
    }

    async fn find_document(&self, filter: &Filter) -> RepositoryResult<Option<NodeDocument>> {
        let document = self
            .store
            .find_one(self.collection(), filter)
            .await
            .context("Failed to look up node")?;
        Ok(document.map(NodeDocument::from_document).transpose()?)
    }

    async fn find_documents(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<NodeDocument>> {
        let documents = self
            .store
            .find(self.collection(), filter, options)
            .await
            .context("Failed to scan nodes")?;
        documents
            .into_iter()
            .map(|doc| NodeDocument::from_document(doc).map_err(RepositoryError::from))
            .collect()
    }

    async fn document_at(
        &self,
        workspace: WorkspaceId,
        path: &NormalizedPath,
    ) -> RepositoryResult<Option<NodeDocument>> {
        self.find_document(&path_filter(workspace, path)).await
    }

    async fn require_document(
        &self,
        workspace: WorkspaceId,
        path: &NormalizedPath,
    ) -> RepositoryResult<NodeDocument> {
        self.document_at(workspace, path)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("node {} in workspace {}", path, workspace)))
    }

    async fn path_exists(
        &self,
        workspace: WorkspaceId,
        path: &NormalizedPath,
    ) -> RepositoryResult<bool> {
        let count = self
            .store
            .count(self.collection(), &path_filter(workspace, path))
            .await
            .context("Failed to count nodes")?;
        Ok(count > 0)
    }

    //
    // READ OPERATIONS
    //

    pub async fn exists(&self, workspace: WorkspaceId, path: &str) -> RepositoryResult<bool> {
        let path = NormalizedPath::validate(path)?;
        self.path_exists(workspace, &path).await
    }

    pub async fn get(&self, workspace: WorkspaceId, path: &str) -> RepositoryResult<Node> {
        let path = NormalizedPath::validate(path)?;
        let document = self.require_document(workspace, &path).await?;
        PropertyCodec::decode_node(&document)
    }

    pub async fn get_by_id(&self, workspace: WorkspaceId, id: NodeId) -> RepositoryResult<Node> {
        let document = self
            .find_document(&id_filter(workspace, id))
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("node {} in workspace {}", id, workspace)))?;
        PropertyCodec::decode_node(&document)
    }

    /// Direct children of `path` in store order
    pub async fn children_of(
        &self,
        workspace: WorkspaceId,
        path: &str,
    ) -> RepositoryResult<NodeCursor<'_>> {
        let path = NormalizedPath::validate(path)?;
        let filter = Filter::And(vec![
            workspace_filter(workspace),
            Filter::eq(FIELD_PARENT, path.as_str()),
        ]);
        Ok(NodeCursor::new(self, filter, FindOptions::new()))
    }

    /// `path` itself followed by all of its descendants
    pub async fn subtree_of(
        &self,
        workspace: WorkspaceId,
        path: &str,
    ) -> RepositoryResult<NodeCursor<'_>> {
        let path = NormalizedPath::validate(path)?;
        Ok(NodeCursor::new(
            self,
            subtree_filter(workspace, &path),
            parents_first(),
        ))
    }

    //
    // WRITE OPERATIONS
    //

    /// Create the root node of `workspace` if it is missing
    pub async fn ensure_root(&self, workspace: WorkspaceId) -> RepositoryResult<Node> {
        let root = NormalizedPath::root();
        if let Some(document) = self.document_at(workspace, &root).await? {
            return PropertyCodec::decode_node(&document);
        }
        tracing::info!("Creating root node in workspace {}", workspace);
        self.insert(Node::new(workspace, root, ROOT_NODE_TYPE)).await
    }

    /// Store a new node
    ///
    /// Fails with `AlreadyExists` when the path is taken and `PathNotFound`
    /// when the parent of a non-root node is missing. Returns the node as
    /// stored (multiplicities promoted, properties clean).
    pub async fn insert(&self, node: Node) -> RepositoryResult<Node> {
        let workspace = node.workspace;
        if self.path_exists(workspace, &node.path).await? {
            return Err(RepositoryError::already_exists(node.path.as_str()));
        }
        if let Some(parent) = node.parent_path() {
            if !self.path_exists(workspace, &parent).await? {
                return Err(RepositoryError::path_not_found(parent.as_str()));
            }
        }
        // identities are unique across workspaces
        let id_taken = self
            .store
            .count(self.collection(), &Filter::eq(FIELD_ID, node.id.to_string()))
            .await
            .context("Failed to count nodes")?;
        if id_taken > 0 {
            return Err(RepositoryError::already_exists(format!(
                "{} (identifier {})",
                node.path, node.id
            )));
        }

        let document = self.build_document(&node).await?;
        self.store
            .insert_one(self.collection(), document.to_document()?)
            .await
            .with_context(|| format!("Failed to insert node {}", node.path))?;

        tracing::debug!("Inserted node {} ({}) in workspace {}", node.path, node.id, workspace);
        PropertyCodec::decode_node(&document)
    }

    /// Overwrite the node at `path`, or insert it when absent
    ///
    /// The whole document is replaced, not merged. The stored identity is
    /// kept; an identity carried by `node` is ignored.
    pub async fn replace(
        &self,
        workspace: WorkspaceId,
        path: &str,
        mut node: Node,
    ) -> RepositoryResult<Node> {
        let path = NormalizedPath::validate(path)?;
        node.workspace = workspace;
        node.path = path.clone();

        let Some(existing) = self.document_at(workspace, &path).await? else {
            return self.insert(node).await;
        };

        node.id = existing.id;
        let document = self.build_document(&node).await?;
        let replaced = self
            .store
            .replace_one(self.collection(), &id_filter(workspace, existing.id), document.to_document()?)
            .await
            .with_context(|| format!("Failed to replace node {}", path))?;
        if replaced == 0 {
            return Err(RepositoryError::not_found(format!("node {} in workspace {}", path, workspace)));
        }

        tracing::debug!("Replaced node {} ({})", path, node.id);
        PropertyCodec::decode_node(&document)
    }

    /// Encode all properties and verify reference targets
    async fn build_document(&self, node: &Node) -> RepositoryResult<NodeDocument> {
        let props = self.codec.encode_node(node).await?;
        self.verify_reference_targets(node, node.properties()).await?;
        Ok(NodeDocument {
            id: node.id,
            path: node.path.clone(),
            parent: node.parent_path(),
            workspace: node.workspace,
            primary_type: node.primary_type.clone(),
            props,
        })
    }

    /// Every reference value must point at an existing referenceable node
    ///
    /// A node may reference itself.
    async fn verify_reference_targets<'p>(
        &self,
        owner: &Node,
        properties: impl IntoIterator<Item = &'p Property>,
    ) -> RepositoryResult<()> {
        if !self.config.verify_reference_targets {
            return Ok(());
        }
        for property in properties {
            if !property.property_type().is_reference() {
                continue;
            }
            for target in property.values().iter().filter_map(|v| v.as_reference()) {
                if target == owner.id {
                    continue;
                }
                let Some(document) = self.find_document(&id_filter(owner.workspace, target)).await?
                else {
                    return Err(RepositoryError::referential_integrity(format!(
                        "{} on {} references missing node {}",
                        property.name(),
                        owner.path,
                        target
                    )));
                };
                let target_node = PropertyCodec::decode_node(&document)?;
                if !self.codec.is_referenceable(&target_node) {
                    return Err(RepositoryError::value_format(format!(
                        "{} on {} references {} which is not referenceable",
                        property.name(),
                        owner.path,
                        target_node.path
                    )));
                }
            }
        }
        Ok(())
    }

    /// Remove `path` and every descendant
    ///
    /// Fails with `ReferentialIntegrity`, removing nothing, when any strong
    /// reference in the workspace points into the subtree.
    pub async fn delete_subtree(
        &self,
        workspace: WorkspaceId,
        path: &str,
    ) -> RepositoryResult<DeleteResult> {
        let path = NormalizedPath::validate(path)?;
        if path.is_root() {
            return Err(PathError::malformed(path.as_str(), "the root node can not be removed").into());
        }
        if !self.path_exists(workspace, &path).await? {
            return Err(RepositoryError::not_found(format!("node {} in workspace {}", path, workspace)));
        }

        let filter = subtree_filter(workspace, &path);
        let ids: Vec<NodeId> = self
            .find_documents(&filter, &FindOptions::new())
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();

        let referrers = self
            .references
            .find_strong_referrers_of_any(workspace, &ids)
            .await?;
        if let Some(referrer) = referrers.first() {
            tracing::warn!(
                "Refusing to delete {}: {} reference(s) into the subtree",
                path,
                referrers.len()
            );
            return Err(RepositoryError::referential_integrity(format!(
                "{} is referenced by {} of {}",
                path, referrer.property_name, referrer.path
            )));
        }

        let deleted_count = self
            .store
            .delete_many(self.collection(), &filter)
            .await
            .with_context(|| format!("Failed to delete subtree {}", path))?;

        tracing::info!("Deleted {} node(s) under {}", deleted_count, path);
        Ok(DeleteResult { deleted_count })
    }

    /// Checks shared by copy and move; returns the validated paths
    async fn check_relocation(
        &self,
        workspace: WorkspaceId,
        src: &str,
        dst: &str,
        src_workspace: WorkspaceId,
    ) -> RepositoryResult<(NormalizedPath, NormalizedPath)> {
        let src = NormalizedPath::validate(src)?;
        let dst = NormalizedPath::validate(dst)?;
        if dst.is_root() {
            return Err(PathError::malformed(dst.as_str(), "the root can not be a destination").into());
        }
        if !self.path_exists(src_workspace, &src).await? {
            return Err(RepositoryError::not_found(format!(
                "node {} in workspace {}",
                src, src_workspace
            )));
        }
        if workspace == src_workspace && src.is_ancestor_or_self_of(&dst) {
            return Err(PathError::malformed(
                dst.as_str(),
                "destination is inside the source subtree",
            )
            .into());
        }
        if self.path_exists(workspace, &dst).await? {
            return Err(RepositoryError::already_exists(dst.as_str()));
        }
        if let Some(parent) = dst.parent() {
            if !self.path_exists(workspace, &parent).await? {
                return Err(RepositoryError::path_not_found(parent.as_str()));
            }
        }
        Ok((src, dst))
    }

    /// Copy the subtree at `src` in `src_workspace` to `dst` in `workspace`
    ///
    /// Copies get fresh identities and verbatim properties. Reference values
    /// keep pointing at the original targets. Binary payloads are copied to
    /// the new property paths.
    pub async fn copy_subtree(
        &self,
        workspace: WorkspaceId,
        src: &str,
        dst: &str,
        src_workspace: WorkspaceId,
    ) -> RepositoryResult<SubtreeResult> {
        let (src, dst) = self.check_relocation(workspace, src, dst, src_workspace).await?;
        let documents = self
            .find_documents(&subtree_filter(src_workspace, &src), &parents_first())
            .await?;

        let mut root_id = None;
        for document in &documents {
            let target = document.path.rebase(&src, &dst).ok_or_else(|| {
                PathError::malformed(document.path.as_str(), "not under the copied subtree")
            })?;
            let copy = NodeDocument {
                id: NodeId::new(),
                parent: target.parent(),
                path: target.clone(),
                workspace,
                primary_type: document.primary_type.clone(),
                props: document.props.clone(),
            };
            self.store
                .insert_one(self.collection(), copy.to_document()?)
                .await
                .with_context(|| format!("Failed to insert copy {}", target))?;
            self.codec
                .relocate_binaries(document, &target, workspace)
                .await?;
            root_id.get_or_insert(copy.id);
            tracing::debug!("Copied {} to {}", document.path, target);
        }

        tracing::info!("Copied {} node(s) from {} to {}", documents.len(), src, dst);
        Ok(SubtreeResult {
            root_id: root_id.ok_or_else(|| RepositoryError::not_found(src.as_str()))?,
            node_count: documents.len(),
        })
    }

    /// Move the subtree at `src` to `dst` within `workspace`
    ///
    /// Identities and properties are kept; only paths and parents change.
    /// Binary payloads are re-stored under the new property paths.
    pub async fn move_subtree(
        &self,
        workspace: WorkspaceId,
        src: &str,
        dst: &str,
    ) -> RepositoryResult<SubtreeResult> {
        let (src, dst) = self.check_relocation(workspace, src, dst, workspace).await?;
        let documents = self
            .find_documents(&subtree_filter(workspace, &src), &parents_first())
            .await?;

        let mut root_id = None;
        for document in &documents {
            let target = document.path.rebase(&src, &dst).ok_or_else(|| {
                PathError::malformed(document.path.as_str(), "not under the moved subtree")
            })?;
            let parent = match target.parent() {
                Some(parent) => serde_json::Value::String(parent.into()),
                None => serde_json::Value::Null,
            };
            let ops = [
                UpdateOp::set(FIELD_PATH, target.as_str()),
                UpdateOp::set(FIELD_PARENT, parent),
            ];
            self.store
                .update_one(self.collection(), &id_filter(workspace, document.id), &ops)
                .await
                .with_context(|| format!("Failed to move {} to {}", document.path, target))?;
            self.codec
                .relocate_binaries(document, &target, workspace)
                .await?;
            root_id.get_or_insert(document.id);
            tracing::debug!("Moved {} to {}", document.path, target);
        }

        tracing::info!("Moved {} node(s) from {} to {}", documents.len(), src, dst);
        Ok(SubtreeResult {
            root_id: root_id.ok_or_else(|| RepositoryError::not_found(src.as_str()))?,
            node_count: documents.len(),
        })
    }

    /// Persist one property of the node at `path`
    ///
    /// Returns `Ok(false)` when nothing was written because the property is
    /// unchanged since it was loaded or is stored as a node-level field.
    pub async fn update_property(
        &self,
        workspace: WorkspaceId,
        path: &str,
        property: Property,
    ) -> RepositoryResult<bool> {
        let path = NormalizedPath::validate(path)?;
        let document = self.require_document(workspace, &path).await?;
        let node = PropertyCodec::decode_node(&document)?;

        let Some(encoded) = self
            .codec
            .encode(&node, &property, EncodeMode::SingleProperty)
            .await?
        else {
            tracing::warn!("Skipped write of property {} on {}", property.name(), path);
            return Ok(false);
        };
        self.verify_reference_targets(&node, [&property]).await?;

        let value = serde_json::to_value(&encoded)?;
        let by_name = Filter::eq(PROP_NAME, property.name());
        let ops = if document.props.iter().any(|p| p.name == encoded.name) {
            [UpdateOp::set_element(FIELD_PROPS, by_name, value)]
        } else {
            [UpdateOp::push(FIELD_PROPS, value)]
        };
        let modified = self
            .store
            .update_one(self.collection(), &id_filter(workspace, document.id), &ops)
            .await
            .with_context(|| format!("Failed to update property {} on {}", encoded.name, path))?;
        if modified == 0 {
            return Err(RepositoryError::not_found(format!("node {} in workspace {}", path, workspace)));
        }

        tracing::debug!("Updated property {} on {}", encoded.name, path);
        Ok(true)
    }

    /// Remove one property from the node at `path`
    pub async fn delete_property(
        &self,
        workspace: WorkspaceId,
        path: &str,
        name: &str,
    ) -> RepositoryResult<()> {
        let path = NormalizedPath::validate(path)?;
        let document = self.require_document(workspace, &path).await?;
        if !document.props.iter().any(|p| p.name == name) {
            return Err(RepositoryError::not_found(format!(
                "property {}",
                path.property_path(name)
            )));
        }

        let ops = [UpdateOp::pull(FIELD_PROPS, Filter::eq(PROP_NAME, name))];
        self.store
            .update_one(self.collection(), &id_filter(workspace, document.id), &ops)
            .await
            .with_context(|| format!("Failed to remove property {} from {}", name, path))?;
        Ok(())
    }

    //
    // BINARIES, REFERENCES, QUERIES
    //

    /// Bytes of the binary value at `index` of `property` on `node_path`
    pub async fn get_binary(
        &self,
        workspace: WorkspaceId,
        node_path: &str,
        property: &str,
        index: u32,
    ) -> RepositoryResult<Vec<u8>> {
        let node_path = NormalizedPath::validate(node_path)?;
        self.codec
            .fetch_binary(workspace, &node_path, property, index)
            .await?
            .ok_or_else(|| {
                RepositoryError::not_found(format!(
                    "binary {}[{}]",
                    node_path.property_path(property),
                    index
                ))
            })
    }

    /// Properties holding a reference to `target`
    pub async fn find_referrers(
        &self,
        workspace: WorkspaceId,
        target: NodeId,
        property_name: Option<&str>,
        weak: bool,
    ) -> RepositoryResult<Vec<Referrer>> {
        self.references
            .find_referrers(workspace, target, property_name, weak)
            .await
    }

    pub async fn execute_query(
        &self,
        workspace: WorkspaceId,
        query: &QueryObjectModel,
    ) -> RepositoryResult<QueryResult> {
        self.queries.execute(workspace, query).await
    }

    //
    // UNSUPPORTED OPERATIONS
    //

    /// Cross-workspace clone; not supported
    pub async fn clone_from(
        &self,
        _workspace: WorkspaceId,
        _src_workspace: WorkspaceId,
        _src: &str,
        _dst: &str,
        _remove_existing: bool,
    ) -> RepositoryResult<SubtreeResult> {
        Err(RepositoryError::unimplemented("clone between workspaces"))
    }

    /// Versioning; not supported
    pub async fn check_in(&self, _workspace: WorkspaceId, _path: &str) -> RepositoryResult<()> {
        Err(RepositoryError::unimplemented("check-in"))
    }

    /// Versioning; not supported
    pub async fn check_out(&self, _workspace: WorkspaceId, _path: &str) -> RepositoryResult<()> {
        Err(RepositoryError::unimplemented("check-out"))
    }
}

/// Lazy, finite, restartable sequence of nodes
///
/// Documents are fetched `cursor_batch_size` at a time with skip/limit.
/// Nothing is fetched until the first call to [`next_node`](Self::next_node).
pub struct NodeCursor<'a> {
    repository: &'a NodeRepository,
    filter: Filter,
    options: FindOptions,
    buffer: VecDeque<NodeDocument>,
    offset: u64,
    exhausted: bool,
}

impl<'a> NodeCursor<'a> {
    fn new(repository: &'a NodeRepository, filter: Filter, options: FindOptions) -> Self {
        Self {
            repository,
            filter,
            options,
            buffer: VecDeque::new(),
            offset: 0,
            exhausted: false,
        }
    }

    pub async fn next_node(&mut self) -> RepositoryResult<Option<Node>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch().await?;
        }
        match self.buffer.pop_front() {
            Some(document) => Ok(Some(PropertyCodec::decode_node(&document)?)),
            None => Ok(None),
        }
    }

    async fn fetch_batch(&mut self) -> RepositoryResult<()> {
        let batch_size = self.repository.config.cursor_batch_size.max(1);
        let options = self.options.clone().skip(self.offset).limit(batch_size);
        let batch = self.repository.find_documents(&self.filter, &options).await?;
        let fetched = batch.len() as u64;
        self.offset += fetched;
        if fetched < batch_size {
            self.exhausted = true;
        }
        self.buffer.extend(batch);
        Ok(())
    }

    /// Start over from the first node; the next call re-queries the store
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.offset = 0;
        self.exhausted = false;
    }

    /// Drain the remaining nodes
    pub async fn collect_all(&mut self) -> RepositoryResult<Vec<Node>> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next_node().await? {
            nodes.push(node);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
#[path = "node_repository_test.rs"]
mod node_repository_test;
