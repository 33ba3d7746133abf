//! Tests for NodeRepository
//!
//! Organized by operation: CRUD, cursors, copy/move, delete, properties.

use super::*;
use crate::db::{MemoryBinaryStore, MemoryDocumentStore};
use crate::models::node_type::{MIX_REFERENCEABLE, NT_UNSTRUCTURED};
use crate::models::{
    Binary, NodeTypeDefinition, PropertyType, StaticNodeTypeCatalog, Value,
};

const WS: WorkspaceId = WorkspaceId::new(1);

struct Fixture {
    repo: NodeRepository,
    store: Arc<MemoryDocumentStore>,
}

fn fixture_with_config(config: RepositoryConfig) -> Fixture {
    let mut catalog = StaticNodeTypeCatalog::with_builtin_types();
    catalog.register(
        NodeTypeDefinition::new("app:page")
            .with_supertype(NT_UNSTRUCTURED)
            .with_property("tags", Some(PropertyType::String), true),
    );
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = NodeRepository::with_config(
        store.clone(),
        Arc::new(catalog),
        Arc::new(MemoryBinaryStore::new()),
        config,
    );
    Fixture { repo, store }
}

async fn fixture() -> Fixture {
    let fixture = fixture_with_config(RepositoryConfig::default());
    fixture.repo.ensure_root(WS).await.unwrap();
    fixture
}

fn path(raw: &str) -> NormalizedPath {
    NormalizedPath::validate(raw).unwrap()
}

async fn add(repo: &NodeRepository, raw: &str) -> Node {
    repo.insert(Node::new(WS, path(raw), NT_UNSTRUCTURED))
        .await
        .unwrap()
}

async fn add_referenceable(repo: &NodeRepository, raw: &str) -> Node {
    let mut node = Node::new(WS, path(raw), NT_UNSTRUCTURED);
    node.add_mixin(MIX_REFERENCEABLE);
    repo.insert(node).await.unwrap()
}

async fn paths_of(mut cursor: NodeCursor<'_>) -> Vec<String> {
    cursor
        .collect_all()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.path.to_string())
        .collect()
}

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn test_insert_then_get() {
    let f = fixture().await;
    let mut node = Node::new(WS, path("/page"), "app:page");
    node.set_property(Property::new("title", Value::from("Home")));
    node.set_property(Property::new("tags", Value::from("solo")));
    let id = node.id;
    f.repo.insert(node).await.unwrap();

    let loaded = f.repo.get(WS, "/page").await.unwrap();
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.primary_type, "app:page");
    assert_eq!(loaded.properties().len(), 2);
    // declared multiple, promoted on write
    assert!(loaded.property("tags").unwrap().is_multiple());
    assert!(loaded.properties().iter().all(|p| p.is_clean()));

    assert_eq!(f.repo.get_by_id(WS, id).await.unwrap().path.as_str(), "/page");
}

#[tokio::test]
async fn test_insert_preconditions() {
    let f = fixture().await;
    add(&f.repo, "/a").await;

    let err = f
        .repo
        .insert(Node::new(WS, path("/a"), NT_UNSTRUCTURED))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists { .. }));

    let err = f
        .repo
        .insert(Node::new(WS, path("/missing/child"), NT_UNSTRUCTURED))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::PathNotFound { .. }));
}

#[tokio::test]
async fn test_insert_with_taken_identifier_fails_already_exists() {
    let f = fixture().await;
    let existing = add(&f.repo, "/a").await;

    let mut same_id = Node::new(WS, path("/b"), NT_UNSTRUCTURED);
    same_id.id = existing.id;
    let err = f.repo.insert(same_id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    assert!(!f.repo.exists(WS, "/b").await.unwrap());

    let other = WorkspaceId::new(2);
    f.repo.ensure_root(other).await.unwrap();
    let mut elsewhere = Node::new(other, path("/a"), NT_UNSTRUCTURED);
    elsewhere.id = existing.id;
    assert!(matches!(
        f.repo.insert(elsewhere).await,
        Err(RepositoryError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_workspaces_are_isolated() {
    let f = fixture().await;
    add(&f.repo, "/a").await;
    let other = WorkspaceId::new(2);
    assert!(!f.repo.exists(other, "/a").await.unwrap());
    assert!(matches!(
        f.repo.get(other, "/a").await,
        Err(RepositoryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_invalid_paths_rejected() {
    let f = fixture().await;
    for raw in ["", "relative", "/a//b", "/a/", "/a/../b", "/a[2]"] {
        assert!(
            matches!(f.repo.exists(WS, raw).await, Err(RepositoryError::InvalidPath(_))),
            "{raw:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_replace_overwrites_and_keeps_identity() {
    let f = fixture().await;
    let mut original = Node::new(WS, path("/a"), NT_UNSTRUCTURED);
    original.set_property(Property::new("keep", Value::from("no")));
    let stored = f.repo.insert(original).await.unwrap();

    let mut replacement = Node::new(WS, path("/ignored"), "app:page");
    replacement.set_property(Property::new("fresh", Value::Long(1)));
    let result = f.repo.replace(WS, "/a", replacement).await.unwrap();

    assert_eq!(result.id, stored.id);
    let loaded = f.repo.get(WS, "/a").await.unwrap();
    assert_eq!(loaded.id, stored.id);
    assert_eq!(loaded.primary_type, "app:page");
    assert!(loaded.property("keep").is_none());
    assert!(loaded.property("fresh").is_some());
}

#[tokio::test]
async fn test_replace_absent_inserts() {
    let f = fixture().await;
    let node = Node::new(WS, path("/x"), NT_UNSTRUCTURED);
    let id = node.id;
    let result = f.repo.replace(WS, "/b", node).await.unwrap();
    assert_eq!(result.id, id);
    assert!(f.repo.exists(WS, "/b").await.unwrap());
}

#[tokio::test]
async fn test_ensure_root_is_idempotent() {
    let f = fixture().await;
    let first = f.repo.get(WS, "/").await.unwrap();
    let second = f.repo.ensure_root(WS).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.primary_type, ROOT_NODE_TYPE);
}

// ============================================================================
// Cursors
// ============================================================================

#[tokio::test]
async fn test_children_cursor_batches_and_restarts() {
    let f = fixture_with_config(RepositoryConfig {
        cursor_batch_size: 2,
        ..RepositoryConfig::default()
    });
    f.repo.ensure_root(WS).await.unwrap();
    add(&f.repo, "/p").await;
    for name in ["c1", "c2", "c3", "c4", "c5"] {
        add(&f.repo, &format!("/p/{}", name)).await;
    }
    add(&f.repo, "/p/c1/grandchild").await;

    let mut cursor = f.repo.children_of(WS, "/p").await.unwrap();
    let first = cursor.next_node().await.unwrap().unwrap();
    assert_eq!(first.path.as_str(), "/p/c1");
    let rest = cursor.collect_all().await.unwrap();
    assert_eq!(rest.len(), 4);
    assert!(cursor.next_node().await.unwrap().is_none());

    cursor.restart();
    assert_eq!(cursor.collect_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_children_of_leaf_is_empty() {
    let f = fixture().await;
    add(&f.repo, "/leaf").await;
    let cursor = f.repo.children_of(WS, "/leaf").await.unwrap();
    assert!(paths_of(cursor).await.is_empty());
}

#[tokio::test]
async fn test_subtree_cursor_respects_segment_boundary() {
    let f = fixture().await;
    add(&f.repo, "/a").await;
    add(&f.repo, "/a/c").await;
    add(&f.repo, "/ab").await;
    add(&f.repo, "/ab/x").await;

    let cursor = f.repo.subtree_of(WS, "/a").await.unwrap();
    assert_eq!(paths_of(cursor).await, vec!["/a", "/a/c"]);
}

// ============================================================================
// Copy and move
// ============================================================================

#[tokio::test]
async fn test_copy_subtree_assigns_new_ids() {
    let f = fixture().await;
    let a = add(&f.repo, "/a").await;
    let c = add(&f.repo, "/a/c").await;

    let result = f.repo.copy_subtree(WS, "/a", "/b", WS).await.unwrap();
    assert_eq!(result.node_count, 2);

    let b = f.repo.get(WS, "/b").await.unwrap();
    let bc = f.repo.get(WS, "/b/c").await.unwrap();
    assert_eq!(b.id, result.root_id);
    assert_ne!(b.id, a.id);
    assert_ne!(bc.id, c.id);
    assert_eq!(bc.parent_path().unwrap().as_str(), "/b");

    // originals untouched
    assert_eq!(f.repo.get(WS, "/a/c").await.unwrap().id, c.id);
    let copied = f.repo.subtree_of(WS, "/b").await.unwrap();
    assert_eq!(paths_of(copied).await, vec!["/b", "/b/c"]);
}

#[tokio::test]
async fn test_copy_keeps_internal_references_on_original_target() {
    let f = fixture().await;
    let a = add_referenceable(&f.repo, "/a").await;
    let mut c = Node::new(WS, path("/a/c"), NT_UNSTRUCTURED);
    c.add_mixin(MIX_REFERENCEABLE);
    c.set_property(Property::new("link", Value::Reference(a.id)));
    f.repo.insert(c).await.unwrap();

    f.repo.copy_subtree(WS, "/a", "/b", WS).await.unwrap();

    let copy_root = f.repo.get(WS, "/b").await.unwrap();
    let copy_child = f.repo.get(WS, "/b/c").await.unwrap();
    assert_ne!(copy_root.id, a.id);
    assert_eq!(
        copy_child.property("link").unwrap().value(),
        Some(&Value::Reference(a.id))
    );
}

#[tokio::test]
async fn test_copy_across_workspaces() {
    let f = fixture().await;
    let target = WorkspaceId::new(2);
    f.repo.ensure_root(target).await.unwrap();
    add(&f.repo, "/a").await;
    add(&f.repo, "/a/c").await;

    f.repo.copy_subtree(target, "/a", "/a", WS).await.unwrap();
    assert!(f.repo.exists(target, "/a/c").await.unwrap());
    assert!(f.repo.exists(WS, "/a/c").await.unwrap());
}

#[tokio::test]
async fn test_copy_and_move_preconditions() {
    let f = fixture().await;
    add(&f.repo, "/a").await;
    add(&f.repo, "/a/c").await;
    add(&f.repo, "/taken").await;

    let err = f.repo.copy_subtree(WS, "/nope", "/b", WS).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));

    let err = f.repo.copy_subtree(WS, "/a", "/taken", WS).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists { .. }));

    let err = f.repo.move_subtree(WS, "/a", "/x/y").await.unwrap_err();
    assert!(matches!(err, RepositoryError::PathNotFound { .. }));

    let err = f.repo.move_subtree(WS, "/a", "/a/c/inner").await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidPath(_)));

    let err = f.repo.copy_subtree(WS, "/a", "/a", WS).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidPath(_)));

    let err = f.repo.move_subtree(WS, "/a", "/").await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidPath(_)));
}

#[tokio::test]
async fn test_move_subtree_keeps_ids() {
    let f = fixture().await;
    let a = add(&f.repo, "/a").await;
    let c = add(&f.repo, "/a/c").await;

    let result = f.repo.move_subtree(WS, "/a", "/b").await.unwrap();
    assert_eq!(result.root_id, a.id);
    assert_eq!(result.node_count, 2);

    assert!(!f.repo.exists(WS, "/a").await.unwrap());
    assert!(!f.repo.exists(WS, "/a/c").await.unwrap());
    assert_eq!(f.repo.get(WS, "/b").await.unwrap().id, a.id);
    let moved = f.repo.get(WS, "/b/c").await.unwrap();
    assert_eq!(moved.id, c.id);
    assert_eq!(moved.parent_path().unwrap().as_str(), "/b");

    let children = f.repo.children_of(WS, "/b").await.unwrap();
    assert_eq!(paths_of(children).await, vec!["/b/c"]);
}

#[tokio::test]
async fn test_move_and_copy_carry_binaries() {
    let f = fixture().await;
    let mut node = Node::new(WS, path("/file"), NT_UNSTRUCTURED);
    node.set_property(Property::new("data", Value::binary(b"payload".to_vec())));
    f.repo.insert(node).await.unwrap();

    f.repo.copy_subtree(WS, "/file", "/copy", WS).await.unwrap();
    f.repo.move_subtree(WS, "/file", "/moved").await.unwrap();

    assert_eq!(f.repo.get_binary(WS, "/copy", "data", 0).await.unwrap(), b"payload");
    assert_eq!(f.repo.get_binary(WS, "/moved", "data", 0).await.unwrap(), b"payload");
    let loaded = f.repo.get(WS, "/moved").await.unwrap();
    assert_eq!(
        loaded.property("data").and_then(|p| p.value()),
        Some(&Value::Binary(Binary::Stored { length: 7 }))
    );
}

// ============================================================================
// Delete and references
// ============================================================================

#[tokio::test]
async fn test_delete_subtree_removes_descendants_only() {
    let f = fixture().await;
    add(&f.repo, "/a").await;
    add(&f.repo, "/a/c").await;
    add(&f.repo, "/ab").await;

    let result = f.repo.delete_subtree(WS, "/a").await.unwrap();
    assert_eq!(result.deleted_count, 2);
    assert!(f.repo.exists(WS, "/ab").await.unwrap());

    assert!(matches!(
        f.repo.delete_subtree(WS, "/a").await,
        Err(RepositoryError::NotFound { .. })
    ));
    assert!(matches!(
        f.repo.delete_subtree(WS, "/").await,
        Err(RepositoryError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_delete_blocked_by_reference_into_subtree() {
    let f = fixture().await;
    add(&f.repo, "/a").await;
    let target = add_referenceable(&f.repo, "/a/c").await;

    let mut holder = Node::new(WS, path("/x"), NT_UNSTRUCTURED);
    holder.add_mixin(MIX_REFERENCEABLE);
    holder.set_property(Property::new("link", Value::Reference(target.id)));
    f.repo.insert(holder).await.unwrap();

    let err = f.repo.delete_subtree(WS, "/a").await.unwrap_err();
    assert!(matches!(err, RepositoryError::ReferentialIntegrity(_)));
    assert_eq!(f.store.count("nodes", &Filter::All).await.unwrap(), 4);

    f.repo.delete_property(WS, "/x", "link").await.unwrap();
    assert_eq!(f.repo.delete_subtree(WS, "/a").await.unwrap().deleted_count, 2);
}

#[tokio::test]
async fn test_delete_blocked_by_reference_inside_subtree() {
    let f = fixture().await;
    let a = add_referenceable(&f.repo, "/a").await;
    let mut c = Node::new(WS, path("/a/c"), NT_UNSTRUCTURED);
    c.add_mixin(MIX_REFERENCEABLE);
    c.set_property(Property::new("link", Value::Reference(a.id)));
    f.repo.insert(c).await.unwrap();

    let err = f.repo.delete_subtree(WS, "/a").await.unwrap_err();
    assert!(matches!(err, RepositoryError::ReferentialIntegrity(_)));
    assert!(f.repo.exists(WS, "/a").await.unwrap());
    assert!(f.repo.exists(WS, "/a/c").await.unwrap());
    assert_eq!(f.store.count("nodes", &Filter::All).await.unwrap(), 3);
}

#[tokio::test]
async fn test_weak_references_do_not_block_delete() {
    let f = fixture().await;
    let target = add_referenceable(&f.repo, "/t").await;
    let mut holder = Node::new(WS, path("/x"), NT_UNSTRUCTURED);
    holder.add_mixin(MIX_REFERENCEABLE);
    holder.set_property(Property::new("soft", Value::WeakReference(target.id)));
    f.repo.insert(holder).await.unwrap();

    let weak = f.repo.find_referrers(WS, target.id, None, true).await.unwrap();
    assert_eq!(weak.len(), 1);
    assert_eq!(f.repo.delete_subtree(WS, "/t").await.unwrap().deleted_count, 1);
}

#[tokio::test]
async fn test_reference_targets_verified_on_write() {
    let f = fixture().await;
    let plain = add(&f.repo, "/plain").await;

    let mut missing = Node::new(WS, path("/m"), NT_UNSTRUCTURED);
    missing.add_mixin(MIX_REFERENCEABLE);
    missing.set_property(Property::new("link", Value::Reference(NodeId::new())));
    assert!(matches!(
        f.repo.insert(missing).await,
        Err(RepositoryError::ReferentialIntegrity(_))
    ));

    let mut not_referenceable = Node::new(WS, path("/n"), NT_UNSTRUCTURED);
    not_referenceable.add_mixin(MIX_REFERENCEABLE);
    not_referenceable.set_property(Property::new("link", Value::Reference(plain.id)));
    assert!(matches!(
        f.repo.insert(not_referenceable).await,
        Err(RepositoryError::ValueFormat(_))
    ));
    assert!(!f.repo.exists(WS, "/n").await.unwrap());
}

#[tokio::test]
async fn test_reference_verification_can_be_disabled() {
    let f = fixture_with_config(RepositoryConfig {
        verify_reference_targets: false,
        ..RepositoryConfig::default()
    });
    f.repo.ensure_root(WS).await.unwrap();
    let mut node = Node::new(WS, path("/m"), NT_UNSTRUCTURED);
    node.add_mixin(MIX_REFERENCEABLE);
    node.set_property(Property::new("link", Value::Reference(NodeId::new())));
    assert!(f.repo.insert(node).await.is_ok());
}

// ============================================================================
// Property update and delete
// ============================================================================

#[tokio::test]
async fn test_update_property_replaces_in_place() {
    let f = fixture().await;
    let mut node = Node::new(WS, path("/a"), NT_UNSTRUCTURED);
    node.set_property(Property::new("first", Value::Long(1)));
    node.set_property(Property::new("second", Value::Long(2)));
    f.repo.insert(node).await.unwrap();

    let mut loaded = f.repo.get(WS, "/a").await.unwrap();
    let first = loaded.property_mut("first").unwrap();
    first.set_value(Value::Long(10));
    let first = first.clone();
    assert!(f.repo.update_property(WS, "/a", first).await.unwrap());

    let reloaded = f.repo.get(WS, "/a").await.unwrap();
    let names: Vec<_> = reloaded.properties().iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(
        reloaded.property("first").and_then(|p| p.value()),
        Some(&Value::Long(10))
    );
}

#[tokio::test]
async fn test_update_property_appends_new_and_skips_clean() {
    let f = fixture().await;
    add(&f.repo, "/a").await;

    assert!(f
        .repo
        .update_property(WS, "/a", Property::new("added", Value::Boolean(true)))
        .await
        .unwrap());

    let loaded = f.repo.get(WS, "/a").await.unwrap();
    let clean = loaded.property("added").unwrap().clone();
    assert!(!f.repo.update_property(WS, "/a", clean).await.unwrap());

    assert!(matches!(
        f.repo
            .update_property(WS, "/nope", Property::new("x", Value::Long(1)))
            .await,
        Err(RepositoryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_property() {
    let f = fixture().await;
    let mut node = Node::new(WS, path("/a"), NT_UNSTRUCTURED);
    node.set_property(Property::new("gone", Value::from("x")));
    f.repo.insert(node).await.unwrap();

    f.repo.delete_property(WS, "/a", "gone").await.unwrap();
    assert!(f.repo.get(WS, "/a").await.unwrap().property("gone").is_none());
    assert!(matches!(
        f.repo.delete_property(WS, "/a", "gone").await,
        Err(RepositoryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_missing_binary_is_not_found() {
    let f = fixture().await;
    assert!(matches!(
        f.repo.get_binary(WS, "/a", "data", 0).await,
        Err(RepositoryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_unsupported_operations() {
    let f = fixture().await;
    assert!(matches!(
        f.repo.clone_from(WS, WorkspaceId::new(2), "/a", "/a", false).await,
        Err(RepositoryError::Unimplemented(_))
    ));
    assert!(matches!(
        f.repo.check_in(WS, "/").await,
        Err(RepositoryError::Unimplemented(_))
    ));
    assert!(matches!(
        f.repo.check_out(WS, "/").await,
        Err(RepositoryError::Unimplemented(_))
    ));
}
