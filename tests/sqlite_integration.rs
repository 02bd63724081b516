//! Integration tests for NodeClient over the SQLite store
//!
//! Each test works in its own temporary database.

use arbor::{ClientConfig, Node, NodeClient, NodeError, NodeId, SqliteStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

async fn create_test_client() -> (NodeClient, TempDir) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("test_arbor.db")).await.unwrap();
    let client = NodeClient::new(Arc::new(store), ClientConfig::default());
    client.create_table().await.unwrap();
    (client, dir)
}

fn ids<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> BTreeSet<NodeId> {
    nodes.into_iter().map(|n| n.id().clone()).collect()
}

#[tokio::test]
async fn test_family_scenario() {
    let (client, _dir) = create_test_client().await;

    let mut root = Node::new();
    root.create_child();
    root.create_child();
    let c1 = root.children()[0].clone();
    let c2 = root.children()[1].clone();

    client.batch_put([&root, &c1, &c2]).await.unwrap();

    let fetched = client.get(c1.id()).await.unwrap();
    assert_eq!(fetched.parent_id(), root.id());

    let children = client.get_children(&root).await.unwrap();
    assert_eq!(ids(&children), ids([&c1, &c2]));

    let siblings = client.get_siblings(&c1).await.unwrap();
    assert_eq!(ids(&siblings), ids([&c1, &c2]));

    client.delete(&root).await.unwrap();
    assert!(matches!(client.get(root.id()).await, Err(NodeError::NotFound(_))));
    assert!(client.get(c1.id()).await.is_ok());
}

#[tokio::test]
async fn test_children_sorted_by_id() {
    let (client, _dir) = create_test_client().await;

    let mut root = Node::with_id("root").unwrap();
    for id in ["c", "a", "b"] {
        root.create_child_with_id(id).unwrap();
    }
    client.put_tree(&root).await.unwrap();

    let children = client.get_children(&root).await.unwrap();
    let order: Vec<&str> = children.iter().map(|n| n.id().as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_deep_tree_round_trip() {
    let (client, _dir) = create_test_client().await;

    let mut root = Node::with_id("root").unwrap().with_metadata("top");
    for i in 0..3 {
        let child = root.create_child_with_id(&format!("c-{}", i)).unwrap();
        for j in 0..2 {
            child
                .create_child_with_id(&format!("c-{}-{}", i, j))
                .unwrap()
                .set_metadata(format!("leaf {}", j));
        }
    }
    client.put_tree(&root).await.unwrap();

    let all: Vec<NodeId> = root.iter().map(|n| n.id().clone()).collect();
    let fetched = client.batch_get(&all).await.unwrap();
    assert_eq!(fetched.len(), 10);

    for node in &fetched {
        let original = root.find(node.id()).unwrap();
        assert_eq!(node.parent_id(), original.parent_id());
        assert_eq!(node.metadata(), original.metadata());
    }

    let grandchildren = client
        .children_of(&NodeId::parse_str("c-1").unwrap())
        .await
        .unwrap();
    let order: Vec<&str> = grandchildren.iter().map(|n| n.id().as_str()).collect();
    assert_eq!(order, vec!["c-1-0", "c-1-1"]);
}

#[tokio::test]
async fn test_large_batch_put() {
    let (client, _dir) = create_test_client().await;

    let mut root = Node::new();
    for _ in 0..100 {
        root.create_child();
    }
    client.put_tree(&root).await.unwrap();

    let children = client.children_of(root.id()).await.unwrap();
    assert_eq!(children.len(), 100);
}

#[tokio::test]
async fn test_operations_after_delete_table() {
    let (client, _dir) = create_test_client().await;
    client.delete_table().await.unwrap();

    let err = client.put(&Node::new()).await.unwrap_err();
    assert!(matches!(err, NodeError::Store { op: "put", .. }));
}
