//! End-to-end registry and cluster join over the in-process overlay.

use hashlookup_core::InitialCluster;
use hashlookup_server::bootstrap::{self, ClusterState, LocalMember};
use hashlookup_server::client::RegistryClient;
use hashlookup_server::network::{DiscoveryClient, MemoryOverlay, RetryPolicy};
use hashlookup_server::service::registry_router;
use hashlookup_server::store::{KvStore, MemoryStore, RegistryStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A serving node backed by the shared (replicated) store.
fn serving_node(kv: &Arc<MemoryStore>) -> Arc<hashlookup_server::network::Router> {
    let kv: Arc<dyn KvStore> = kv.clone();
    Arc::new(registry_router(RegistryStore::new(kv.clone()), kv))
}

#[tokio::test]
async fn test_registry_through_first_responsive_node() {
    let kv = Arc::new(MemoryStore::with_members([("A", "http://10.0.0.1:2380")]));

    let overlay = MemoryOverlay::new();
    overlay.add_unreachable_peer();
    overlay.add_peer(serving_node(&kv));
    overlay.add_peer(serving_node(&kv));

    let client = RegistryClient::new(DiscoveryClient::new(overlay.clone()));

    client.add("a", "1").await.unwrap();
    client.add("b", "2").await.unwrap();
    assert_eq!(
        client.list().await.unwrap(),
        BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ])
    );

    client.delete("a").await.unwrap();
    assert_eq!(client.get("a").await.unwrap(), None);
    assert_eq!(client.get("b").await.unwrap().as_deref(), Some("2"));

    // Every request found a peer on the first discovery cycle.
    assert_eq!(overlay.lookups().len(), 6);
}

#[tokio::test]
async fn test_second_replica_joins_then_serves() {
    let first = LocalMember::new("10.0.0.1", 2379, 2380);
    let plan = bootstrap::singleton(&first);
    assert_eq!(plan.state, ClusterState::New);

    let kv = Arc::new(MemoryStore::with_members([(
        first.name.as_str(),
        first.peer_url.as_str(),
    )]));
    let overlay = MemoryOverlay::new();
    overlay.add_peer(serving_node(&kv));

    let second = LocalMember::new("10.0.0.2", 2379, 2380);
    let client = DiscoveryClient::new(overlay.clone()).with_retry(RetryPolicy {
        max_attempts: 1,
        backoff_base: 2,
    });
    let joined = bootstrap::join_cluster(&client, &second).await.unwrap();

    assert_eq!(joined.state, ClusterState::Existing);
    let expected: InitialCluster = format!(
        "{}={},{}={}",
        first.name, first.peer_url, second.name, second.peer_url
    )
    .parse()
    .unwrap();
    assert_eq!(joined.initial_cluster, expected);

    // The new replica serves the same records once it is up.
    overlay.add_peer(serving_node(&kv));
    let registry = RegistryClient::new(DiscoveryClient::new(overlay));
    registry.add("svc", "hash").await.unwrap();
    assert_eq!(registry.get("svc").await.unwrap().as_deref(), Some("hash"));
}
