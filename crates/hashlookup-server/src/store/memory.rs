//! In-process [`KvStore`] used for offline runs and tests.

use super::{KvStore, MemberAddOutcome, StoreError, StoreMember};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Members {
    next_id: u64,
    list: Vec<StoreMember>,
}

/// Ordered map plus a member list. Can be switched offline to exercise
/// store failure paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    members: RwLock<Members>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose cluster already has `members`, named, with one peer URL each.
    pub fn with_members<'a>(members: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let list: Vec<StoreMember> = members
            .into_iter()
            .enumerate()
            .map(|(i, (name, peer_url))| StoreMember {
                id: i as u64 + 1,
                name: name.to_string(),
                peer_urls: vec![peer_url.to_string()],
            })
            .collect();

        Self {
            members: RwLock::new(Members {
                next_id: list.len() as u64 + 1,
                list,
            }),
            ..Self::default()
        }
    }

    /// While offline every call fails as the etcd client would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn members(&self) -> Vec<StoreMember> {
        self.members.read().await.list.clone()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(io::Error::new(
                io::ErrorKind::NotConnected,
                "memory store is offline",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.check_online()?;
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn add_member(&self, peer_urls: Vec<String>) -> Result<MemberAddOutcome, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::membership_change("memory store is offline"));
        }

        let mut members = self.members.write().await;
        members.next_id += 1;
        let member_id = members.next_id;
        members.list.push(StoreMember {
            id: member_id,
            name: String::new(),
            peer_urls,
        });

        Ok(MemberAddOutcome {
            member_id,
            members: members.list.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_scan_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        for key in ["b", "a2", "a1", "c"] {
            store.put(key, key.as_bytes().to_vec()).await.unwrap();
        }

        let keys: Vec<String> = store
            .get_prefix("a")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["a1", "a2"]);
        assert_eq!(store.get_prefix("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_add_member_assigns_fresh_id() {
        let store = MemoryStore::with_members([("A", "http://10.0.0.1:2380")]);
        let outcome = store
            .add_member(vec!["http://10.0.0.2:2380".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.members.len(), 2);
        let added = outcome
            .members
            .iter()
            .find(|m| m.id == outcome.member_id)
            .unwrap();
        assert!(added.name.is_empty());
        assert_ne!(outcome.member_id, outcome.members[0].id);
    }

    #[tokio::test]
    async fn test_offline_fails_calls() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("x").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.add_member(vec![]).await,
            Err(StoreError::MembershipChange(_))
        ));
    }
}
