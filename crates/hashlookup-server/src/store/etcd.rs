//! etcd-backed [`KvStore`].

use super::{KvStore, MemberAddOutcome, StoreError, StoreMember};
use crate::config::EtcdConfig;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use etcd_client::{Client, GetOptions};
use tracing::{debug, info, warn};

/// Store client for the local etcd replica.
///
/// `etcd_client::Client` is a cheap handle over a shared channel, so every
/// call works on its own clone.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the replica at `config.client_endpoint()`, retrying with
    /// exponential backoff while it starts up.
    pub async fn connect(config: &EtcdConfig) -> Result<Self, StoreError> {
        let endpoints = vec![config.client_endpoint()];
        let backoff = ExponentialBackoff {
            initial_interval: config.backoff_initial,
            max_interval: config.backoff_max,
            max_elapsed_time: Some(config.backoff_max_elapsed),
            multiplier: config.backoff_multiplier,
            ..Default::default()
        };

        let client = retry(backoff, || async {
            match Client::connect(&endpoints, None).await {
                Ok(client) => Ok(client),
                Err(e) => {
                    warn!(endpoint = %endpoints[0], error = %e, "etcd connection failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
        .map_err(StoreError::unavailable)?;

        info!(endpoint = %endpoints[0], "Connected to etcd");
        Ok(Self { client })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client
            .put(key, value, None)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(key, None)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(StoreError::unavailable)?;

        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .delete(key, None)
            .await
            .map_err(StoreError::unavailable)?;
        debug!(key = %key, deleted = resp.deleted(), "etcd delete");
        Ok(())
    }

    async fn add_member(&self, peer_urls: Vec<String>) -> Result<MemberAddOutcome, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .member_add(peer_urls, None)
            .await
            .map_err(StoreError::membership_change)?;

        let member_id = resp
            .member()
            .map(|m| m.id())
            .ok_or_else(|| StoreError::membership_change("member add response without new member"))?;

        let members = resp
            .member_list()
            .iter()
            .map(|m| StoreMember {
                id: m.id(),
                name: m.name().to_string(),
                peer_urls: m.peer_urls().to_vec(),
            })
            .collect();

        Ok(MemberAddOutcome { member_id, members })
    }
}
