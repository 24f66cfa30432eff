//! Typed registry client.
//!
//! Wraps a [`DiscoveryClient`] with the encoding of each registry protocol.

use crate::network::{stream_protocol, ClientError, DiscoveryClient, Overlay};
use hashlookup_core::{
    decode, decode_text, encode, AddRequest, CodecError, GetResponse, ListResponse, Protocol,
    RENDEZVOUS,
};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("unexpected response: {0}")]
    Codec(#[from] CodecError),
}

pub struct RegistryClient<O> {
    client: DiscoveryClient<O>,
}

impl<O: Overlay> RegistryClient<O> {
    pub fn new(client: DiscoveryClient<O>) -> Self {
        Self { client }
    }

    /// Register or overwrite `name`. Returns the server's acknowledgement.
    pub async fn add(&self, name: &str, payload: &str) -> Result<String, RegistryClientError> {
        let request = encode(&AddRequest {
            name: name.to_string(),
            payload: payload.to_string(),
        })?;
        let response = self.call(Protocol::Add, &request).await?;
        Ok(decode_text(&response)?)
    }

    /// `None` when the name is not registered.
    pub async fn get(&self, name: &str) -> Result<Option<String>, RegistryClientError> {
        let response = self.call(Protocol::Get, name.as_bytes()).await?;
        let response: GetResponse = decode(&response)?;
        Ok(response.into_payload())
    }

    pub async fn list(&self) -> Result<BTreeMap<String, String>, RegistryClientError> {
        let response = self.call(Protocol::List, &[]).await?;
        let response: ListResponse = decode(&response)?;
        Ok(response.entries)
    }

    /// Delete `name`; succeeds for absent names too.
    pub async fn delete(&self, name: &str) -> Result<String, RegistryClientError> {
        let response = self.call(Protocol::Delete, name.as_bytes()).await?;
        Ok(decode_text(&response)?)
    }

    async fn call(&self, protocol: Protocol, request: &[u8]) -> Result<bytes::Bytes, ClientError> {
        self.client
            .send(RENDEZVOUS, stream_protocol(protocol), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryOverlay;
    use crate::service::registry_router;
    use crate::store::{KvStore, MemoryStore, RegistryStore};
    use std::sync::Arc;

    fn client_with_node() -> (Arc<MemoryStore>, RegistryClient<MemoryOverlay>) {
        let kv = Arc::new(MemoryStore::new());
        let dyn_kv: Arc<dyn KvStore> = kv.clone();
        let router = registry_router(RegistryStore::new(dyn_kv.clone()), dyn_kv);

        let overlay = MemoryOverlay::new();
        overlay.add_peer(Arc::new(router));
        (kv, RegistryClient::new(DiscoveryClient::new(overlay)))
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let (_, client) = client_with_node();

        assert_eq!(client.add("svc", "hash-1").await.unwrap(), "Added svc:hash-1");
        assert_eq!(client.get("svc").await.unwrap().as_deref(), Some("hash-1"));

        client.add("svc", "hash-2").await.unwrap();
        assert_eq!(client.get("svc").await.unwrap().as_deref(), Some("hash-2"));

        assert_eq!(client.delete("svc").await.unwrap(), "Deleted svc");
        assert_eq!(client.get("svc").await.unwrap(), None);
        assert!(client.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_padded_name_is_one_record() {
        let (_, client) = client_with_node();

        client.add("svc", "keep-me").await.unwrap();
        client.add(" svc", "padded").await.unwrap();
        assert_eq!(client.get(" svc").await.unwrap().as_deref(), Some("padded"));
        assert_eq!(client.get("svc").await.unwrap().as_deref(), Some("padded"));

        client.delete(" svc").await.unwrap();
        assert!(client.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_transport_error() {
        let (kv, client) = client_with_node();
        kv.put("svc", b"garbage".to_vec()).await.unwrap();

        let err = client.get("svc").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryClientError::Client(ClientError::Transport { .. })
        ));
    }
}
