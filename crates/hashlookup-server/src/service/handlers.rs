use crate::network::{short_peer_id, HandlerError, ProtocolHandler};
use crate::observability::events;
use crate::store::RegistryStore;
use async_trait::async_trait;
use bytes::Bytes;
use hashlookup_core::{decode, decode_text, encode, AddRequest, GetResponse, ListResponse};
use libp2p::PeerId;
use tracing::debug;

/// `/add`: insert or overwrite a record, answer `Added <name>:<payload>`.
pub struct AddHandler {
    store: RegistryStore,
}

impl AddHandler {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProtocolHandler for AddHandler {
    async fn handle(&self, peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
        let AddRequest { name, payload } = decode(&request)?;
        // Same key rule as the bare-name protocols.
        let name = name.trim();

        self.store.put(name, &payload).await?;
        events::record_added(name, payload.len(), &short_peer_id(&peer));

        Ok(format!("Added {name}:{payload}").into_bytes())
    }
}

/// `/get`: bare name in, [`GetResponse`] out.
pub struct GetHandler {
    store: RegistryStore,
}

impl GetHandler {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProtocolHandler for GetHandler {
    async fn handle(&self, peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
        let name = decode_text(&request)?;

        let response = match self.store.get(&name).await? {
            Some(payload) => GetResponse::found(payload),
            None => GetResponse::not_found(),
        };
        debug!(
            name = %name,
            found = response.found,
            peer_id_short = %short_peer_id(&peer),
            "Lookup served"
        );

        Ok(encode(&response)?)
    }
}

/// `/list`: request body ignored, every record returned.
pub struct ListHandler {
    store: RegistryStore,
}

impl ListHandler {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProtocolHandler for ListHandler {
    async fn handle(&self, peer: PeerId, _request: Bytes) -> Result<Vec<u8>, HandlerError> {
        let entries = self.store.list("").await?;
        debug!(
            entries = entries.len(),
            peer_id_short = %short_peer_id(&peer),
            "List served"
        );

        Ok(encode(&ListResponse::from_entries(entries))?)
    }
}

/// `/delete`: bare name in, `Deleted <name>` out, absent names included.
pub struct DeleteHandler {
    store: RegistryStore,
}

impl DeleteHandler {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProtocolHandler for DeleteHandler {
    async fn handle(&self, peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
        let name = decode_text(&request)?;

        self.store.delete(&name).await?;
        events::record_deleted(&name, &short_peer_id(&peer));

        Ok(format!("Deleted {name}").into_bytes())
    }
}
