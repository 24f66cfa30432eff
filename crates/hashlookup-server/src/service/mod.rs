//! Registry Service
//!
//! Server side of the registry protocols. Each handler owns a
//! [`RegistryStore`] handed in at construction and answers exactly one
//! request per stream.

mod handlers;

pub use handlers::{AddHandler, DeleteHandler, GetHandler, ListHandler};

use crate::bootstrap::MemberAddHandler;
use crate::network::Router;
use crate::store::{KvStore, RegistryStore};
use hashlookup_core::Protocol;
use std::sync::Arc;

/// Dispatch table for every protocol a serving node answers, member
/// admission included.
pub fn registry_router(store: RegistryStore, kv: Arc<dyn KvStore>) -> Router {
    Router::new()
        .route(Protocol::Add, AddHandler::new(store.clone()))
        .route(Protocol::Get, GetHandler::new(store.clone()))
        .route(Protocol::List, ListHandler::new(store.clone()))
        .route(Protocol::Delete, DeleteHandler::new(store))
        .route(Protocol::MemberAdd, MemberAddHandler::new(kv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::stream_protocol;
    use crate::store::MemoryStore;

    #[test]
    fn test_router_serves_every_protocol() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let router = registry_router(RegistryStore::new(kv.clone()), kv);

        for protocol in Protocol::ALL {
            assert!(router.supports(&stream_protocol(protocol)), "{protocol}");
        }
    }
}
