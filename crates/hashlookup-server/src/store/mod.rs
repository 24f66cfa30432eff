//! Backing Store
//!
//! The registry keeps its records in a consensus-backed key-value store. This
//! module defines the narrow [`KvStore`] surface the node needs, its etcd and
//! in-memory implementations, the registry adapter on top of it, and the
//! launcher for the local etcd replica.

pub mod etcd;
pub mod launcher;
pub mod memory;
pub mod registry;

pub use etcd::EtcdStore;
pub use launcher::EtcdProcess;
pub use memory::MemoryStore;
pub use registry::RegistryStore;

use async_trait::async_trait;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backing store unavailable")]
    Unavailable(#[source] BoxError),

    #[error("stored record for '{key}' is corrupt")]
    RecordCorrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cluster membership change failed")]
    MembershipChange(#[source] BoxError),
}

impl StoreError {
    pub fn unavailable(error: impl Into<BoxError>) -> Self {
        StoreError::Unavailable(error.into())
    }

    pub fn membership_change(error: impl Into<BoxError>) -> Self {
        StoreError::MembershipChange(error.into())
    }
}

/// A member of the store cluster as reported by a membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMember {
    pub id: u64,
    /// Empty until the member has started and announced its name.
    pub name: String,
    pub peer_urls: Vec<String>,
}

/// Result of adding a voting member.
#[derive(Debug, Clone)]
pub struct MemberAddOutcome {
    /// Identifier assigned to the new member
    pub member_id: u64,
    /// Full member list after the change, new member included
    pub members: Vec<StoreMember>,
}

/// Key-value and membership primitives of the consensus-backed store.
///
/// Implementations are internally synchronized and shared between handlers
/// as `Arc<dyn KvStore>`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Add a voting member reachable at `peer_urls`. Blocks until the change
    /// is committed.
    async fn add_member(&self, peer_urls: Vec<String>) -> Result<MemberAddOutcome, StoreError>;
}
