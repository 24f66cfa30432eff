//! P2P Network Module
//!
//! Provides the overlay used to reach registry nodes without a central
//! directory: discovery of serving peers, labeled request/response streams,
//! and the server side dispatch of inbound streams.
//!
//! This module contains:
//! - `behaviour`: libp2p NetworkBehaviour configuration
//! - `swarm`: swarm construction and the event loop owning it
//! - `handle`: cloneable handle used by the rest of the node
//! - `init`: overlay startup and bootstrap peer dialing
//! - `transport`: length-delimited single exchange framing
//! - `client`: peer discovery client with retry and backoff
//! - `server`: protocol dispatch table for inbound streams
//! - `memory`: in-process overlay for offline runs and tests

pub mod behaviour;
pub mod client;
pub mod handle;
pub mod init;
pub mod memory;
pub mod server;
pub mod swarm;
pub mod transport;

pub use behaviour::HashLookupBehaviour;
pub use client::{ClientError, DiscoveryClient, RetryPolicy};
pub use handle::NetworkHandle;
pub use init::{start_overlay, OverlayNode};
pub use memory::MemoryOverlay;
pub use server::{HandlerError, ProtocolHandler, Router};
pub use swarm::NetworkCommand;

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::stream::BoxStream;
use hashlookup_core::Protocol;
use libp2p::{PeerId, StreamProtocol};
use std::io;

/// Lazy, single-pass sequence of candidate peers.
pub type PeerCandidates = BoxStream<'static, PeerId>;

/// The discovery substrate could not be queried at all.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("overlay event loop is not running")]
    Unavailable,
}

/// Overlay network as seen by the discovery client: who we are, who offers
/// a rendezvous tag, and how to open a labeled stream to one of them.
#[async_trait]
pub trait Overlay: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn local_peer_id(&self) -> PeerId;

    /// Query peers advertised under `rendezvous`.
    async fn find_peers(&self, rendezvous: &str) -> Result<PeerCandidates, DiscoveryError>;

    /// Open a stream labeled with `protocol` to `peer`.
    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> io::Result<Self::Stream>;
}

/// Stream protocol label for a registry RPC.
pub fn stream_protocol(protocol: Protocol) -> StreamProtocol {
    StreamProtocol::new(protocol.as_str())
}

/// Shortened peer id for log fields.
pub(crate) fn short_peer_id(peer_id: &PeerId) -> String {
    let id = peer_id.to_base58();
    id[id.len().saturating_sub(6)..].to_string()
}
