//! Cloneable front-end to the overlay event loop.

use super::swarm::NetworkCommand;
use super::{DiscoveryError, Overlay, PeerCandidates};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{PeerId, Stream, StreamProtocol};
use std::io;
use tokio::sync::mpsc;

/// Handle to a running overlay node.
///
/// Commands are forwarded to the event loop that owns the swarm; streams are
/// opened directly through the stream behaviour's control.
#[derive(Clone)]
pub struct NetworkHandle {
    local_peer_id: PeerId,
    commands: mpsc::UnboundedSender<NetworkCommand>,
    control: libp2p_stream::Control,
}

impl NetworkHandle {
    pub(crate) fn new(
        local_peer_id: PeerId,
        commands: mpsc::UnboundedSender<NetworkCommand>,
        control: libp2p_stream::Control,
    ) -> Self {
        Self {
            local_peer_id,
            commands,
            control,
        }
    }

    /// Advertise this node under `rendezvous`.
    pub fn provide(&self, rendezvous: &str) -> Result<(), DiscoveryError> {
        self.commands
            .send(NetworkCommand::StartProviding {
                key: rendezvous.to_string(),
            })
            .map_err(|_| DiscoveryError::Unavailable)
    }

    /// Stream control used to accept inbound protocol streams.
    pub fn control(&self) -> libp2p_stream::Control {
        self.control.clone()
    }
}

impl std::fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHandle")
            .field("local_peer_id", &self.local_peer_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Overlay for NetworkHandle {
    type Stream = Stream;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn find_peers(&self, rendezvous: &str) -> Result<PeerCandidates, DiscoveryError> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.commands
            .send(NetworkCommand::FindProviders {
                key: rendezvous.to_string(),
                providers: tx,
            })
            .map_err(|_| DiscoveryError::Unavailable)?;
        Ok(rx.boxed())
    }

    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> io::Result<Stream> {
        let mut control = self.control.clone();
        control
            .open_stream(peer, protocol)
            .await
            .map_err(io::Error::other)
    }
}
