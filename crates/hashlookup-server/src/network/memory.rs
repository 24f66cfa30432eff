//! In-Process Overlay
//!
//! An [`Overlay`] whose peers live in the same process. Streams are
//! `tokio::io::duplex` pipes served by each peer's [`Router`], which lets the
//! discovery client and the handlers run end to end without a swarm.

use super::{DiscoveryError, Overlay, PeerCandidates, Router};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::DuplexStream;
use tokio::time::Instant;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Clone)]
enum Candidate {
    Serving { peer_id: PeerId, router: Arc<Router> },
    Unreachable { peer_id: PeerId },
}

impl Candidate {
    fn peer_id(&self) -> PeerId {
        match self {
            Candidate::Serving { peer_id, .. } | Candidate::Unreachable { peer_id } => *peer_id,
        }
    }
}

#[derive(Default)]
struct State {
    candidates: Vec<Candidate>,
    lookups: Vec<Instant>,
    fail_discovery: bool,
}

/// Overlay with in-process peers, advertised in insertion order.
#[derive(Clone)]
pub struct MemoryOverlay {
    local_peer_id: PeerId,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self {
            local_peer_id: PeerId::random(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the candidate list intact.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advertise a peer served by `router`.
    pub fn add_peer(&self, router: Arc<Router>) -> PeerId {
        let peer_id = PeerId::random();
        self.state()
            .candidates
            .push(Candidate::Serving { peer_id, router });
        peer_id
    }

    /// Advertise a peer whose streams can never be opened.
    pub fn add_unreachable_peer(&self) -> PeerId {
        let peer_id = PeerId::random();
        self.state()
            .candidates
            .push(Candidate::Unreachable { peer_id });
        peer_id
    }

    /// Advertise the local peer itself, as a provider lookup would.
    pub fn advertise_self(&self, router: Arc<Router>) {
        self.state().candidates.push(Candidate::Serving {
            peer_id: self.local_peer_id,
            router,
        });
    }

    /// Make every following discovery query fail.
    pub fn fail_discovery(&self) {
        self.state().fail_discovery = true;
    }

    /// Instants at which discovery was queried.
    pub fn lookups(&self) -> Vec<Instant> {
        self.state().lookups.clone()
    }
}

#[async_trait]
impl Overlay for MemoryOverlay {
    type Stream = Compat<DuplexStream>;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn find_peers(&self, _rendezvous: &str) -> Result<PeerCandidates, DiscoveryError> {
        let mut state = self.state();
        state.lookups.push(Instant::now());
        if state.fail_discovery {
            return Err(DiscoveryError::Unavailable);
        }

        let peers: Vec<PeerId> = state.candidates.iter().map(Candidate::peer_id).collect();
        Ok(futures::stream::iter(peers).boxed())
    }

    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> io::Result<Self::Stream> {
        let candidate = self
            .state()
            .candidates
            .iter()
            .find(|c| c.peer_id() == peer)
            .cloned();

        let router = match candidate {
            Some(Candidate::Serving { router, .. }) => router,
            Some(Candidate::Unreachable { .. }) | None => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("peer {peer} is unreachable"),
                ))
            }
        };

        if !router.supports(&protocol) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("peer {peer} does not support {protocol}"),
            ));
        }

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        let dialer = self.local_peer_id;
        tokio::spawn(async move {
            router.serve_stream(&protocol, dialer, remote.compat()).await;
        });

        Ok(local.compat())
    }
}
