//! P2P Network Initialization
//!
//! Builds the swarm, dials bootstrap peers and spawns the event loop that owns
//! it. The returned [`NetworkHandle`] is how the rest of the node talks to the
//! overlay.

use super::swarm::{build_swarm, spawn_event_loop};
use super::{short_peer_id, NetworkHandle};
use crate::config::NodeConfig;
use anyhow::Result;
use libp2p::multiaddr::Protocol as AddrProtocol;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A running overlay node.
pub struct OverlayNode {
    pub handle: NetworkHandle,
    pub event_loop: JoinHandle<()>,
}

/// Start the overlay: listen on the configured port, dial bootstrap peers and
/// run the event loop until `cancel` fires.
pub async fn start_overlay(config: &NodeConfig, cancel: CancellationToken) -> Result<OverlayNode> {
    let mut swarm = build_swarm(config).await?;
    let local_peer_id = *swarm.local_peer_id();
    let control = swarm.behaviour_mut().stream.new_control();

    info!(
        peer_id = %local_peer_id,
        peer_id_short = %short_peer_id(&local_peer_id),
        "Overlay node starting"
    );

    let mut bootstrapped = 0usize;
    for addr in config.effective_bootstrap_peers() {
        let Some((peer_id, addr)) = split_peer_id(addr.clone()) else {
            warn!(addr = %addr, "Bootstrap multiaddr has no /p2p peer id, skipping");
            continue;
        };

        swarm
            .behaviour_mut()
            .kademlia
            .add_address(&peer_id, addr.clone());

        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(
                peer_id_short = %short_peer_id(&peer_id),
                addr = %addr,
                error = %e,
                "Failed to dial bootstrap peer"
            );
            continue;
        }
        bootstrapped += 1;
    }

    if bootstrapped > 0 {
        if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
            warn!(error = %e, "Kademlia bootstrap could not start");
        }
    } else if config.local {
        info!("Local mode, not contacting bootstrap peers");
    }

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let event_loop = spawn_event_loop(swarm, commands_rx, cancel);

    Ok(OverlayNode {
        handle: NetworkHandle::new(local_peer_id, commands_tx, control),
        event_loop,
    })
}

/// Split the trailing `/p2p/<peer id>` off a multiaddr.
fn split_peer_id(mut addr: Multiaddr) -> Option<(PeerId, Multiaddr)> {
    match addr.pop() {
        Some(AddrProtocol::P2p(peer_id)) => Some((peer_id, addr)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_peer_id() {
        let peer_id = PeerId::random();
        let addr: Multiaddr = format!("/ip4/10.0.0.1/tcp/4001/p2p/{peer_id}")
            .parse()
            .unwrap();

        let (id, rest) = split_peer_id(addr).unwrap();
        assert_eq!(id, peer_id);
        assert_eq!(rest.to_string(), "/ip4/10.0.0.1/tcp/4001");
    }

    #[test]
    fn test_split_peer_id_missing() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/4001".parse().unwrap();
        assert!(split_peer_id(addr).is_none());
    }
}
