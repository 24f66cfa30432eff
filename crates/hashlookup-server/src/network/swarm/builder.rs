//! Swarm Builder
//!
//! Handles libp2p swarm creation with TCP/QUIC transports, noise encryption,
//! and yamux multiplexing.

use super::super::behaviour::HashLookupBehaviour;
use crate::config::NodeConfig;
use anyhow::{Context, Result};
use libp2p::{noise, swarm::Swarm, tcp, yamux, Multiaddr};
use tracing::debug;

/// Creates and configures a libp2p swarm listening on the configured port
pub async fn build_swarm(config: &NodeConfig) -> Result<Swarm<HashLookupBehaviour>> {
    let config_for_behaviour = config.clone();
    let idle_timeout = config.connection_idle_timeout;

    let mut swarm = libp2p::SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )?
        .with_quic()
        .with_behaviour(move |key| {
            debug!(peer_id = %key.public().to_peer_id(), "Created swarm identity");

            HashLookupBehaviour::new(key, &config_for_behaviour)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })?
        .with_swarm_config(move |c| c.with_idle_connection_timeout(idle_timeout))
        .build();

    let tcp_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.p2p_port).parse()?;
    let quic_addr: Multiaddr = format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.p2p_port).parse()?;

    swarm
        .listen_on(tcp_addr)
        .context("swarm failed to listen on tcp")?;
    swarm
        .listen_on(quic_addr)
        .context("swarm failed to listen on quic")?;
    debug!(port = config.p2p_port, "Configured P2P listen addresses");

    Ok(swarm)
}
