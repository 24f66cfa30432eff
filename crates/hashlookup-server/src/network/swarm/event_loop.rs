//! Swarm Event Loop
//!
//! A single task owns the swarm. It serves commands from [`NetworkHandle`]s
//! (provider advertisement and provider lookups) and handles connection,
//! mDNS, identify and Kademlia events.
//!
//! [`NetworkHandle`]: super::super::NetworkHandle

use super::super::behaviour::{HashLookupBehaviour, HashLookupBehaviourEvent};
use super::super::short_peer_id;
use futures::channel::mpsc::UnboundedSender;
use futures::StreamExt;
use libp2p::kad::{self, GetProvidersOk, QueryId, QueryResult, RecordKey};
use libp2p::{identify, mdns, swarm::SwarmEvent, PeerId, Swarm};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Commands executed by the event loop
#[derive(Debug)]
pub enum NetworkCommand {
    /// Advertise this node as a provider of `key`
    StartProviding { key: String },
    /// Stream every provider of `key` to `providers`; the channel closes when
    /// the lookup ends
    FindProviders {
        key: String,
        providers: UnboundedSender<PeerId>,
    },
}

/// Spawns the swarm event loop; it stops when `cancel` fires
pub fn spawn_event_loop(
    swarm: Swarm<HashLookupBehaviour>,
    commands: mpsc::UnboundedReceiver<NetworkCommand>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let event_loop = EventLoop {
        swarm,
        commands,
        pending_providers: HashMap::new(),
    };
    tokio::spawn(event_loop.run(cancel))
}

struct EventLoop {
    swarm: Swarm<HashLookupBehaviour>,
    commands: mpsc::UnboundedReceiver<NetworkCommand>,
    pending_providers: HashMap<QueryId, UnboundedSender<PeerId>>,
}

impl EventLoop {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Overlay event loop shutting down");
                    break;
                }
                Some(cmd) = self.commands.recv() => self.handle_command(cmd),
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }

        // Close outstanding lookups so waiting clients observe the end.
        self.pending_providers.clear();
    }

    fn handle_command(&mut self, cmd: NetworkCommand) {
        match cmd {
            NetworkCommand::StartProviding { key } => {
                let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                match kademlia.start_providing(RecordKey::new(&key)) {
                    Ok(query_id) => {
                        debug!(key = %key, query_id = ?query_id, "Advertising provider record");
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to store provider record");
                    }
                }
            }
            NetworkCommand::FindProviders { key, providers } => {
                let query_id = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .get_providers(RecordKey::new(&key));
                trace!(key = %key, query_id = ?query_id, "Looking up providers");
                self.pending_providers.insert(query_id, providers);
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<HashLookupBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(
                    address = %address,
                    peer_id = %self.swarm.local_peer_id(),
                    "P2P network listening"
                );
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(
                    peer_id_short = %short_peer_id(&peer_id),
                    remote_addr = %endpoint.get_remote_address(),
                    "Peer connected"
                );
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(
                    peer_id_short = %short_peer_id(&peer_id),
                    cause = ?cause,
                    "Peer disconnected"
                );
            }
            SwarmEvent::NewExternalAddrOfPeer { peer_id, address } => {
                // Provider lookups learn addresses this way; keep them dialable.
                self.swarm
                    .behaviour_mut()
                    .kademlia
                    .add_address(&peer_id, address);
            }
            SwarmEvent::Behaviour(HashLookupBehaviourEvent::Mdns(mdns::Event::Discovered(
                peers,
            ))) => {
                for (peer_id, multiaddr) in peers {
                    debug!(
                        peer_id_short = %short_peer_id(&peer_id),
                        addr = %multiaddr,
                        "mDNS: discovered peer"
                    );
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, multiaddr.clone());

                    if let Err(e) = self.swarm.dial(multiaddr) {
                        trace!(
                            peer_id_short = %short_peer_id(&peer_id),
                            error = %e,
                            "mDNS: dial failed"
                        );
                    }
                }
            }
            SwarmEvent::Behaviour(HashLookupBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, multiaddr) in peers {
                    trace!(
                        peer_id_short = %short_peer_id(&peer_id),
                        addr = %multiaddr,
                        "mDNS: peer expired"
                    );
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .remove_address(&peer_id, &multiaddr);
                }
            }
            SwarmEvent::Behaviour(HashLookupBehaviourEvent::Identify(
                identify::Event::Received { peer_id, info, .. },
            )) => {
                trace!(
                    peer_id_short = %short_peer_id(&peer_id),
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    listen_addrs = info.listen_addrs.len(),
                    "Identify: received peer info"
                );
                for addr in info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(HashLookupBehaviourEvent::Kademlia(event)) => {
                self.handle_kademlia_event(event);
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer) = peer_id {
                    trace!(
                        peer_id_short = %short_peer_id(&peer),
                        error = %error,
                        "Outgoing connection failed"
                    );
                } else {
                    trace!(error = %error, "Outgoing connection failed to unknown peer");
                }
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                trace!(error = %error, "Incoming connection failed");
            }
            _ => {}
        }
    }

    fn handle_kademlia_event(&mut self, event: kad::Event) {
        let (id, result, step) = match event {
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => (id, result, step),
            other => {
                trace!(event = ?other, "Kademlia: DHT event");
                return;
            }
        };

        match result {
            QueryResult::GetProviders(Ok(GetProvidersOk::FoundProviders { providers, .. })) => {
                let Some(tx) = self.pending_providers.get(&id) else {
                    return;
                };

                for provider in providers {
                    if tx.unbounded_send(provider).is_err() {
                        break;
                    }
                }

                // The client stops reading once a candidate answered.
                if tx.is_closed() {
                    self.pending_providers.remove(&id);
                    if let Some(mut query) = self.swarm.behaviour_mut().kademlia.query_mut(&id) {
                        query.finish();
                    }
                } else if step.last {
                    self.pending_providers.remove(&id);
                }
            }
            QueryResult::GetProviders(Ok(GetProvidersOk::FinishedWithNoAdditionalRecord {
                ..
            })) => {
                self.pending_providers.remove(&id);
            }
            QueryResult::GetProviders(Err(e)) => {
                debug!(error = %e, "Provider lookup ended with error");
                self.pending_providers.remove(&id);
            }
            QueryResult::StartProviding(Ok(ok)) => {
                debug!(key = ?ok.key, "Provider record published");
            }
            QueryResult::StartProviding(Err(e)) => {
                warn!(error = %e, "Provider record publication failed");
            }
            QueryResult::Bootstrap(result) => {
                trace!(result = ?result, "Kademlia bootstrap progressed");
            }
            other => {
                trace!(result = ?other, "Kademlia: query progressed");
            }
        }
    }
}
