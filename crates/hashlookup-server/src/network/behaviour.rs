//! libp2p NetworkBehaviour Configuration
//!
//! Combines the protocols a registry node runs into a single behaviour:
//! - Identify: peer information exchange (protocol version, listen addresses)
//! - mDNS: automatic local network peer discovery
//! - Kademlia: DHT whose provider records advertise rendezvous tags
//! - Stream: labeled request/response streams for the registry RPCs

use crate::config::NodeConfig;
use crate::version;
use libp2p::{identify, identity, kad, mdns, swarm::NetworkBehaviour};

/// Combined network behaviour of a registry node.
#[derive(NetworkBehaviour)]
pub struct HashLookupBehaviour {
    pub identify: identify::Behaviour,
    pub mdns: mdns::tokio::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub stream: libp2p_stream::Behaviour,
}

impl HashLookupBehaviour {
    pub fn new(keypair: &identity::Keypair, config: &NodeConfig) -> Result<Self, std::io::Error> {
        let local_peer_id = keypair.public().to_peer_id();

        let identify = identify::Behaviour::new(
            identify::Config::new(version::PROTOCOL_VERSION.to_string(), keypair.public())
                .with_agent_version(version::agent_version()),
        );

        let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)?;

        // Provider records are the rendezvous mechanism, so they must outlive
        // the publication interval.
        let store = kad::store::MemoryStore::new(local_peer_id);
        let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
        kad_config
            .set_query_timeout(config.kademlia_query_timeout)
            .set_provider_record_ttl(Some(config.kademlia_provider_ttl))
            .set_provider_publication_interval(Some(config.kademlia_publication_interval));

        let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
        kademlia.set_mode(Some(kad::Mode::Server));

        Ok(Self {
            identify,
            mdns,
            kademlia,
            stream: libp2p_stream::Behaviour::new(),
        })
    }
}
