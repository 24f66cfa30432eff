//! Node Configuration
//!
//! Centralized configuration for the overlay node and the local etcd replica,
//! with environment variable overrides. Command line flags are applied on top
//! of these values by the binary.

use libp2p::Multiaddr;
use std::time::Duration;
use tracing::warn;

use crate::network::RetryPolicy;

/// Overlay node configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// P2P listen port (env: P2P_PORT)
    pub p2p_port: u16,

    /// Overlay bootstrap peers, `/p2p/<peer id>` suffix required
    /// (env: BOOTSTRAP_PEERS, comma-separated)
    pub bootstrap_peers: Vec<Multiaddr>,

    /// Run without contacting bootstrap peers (offline/local testing)
    pub local: bool,

    /// Idle connection timeout before closing
    pub connection_idle_timeout: Duration,

    /// Maximum size of a single framed message
    pub max_message_size: usize,

    /// Retry budget of the peer discovery client
    pub retry: RetryPolicy,

    // Kademlia DHT settings
    /// Query timeout for Kademlia DHT
    pub kademlia_query_timeout: Duration,

    /// Provider record TTL for Kademlia
    pub kademlia_provider_ttl: Duration,

    /// Interval at which provider records are re-published
    pub kademlia_publication_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            p2p_port: 4001,
            bootstrap_peers: Vec::new(),
            local: false,
            connection_idle_timeout: Duration::from_secs(60),
            max_message_size: 4 * 1024 * 1024,
            retry: RetryPolicy::default(),
            kademlia_query_timeout: Duration::from_secs(30),
            kademlia_provider_ttl: Duration::from_secs(24 * 60 * 60),
            kademlia_publication_interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

impl NodeConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("P2P_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.p2p_port = parsed;
            }
        }

        if let Ok(peers) = std::env::var("BOOTSTRAP_PEERS") {
            config.bootstrap_peers = parse_multiaddrs(peers.split(','));
        }

        config
    }

    /// Peers to dial on startup; none in local mode.
    pub fn effective_bootstrap_peers(&self) -> &[Multiaddr] {
        if self.local {
            &[]
        } else {
            &self.bootstrap_peers
        }
    }
}

/// Local etcd replica configuration
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// IP the local replica binds to (env: ETCD_IP)
    pub ip: String,

    /// Client port of the local replica
    pub client_port: u16,

    /// Peer port of the local replica
    pub peer_port: u16,

    /// etcd executable (env: ETCD_BIN)
    pub binary: String,

    // Connection backoff settings
    /// Initial interval for etcd connection retry
    pub backoff_initial: Duration,

    /// Maximum interval for etcd connection retry
    pub backoff_max: Duration,

    /// Maximum elapsed time for etcd connection retries
    pub backoff_max_elapsed: Duration,

    /// Multiplier for etcd backoff
    pub backoff_multiplier: f64,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            client_port: 2379,
            peer_port: 2380,
            binary: "etcd".to_string(),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            backoff_max_elapsed: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl EtcdConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ip) = std::env::var("ETCD_IP") {
            config.ip = ip;
        }

        if let Ok(binary) = std::env::var("ETCD_BIN") {
            config.binary = binary;
        }

        config
    }

    /// `ip:client_port`, the endpoint the store client connects to.
    pub fn client_endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.client_port)
    }
}

/// Parse multiaddrs, skipping blanks and logging invalid entries.
pub fn parse_multiaddrs<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Multiaddr> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .filter_map(|v| match v.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(value = %v, error = %e, "Ignoring invalid bootstrap multiaddr");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.local);

        let etcd = EtcdConfig::default();
        assert_eq!(etcd.client_endpoint(), "127.0.0.1:2379");
    }

    #[test]
    fn test_local_mode_ignores_bootstrap_peers() {
        let mut config = NodeConfig {
            bootstrap_peers: parse_multiaddrs(["/ip4/10.0.0.1/tcp/4001"]),
            ..Default::default()
        };
        assert_eq!(config.effective_bootstrap_peers().len(), 1);

        config.local = true;
        assert!(config.effective_bootstrap_peers().is_empty());
    }

    #[test]
    fn test_parse_multiaddrs_skips_invalid() {
        let addrs = parse_multiaddrs(["/ip4/127.0.0.1/tcp/4001", "", "not-an-addr"]);
        assert_eq!(addrs.len(), 1);
    }
}
