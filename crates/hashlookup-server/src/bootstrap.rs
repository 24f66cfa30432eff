//! Cluster Bootstrap
//!
//! A new store replica must know the full member list before it starts, and
//! the running cluster must learn the joiner's name and address before it can
//! hand that list out. The joiner therefore asks any serving node to admit it
//! (one `/memberadd` round trip) and starts with the returned configuration.
//!
//! The first replica of a deployment skips all of this and starts a singleton
//! cluster. That choice is made by the operator, never inferred.

use crate::config::EtcdConfig;
use crate::network::{
    short_peer_id, stream_protocol, ClientError, DiscoveryClient, HandlerError, Overlay,
    ProtocolHandler,
};
use crate::observability::{events, metrics};
use crate::store::{KvStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use hashlookup_core::{
    decode, encode, ClusterMember, CodecError, InitialCluster, MemberAddRequest,
    MemberAddResponse, MemberAddResponseError, Protocol, RENDEZVOUS,
};
use libp2p::PeerId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity and URLs of the local store replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMember {
    /// `<ip>-<client port>-<peer port>`, unique per replica
    pub name: String,
    pub client_url: String,
    pub peer_url: String,
}

impl LocalMember {
    pub fn new(ip: &str, client_port: u16, peer_port: u16) -> Self {
        Self {
            name: format!("{ip}-{client_port}-{peer_port}"),
            client_url: format!("http://{ip}:{client_port}"),
            peer_url: format!("http://{ip}:{peer_port}"),
        }
    }

    pub fn from_config(config: &EtcdConfig) -> Self {
        Self::new(&config.ip, config.client_port, config.peer_port)
    }

    pub fn cluster_member(&self) -> ClusterMember {
        ClusterMember::new(&self.name, &self.peer_url)
    }
}

/// `--initial-cluster-state` of the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    New,
    Existing,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterState::New => f.write_str("new"),
            ClusterState::Existing => f.write_str("existing"),
        }
    }
}

/// How the local replica starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlan {
    pub initial_cluster: InitialCluster,
    pub state: ClusterState,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to encode member add request: {0}")]
    Encode(#[from] CodecError),
    #[error("no serving node admitted this member: {0}")]
    Discovery(#[from] ClientError),
    #[error("invalid member add response: {0}")]
    InvalidResponse(#[from] MemberAddResponseError),
    #[error("admitted cluster {initial_cluster} does not list member {name}")]
    NotAdmitted {
        name: String,
        initial_cluster: InitialCluster,
    },
}

/// Start a brand new cluster made of the local replica only.
pub fn singleton(member: &LocalMember) -> ClusterPlan {
    let plan = ClusterPlan {
        initial_cluster: InitialCluster::singleton(member.cluster_member()),
        state: ClusterState::New,
    };
    events::cluster_bootstrapped(&member.name, "new", 1);
    plan
}

/// Ask a serving node to admit `member` and return the configuration to
/// start with. Fails once the discovery client gives up, or when the returned
/// configuration does not list `member` with its own peer URL; the caller
/// decides whether to try again.
pub async fn join_cluster<O: Overlay>(
    client: &DiscoveryClient<O>,
    member: &LocalMember,
) -> Result<ClusterPlan, BootstrapError> {
    let request = encode(&MemberAddRequest {
        joiner_name: member.name.clone(),
        joiner_peer_address: member.peer_url.clone(),
    })?;

    info!(
        member_name = %member.name,
        peer_url = %member.peer_url,
        rendezvous = RENDEZVOUS,
        "Discovering a node to join through"
    );

    let response = match client
        .send(RENDEZVOUS, stream_protocol(Protocol::MemberAdd), &request)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(member_name = %member.name, error = %e, "Cluster join failed");
            return Err(e.into());
        }
    };

    let MemberAddResponse { initial_cluster } = match MemberAddResponse::from_bytes(&response) {
        Ok(response) => response,
        Err(e) => {
            warn!(member_name = %member.name, error = %e, "Rejected member add response");
            return Err(e.into());
        }
    };
    if !initial_cluster.contains(&member.cluster_member()) {
        warn!(
            member_name = %member.name,
            initial_cluster = %initial_cluster,
            "Admitted cluster does not list this member under its own name"
        );
        return Err(BootstrapError::NotAdmitted {
            name: member.name.clone(),
            initial_cluster,
        });
    }

    events::cluster_bootstrapped(&member.name, "existing", initial_cluster.len());
    Ok(ClusterPlan {
        initial_cluster,
        state: ClusterState::Existing,
    })
}

/// Add the joiner as a voting member and render the post-change
/// configuration. The new member has no name in the store until it starts,
/// so the requested name is substituted for it.
///
/// An earlier joiner that was admitted but never started is still unnamed
/// and renders as `=<url>`. Joiners reject such a configuration, so the
/// stale member has to be removed from the store before anyone else joins.
pub async fn admit_member(
    kv: &dyn KvStore,
    request: &MemberAddRequest,
) -> Result<InitialCluster, StoreError> {
    let outcome = kv
        .add_member(vec![request.joiner_peer_address.clone()])
        .await?;
    debug!(
        joiner_name = %request.joiner_name,
        member_id = outcome.member_id,
        "Membership change committed"
    );

    let members = outcome
        .members
        .iter()
        .flat_map(|member| {
            let name = if member.id == outcome.member_id {
                request.joiner_name.as_str()
            } else {
                if member.name.is_empty() {
                    warn!(
                        member_id = member.id,
                        peer_urls = ?member.peer_urls,
                        "Cluster member has not started and has no name"
                    );
                }
                member.name.as_str()
            };
            member
                .peer_urls
                .iter()
                .map(move |url| ClusterMember::new(name, url))
        })
        .collect();

    Ok(InitialCluster(members))
}

/// `/memberadd` server side.
pub struct MemberAddHandler {
    kv: Arc<dyn KvStore>,
}

impl MemberAddHandler {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl ProtocolHandler for MemberAddHandler {
    async fn handle(&self, peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
        let request: MemberAddRequest = decode(&request)?;
        info!(
            joiner_name = %request.joiner_name,
            joiner_peer_url = %request.joiner_peer_address,
            peer_id_short = %short_peer_id(&peer),
            "Member add request"
        );

        match admit_member(self.kv.as_ref(), &request).await {
            Ok(initial_cluster) => {
                metrics::record_member_admission("admitted");
                events::member_admitted(
                    &request.joiner_name,
                    &request.joiner_peer_address,
                    initial_cluster.len(),
                );
                Ok(MemberAddResponse { initial_cluster }.to_bytes())
            }
            Err(e) => {
                metrics::record_member_admission("failed");
                events::member_admission_failed(
                    &request.joiner_name,
                    &request.joiner_peer_address,
                    &e.to_string(),
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MemoryOverlay, RetryPolicy, Router};
    use crate::store::MemoryStore;

    fn two_member_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_members([
            ("A", "10.0.0.1:2380"),
            ("B", "10.0.0.2:2380"),
        ]))
    }

    fn joiner_c() -> MemberAddRequest {
        MemberAddRequest {
            joiner_name: "C".to_string(),
            joiner_peer_address: "10.0.0.3:2380".to_string(),
        }
    }

    #[test]
    fn test_local_member_naming() {
        let member = LocalMember::new("10.0.0.3", 2379, 2380);
        assert_eq!(member.name, "10.0.0.3-2379-2380");
        assert_eq!(member.client_url, "http://10.0.0.3:2379");
        assert_eq!(member.peer_url, "http://10.0.0.3:2380");
        assert_eq!(ClusterState::Existing.to_string(), "existing");
    }

    #[test]
    fn test_singleton_plan() {
        let member = LocalMember::new("127.0.0.1", 2379, 2380);
        let plan = singleton(&member);

        assert_eq!(plan.state, ClusterState::New);
        assert_eq!(
            plan.initial_cluster.to_string(),
            "127.0.0.1-2379-2380=http://127.0.0.1:2380"
        );
    }

    #[tokio::test]
    async fn test_admit_member_into_two_member_cluster() {
        let kv = two_member_store();
        let cluster = admit_member(kv.as_ref(), &joiner_c()).await.unwrap();

        assert_eq!(cluster.len(), 3);
        assert!(cluster.contains(&ClusterMember::new("C", "10.0.0.3:2380")));
        assert_eq!(
            cluster.to_string(),
            "A=10.0.0.1:2380,B=10.0.0.2:2380,C=10.0.0.3:2380"
        );
    }

    #[tokio::test]
    async fn test_membership_failure_aborts() {
        let kv = two_member_store();
        kv.set_offline(true);

        let err = MemberAddHandler::new(kv)
            .handle(PeerId::random(), Bytes::from(encode(&joiner_c()).unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Store(StoreError::MembershipChange(_))
        ));
    }

    #[tokio::test]
    async fn test_join_cluster_through_serving_node() {
        let kv = two_member_store();
        let router = Router::new().route(Protocol::MemberAdd, MemberAddHandler::new(kv.clone()));

        let overlay = MemoryOverlay::new();
        overlay.add_peer(Arc::new(router));
        let client = DiscoveryClient::new(overlay);

        let member = LocalMember::new("10.0.0.3", 2379, 2380);
        let plan = join_cluster(&client, &member).await.unwrap();

        assert_eq!(plan.state, ClusterState::Existing);
        assert_eq!(plan.initial_cluster.len(), 3);
        assert!(plan.initial_cluster.contains(&member.cluster_member()));
        assert_eq!(kv.members().await.len(), 3);
    }

    struct FixedResponse(&'static str);

    #[async_trait]
    impl ProtocolHandler for FixedResponse {
        async fn handle(&self, _peer: PeerId, _request: Bytes) -> Result<Vec<u8>, HandlerError> {
            Ok(self.0.as_bytes().to_vec())
        }
    }

    fn client_answering(response: &'static str) -> DiscoveryClient<MemoryOverlay> {
        let router = Router::new().route(Protocol::MemberAdd, FixedResponse(response));
        let overlay = MemoryOverlay::new();
        overlay.add_peer(Arc::new(router));
        DiscoveryClient::new(overlay)
    }

    #[tokio::test]
    async fn test_join_cluster_rejects_cluster_without_member() {
        let client = client_answering("A=http://10.0.0.1:2380,B=http://10.0.0.2:2380");
        let member = LocalMember::new("10.0.0.3", 2379, 2380);

        let err = join_cluster(&client, &member).await.unwrap_err();
        match err {
            BootstrapError::NotAdmitted {
                name,
                initial_cluster,
            } => {
                assert_eq!(name, "10.0.0.3-2379-2380");
                assert_eq!(initial_cluster.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_join_cluster_rejects_member_under_other_url() {
        let client = client_answering("A=http://10.0.0.1:2380,10.0.0.3-2379-2380=http://10.0.0.9:2380");
        let member = LocalMember::new("10.0.0.3", 2379, 2380);

        let err = join_cluster(&client, &member).await.unwrap_err();
        assert!(matches!(err, BootstrapError::NotAdmitted { .. }));
    }

    #[tokio::test]
    async fn test_unstarted_member_blocks_next_join() {
        let kv = two_member_store();
        let first = admit_member(kv.as_ref(), &joiner_c()).await.unwrap();
        assert!(first.contains(&ClusterMember::new("C", "10.0.0.3:2380")));

        let router = Router::new().route(Protocol::MemberAdd, MemberAddHandler::new(kv.clone()));
        let overlay = MemoryOverlay::new();
        overlay.add_peer(Arc::new(router));
        let client = DiscoveryClient::new(overlay);

        let member = LocalMember::new("10.0.0.4", 2379, 2380);
        let err = join_cluster(&client, &member).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::InvalidResponse(MemberAddResponseError::InitialCluster(_))
        ));
        assert_eq!(kv.members().await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_cluster_without_peers_fails() {
        let client = DiscoveryClient::new(MemoryOverlay::new()).with_retry(RetryPolicy {
            max_attempts: 2,
            backoff_base: 2,
        });

        let member = LocalMember::new("10.0.0.3", 2379, 2380);
        let err = join_cluster(&client, &member).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Discovery(ClientError::NoPeersAvailable { attempts: 2, .. })
        ));
    }
}
