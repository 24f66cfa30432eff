//! Registry Messages
//!
//! Request and response records exchanged over registry streams. Payloads are
//! opaque: nodes store and return them verbatim, so clients can evolve the
//! metadata schema without redeploying the registry.
//!
//! Field names on the wire match the nodes already deployed
//! (`Name`, `InfoStr`, `LookupOk`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::codec::CodecError;

/// A registered name and its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub payload: String,
}

/// Body of an `/add` request. Adding an existing name replaces its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "InfoStr")]
    pub payload: String,
}

impl From<ServiceRecord> for AddRequest {
    fn from(record: ServiceRecord) -> Self {
        Self {
            name: record.name,
            payload: record.payload,
        }
    }
}

impl From<AddRequest> for ServiceRecord {
    fn from(request: AddRequest) -> Self {
        Self {
            name: request.name,
            payload: request.payload,
        }
    }
}

/// Body of a `/get` response. `found == false` means the name is not
/// registered; it is not a transport failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(rename = "InfoStr", default)]
    pub payload: String,
    #[serde(rename = "LookupOk", default)]
    pub found: bool,
}

impl GetResponse {
    pub fn found(payload: String) -> Self {
        Self {
            payload,
            found: true,
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    /// Payload if the lookup succeeded.
    pub fn into_payload(self) -> Option<String> {
        self.found.then_some(self.payload)
    }
}

/// Body of a `/list` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(rename = "NameToInfoStr", default)]
    pub entries: BTreeMap<String, String>,
    #[serde(rename = "LookupOk", default)]
    pub found: bool,
}

impl ListResponse {
    /// `found` is derived from whether any entry exists.
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        let found = !entries.is_empty();
        Self { entries, found }
    }
}

/// Body of a `/memberadd` request sent by a joining store replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAddRequest {
    #[serde(rename = "MemberName")]
    pub joiner_name: String,
    #[serde(rename = "MemberPeerUrl")]
    pub joiner_peer_address: String,
}

/// One `name=peer_url` entry of an initial cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub name: String,
    pub peer_url: String,
}

impl ClusterMember {
    pub fn new(name: impl Into<String>, peer_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peer_url: peer_url.into(),
        }
    }
}

impl fmt::Display for ClusterMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.peer_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitialClusterError {
    #[error("initial cluster is empty")]
    Empty,
    #[error("malformed cluster member entry: {0:?}")]
    MalformedEntry(String),
}

/// Full member list a store replica needs to start inside a cluster,
/// rendered as comma separated `name=peer_url` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialCluster(pub Vec<ClusterMember>);

impl InitialCluster {
    /// Configuration of a brand new single member cluster.
    pub fn singleton(member: ClusterMember) -> Self {
        Self(vec![member])
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, member: &ClusterMember) -> bool {
        self.0.contains(member)
    }
}

impl fmt::Display for InitialCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, member) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{member}")?;
        }
        Ok(())
    }
}

impl FromStr for InitialCluster {
    type Err = InitialClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InitialClusterError::Empty);
        }

        s.split(',')
            .map(|entry| {
                let entry = entry.trim();
                match entry.split_once('=') {
                    Some((name, url)) if !name.is_empty() && !url.is_empty() => {
                        Ok(ClusterMember::new(name, url))
                    }
                    _ => Err(InitialClusterError::MalformedEntry(entry.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(InitialCluster)
    }
}

/// Body of a `/memberadd` response: the plain text initial cluster string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAddResponse {
    pub initial_cluster: InitialCluster,
}

impl MemberAddResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.initial_cluster.to_string().into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MemberAddResponseError> {
        let text = std::str::from_utf8(bytes).map_err(CodecError::from)?;
        let initial_cluster = text.parse()?;
        Ok(Self { initial_cluster })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemberAddResponseError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    InitialCluster(#[from] InitialClusterError),
}
