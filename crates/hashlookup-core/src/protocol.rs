//! Protocol Tags
//!
//! Every serving node advertises itself under a single rendezvous tag. The
//! protocol tag of an opened stream selects which RPC that stream carries.

use std::fmt;
use std::str::FromStr;

/// Rendezvous tag advertised by every node serving the registry and
/// membership protocols.
pub const RENDEZVOUS: &str = "hash-lookup";

/// RPCs offered by a registry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// `AddRequest` -> ack string
    Add,
    /// name -> `GetResponse`
    Get,
    /// empty -> `ListResponse`
    List,
    /// name -> ack string
    Delete,
    /// `MemberAddRequest` -> initial cluster string
    MemberAdd,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Add,
        Protocol::Get,
        Protocol::List,
        Protocol::Delete,
        Protocol::MemberAdd,
    ];

    /// Literal tag used on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Add => "/add/0.1",
            Protocol::Get => "/get/0.1",
            Protocol::List => "/list/0.1",
            Protocol::Delete => "/delete/0.1",
            Protocol::MemberAdd => "/memberadd/1.0",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown protocol tag: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}
