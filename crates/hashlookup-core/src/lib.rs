//! Core shared types for hash-lookup
//!
//! This crate contains the wire protocol shared by registry nodes and their
//! clients: protocol tags, request/response records and the text codec used
//! to put them on a stream.

pub mod codec;
pub mod messages;
pub mod protocol;

pub use codec::{decode, decode_text, encode, CodecError};
pub use messages::{
    AddRequest, ClusterMember, GetResponse, InitialCluster, InitialClusterError, ListResponse,
    MemberAddRequest, MemberAddResponse, MemberAddResponseError, ServiceRecord,
};
pub use protocol::{Protocol, RENDEZVOUS};
