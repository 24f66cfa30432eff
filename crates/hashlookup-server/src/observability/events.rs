//! Structured Events
//!
//! State changes worth finding in logs carry an `event_type` field so they can
//! be filtered independently of message text.
//!
//! Event types:
//! - `record_added` / `record_deleted` - registry mutations
//! - `member_admitted` / `member_admission_failed` - membership changes served
//! - `cluster_bootstrapped` - local replica configuration decided
//! - `serving_started` - node advertises the rendezvous tag

use tracing::{info, warn};

pub fn record_added(name: &str, payload_len: usize, peer: &str) {
    info!(
        event_type = "record_added",
        name = %name,
        payload_len = payload_len,
        peer_id_short = %peer,
        "Record added"
    );
}

pub fn record_deleted(name: &str, peer: &str) {
    info!(
        event_type = "record_deleted",
        name = %name,
        peer_id_short = %peer,
        "Record deleted"
    );
}

/// A joiner was added to the store membership.
pub fn member_admitted(joiner_name: &str, joiner_peer_url: &str, members: usize) {
    info!(
        event_type = "member_admitted",
        joiner_name = %joiner_name,
        joiner_peer_url = %joiner_peer_url,
        members = members,
        "Member admitted"
    );
}

pub fn member_admission_failed(joiner_name: &str, joiner_peer_url: &str, error: &str) {
    warn!(
        event_type = "member_admission_failed",
        joiner_name = %joiner_name,
        joiner_peer_url = %joiner_peer_url,
        error = %error,
        "Member admission failed"
    );
}

/// The local replica's initial cluster and state are known.
pub fn cluster_bootstrapped(member_name: &str, cluster_state: &str, members: usize) {
    info!(
        event_type = "cluster_bootstrapped",
        member_name = %member_name,
        cluster_state = %cluster_state,
        members = members,
        "Cluster configuration ready"
    );
}

pub fn serving_started(rendezvous: &str, protocols: usize, local_peer_id: &str) {
    info!(
        event_type = "serving_started",
        rendezvous = %rendezvous,
        protocols = protocols,
        local_peer_id = %local_peer_id,
        "Serving registry protocols"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_functions_dont_panic() {
        record_added("svc", 12, "abc123");
        record_deleted("svc", "abc123");
        member_admitted("C", "http://10.0.0.3:2380", 3);
        member_admission_failed("C", "http://10.0.0.3:2380", "unavailable");
        cluster_bootstrapped("10.0.0.3-2379-2380", "existing", 3);
        serving_started("hash-lookup", 5, "12D3KooW");
    }
}
