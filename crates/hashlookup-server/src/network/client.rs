//! Peer Discovery Client
//!
//! Sends one request to the first responsive peer advertised under a
//! rendezvous tag. Candidates are tried in discovery order; a candidate that
//! cannot be opened is skipped. When the candidates run out the whole
//! discovery cycle is retried with exponential backoff.

use super::{short_peer_id, transport, DiscoveryError, Overlay};
use crate::observability::metrics;
use bytes::Bytes;
use futures::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retry budget of the discovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of discovery cycles before giving up
    pub max_attempts: u32,
    /// Base of the delay: `backoff_base^attempt` seconds before retry `attempt`
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (zero for the first one).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("discovery substrate error: {0}")]
    DiscoverySubstrate(#[from] DiscoveryError),
    #[error("no peers available under {rendezvous:?} after {attempts} attempts")]
    NoPeersAvailable { rendezvous: String, attempts: u32 },
    #[error("exchange with peer {peer} failed: {source}")]
    Transport {
        peer: PeerId,
        #[source]
        source: io::Error,
    },
    #[error("request cancelled")]
    Cancelled,
}

/// Request/response client over an [`Overlay`].
pub struct DiscoveryClient<O> {
    overlay: O,
    retry: RetryPolicy,
    max_message_size: usize,
    cancel: CancellationToken,
}

impl<O: Overlay> DiscoveryClient<O> {
    pub fn new(overlay: O) -> Self {
        Self {
            overlay,
            retry: RetryPolicy::default(),
            max_message_size: transport::DEFAULT_MAX_MESSAGE_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Abort backoff waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send `request` on `protocol` to the first responsive peer advertised
    /// under `rendezvous` and return its response.
    pub async fn send(
        &self,
        rendezvous: &str,
        protocol: StreamProtocol,
        request: &[u8],
    ) -> Result<Bytes, ClientError> {
        let local_peer_id = self.overlay.local_peer_id();

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.backoff(attempt).await?;
            }

            metrics::record_discovery_attempt(rendezvous);
            let mut candidates = self.overlay.find_peers(rendezvous).await?;

            while let Some(peer) = candidates.next().await {
                if peer == local_peer_id {
                    continue;
                }

                debug!(
                    peer_id = %peer,
                    peer_id_short = %short_peer_id(&peer),
                    protocol = %protocol,
                    "Connecting to candidate"
                );

                let stream = match self.overlay.open_stream(peer, protocol.clone()).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(
                            peer_id_short = %short_peer_id(&peer),
                            protocol = %protocol,
                            error = %e,
                            "Connection failed, trying next candidate"
                        );
                        metrics::record_candidate_failure(protocol.as_ref());
                        continue;
                    }
                };

                return transport::exchange(stream, request, self.max_message_size)
                    .await
                    .map_err(|source| ClientError::Transport { peer, source });
            }

            debug!(
                rendezvous = %rendezvous,
                attempt = attempt + 1,
                max_attempts = self.retry.max_attempts,
                "Candidates exhausted without a responsive peer"
            );
        }

        Err(ClientError::NoPeersAvailable {
            rendezvous: rendezvous.to_string(),
            attempts: self.retry.max_attempts,
        })
    }

    /// Sleep before `attempt`, reporting the countdown once per second.
    async fn backoff(&self, attempt: u32) -> Result<(), ClientError> {
        let delay = self.retry.delay_before(attempt);

        for remaining in (1..=delay.as_secs()).rev() {
            info!(
                attempt = attempt + 1,
                retry_in_secs = remaining,
                "Unable to connect to any peers, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryOverlay;
    use crate::network::server::{HandlerError, ProtocolHandler, Router};
    use async_trait::async_trait;
    use std::sync::Arc;

    const ECHO: StreamProtocol = StreamProtocol::new("/echo/1.0");

    /// Replies with a fixed tag so tests can tell which peer answered.
    struct Tagged(&'static str);

    #[async_trait]
    impl ProtocolHandler for Tagged {
        async fn handle(&self, _peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
            let mut response = self.0.as_bytes().to_vec();
            response.extend_from_slice(&request);
            Ok(response)
        }
    }

    fn tagged_router(tag: &'static str) -> Arc<Router> {
        Arc::new(Router::new().route_stream(ECHO, Tagged(tag)))
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_before(a).as_secs()).collect();
        assert_eq!(delays, vec![0, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_peers_exhausts_budget_with_backoff() {
        let overlay = MemoryOverlay::new();
        let client = DiscoveryClient::new(overlay.clone());

        let started = tokio::time::Instant::now();
        let err = client.send("hash-lookup", ECHO, b"x").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::NoPeersAvailable { attempts: 5, .. }
        ));

        let lookups = overlay.lookups();
        assert_eq!(lookups.len(), 5);
        let gaps: Vec<u64> = lookups
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![2, 4, 8, 16]);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_skips_to_next_candidate() {
        let overlay = MemoryOverlay::new();
        overlay.add_unreachable_peer();
        overlay.add_peer(tagged_router("second:"));

        let client = DiscoveryClient::new(overlay.clone());
        let response = client.send("hash-lookup", ECHO, b"hi").await.unwrap();

        assert_eq!(&response[..], b"second:hi");
        assert_eq!(overlay.lookups().len(), 1);
    }

    #[tokio::test]
    async fn test_first_responsive_peer_wins() {
        let overlay = MemoryOverlay::new();
        overlay.add_peer(tagged_router("first:"));
        overlay.add_peer(tagged_router("second:"));

        let client = DiscoveryClient::new(overlay);
        let response = client.send("hash-lookup", ECHO, b"").await.unwrap();
        assert_eq!(&response[..], b"first:");
    }

    #[tokio::test]
    async fn test_self_is_skipped() {
        let overlay = MemoryOverlay::new();
        overlay.advertise_self(tagged_router("self:"));
        overlay.add_peer(tagged_router("remote:"));

        let client = DiscoveryClient::new(overlay);
        let response = client.send("hash-lookup", ECHO, b"").await.unwrap();
        assert_eq!(&response[..], b"remote:");
    }

    #[tokio::test]
    async fn test_substrate_error_is_not_retried() {
        let overlay = MemoryOverlay::new();
        overlay.fail_discovery();

        let client = DiscoveryClient::new(overlay.clone());
        let err = client.send("hash-lookup", ECHO, b"").await.unwrap_err();
        assert!(matches!(err, ClientError::DiscoverySubstrate(_)));
        assert_eq!(overlay.lookups().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_counts_as_failed_open() {
        let overlay = MemoryOverlay::new();
        overlay.add_peer(Arc::new(Router::new()));

        let client = DiscoveryClient::new(overlay).with_retry(RetryPolicy {
            max_attempts: 1,
            backoff_base: 2,
        });
        let err = client.send("hash-lookup", ECHO, b"").await.unwrap_err();
        assert!(matches!(err, ClientError::NoPeersAvailable { attempts: 1, .. }));
    }

    struct Rejecting;

    #[async_trait]
    impl ProtocolHandler for Rejecting {
        async fn handle(&self, _peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError> {
            hashlookup_core::decode_text(&request)?;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_aborted_exchange_is_transport_error() {
        let overlay = MemoryOverlay::new();
        let rejecting = overlay.add_peer(Arc::new(Router::new().route_stream(ECHO, Rejecting)));
        overlay.add_peer(tagged_router("never:"));

        let client = DiscoveryClient::new(overlay);
        let err = client.send("hash-lookup", ECHO, &[0xff, 0xfe]).await.unwrap_err();
        match err {
            ClientError::Transport { peer, .. } => assert_eq!(peer, rejecting),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let client = DiscoveryClient::new(MemoryOverlay::new()).with_cancellation(cancel.clone());

        let request = tokio::spawn(async move { client.send("hash-lookup", ECHO, b"").await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert!(matches!(request.await.unwrap(), Err(ClientError::Cancelled)));
    }
}
