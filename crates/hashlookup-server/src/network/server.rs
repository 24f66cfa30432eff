//! Protocol Dispatch
//!
//! Maps protocol tags to handlers. Each inbound stream carries exactly one
//! request; the handler either produces exactly one response or aborts the
//! stream without writing anything.

use super::{short_peer_id, stream_protocol, transport, NetworkHandle};
use crate::observability::metrics;
use crate::store::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use hashlookup_core::{CodecError, Protocol};
use libp2p::{PeerId, StreamProtocol};
use libp2p_stream::AlreadyRegistered;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reasons a handler aborts its stream instead of answering.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("malformed request: {0}")]
    Malformed(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Server callback for one protocol tag.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Turn one request into one response, or abort with an error.
    async fn handle(&self, peer: PeerId, request: Bytes) -> Result<Vec<u8>, HandlerError>;
}

/// Dispatch table keyed by protocol tag
#[derive(Clone)]
pub struct Router {
    handlers: HashMap<StreamProtocol, Arc<dyn ProtocolHandler>>,
    max_message_size: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            max_message_size: transport::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Register the handler for a registry protocol.
    pub fn route(self, protocol: Protocol, handler: impl ProtocolHandler + 'static) -> Self {
        self.route_stream(stream_protocol(protocol), handler)
    }

    /// Register a handler for an arbitrary stream protocol.
    pub fn route_stream(
        mut self,
        protocol: StreamProtocol,
        handler: impl ProtocolHandler + 'static,
    ) -> Self {
        self.handlers.insert(protocol, Arc::new(handler));
        self
    }

    pub fn supports(&self, protocol: &StreamProtocol) -> bool {
        self.handlers.contains_key(protocol)
    }

    pub fn protocols(&self) -> impl Iterator<Item = &StreamProtocol> {
        self.handlers.keys()
    }

    /// Serve a single inbound stream.
    pub async fn serve_stream<S>(&self, protocol: &StreamProtocol, peer: PeerId, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Some(handler) = self.handlers.get(protocol) else {
            warn!(protocol = %protocol, "No handler registered for protocol");
            return;
        };

        let started = Instant::now();
        let request = match transport::read_message(&mut stream, self.max_message_size).await {
            Ok(request) => request,
            Err(e) => {
                debug!(
                    protocol = %protocol,
                    peer_id_short = %short_peer_id(&peer),
                    error = %e,
                    "Failed to read request"
                );
                metrics::record_request(protocol.as_ref(), "read_failed", started.elapsed());
                return;
            }
        };

        match handler.handle(peer, request).await {
            Ok(response) => {
                if let Err(e) =
                    transport::write_message(&mut stream, &response, self.max_message_size).await
                {
                    warn!(
                        protocol = %protocol,
                        peer_id_short = %short_peer_id(&peer),
                        error = %e,
                        "Failed to write response"
                    );
                    metrics::record_request(protocol.as_ref(), "write_failed", started.elapsed());
                    return;
                }
                let _ = stream.close().await;
                metrics::record_request(protocol.as_ref(), "ok", started.elapsed());
            }
            Err(e) => {
                // Dropping the stream unanswered resets it on the remote side.
                warn!(
                    protocol = %protocol,
                    peer_id_short = %short_peer_id(&peer),
                    error = %e,
                    "Aborting stream"
                );
                metrics::record_request(protocol.as_ref(), "aborted", started.elapsed());
            }
        }
    }

    /// Accept inbound streams for every registered protocol until `cancel`
    /// fires. One task is spawned per stream.
    pub fn serve(
        self: Arc<Self>,
        handle: &NetworkHandle,
        cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, AlreadyRegistered> {
        let mut control = handle.control();
        let mut tasks = Vec::with_capacity(self.handlers.len());

        for protocol in self.handlers.keys().cloned() {
            let incoming = control.accept(protocol.clone())?;
            info!(protocol = %protocol, "Serving protocol");
            tasks.push(tokio::spawn(accept_loop(
                self.clone(),
                protocol,
                incoming,
                cancel.clone(),
            )));
        }

        Ok(tasks)
    }
}

/// Spawn one task per inbound stream until `cancel` fires, then wait for the
/// streams already accepted to be answered.
async fn accept_loop<I, S>(
    router: Arc<Router>,
    protocol: StreamProtocol,
    mut incoming: I,
    cancel: CancellationToken,
) where
    I: futures::Stream<Item = (PeerId, S)> + Unpin,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(
                    protocol = %protocol,
                    in_flight = in_flight.len(),
                    "Stopped accepting streams"
                );
                while let Some(result) = in_flight.next().await {
                    log_task_result(&protocol, result);
                }
                return;
            }
            Some((peer, stream)) = incoming.next() => {
                debug!(
                    protocol = %protocol,
                    peer_id_short = %short_peer_id(&peer),
                    "New inbound stream"
                );
                let router = router.clone();
                let protocol = protocol.clone();
                in_flight.push(tokio::spawn(async move {
                    router.serve_stream(&protocol, peer, stream).await;
                }));
            }
            Some(result) = in_flight.next() => log_task_result(&protocol, result),
        }
    }
}

fn log_task_result(protocol: &StreamProtocol, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!(protocol = %protocol, error = %e, "Stream task panicked");
    }
}
