//! Hash Lookup Server - registry node with a local etcd replica

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use hashlookup_core::RENDEZVOUS;
use hashlookup_server::bootstrap::{self, ClusterPlan, LocalMember};
use hashlookup_server::config::{parse_multiaddrs, EtcdConfig, NodeConfig};
use hashlookup_server::network::{start_overlay, DiscoveryClient, Overlay, OverlayNode};
use hashlookup_server::observability::{self, events, LogFormat, TracingConfig};
use hashlookup_server::service::registry_router;
use hashlookup_server::store::{EtcdProcess, EtcdStore, KvStore, MemoryStore, RegistryStore};
use hashlookup_server::version;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "hashlookup-server",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")"),
    about = "Decentralized name registry node"
)]
struct Args {
    /// Start a new etcd cluster instead of joining an existing one
    #[arg(long)]
    new_etcd_cluster: bool,

    /// IP of the local etcd replica [env: ETCD_IP, default: 127.0.0.1]
    #[arg(long)]
    etcd_ip: Option<String>,

    /// Client port of the local etcd replica [default: 2379]
    #[arg(long)]
    etcd_client_port: Option<u16>,

    /// Peer port of the local etcd replica [default: 2380]
    #[arg(long)]
    etcd_peer_port: Option<u16>,

    /// Do not contact bootstrap peers (overrides --bootstrap)
    #[arg(long)]
    local: bool,

    /// Bootstrap peer multiaddr with /p2p suffix, repeatable [env: BOOTSTRAP_PEERS]
    #[arg(long)]
    bootstrap: Vec<String>,

    /// P2P listen port [env: P2P_PORT, default: 4001]
    #[arg(long)]
    p2p_port: Option<u16>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Console log format [env: LOG_FORMAT]
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Keep records in memory instead of running etcd (offline testing)
    #[arg(long)]
    memory_store: bool,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::from_env();
        if let Some(port) = self.p2p_port {
            config.p2p_port = port;
        }
        if !self.bootstrap.is_empty() {
            config.bootstrap_peers = parse_multiaddrs(self.bootstrap.iter().map(String::as_str));
        }
        config.local = self.local;
        config
    }

    fn etcd_config(&self) -> EtcdConfig {
        let mut config = EtcdConfig::from_env();
        if let Some(ip) = &self.etcd_ip {
            config.ip = ip.clone();
        }
        if let Some(port) = self.etcd_client_port {
            config.client_port = port;
        }
        if let Some(port) = self.etcd_peer_port {
            config.peer_port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut tracing_config = TracingConfig::from_env();
    if let Some(format) = args.log_format {
        tracing_config.log_format = format;
    }
    observability::init_tracing(&tracing_config).map_err(|e| anyhow!(e))?;

    info!("{}", version::build_info());

    if let Some(addr) = args.metrics_addr {
        observability::init_metrics(addr).map_err(|e| anyhow!(e))?;
        info!(addr = %addr, "Prometheus metrics listener started");
    }

    let result = run(args).await;
    if let Err(e) = &result {
        error!(error = ?e, "Server exited with error");
    }

    observability::shutdown_tracing();
    result
}

async fn run(args: Args) -> Result<()> {
    let node_config = args.node_config();
    let etcd_config = args.etcd_config();
    let cancel = CancellationToken::new();

    let OverlayNode { handle, event_loop } = start_overlay(&node_config, cancel.clone())
        .await
        .context("failed to start overlay node")?;

    // Store selection. The etcd replica needs its cluster configuration first.
    let mut etcd_process = None;
    let kv: Arc<dyn KvStore> = if args.memory_store {
        warn!("Using in-memory store, records are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let member = LocalMember::from_config(&etcd_config);
        let plan = if args.new_etcd_cluster {
            bootstrap::singleton(&member)
        } else {
            let client = DiscoveryClient::new(handle.clone())
                .with_retry(node_config.retry)
                .with_max_message_size(node_config.max_message_size)
                .with_cancellation(cancel.clone());
            bootstrap::join_cluster(&client, &member)
                .await
                .context("failed to join the etcd cluster")?
        };

        let ClusterPlan {
            initial_cluster,
            state,
        } = plan;
        etcd_process = Some(
            EtcdProcess::spawn(&etcd_config.binary, &member, &initial_cluster, state)
                .with_context(|| format!("failed to start {}", etcd_config.binary))?,
        );

        Arc::new(
            EtcdStore::connect(&etcd_config)
                .await
                .context("failed to connect to the local etcd replica")?,
        )
    };

    let router = Arc::new(
        registry_router(RegistryStore::new(kv.clone()), kv)
            .with_max_message_size(node_config.max_message_size),
    );
    let protocols = router.protocols().count();
    let listeners = router
        .serve(&handle, cancel.clone())
        .context("failed to register protocol handlers")?;

    handle
        .provide(RENDEZVOUS)
        .context("overlay stopped before advertising")?;
    events::serving_started(RENDEZVOUS, protocols, &handle.local_peer_id().to_string());

    match etcd_process.as_mut() {
        Some(etcd) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
                status = etcd.exited() => match status {
                    Ok(status) => error!(status = %status, "etcd replica exited"),
                    Err(e) => error!(error = %e, "Failed to wait for etcd replica"),
                },
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
    }

    cancel.cancel();
    for listener in listeners {
        let _ = listener.await;
    }
    let _ = event_loop.await;

    if let Some(etcd) = etcd_process {
        etcd.shutdown().await.context("failed to stop etcd replica")?;
    }

    info!("Shutdown complete");
    Ok(())
}
