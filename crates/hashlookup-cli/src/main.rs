//! Hash Lookup CLI
//!
//! Registers, looks up, lists and deletes names through any serving registry
//! node found on the overlay.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hashlookup_server::client::RegistryClient;
use hashlookup_server::config::{parse_multiaddrs, NodeConfig};
use hashlookup_server::network::{start_overlay, DiscoveryClient, OverlayNode};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hashlookup")]
#[command(about = "Client for the hash-lookup name registry")]
struct Cli {
    /// Bootstrap peer multiaddr with /p2p suffix, repeatable [env: BOOTSTRAP_PEERS]
    #[arg(long, global = true)]
    bootstrap: Vec<String>,

    /// Do not contact bootstrap peers, rely on mDNS only
    #[arg(long, global = true)]
    local: bool,

    /// P2P listen port, 0 picks a free one
    #[arg(long, global = true, default_value_t = 0)]
    p2p_port: u16,

    /// Discovery cycles before giving up
    #[arg(long, global = true, default_value_t = 5)]
    attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register NAME, replacing any existing payload
    Add { name: String, payload: String },
    /// Print the payload registered under NAME
    Get { name: String },
    /// Print every registered name and payload
    List,
    /// Remove NAME
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let mut config = NodeConfig::from_env();
    config.p2p_port = cli.p2p_port;
    config.local = cli.local;
    config.retry.max_attempts = cli.attempts;
    if !cli.bootstrap.is_empty() {
        config.bootstrap_peers = parse_multiaddrs(cli.bootstrap.iter().map(String::as_str));
    }

    let cancel = CancellationToken::new();
    let OverlayNode { handle, event_loop } = start_overlay(&config, cancel.clone())
        .await
        .context("failed to start overlay node")?;
    debug!("Overlay node started");

    let client = RegistryClient::new(
        DiscoveryClient::new(handle)
            .with_retry(config.retry)
            .with_max_message_size(config.max_message_size)
            .with_cancellation(cancel.clone()),
    );

    let result = tokio::select! {
        result = run(&client, cli.command) => result,
        _ = tokio::signal::ctrl_c() => Ok(ExitCode::from(130)),
    };

    cancel.cancel();
    let _ = event_loop.await;
    result
}

async fn run<O>(client: &RegistryClient<O>, command: Commands) -> anyhow::Result<ExitCode>
where
    O: hashlookup_server::network::Overlay,
{
    match command {
        Commands::Add { name, payload } => {
            let ack = client.add(&name, &payload).await.context("add failed")?;
            println!("{ack}");
        }
        Commands::Get { name } => match client.get(&name).await.context("get failed")? {
            Some(payload) => println!("{payload}"),
            None => {
                eprintln!("{name}: not found");
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::List => {
            for (name, payload) in client.list().await.context("list failed")? {
                println!("{name}\t{payload}");
            }
        }
        Commands::Delete { name } => {
            let ack = client.delete(&name).await.context("delete failed")?;
            println!("{ack}");
        }
    }

    Ok(ExitCode::SUCCESS)
}
