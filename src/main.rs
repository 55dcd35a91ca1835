use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chain::BlockStore;
use clap::Parser;
use containers::{Block, BlockHeader, Bytes32, Height};
use metrics::Metrics;
use metrics::server::{MetricsServerConfig, run_metrics_server};
use networking::sync::{SyncConfig, SyncManager};
use networking::{ConsensusMessage, OutboundMessage};
use parking_lot::RwLock;
use tokio::{sync::mpsc, task};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// YAML file with sync settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "node-0")]
    node_id: String,

    /// Tag every sync log line with the node id
    #[arg(long)]
    print_self_id: bool,

    #[arg(long)]
    message_queue_size: Option<usize>,

    /// Serve Prometheus metrics
    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 5054)]
    metrics_port: u16,
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => SyncConfig::default(),
    };

    if args.print_self_id {
        config.print_self_id = true;
    }
    if let Some(size) = args.message_queue_size {
        config.message_queue_size = size;
    }
    Ok(config)
}

fn genesis() -> Block {
    Block::new(
        BlockHeader {
            chain_id: "devnet".to_string(),
            epoch: 0,
            height: Height(0),
            parent: Bytes32::zero(),
            state_hash: Bytes32::zero(),
            timestamp: 0,
            proposer: String::new(),
        },
        Vec::new(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let store = Arc::new(RwLock::new(BlockStore::with_genesis(genesis())));
    let metrics = Arc::new(Metrics::new());

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<OutboundMessage>();
    let (consensus_sender, mut consensus_receiver) = mpsc::unbounded_channel::<ConsensusMessage>();

    let sync_manager = SyncManager::new(
        store.clone(),
        &args.node_id,
        Arc::new(outbound_sender),
        consensus_sender,
        config,
        metrics.clone(),
    );

    // No wire transport yet: outbound traffic is only logged
    task::spawn(async move {
        while let Some(message) = outbound_receiver.recv().await {
            debug!(peers = ?message.peer_ids(), ?message, "Outbound sync message");
        }
    });

    let consumer_store = store.clone();
    task::spawn(async move {
        while let Some(message) = consensus_receiver.recv().await {
            info!(%message, "Consensus input");
            if let ConsensusMessage::Block(block) = message {
                consumer_store.write().add_block(block);
            }
        }
    });

    let cancel = CancellationToken::new();

    if args.metrics {
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        let server_metrics = metrics.clone();
        let server_cancel = cancel.child_token();
        task::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, server_metrics, server_cancel).await {
                warn!(%err, "Metrics server exited");
            }
        });
    }

    sync_manager.start(&cancel);
    info!(node_id = %args.node_id, "Sync node running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    cancel.cancel();
    sync_manager.wait().await;
    info!(blocks = store.read().len(), "Sync node stopped");

    Ok(())
}
