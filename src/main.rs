//! Demo binary: runs every peer of `cluster.initial_cluster` in this process
//! over a local network, proposes a few commands and prints what each peer
//! applies until Ctrl+C.
//!
//! Configuration follows [`RaftNodeConfig::new`]: defaults, then the file
//! named by `CONFIG_PATH`, then `RAFT__*` environment variables, e.g.
//! `RAFT__CLUSTER__INITIAL_CLUSTER=1,2,3,4,5`.

use std::path::Path;
use std::time::Duration;

use d_raft::file_io::open_file_for_append;
use d_raft::gather_metrics;
use d_raft::LocalNetwork;
use d_raft::NodeBuilder;
use d_raft::Raft;
use d_raft::RaftNodeConfig;
use d_raft::Result;
use tokio::signal;
use tokio::time::sleep;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const DEMO_COMMANDS: usize = 5;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = RaftNodeConfig::new()?;

    // Initializing Logs
    let _guard = init_observability(&settings.cluster.log_dir)?;

    let network = LocalNetwork::new();
    let mut peers: Vec<Raft> = Vec::new();
    for node_id in settings.cluster.initial_cluster.clone() {
        let mut node_config = settings.clone();
        node_config.cluster.node_id = node_id;

        let (raft, mut apply_rx) = NodeBuilder::from_config(node_config)
            .transport(network.transport(node_id))
            .build()?;
        network.register(&raft);

        tokio::spawn(async move {
            while let Some(msg) = apply_rx.recv().await {
                println!(
                    "node {node_id} applied #{}: {}",
                    msg.index,
                    String::from_utf8_lossy(&msg.command)
                );
            }
        });
        peers.push(raft);
    }
    info!(nodes = peers.len(), "demo cluster started");

    tokio::select! {
        _ = propose_demo_commands(&peers) => {
            info!("Demo commands proposed. Waiting for CTRL+C signal...");
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for ctrl_c: {:?}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        }
    }

    for raft in &peers {
        raft.kill();
    }
    for raft in &peers {
        let (term, is_leader) = raft.get_state();
        println!(
            "node {} term={term} leader={is_leader} commit={} applied={}",
            raft.node_id(),
            raft.commit_index(),
            raft.last_applied()
        );
    }
    println!("{}", gather_metrics());
    println!("Exiting program.");
    Ok(())
}

async fn propose_demo_commands(peers: &[Raft]) {
    let mut proposed = 0;
    while proposed < DEMO_COMMANDS {
        let command = format!("set k{proposed} v{proposed}").into_bytes();
        match leader_of(peers) {
            Some(raft) => match raft.start(command) {
                Ok((index, term, true)) => {
                    info!(node_id = raft.node_id(), index, term, "proposed");
                    proposed += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("proposal failed: {:?}", e),
            },
            None => info!("no leader yet"),
        }
        sleep(Duration::from_millis(200)).await;
    }
}

fn leader_of(peers: &[Raft]) -> Option<&Raft> {
    peers.iter().find(|raft| raft.get_state().1)
}

pub fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&log_dir.join("d-raft.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

