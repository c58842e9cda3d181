//! meridian-daemon: a Meridian network node.
//!
//! Single OS process running a Tokio async runtime. Peers and tools talk to
//! the node via JSON-RPC over a Unix socket.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use meridian_daemon::commands::join::join_network;
use meridian_daemon::config::DaemonConfig;
use meridian_daemon::node::load_or_generate_keypair;
use meridian_daemon::rpc::RpcServer;
use meridian_daemon::DaemonState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config; an explicit path may be given as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => DaemonConfig::load_from(&PathBuf::from(path))?,
        None => DaemonConfig::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("meridian={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Meridian daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Node key
    let keypair = load_or_generate_keypair(&config.key_file(), &config)?;

    // 3. Build daemon state
    let socket_path = config.listen_socket();
    let seed = config.seed_socket();
    let state = Arc::new(DaemonState::new(config, keypair)?);

    // 4. Join through the seed, or start a new network
    match seed {
        Some(seed) => {
            let outcome = join_network(&state, &seed).await?;
            info!(clusters = outcome.topology.cluster_count(), "membership agreed");
        }
        None => {
            let version = state.bootstrap_genesis();
            info!(version, "started new network");
        }
    }

    // 5. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "RPC server error");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
