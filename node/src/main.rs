use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use net::hooks::{AddressBook, InMemoryBlockchain, NoopMetrics};
use net::{Node, NodeConfig, Scheduler};

/// Peer-to-peer bitcoin-style node: speaks the wire protocol (handshake,
/// inventory exchange, ping/pong liveness, addr gossip) and routes messages
/// between a listener and a set of outbound peers. Consensus, persistence,
/// and mempool policy are out of scope; see `net::hooks` for the
/// collaborator interfaces a real chain/mempool would plug in through.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a `key = value` config file (see net::config for the
    /// recognized keys). Omit to run with built-in defaults.
    #[arg(short, long)]
    config: Option<String>,

    /// Override `listen.host:listen.port`, e.g. 0.0.0.0:8333.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Outbound peer to dial at startup. Repeatable.
    #[arg(short, long = "peer")]
    peers: Vec<SocketAddr>,

    /// Override `network.magic` (decimal or 0x-prefixed hex).
    #[arg(long)]
    magic: Option<String>,
}

fn init_logging() {
    SimpleLogger::new()
        .with_colors(true)
        .with_level(LevelFilter::Info)
        .with_local_timestamps()
        .init()
        .unwrap();
}

fn build_config(args: &Args) -> net::error::PeerResult<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.listen_host = listen.ip().to_string();
        config.listen_port = listen.port();
    }
    config.peer_seeds.extend(args.peers.iter().copied());
    if let Some(magic) = &args.magic {
        config.network_magic = parse_magic(magic)?;
    }

    Ok(config)
}

fn parse_magic(raw: &str) -> net::error::PeerResult<u32> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| net::error::PeerError::protocol(format!("bad --magic value: {e}")))
    } else {
        raw.parse().map_err(|e| net::error::PeerError::protocol(format!("bad --magic value: {e}")))
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> net::error::PeerResult<()> {
    init_logging();
    let args = Args::parse();
    let config = build_config(&args)?;

    log::info!(
        "starting node: listen={}:{} magic={:#010x} seeds={}",
        config.listen_host,
        config.listen_port,
        config.network_magic,
        config.peer_seeds.len()
    );

    let node = Arc::new(Node::new(
        config.clone(),
        Arc::new(InMemoryBlockchain::new()),
        Arc::new(AddressBook::new()),
        Arc::new(NoopMetrics),
    ));
    let scheduler = Scheduler::new(node);

    for seed in &config.peer_seeds {
        let scheduler = Arc::clone(&scheduler);
        let seed = *seed;
        tokio::spawn(async move {
            if let Err(err) = scheduler.connect(seed).await {
                log::warn!("outbound connect to {seed} failed: {err}");
            }
        });
    }

    tokio::select! {
        result = scheduler.listen() => {
            if let Err(err) = result {
                log::error!("listener exited: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down on ctrl-c, {} session(s) still active", scheduler.active_sessions());
        }
    }

    Ok(())
}
