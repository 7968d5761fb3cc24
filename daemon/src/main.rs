use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info};
use nodesync_daemon::config::{
    Settings, DEFAULT_INTAKE_BIND_ADDRESS, DEFAULT_MAX_BLOCK_TXS, DEFAULT_MINE_INTERVAL_SECONDS,
    DEFAULT_SYNC_INTERVAL_SECONDS,
};
use nodesync_daemon::core::janitor;
use nodesync_daemon::core::mining::{MineOutcome, Miner};
use nodesync_daemon::core::service::SyncService;
use nodesync_daemon::core::storage::StoreGateway;
use nodesync_daemon::net::broadcast::Broadcaster;
use nodesync_daemon::net::quorum::QuorumVerifier;
use nodesync_daemon::net::registry::PeerRegistry;
use nodesync_daemon::net::replicator::Replicator;
use nodesync_daemon::net::PeerClient;
use nodesync_daemon::rpc::{build_intake_server, event_cache::EventCache, IntakeState};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "nodesyncd",
    version,
    about = "Ledger synchronization and PoS mining daemon"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full synchronization round
    Sync {
        /// Destructive exact transaction replication instead of the
        /// incremental import
        #[arg(long)]
        exact: bool,
    },
    /// Show local tip, peer table and mempool summary
    Status,
    /// Show the mempool snapshot
    Mempool,
    /// Pull pending transactions from peers into the local mempool
    SyncMempool,
    /// Run mempool maintenance, then pull from peers
    EnhancedMempool,
    /// Coordinated mining loop with leader election
    Mine {
        interval_s: Option<u64>,
        max_tx: Option<u64>,
    },
    /// Mining loop without leader election or pre-mine sync (single-node)
    MineSimple {
        interval_s: Option<u64>,
        max_tx: Option<u64>,
    },
    /// Single mining attempt
    MineOnce,
    /// Daemon mode: sync loop, intake server and coordinated mining
    Serve {
        #[arg(long, default_value = DEFAULT_INTAKE_BIND_ADDRESS)]
        bind: String,
        #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL_SECONDS)]
        interval: u64,
    },
}

struct Daemon {
    settings: Arc<Settings>,
    store: Arc<StoreGateway>,
    service: Arc<SyncService>,
    replicator: Arc<Replicator>,
    miner: Arc<Miner>,
}

impl Daemon {
    async fn bootstrap() -> anyhow::Result<Self> {
        let settings = Arc::new(Settings::from_env().context("loading configuration")?);
        let store = Arc::new(
            StoreGateway::connect(&settings)
                .await
                .context("connecting to the store")?,
        );
        let client = Arc::new(PeerClient::new(&settings).context("building the peer client")?);
        let registry = Arc::new(PeerRegistry::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::clone(&settings),
        ));
        let replicator = Arc::new(Replicator::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::clone(&settings),
        ));
        let quorum = QuorumVerifier::new(Arc::clone(&store), Arc::clone(&client));
        let service = Arc::new(SyncService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&replicator),
            quorum,
            Arc::clone(&settings),
        ));
        let miner = Arc::new(Miner::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&replicator),
            Broadcaster::new(Arc::clone(&client)),
            Arc::clone(&settings),
        ));

        Ok(Daemon {
            settings,
            store,
            service,
            replicator,
            miner,
        })
    }
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = tx.send(true);
        }
    });
    rx
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let daemon = Daemon::bootstrap().await?;

    match cli.command {
        Command::Sync { exact } => {
            if exact {
                let status = daemon.service.status().await?;
                let best = status
                    .peers
                    .into_iter()
                    .find(|p| p.accessible)
                    .ok_or_else(|| anyhow::anyhow!("no accessible peers"))?;
                let report = daemon.replicator.exact_replication(&best.base_url).await?;
                println!(
                    "exact replication from {}: {} imported",
                    report.source, report.inserted
                );
            } else {
                let report = daemon.service.run_round().await?;
                println!(
                    "synced via {}: +{} blocks (-{} rolled back), +{} transactions, \
                     {} mempool pulled, quorum {}/{}",
                    report.peer,
                    report.chain.blocks_inserted,
                    report.chain.blocks_rolled_back,
                    report.transactions.inserted,
                    report.aux.mempool_pulled,
                    report.quorum.agreed,
                    report.quorum.asked
                );
            }
        }
        Command::Status => {
            let report = daemon.service.status().await?;
            println!("node:         {}", report.node_id);
            println!(
                "tip height:   {}",
                report
                    .tip_height
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "empty chain".to_string())
            );
            println!("transactions: {}", report.total_transactions);
            println!(
                "mempool:      {} total ({} pending, {} processing, {} failed)",
                report.mempool.total,
                report.mempool.pending,
                report.mempool.processing,
                report.mempool.failed
            );
            println!("peers:");
            for peer in &report.peers {
                println!(
                    "  {:<40} {:>9} height={:<10} {:>6}ms",
                    peer.base_url,
                    if peer.accessible { "reachable" } else { "down" },
                    peer.height.map(|h| h.to_string()).unwrap_or_default(),
                    peer.latency_ms
                );
            }
        }
        Command::Mempool => {
            let stats = daemon.store.mempool_stats().await?;
            println!(
                "mempool: {} total ({} pending, {} processing, {} failed)",
                stats.total, stats.pending, stats.processing, stats.failed
            );
        }
        Command::SyncMempool => {
            let report = daemon.service.status().await?;
            let mut pulled = 0u64;
            for peer in report.peers.iter().filter(|p| p.accessible) {
                pulled += daemon.replicator.sync_mempool(&peer.base_url).await?;
            }
            println!("pulled {} mempool entries", pulled);
        }
        Command::EnhancedMempool => {
            let janitor_report = janitor::run_maintenance(&daemon.store).await?;
            println!(
                "maintenance: {} expired, {} confirmed, {} duplicates, {} stuck, {} purged",
                janitor_report.expired_removed,
                janitor_report.confirmed_removed,
                janitor_report.duplicates_collapsed,
                janitor_report.stuck_marked_failed,
                janitor_report.old_failed_purged
            );
            let report = daemon.service.status().await?;
            let mut pulled = 0u64;
            for peer in report.peers.iter().filter(|p| p.accessible) {
                pulled += daemon.replicator.sync_mempool(&peer.base_url).await?;
            }
            println!("pulled {} mempool entries", pulled);
        }
        Command::Mine { interval_s, max_tx } => {
            let shutdown = shutdown_on_ctrl_c();
            daemon
                .miner
                .run_loop(
                    interval_s.unwrap_or(DEFAULT_MINE_INTERVAL_SECONDS),
                    max_tx.unwrap_or(DEFAULT_MAX_BLOCK_TXS),
                    true,
                    shutdown,
                )
                .await;
        }
        Command::MineSimple { interval_s, max_tx } => {
            let shutdown = shutdown_on_ctrl_c();
            daemon
                .miner
                .run_loop(
                    interval_s.unwrap_or(DEFAULT_MINE_INTERVAL_SECONDS),
                    max_tx.unwrap_or(DEFAULT_MAX_BLOCK_TXS),
                    false,
                    shutdown,
                )
                .await;
        }
        Command::MineOnce => {
            match daemon.miner.mine_once(None, DEFAULT_MAX_BLOCK_TXS, true).await? {
                MineOutcome::Mined {
                    height,
                    hash,
                    tx_count,
                } => println!("mined block {} ({}) with {} transactions", height, hash, tx_count),
                other => println!("not mined: {:?}", other),
            }
        }
        Command::Serve { bind, interval } => {
            let shutdown = shutdown_on_ctrl_c();

            let state = Arc::new(IntakeState {
                service: Arc::clone(&daemon.service),
                miner: Arc::clone(&daemon.miner),
                store: Arc::clone(&daemon.store),
                replicator: Arc::clone(&daemon.replicator),
                settings: Arc::clone(&daemon.settings),
                events: EventCache::new(),
            });
            let server = build_intake_server(state, &bind).context("binding intake server")?;
            let server_handle = server.handle();
            let server_task = tokio::spawn(server);

            let sync_service = Arc::clone(&daemon.service);
            let sync_shutdown = shutdown.clone();
            let sync_task = tokio::spawn(async move {
                sync_service.run_loop(interval, sync_shutdown).await;
            });

            let miner = Arc::clone(&daemon.miner);
            let miner_shutdown = shutdown.clone();
            let miner_task = tokio::spawn(async move {
                miner
                    .run_loop(
                        DEFAULT_MINE_INTERVAL_SECONDS,
                        DEFAULT_MAX_BLOCK_TXS,
                        true,
                        miner_shutdown,
                    )
                    .await;
            });

            let mut shutdown_wait = shutdown;
            let _ = shutdown_wait.changed().await;
            server_handle.stop(true).await;
            let _ = server_task.await;
            let _ = sync_task.await;
            let _ = miner_task.await;
            info!("daemon stopped");
        }
    }

    Ok(())
}
