use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quill_broker::{BackgroundHandler, BrokerConfig, BusUiSurface, Orchestrator, SurfaceOpener};
use quill_bus::{ExecutionContext, MessageBus};
use quill_provider::{NoopAnalytics, StubWallet};
use quill_state::{handoff::DEFAULT_HANDOFF_TTL, replay::DEFAULT_EVICTION_GRACE, StateDb};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "quilld")]
struct Args {
    #[arg(long, default_value = "quill-broker.db")]
    db: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match BrokerConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("failed to load config {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => BrokerConfig::default(),
    };

    let db = match StateDb::open(&args.db) {
        Ok(db) => db,
        Err(err) => {
            log::error!("failed to open state db {}: {err}", args.db.display());
            std::process::exit(1);
        }
    };

    let bus = MessageBus::new();
    // Stub keychain for now; collaborators get replaced one at a time as the
    // real services land.
    let wallet = Arc::new(StubWallet::new());
    let surfaces = SurfaceOpener::new(
        vec![Arc::new(BusUiSurface::new(Arc::clone(&bus)))],
        config.timeouts.surface_attempt(),
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&bus),
        db,
        wallet,
        Arc::new(NoopAnalytics),
        surfaces,
        &config,
    );
    bus.attach(ExecutionContext::Background, BackgroundHandler::new(Arc::clone(&orchestrator)));

    let maintenance = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = maintenance.handoff_store().prune_expired(DEFAULT_HANDOFF_TTL) {
                log::warn!("handoff pruning failed: {err}");
            }
            if let Err(err) = maintenance.replay_ledger().evict_stale_pending(DEFAULT_EVICTION_GRACE)
            {
                log::warn!("replay eviction failed: {err}");
            }
        }
    });

    log::info!("quilld running (db: {}); ctrl-c to stop", args.db.display());
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to wait for shutdown signal: {err}");
    }
    log::info!("quilld shutting down");
}
