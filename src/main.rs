/// PickemBot — Match Announcement & Prediction Engine
///
/// What it does:
///   1. Every POLL_INTERVAL_SECS settles finished matches and scores the
///      stored predictions
///   2. Fetches the schedule and announces matches starting within
///      WINDOW_HOURS into each guild's predictions channel
///   3. Collects one-choice-per-user reaction votes until kickoff
///
/// Without a chat transport configured it runs against the console gateway:
/// announcements go to the log, no reactions arrive.
///
/// Run:
///   cargo run --bin pickem-bot

use anyhow::Result;
use dotenv::dotenv;
use esports_api::{LeagueSource, ScheduleProvider, ValorantSource};
use logger::EventLogger;
use pickem_bot::collector::PredictionCollector;
use pickem_bot::config::Config;
use pickem_bot::gateway::{ChatGateway, ConsoleGateway};
use pickem_bot::reconciler::Reconciler;
use pickem_bot::store::PredictionStore;
use std::env;
use std::fs::File;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!("=== PickemBot — match lifecycle engine ===");
    info!(
        "Esport: {} | window {}h | lookback {}h | tick {}s",
        config.esport, config.window_hours, config.lookback_hours, config.poll_interval_secs
    );
    info!("Logs: ./{}/", config.log_dir);

    // Single instance lock
    let lock_file_path = env::temp_dir().join("pickem_bot.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of pickem-bot is already running! Exiting.");
            return Ok(());
        }
    };

    let store = Arc::new(PredictionStore::open(&config.db_path)?);
    let logger = Arc::new(EventLogger::new(&config.log_dir));

    let provider: Arc<dyn ScheduleProvider> = match config.esport.as_str() {
        "valorant" => Arc::new(ValorantSource::new(&config.log_dir)),
        _ => {
            let mut source = LeagueSource::new(&config.log_dir);
            if let Ok(league_id) = env::var("LEAGUE_ID") {
                source = source.with_league(league_id);
            }
            Arc::new(source)
        }
    };

    let collector = Arc::new(PredictionCollector::new(
        Arc::clone(&store),
        Arc::clone(&logger),
    ));
    let gateway: Arc<dyn ChatGateway> = Arc::new(ConsoleGateway::new(config.guilds.clone()));

    collector.register_global_listeners(Arc::clone(&gateway));

    let reconciler = Reconciler::new(store, provider, collector, logger, &config);
    reconciler.start_periodic(gateway.as_ref()).await;

    Ok(())
}
