//! Settlement engine binary for the colony economy.
//!
//! This is the main entry point that wires together the cycle clock, the
//! ledger store, the settlement engine, the hot-state cache and the
//! Observer API. It loads configuration, initializes all subsystems, and
//! polls for cycle boundaries until stopped.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `colony-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured store: in-memory seeded from config, or
//!    `PostgreSQL` with migrations and a first-run seed
//! 4. Connect the Dragonfly hot-state cache when a URL is configured
//! 5. Start the Observer API server
//! 6. Run the cycle runner until Ctrl-C or an operator stop
//! 7. Log the result

mod error;
mod observer_callback;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colony_core::config::LoggingConfig;
use colony_core::hazard::HazardRoller;
use colony_core::{
    ColonyConfig, CycleClock, CycleRunner, OperatorState, PassObserver, SettlementEngine,
    SettlementSettings, StorageBackend,
};
use colony_db::{HotStateCache, PgLedgerStore, PostgresConfig, PostgresPool};
use colony_ledger::{LedgerStore, MemoryLedgerStore};
use colony_observer::{start_server, AppState, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::observer_callback::CachePublisher;

/// Config file read when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "colony-config.yaml";

/// Application entry point for the settlement engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("colony-engine starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        period_seconds = config.cycle.period_seconds,
        poll_interval_ms = config.cycle.poll_interval_ms,
        max_concurrent_commits = config.settlement.max_concurrent_commits,
        storage = ?config.infrastructure.storage,
        "Engine settings"
    );

    // 3. Open the store and hand off to the generic run loop.
    match config.infrastructure.storage {
        StorageBackend::Memory => {
            let store = MemoryLedgerStore::with_economy(
                config.economy.parameters.clone(),
                config.economy.market_board(),
            );
            info!("Using in-memory ledger store; state is lost on exit");
            run(Arc::new(store), &config).await?;
        }
        StorageBackend::Postgres => {
            let pool = connect_postgres(&config).await?;
            let store = PgLedgerStore::new(&pool);
            let seeded = store
                .seed(&config.economy.parameters, &config.economy.market_board())
                .await?;
            info!(seeded, "PostgreSQL ledger store ready");
            let result = run(Arc::new(store), &config).await;
            pool.close().await;
            result?;
        }
    }

    info!("colony-engine shutdown complete");
    Ok(())
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `path`, falling back to defaults if it is absent.
///
/// The flag reports whether the file was read.
fn load_config(path: &Path) -> Result<(ColonyConfig, bool), EngineError> {
    if path.exists() {
        Ok((ColonyConfig::from_file(path)?, true))
    } else {
        let mut config = ColonyConfig::default();
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok((config, false))
    }
}

/// Connect to `PostgreSQL` sized for the settlement fan-out and migrate.
async fn connect_postgres(config: &ColonyConfig) -> Result<PostgresPool, EngineError> {
    let pg_config = PostgresConfig::for_settlement(
        &config.infrastructure.postgres_url,
        config.settlement.max_concurrent_commits,
        Duration::from_millis(config.settlement.commit_timeout_ms),
    );
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;
    Ok(pool)
}

/// Connect the hot-state cache if a URL is configured.
///
/// A cache that cannot be reached disables publishing instead of failing
/// startup.
async fn connect_cache(url: &str) -> Option<HotStateCache> {
    if url.is_empty() {
        info!("No Dragonfly URL configured, hot-state publishing disabled");
        return None;
    }
    match HotStateCache::connect(url).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(error = %e, "failed to connect to Dragonfly, hot-state publishing disabled");
            None
        }
    }
}

/// Length of a purchased protection window.
fn protection_window(config: &ColonyConfig) -> Result<chrono::Duration, EngineError> {
    i64::try_from(config.insurance.protection_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| EngineError::Setting {
            message: format!(
                "insurance.protection_seconds {} is out of range",
                config.insurance.protection_seconds
            ),
        })
}

/// Run the observer and the cycle runner over `store` until stopped.
async fn run<S: LedgerStore + 'static>(store: Arc<S>, config: &ColonyConfig) -> Result<(), EngineError> {
    let clock = CycleClock::new(config.cycle.period_seconds)?;
    let protection = protection_window(config)?;
    let operator = Arc::new(OperatorState::new());

    let engine = Arc::new(SettlementEngine::new(
        Arc::clone(&store),
        clock,
        SettlementSettings::from(&config.settlement),
        HazardRoller::new(config.hazard.clone()),
    ));

    // 4. Hot-state cache, seeded with the current phenomenon.
    let publisher = CachePublisher::new(connect_cache(&config.infrastructure.dragonfly_url).await);
    if publisher.is_enabled() {
        publisher.on_phenomenon(&store.load_phenomenon().await?).await;
    }

    // 5. Observer API server.
    let app_state = Arc::new(AppState::new(
        Arc::clone(&store),
        clock,
        protection,
        Arc::clone(&operator),
    ));
    let server_config = ServerConfig::on_port(config.infrastructure.observer_port);
    let observer = tokio::spawn(async move { start_server(&server_config, app_state).await });
    info!(port = config.infrastructure.observer_port, "Observer API server started");

    // 6. Stop on Ctrl-C.
    let signal_operator = Arc::clone(&operator);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current tick");
                signal_operator.request_stop();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    let mut runner = CycleRunner::new(engine, &config.cycle, Arc::clone(&operator), publisher);
    let summary = runner.run().await;
    info!(ticks = summary.ticks, passes = summary.passes, "Cycle runner finished");

    // The runner only returns once a stop was requested, which also
    // shuts the observer down.
    operator.request_stop();
    match observer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Observer API server failed"),
        Err(e) => warn!(error = %e, "Observer API task panicked"),
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let path = std::env::temp_dir().join("colony-engine-missing-config.yaml");
        let (config, from_file) = load_config(&path).unwrap();
        assert!(!from_file);
        assert_eq!(config.cycle.period_seconds, 300);
        assert_eq!(config.infrastructure.storage, StorageBackend::Memory);
    }

    #[test]
    fn config_file_is_read() {
        let path = std::env::temp_dir().join(format!(
            "colony-engine-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "cycle:\n  period_seconds: 5000\ninsurance:\n  protection_seconds: 60\n")
            .unwrap();
        let (config, from_file) = load_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(from_file);
        assert_eq!(config.cycle.period_seconds, 5000);
        assert_eq!(protection_window(&config).unwrap(), chrono::Duration::seconds(60));
    }

    #[test]
    fn oversized_protection_window_is_rejected() {
        let mut config = ColonyConfig::default();
        config.insurance.protection_seconds = u64::MAX;
        assert!(matches!(
            protection_window(&config),
            Err(EngineError::Setting { .. })
        ));
    }

    #[tokio::test]
    async fn empty_cache_url_disables_publishing() {
        assert!(connect_cache("").await.is_none());
    }
}
