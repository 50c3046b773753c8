//! idledgerd - identity ledger daemon
//!
//! Hosts the local ledger and identity verification contract, restores them
//! from the storage directory at startup, and keeps the snapshots current
//! until it receives Ctrl+C or SIGTERM.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use idledger_service::{ServiceConfig, ServiceError, ServiceState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "idledgerd", version, about = "Identity ledger daemon", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "IDLEDGER_CONFIG")]
    config: Option<String>,

    /// Directory holding the JSON snapshots
    #[arg(long, env = "IDLEDGER_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Enable periodic and save-on-write snapshots
    #[arg(long, env = "IDLEDGER_AUTO_SAVE", action = ArgAction::Set)]
    auto_save: Option<bool>,

    /// Periodic save interval in seconds
    #[arg(long, env = "IDLEDGER_AUTO_SAVE_INTERVAL")]
    auto_save_interval: Option<u64>,

    /// Address of an already deployed identity contract
    #[arg(long, env = "IDLEDGER_CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    /// Funded account relaying identity transactions
    #[arg(long, env = "IDLEDGER_OPERATOR")]
    operator: Option<String>,

    /// Log level
    #[arg(long, env = "IDLEDGER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "IDLEDGER_LOG_JSON")]
    json: bool,
}

impl Cli {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(dir) = self.storage_dir {
            config.engine.storage_dir = dir;
        }
        if let Some(enabled) = self.auto_save {
            config.engine.auto_save.enabled = enabled;
        }
        if let Some(secs) = self.auto_save_interval {
            config.engine.auto_save.interval_secs = secs;
        }
        if self.contract_address.is_some() {
            config.engine.contract_address = self.contract_address;
        }
        if self.operator.is_some() {
            config.engine.operator = self.operator;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config.logging.json |= self.json;
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())
        .map_err(|e| ServiceError::Config(e.to_string()))?;
    cli.apply(&mut config);

    init_tracing(&config.logging.level, config.logging.json);

    let state = ServiceState::bootstrap(&config)?;
    let height = state.service.with_ledger(|ledger| ledger.height())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        height,
        auto_save = state.auto_save_enabled(),
        interval_secs = config.engine.auto_save.interval_secs,
        "idledgerd started"
    );

    shutdown_signal().await?;

    if let Some(stats) = state.shutdown().await? {
        info!(
            saves = stats.saves,
            failures = stats.failures,
            "final snapshot written"
        );
    }
    info!("idledgerd stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate.recv() => {
                info!("Received terminate signal, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}
