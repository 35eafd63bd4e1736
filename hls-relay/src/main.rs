use std::path::PathBuf;

use clap::Parser;
use hls_relay::api::server::backend_available;
use hls_relay::api::{ApiServer, ApiServerConfig, AppState};
use hls_relay::config::RelayConfig;
use hls_relay::logging::{self, LoggingOptions};
use mimalloc::MiMalloc;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Playlist relay resolving live streams on demand.
#[derive(Debug, Parser)]
#[command(name = "hls-relay", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(short, long)]
    bind: Option<String>,

    /// Externally reachable base URL used in generated links
    #[arg(long)]
    public_base_url: Option<String>,

    /// Directory holding channel records
    #[arg(long)]
    channels_dir: Option<PathBuf>,

    /// Log filter directive (RUST_LOG takes precedence)
    #[arg(long, env = "RELAY_LOG_FILTER")]
    log_filter: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Also write daily-rolling log files to this directory
    #[arg(long, env = "RELAY_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn apply_to(&self, config: &mut RelayConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(base) = &self.public_base_url {
            config.public_base_url = Some(base.clone());
        }
        if let Some(dir) = &self.channels_dir {
            config.channels_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _log_guard = logging::init(LoggingOptions {
        filter: args.log_filter.as_deref(),
        json: args.json_logs,
        log_dir: args.log_dir.as_deref(),
    })?;

    let mut config = RelayConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    let state = AppState::from_config(&config)?;
    info!(
        backend = %state.resolver.backend_name(),
        channels_dir = %config.channels_dir.display(),
        public_base_url = %config.public_base_url(),
        cache_ttl_secs = config.cache_ttl_secs,
        "Relay configured"
    );
    if !backend_available(&config).await {
        warn!(
            backend = %state.resolver.backend_name(),
            "Extractor binary does not respond; resolutions will fail"
        );
    }
    if !config.channels_dir.is_dir() {
        warn!(
            "Channels directory {} does not exist; every playlist will be not found",
            config.channels_dir.display()
        );
    }

    let server = ApiServer::with_state(ApiServerConfig::from(&config), state);
    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            cancel.cancel();
        }
    });

    server.run().await?;
    info!("Relay stopped");
    Ok(())
}
