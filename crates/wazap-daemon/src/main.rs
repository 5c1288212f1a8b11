//! Process entry point: parses CLI args, loads config (fail-fast on error),
//! initializes tracing, and hands off to [`run::run`]. No HTTP server is
//! started here — readiness, metrics, and shutdown are all driven by the
//! process lifecycle and logging alone (spec §7).

mod commands;
mod handlers;
mod run;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wazap_core::config::WazapConfig;

#[derive(Parser, Debug)]
#[command(name = "wazap-daemon", about = "WhatsApp automation service core")]
struct Cli {
    /// Path to wazap.toml. Defaults to ~/.wazap/wazap.toml.
    #[arg(long)]
    config: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wazap_daemon=info,wazap_connection=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match WazapConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "fatal: config load failed");
            return ExitCode::from(1);
        }
    };

    match run::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal: unrecoverable boot/connection error");
            ExitCode::from(1)
        }
    }
}
