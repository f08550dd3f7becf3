use std::path::PathBuf;

use ai_concierge::config::ServerConfig;
use ai_concierge::daemon;
use ai_concierge::error::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ai-concierge")]
#[command(about = "AI Concierge lead qualification backend")]
struct Cli {
    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "SEED_DIR")]
    seed_dir: Option<PathBuf>,

    #[arg(long, env = "ANTHROPIC_MODEL")]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    ai_concierge::logging::init_tracing("ai_concierge");
    let cli = Cli::parse();

    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(seed_dir) = cli.seed_dir {
        config.seed_dir = Some(seed_dir);
    }
    if let Some(model) = cli.model {
        config.anthropic.model = Some(model);
    }

    daemon::run_with_shutdown(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
