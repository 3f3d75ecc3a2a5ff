mod admin;
mod bootstrap;
mod chat;
mod crm;
mod health;
mod llm;
mod notify;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use nouma_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(name = "nouma-server", about = "Nouma customer-support chatbot backend")]
struct Cli {
    /// Path to the TOML config file (defaults to nouma.toml / config/nouma.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind address override.
    #[arg(long)]
    bind: Option<String>,
    /// Port override.
    #[arg(long)]
    port: Option<u16>,
    /// SQLite database URL override.
    #[arg(long)]
    database_url: Option<String>,
    /// Agent documents directory override.
    #[arg(long)]
    agents_dir: Option<PathBuf>,
    /// Seed the demo catalog into an empty database before serving.
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

fn init_logging(config: &AppConfig) {
    use nouma_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let require_file = cli.config.is_some();
    let options = LoadOptions {
        config_path: cli.config,
        require_file,
        overrides: ConfigOverrides {
            database_url: cli.database_url,
            agents_dir: cli.agents_dir,
            bind_address: cli.bind,
            port: cli.port,
            ..ConfigOverrides::default()
        },
    };

    let config = AppConfig::load(options)?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config, cli.seed_demo).await;
    let widget_dir = app.config.server.widget_dir.clone();
    let router = bootstrap::router(app.state, widget_dir.as_deref());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(bind_address = %address, "nouma-server listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("nouma-server stopping");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
