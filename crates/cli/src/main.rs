use std::path::PathBuf;

use anyhow::Context;
use bookloop_kernel::settings::Settings;
use clap::{Parser, Subcommand};

/// Bookloop book-sharing server.
#[derive(Debug, Parser)]
#[command(name = "bookloop", version, about)]
struct Cli {
    /// Directory holding base.toml and the per-environment overlays
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (local, staging or production)
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Boot every module and serve the HTTP API until Ctrl-C
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as JSON
    Settings,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        if self.config_dir.is_none() && self.env.is_none() {
            return Settings::load();
        }
        let config_dir = match &self.config_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };
        let env = self.env.as_deref().unwrap_or("local");
        Settings::load_from(&config_dir, env)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = cli
        .settings()
        .context("failed to load Bookloop settings")?;

    match cli.command {
        Commands::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            bookloop_telemetry::init(&settings.telemetry)?;
            tracing::info!(env = ?settings.environment, "bookloop serve starting");

            bookloop_app::app::serve(&settings, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "failed to listen for shutdown signal");
                }
            })
            .await?;
        }
    }

    Ok(())
}
