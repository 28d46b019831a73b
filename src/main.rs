pub mod types;
pub mod config;
pub mod matching;
pub mod data;
pub mod projection;
pub mod layout;
pub mod scene;
pub mod zoom;
pub mod render;
pub mod chart;
pub mod table;
pub mod page;
pub mod app;
pub mod explore;

#[cfg(test)]
mod testing;

use app::RunOutcome;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the bubble map, bar chart and data table
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Replay zoom interactions against the map
    Explore {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Command script; read from stdin when omitted
        #[arg(short, long, value_name = "FILE")]
        script: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Render { config } => {
            info!("Rendering with config {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            app::render(&app_config).await?
        }
        Commands::Explore { config, script } => {
            info!("Exploring with config {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            explore::run(&app_config, script.as_deref()).await?
        }
    };

    match outcome {
        RunOutcome::Rendered(files) => {
            info!("Done, {} files written", files.len());
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::LoadFailed => Ok(ExitCode::FAILURE),
    }
}
