//! Price Estimator CLI
//!
//! A command-line tool for requesting price-per-m² estimates and checking
//! the health of the estimator service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::PredictRequest;
use commands::{health, predict};

/// Price Estimator CLI
#[derive(Parser)]
#[command(name = "estimate")]
#[command(author, version, about = "CLI for the Price Estimator API", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ESTIMATOR_API_URL env var)
    #[arg(long, env = "ESTIMATOR_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Basic auth user
    #[arg(long, env = "ESTIMATOR_USER")]
    pub user: Option<String>,

    /// Basic auth password
    #[arg(long, env = "ESTIMATOR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Estimate the price per m² of a property
    Predict {
        /// City whose model is used (lille, bordeaux)
        #[arg(long)]
        city: String,

        /// Property type (appartement, maison)
        #[arg(long)]
        type_local: String,

        /// Built surface in m²
        #[arg(long)]
        surface_bati: f64,

        /// Number of main rooms
        #[arg(long)]
        pieces: u32,

        /// Land surface in m²
        #[arg(long, default_value_t = 0.0)]
        surface_terrain: f64,

        /// Number of lots
        #[arg(long, default_value_t = 1)]
        lots: u32,
    },

    /// Show service health
    Health,
}

async fn run(cli: Cli) -> Result<()> {
    let credentials = match (cli.user, cli.password) {
        (Some(user), password) => Some((user, password.unwrap_or_default())),
        (None, _) => None,
    };
    let client = client::ApiClient::new(&cli.api_url, credentials)?;

    match cli.command {
        Commands::Predict {
            city,
            type_local,
            surface_bati,
            pieces,
            surface_terrain,
            lots,
        } => {
            let request = PredictRequest {
                surface_bati,
                nombre_pieces: pieces,
                type_local,
                surface_terrain,
                nombre_lots: lots,
            };
            predict::predict(&client, &city, request, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
