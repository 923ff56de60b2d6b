//! Kuna CRM - Main Server
//!
//! Clients, sales pipeline, tasks and AI insights over HTTP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kuna_crm::{crm::CrmManager, AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kuna")]
#[command(about = "Small-business CRM server")]
struct Cli {
    /// Path to the YAML config file (default: ./config.yaml)
    #[arg(short, long, global = true, env = "KUNA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create the default pipeline stages if none exist
    SeedStages,

    /// Print the effective configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kuna_crm=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            kuna_crm::start_server(config).await
        }
        Commands::SeedStages => run_seed(config).await,
        Commands::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

async fn run_seed(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;
    let crm = CrmManager::new(state.store.clone());

    let seeded = crm.seed_default_stages().await?;
    tracing::info!("{}", seeded.message);
    for stage in &seeded.stages {
        tracing::info!("  {}. {}", stage.order, stage.name);
    }
    Ok(())
}

fn check_config(config: &Config) {
    println!("server:   {}:{}", config.server_host, config.server_port);
    println!(
        "database: {} (max {} connections)",
        config.database_url, config.database_max_connections
    );
    match config.llm.api_key {
        Some(_) => println!(
            "llm:      {} via {} (timeout {}s)",
            config.llm.model, config.llm.base_url, config.llm.timeout_secs
        ),
        None => println!("llm:      disabled (OPENAI_API_KEY not set)"),
    }
    println!(
        "business: {} ({}), currency {}, language {}",
        config.business.name,
        config.business.business_type,
        config.business.currency_symbol,
        config.business.language
    );
}
