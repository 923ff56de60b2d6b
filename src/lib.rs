//! Kuna CRM
//!
//! A small-business CRM server with:
//! - Client records with contact data and spend/visit aggregates
//! - A sales pipeline where each client sits in at most one stage
//! - Tasks tied to clients and stages, and a per-client interaction log
//! - AI-assisted insights through any OpenAI-compatible completion API

pub mod ai;
pub mod api;
pub mod crm;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub database: DatabaseYamlConfig,
    pub llm: LlmConfig,
    pub business: BusinessConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://kuna.db".into(),
            max_connections: 5,
        }
    }
}

/// Completion API settings. Without an API key the AI endpoints run on
/// their local fallbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 30,
        }
    }
}

/// The business the CRM serves, woven into every prompt
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusinessConfig {
    pub name: String,
    pub business_type: String,
    pub currency_symbol: String,
    /// Language code the assistant answers in
    pub language: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "Mi Negocio".into(),
            business_type: "cafetería".into(),
            currency_symbol: "₡".into(),
            language: "es".into(),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub llm: LlmConfig,
    pub business: BusinessConfig,
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. A missing file falls
    /// back to env vars / defaults; an explicit path that does not parse is an error.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path)?;

        let mut llm = yaml.llm;
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            llm.api_key = Some(key);
        }
        llm.api_key = llm.api_key.filter(|k| !k.trim().is_empty());
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            llm.model = model;
        }
        llm.timeout_secs = env_parse("LLM_TIMEOUT_SECS").unwrap_or(llm.timeout_secs);

        let mut business = yaml.business;
        if let Ok(name) = std::env::var("BUSINESS_NAME") {
            business.name = name;
        }
        if let Ok(kind) = std::env::var("BUSINESS_TYPE") {
            business.business_type = kind;
        }

        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(yaml.server.host),
            server_port: env_parse("SERVER_PORT").unwrap_or(yaml.server.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(yaml.database.url),
            database_max_connections: yaml.database.max_connections,
            llm,
            business,
        })
    }

    fn load_yaml(yaml_path: Option<&Path>) -> Result<YamlConfig> {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                Ok(YamlConfig::default())
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::CrmStore>,
    pub llm: Arc<dyn ai::CompletionProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the database and build the completion provider
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(
            store::SqliteStore::connect(&config.database_url, config.database_max_connections)
                .await?,
        );
        let llm = ai::build_provider(&config.llm)?;

        Ok(Self {
            store,
            llm,
            config: Arc::new(config),
        })
    }
}

/// Run the HTTP server until the process is stopped
pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config).await?;
    let app = api::create_router(api::handlers::ServerState::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Kuna CRM listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
