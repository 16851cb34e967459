//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (e.g. `PROVIDER__BASE_URL`,
//! `ORCHESTRATOR__DEFAULT_MODEL`, `NATS__URL`).
//!
//! Every external collaborator is optional. A missing one puts the tool
//! that depends on it into its degraded mode.

use parlance_ai::ProviderConfig;
use parlance_conversation::OrchestratorConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Completion provider connection.
    pub provider: ProviderConfig,

    /// Turn processing settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// PostgreSQL URL for the chat log and product catalog.
    #[serde(default)]
    pub database_url: Option<String>,

    /// NATS object store holding documents.
    #[serde(default)]
    pub nats: Option<NatsConfig>,

    /// SerpAPI key for web search.
    #[serde(default)]
    pub serpapi_key: Option<String>,
}

/// NATS connection for the document store.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,

    /// Object store bucket holding documents.
    #[serde(default = "default_documents_bucket")]
    pub bucket: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_documents_bucket() -> String {
    "documents".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(
        source: impl config::Source + Send + Sync + 'static,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
