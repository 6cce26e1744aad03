use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend endpoint that mints short-lived realtime credentials.
    pub token_issuer_url: String,
    /// Backend endpoint answering knowledge-base queries.
    pub reasoning_url: String,
    /// Realtime signaling endpoint the SDP offer is posted to.
    pub realtime_url: String,
    /// Realtime model identifier, appended as a query parameter.
    pub realtime_model: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let token_issuer_url = std::env::var("TOKEN_ISSUER_URL")
            .map_err(|_| ConfigError::MissingVar("TOKEN_ISSUER_URL".to_string()))?;

        let reasoning_url = std::env::var("REASONING_URL")
            .map_err(|_| ConfigError::MissingVar("REASONING_URL".to_string()))?;

        let realtime_url = std::env::var("REALTIME_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/realtime".to_string());

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            token_issuer_url,
            reasoning_url,
            realtime_url,
            realtime_model,
            log_level,
        })
    }
}
