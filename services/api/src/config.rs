use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Connection settings for the hosted realtime deployment.
#[derive(Clone, Debug)]
pub struct AzureRealtimeConfig {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub voice: String,
}

impl AzureRealtimeConfig {
    /// The WebSocket URL of the realtime deployment.
    ///
    /// `https://` endpoints become `wss://`, `http://` become `ws://`.
    pub fn realtime_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!(
            "{}/openai/realtime?api-version={}&deployment={}",
            base, self.api_version, self.deployment
        )
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub azure: AzureRealtimeConfig,
    pub customer_id: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub callback_template_path: PathBuf,
}

fn required(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name.to_string())),
    }
}

const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = required("AZURE_OPENAI_API_KEY")?;
        let endpoint = required("AZURE_OPENAI_ENDPOINT")?;
        if !(endpoint.starts_with("https://")
            || endpoint.starts_with("http://")
            || endpoint.starts_with("wss://")
            || endpoint.starts_with("ws://"))
        {
            return Err(ConfigError::InvalidValue(
                "AZURE_OPENAI_ENDPOINT".to_string(),
                format!("'{}' is not an http(s) or ws(s) URL", endpoint),
            ));
        }
        let deployment = required("AZURE_OPENAI_DEPLOYMENT")?;
        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2024-10-01-preview".to_string());

        let voice = std::env::var("REALTIME_VOICE")
            .unwrap_or_else(|_| "alloy".to_string())
            .to_lowercase();
        if !VOICES.contains(&voice.as_str()) {
            return Err(ConfigError::InvalidValue(
                "REALTIME_VOICE".to_string(),
                format!("'{}' is not a supported voice", voice),
            ));
        }

        let customer_id = std::env::var("CUSTOMER_ID").unwrap_or_else(|_| "12121".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));
        let callback_template_path = std::env::var("CALLBACK_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./templates/callback_schedule_template.html"));

        Ok(Self {
            bind_address,
            azure: AzureRealtimeConfig {
                api_key,
                endpoint,
                deployment,
                api_version,
                voice,
            },
            customer_id,
            log_level,
            prompts_path,
            callback_template_path,
        })
    }
}
