use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Process configuration, read once at startup and handed to the services
/// that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream credential. `None` keeps the server up but every analysis
    /// request fails with a configuration error.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub max_output_tokens: u32,
    pub bind_addr: String,
    pub server_url: String,
    pub store_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let max_output_tokens = match env::var("OPENAI_MAX_TOKENS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("⚠️ Invalid OPENAI_MAX_TOKENS '{}', using {}", raw, DEFAULT_MAX_TOKENS);
                DEFAULT_MAX_TOKENS
            }),
            Err(_) => DEFAULT_MAX_TOKENS,
        };

        Self {
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            max_output_tokens,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            server_url: env::var("TRACKER_SERVER_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            store_path: env::var("TRACKER_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_store_path()),
        }
    }
}

/// `<data dir>/instant-health-tracker/food_logs.json`, falling back to the
/// working directory on platforms without a data dir.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("instant-health-tracker")
        .join("food_logs.json")
}
