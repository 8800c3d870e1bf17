use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub ai: AiSettings,
}

/// Completion provider settings. Every field is optional in the environment;
/// `any_set` records whether the operator asked for a client at all.
#[derive(Debug, Clone, Default)]
pub struct AiSettings {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub any_set: bool,
}

const AI_VARS: [&str; 6] = [
    "AI_PROVIDER",
    "AI_BASE_URL",
    "AI_API_KEY",
    "AI_MODEL",
    "AI_TIMEOUT_SECS",
    "AI_MAX_RETRIES",
];

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ai: AiSettings::from_env()?,
        })
    }
}

impl AiSettings {
    fn from_env() -> Result<Self> {
        Ok(AiSettings {
            provider: optional_env("AI_PROVIDER").unwrap_or_else(|| "groq".to_string()),
            base_url: optional_env("AI_BASE_URL").unwrap_or_default(),
            api_key: optional_env("AI_API_KEY").unwrap_or_default(),
            model: optional_env("AI_MODEL").unwrap_or_default(),
            timeout_secs: optional_env("AI_TIMEOUT_SECS")
                .unwrap_or_else(|| "15".to_string())
                .parse::<u64>()
                .context("AI_TIMEOUT_SECS must be a whole number of seconds")?,
            max_retries: optional_env("AI_MAX_RETRIES")
                .unwrap_or_else(|| "2".to_string())
                .parse::<u32>()
                .context("AI_MAX_RETRIES must be a non-negative integer")?,
            any_set: AI_VARS.iter().any(|key| optional_env(key).is_some()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are the same thing.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
