use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile_api_url: String,
    pub upload_api_url: String,
    pub token_path: String,
    pub request_timeout_secs: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let profile_api_url = require_env("PROFILE_API_URL")?;

        Ok(Config {
            // Uploads go through the same gateway unless pointed elsewhere.
            upload_api_url: std::env::var("UPLOAD_API_URL")
                .unwrap_or_else(|_| profile_api_url.clone()),
            token_path: std::env::var("TOKEN_PATH")
                .unwrap_or_else(|_| ".session-token".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .context("REQUEST_TIMEOUT_SECS must be a number of seconds")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            profile_api_url,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
