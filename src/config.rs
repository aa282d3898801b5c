use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    /// Default max age for confirm, reset and change-email tokens.
    pub token_max_age: Duration,
    /// Max age of the bearer token issued on login.
    pub session_max_age: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let secret_key = env_required("QUILL_SECRET_KEY")?;
        if secret_key.trim().is_empty() {
            return Err("QUILL_SECRET_KEY must not be empty".to_string());
        }

        let host: IpAddr = env_or("QUILL_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid QUILL_HOST: {e}"))?;

        let port: u16 = env_or("QUILL_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid QUILL_PORT: {e}"))?;

        let base_url = env_or("QUILL_BASE_URL", &format!("http://{host}:{port}"));

        let token_max_age = env_seconds("QUILL_TOKEN_MAX_AGE", 3600)?;
        let session_max_age = env_seconds("QUILL_SESSION_MAX_AGE", 86400)?;

        let log_level = env_or("QUILL_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            secret_key,
            host,
            port,
            base_url,
            token_max_age,
            session_max_age,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_seconds(key: &str, default: u64) -> Result<Duration, String> {
    env_or(key, &default.to_string())
        .parse()
        .map(Duration::from_secs)
        .map_err(|e| format!("Invalid {key}: {e}"))
}
