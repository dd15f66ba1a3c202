use anyhow::{Context, Result};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    /// Postgres connection string. Only optional for in-memory runs.
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    /// Mentor alert webhook. Alerts are logged and dropped when unset.
    pub webhook_url: Option<String>,
    /// Deployment environment name, e.g. `development` or `production`.
    pub app_env: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = non_empty(env::var("DATABASE_URL").ok());
        let webhook_url = non_empty(env::var("MENTOR_WEBHOOK_URL").ok());
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let max_db_connections = env::var("MAX_DB_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("MAX_DB_CONNECTIONS must be a valid number")?;

        Ok(Config {
            database_url,
            max_db_connections,
            webhook_url,
            app_env,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }

    /// Whether error responses may carry internal detail.
    pub fn expose_error_details(&self) -> bool {
        !self.app_env.eq_ignore_ascii_case("production")
    }
}

/// Treat missing, empty and whitespace-only values alike.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
