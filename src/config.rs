use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

/// Username of the platform commission account. Resolved lazily through the
/// ledger's get-or-create path; overridable via PLATFORM_ACCOUNT_KEY.
pub const DEFAULT_PLATFORM_ACCOUNT_KEY: &str = "__platform__";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub platform_account_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            platform_account_key: env::var("PLATFORM_ACCOUNT_KEY")
                .unwrap_or_else(|_| DEFAULT_PLATFORM_ACCOUNT_KEY.to_string()),
        })
    }
}
