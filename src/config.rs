use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Optional; when unset the read-through cache is disabled and every
    /// lookup goes straight to the stores.
    pub redis_url: Option<String>,
    pub discount_service_url: String,
    pub discount_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").ok(),
            discount_service_url: env::var("DISCOUNT_SERVICE_URL")?,
            discount_timeout_secs: env::var("DISCOUNT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        })
    }
}
