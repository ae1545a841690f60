//! Server configuration loaded from the environment

/// Configuration surface of the API server. Provider credentials are
/// loaded separately by the billing crate (`ProviderConfig`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Optional direct (non-pooler) URL used for migrations.
    pub database_direct_url: Option<String>,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Comma-separated CORS origin allowlist.
    pub allowed_origins: Vec<String>,
    /// Request-level timeout in seconds for webhook and gated requests.
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
        let database_direct_url = std::env::var("DATABASE_DIRECT_URL").ok();
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            database_url,
            database_direct_url,
            bind_address,
            allowed_origins,
            request_timeout_secs,
        })
    }
}
