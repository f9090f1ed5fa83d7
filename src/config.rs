use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub viacep_base_url: String,
    pub brasilapi_base_url: String,
    pub cnpja_base_url: String,
    pub cnpjws_base_url: String,
    /// Per-call timeout of every external lookup.
    pub lookup_timeout_secs: u64,
    pub lookup_cache_ttl_secs: u64,
    pub lookup_cache_capacity: u64,
}

fn base_url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let raw = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// First 20 characters of a URL, enough to tell hosts apart in logs.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}

fn positive_var(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a positive integer", name))?;
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
            Ok(value)
        }
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            viacep_base_url: base_url_var("VIACEP_BASE_URL", "https://viacep.com.br")?,
            brasilapi_base_url: base_url_var("BRASILAPI_BASE_URL", "https://brasilapi.com.br")?,
            cnpja_base_url: base_url_var("CNPJA_BASE_URL", "https://open.cnpja.com")?,
            cnpjws_base_url: base_url_var("CNPJWS_BASE_URL", "https://publica.cnpj.ws")?,
            lookup_timeout_secs: positive_var("LOOKUP_TIMEOUT_SECS", 5)?,
            lookup_cache_ttl_secs: positive_var("LOOKUP_CACHE_TTL_SECS", 86_400)?,
            lookup_cache_capacity: positive_var("LOOKUP_CACHE_CAPACITY", 50_000)?,
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}...", url_prefix(&config.database_url));
        tracing::debug!(
            "Postal providers: {}, {}",
            config.viacep_base_url,
            config.brasilapi_base_url
        );
        tracing::debug!(
            "Registry providers: {}, {}",
            config.cnpja_base_url,
            config.cnpjws_base_url
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn lookup_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_cache_ttl_secs)
    }
}
