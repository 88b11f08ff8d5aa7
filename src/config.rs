use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub max_connections: u32,
    /// Upper bound for every storage call, including pool acquisition.
    pub timeout_secs: u64,
}

impl DbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Page size bounds for directory listings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListLimits {
    pub default_per_page: i64,
    pub max_per_page: i64,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            max_per_page: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub db: DbConfig,
    pub listing: ListLimits,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "backoffice".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "backoffice-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24),
        };
        let db = DbConfig {
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            timeout_secs: env_or("DB_TIMEOUT_SECS", 5),
        };
        let defaults = ListLimits::default();
        let listing = ListLimits {
            default_per_page: env_or("LIST_DEFAULT_PER_PAGE", defaults.default_per_page),
            max_per_page: env_or("LIST_MAX_PER_PAGE", defaults.max_per_page),
        };
        anyhow::ensure!(
            listing.default_per_page >= 1 && listing.default_per_page <= listing.max_per_page,
            "LIST_DEFAULT_PER_PAGE must be between 1 and LIST_MAX_PER_PAGE"
        );
        Ok(Self {
            database_url,
            jwt,
            db,
            listing,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
