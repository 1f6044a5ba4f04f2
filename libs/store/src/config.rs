//! Connection settings for the Postgres event backend.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::log::PgBackend;
use crate::StoreError;

/// Pool settings for the event store's Postgres connection.
///
/// Every concurrent `apply` holds a connection for one read and one insert,
/// so `max_connections` bounds how many writers can contend at once.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,

    /// How long a writer waits for a free connection before failing.
    pub acquire_timeout: Duration,

    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/aggstore".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// Reads `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`,
    /// `DB_ACQUIRE_TIMEOUT_MS`, `DB_IDLE_TIMEOUT_SECS` and
    /// `DB_MAX_LIFETIME_SECS`. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        let defaults = Self::default();

        Self {
            url: lookup("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: lookup("DB_MIN_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_connections),
            acquire_timeout: parse("DB_ACQUIRE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: parse("DB_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime: parse("DB_MAX_LIFETIME_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_lifetime),
        }
    }

    /// The URL with any password masked, for logs and error output.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
            None => self.url.clone(),
        }
    }
}

/// A verified Postgres pool that event backends are built from.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Opens the pool and round-trips one query, so a bad URL or an
    /// unreachable server fails here rather than on the first append.
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Connect)?;

        info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "event store connected"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Event backend sharing this pool.
    pub fn backend(&self) -> PgBackend {
        PgBackend::new(self.pool.clone())
    }
}
