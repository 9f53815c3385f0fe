//! Database handle with retry and mock-mode fallback.
//!
//! Every statement goes through [`Database::fetch`] (reads) or
//! [`Database::execute`] (writes and DDL). When no `DATABASE_URL` is
//! configured the handle runs in mock mode: reads return empty results and
//! writes fail with [`DbError::MockModeWrite`].

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::DbError;

/// Retry schedule for query execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,

    /// Base delay used instead when a loopback target refused the connection.
    pub refused_base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Whether the target host is a loopback address.
    pub loopback: bool,
}

impl RetryPolicy {
    /// Policy for a remote database server.
    pub fn remote() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            refused_base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            loopback: false,
        }
    }

    /// Policy for a database on the local machine, which is often still starting up.
    pub fn loopback() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            refused_base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(10_000),
            loopback: true,
        }
    }

    /// Pick a policy from the host in a connection URL.
    pub fn for_database_url(database_url: &str) -> Self {
        let host = url::Url::parse(database_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_matches(['[', ']']).to_string()));

        match host.as_deref() {
            Some("localhost" | "127.0.0.1" | "::1") => Self::loopback(),
            Some(h) if h.starts_with("127.") => Self::loopback(),
            _ => Self::remote(),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            refused_base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            loopback: false,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, err: &DbError) -> Duration {
        let base = if self.loopback && err.is_connection_refused() {
            self.refused_base_delay
        } else {
            self.base_delay
        };
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                if matches!(err, DbError::Connection { .. }) {
                    error!(
                        query = %label,
                        attempts = attempt,
                        error = %err,
                        "database unreachable after retries; check that the database service is \
                         running, that no firewall blocks the port, and that a paused cloud \
                         instance has been resumed"
                    );
                }
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt, &err);
                warn!(
                    query = %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying database statement"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Shared database handle.
#[derive(Clone)]
pub struct Database {
    pool: Option<PgPool>,
    policy: RetryPolicy,
}

impl Database {
    /// Connect using the configured URL, or fall back to mock mode when none is set.
    pub async fn connect(config: &Config) -> Result<Self> {
        let Some(database_url) = config.database_url.as_deref() else {
            warn!("DATABASE_URL not set; running in mock mode (reads are empty, writes fail)");
            return Ok(Self::mock());
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_lazy(database_url)
            .context("invalid DATABASE_URL")?;

        Ok(Self {
            pool: Some(pool),
            policy: RetryPolicy::for_database_url(database_url),
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, policy: RetryPolicy) -> Self {
        Self {
            pool: Some(pool),
            policy,
        }
    }

    /// A handle with no backing datastore.
    pub fn mock() -> Self {
        Self {
            pool: None,
            policy: RetryPolicy::immediate(1),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.pool.is_none()
    }

    /// Run a read statement. In mock mode this returns `T::default()` without touching anything.
    pub async fn fetch<T, F, Fut>(&self, label: &str, op: F) -> Result<T, DbError>
    where
        T: Default,
        F: Fn(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let Some(pool) = &self.pool else {
            debug!(query = %label, "mock mode: returning empty result");
            return Ok(T::default());
        };
        self.run(pool, label, op).await
    }

    /// Run a write or DDL statement. In mock mode this fails with [`DbError::MockModeWrite`].
    pub async fn execute<T, F, Fut>(&self, label: &str, op: F) -> Result<T, DbError>
    where
        F: Fn(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let Some(pool) = &self.pool else {
            return Err(DbError::MockModeWrite(label.to_string()));
        };
        self.run(pool, label, op).await
    }

    /// Run a multi-statement SQL script.
    pub async fn execute_script(&self, label: &str, sql: &str) -> Result<(), DbError> {
        self.execute(label, |pool| async move {
            sqlx::raw_sql(sql).execute(&pool).await.map(|_| ())
        })
        .await
    }

    /// Check if the database connection is healthy.
    pub async fn check_health(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => false,
        }
    }

    async fn run<T, F, Fut>(&self, pool: &PgPool, label: &str, op: F) -> Result<T, DbError>
    where
        F: Fn(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        with_retry(&self.policy, label, || {
            let fut = op(pool.clone());
            async move { fut.await.map_err(DbError::from) }
        })
        .await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("mock", &self.is_mock())
            .field("policy", &self.policy)
            .finish()
    }
}
