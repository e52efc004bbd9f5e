use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use crate::{bootstrap::Dependency, config::DatabaseConfig};

/// Postgres pool. Ready only after a `SELECT 1` round trip succeeds.
pub struct Postgres {
    config: DatabaseConfig,
}

impl Postgres {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        let cfg = &self.config;
        PgPoolOptions::new()
            .max_connections(cfg.max_open_conns)
            .min_connections(cfg.max_idle_conns.min(cfg.max_open_conns))
            .idle_timeout(cfg.max_idle_time)
            .acquire_timeout(cfg.ping_timeout)
    }
}

#[async_trait]
impl Dependency for Postgres {
    type Handle = PgPool;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> anyhow::Result<PgPool> {
        let db = self
            .pool_options()
            .connect(&self.config.url)
            .await
            .context("connect to database")?;

        tokio::time::timeout(self.config.ping_timeout, sqlx::query("SELECT 1").execute(&db))
            .await
            .context("database ping timed out")?
            .context("database ping failed")?;

        debug!(
            max_open = self.config.max_open_conns,
            min_idle = self.config.max_idle_conns,
            "database pool ready"
        );
        Ok(db)
    }
}
