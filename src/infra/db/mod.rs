//! Postgres-backed repository implementations.

mod posts;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};
use tracing::warn;

use crate::application::repos::{HealthRepo, RepoError};
use crate::domain::version::VersionToken;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open the pool, retrying the initial connection with exponential backoff.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        retries: u32,
    ) -> Result<PgPool, sqlx::Error> {
        let strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(4))
            .with_max_times(retries as usize);

        (|| async {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await
        })
        .retry(strategy)
        .notify(|err: &sqlx::Error, delay: Duration| {
            warn!(
                target = "nebula::infra::db",
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "database connection failed, retrying"
            );
        })
        .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }
}

#[async_trait]
impl HealthRepo for PostgresRepositories {
    async fn health_check(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

/// Row versions are drawn from `row_version_seq`; any other token shape can never match.
fn expected_sequence(token: Option<VersionToken>) -> Result<Option<i64>, RepoError> {
    match token {
        Some(token) => token
            .to_sequence()
            .map(Some)
            .ok_or(RepoError::StaleVersion),
        None => Ok(None),
    }
}
