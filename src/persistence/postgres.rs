//! PostgreSQL checkpoint store.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;

use super::{Checkpoint, CheckpointBackend, Checkpointer};
use crate::config::{ConnectionTarget, DatabaseConfig};
use crate::error::{Result, SetupStage, ThreadlineError};
use crate::setup::Mode;
use crate::types::ConversationState;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS threadline_checkpoints (
    thread_id  TEXT PRIMARY KEY,
    state      JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

/// Checkpoints stored one row per thread, state as JSONB.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointer {
    pool: PgPool,
}

impl PostgresCheckpointer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkpoint table if it does not exist.
    pub async fn setup(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Checkpointer for PostgresCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row: Option<(Json<ConversationState>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT state, updated_at FROM threadline_checkpoints WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(state), updated_at)| Checkpoint {
            thread_id: thread_id.to_string(),
            state,
            updated_at,
        }))
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO threadline_checkpoints (thread_id, state, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (thread_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(thread_id)
        .bind(Json(state))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM threadline_checkpoints WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Connect options for a [`DatabaseConfig`] target.
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    match &config.target {
        ConnectionTarget::Url(url) => PgConnectOptions::from_str(url)
            .map_err(|e| ThreadlineError::Configuration(format!("invalid PG_URI: {e}"))),
        ConnectionTarget::Fields {
            host,
            port,
            database,
            user,
            password,
        } => Ok(PgConnectOptions::new()
            .host(host)
            .port(*port)
            .database(database)
            .username(user)
            .password(password)),
    }
}

/// Backend opening one pool per setup track.
#[derive(Debug, Clone, Default)]
pub struct PostgresBackend;

impl PostgresBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CheckpointBackend for PostgresBackend {
    async fn connect(&self, config: &DatabaseConfig, mode: Mode) -> Result<Arc<dyn Checkpointer>> {
        let options = connect_options(config)?;
        let policy = &config.pool;

        let pool = PgPoolOptions::new()
            .max_connections(policy.max_connections)
            .acquire_timeout(policy.acquire_timeout())
            .idle_timeout(policy.recycle_after())
            .test_before_acquire(policy.pre_ping)
            .connect_with(options)
            .await
            .map_err(|e| {
                ThreadlineError::setup(SetupStage::Persistence, "could not open postgres pool", e)
            })?;

        let checkpointer = PostgresCheckpointer::new(pool);
        checkpointer.setup().await.map_err(|e| {
            ThreadlineError::setup(SetupStage::Persistence, "could not prepare checkpoint table", e)
        })?;

        tracing::info!(
            %mode,
            max_connections = policy.max_connections,
            pre_ping = policy.pre_ping,
            recycle_secs = policy.recycle_secs,
            "postgres checkpointer ready"
        );
        Ok(Arc::new(checkpointer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolPolicy;

    #[test]
    fn connect_options_from_fields() {
        let config = DatabaseConfig {
            target: ConnectionTarget::Fields {
                host: "db.internal".into(),
                port: 6543,
                database: "agents".into(),
                user: "svc".into(),
                password: "s3cret".into(),
            },
            pool: PoolPolicy::default(),
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("agents"));
        assert_eq!(options.get_username(), "svc");
    }

    #[test]
    fn connect_options_from_url() {
        let config = DatabaseConfig::from_url("postgres://svc:pw@localhost:5433/agents");
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("agents"));
    }

    #[test]
    fn invalid_url_is_configuration_error() {
        let config = DatabaseConfig::from_url("postgres://[::1");
        assert!(matches!(
            connect_options(&config),
            Err(ThreadlineError::Configuration(_))
        ));
    }
}
