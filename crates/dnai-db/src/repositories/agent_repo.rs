//! Voice agent and inbound number repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    models::{InboundNumber, VoiceAgent},
    traits::AgentRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of AgentRepository
pub struct PgAgentRepository {
    pool: PgPool,
}

impl PgAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PgAgentRepository {
    #[instrument(skip(self))]
    async fn list_agents(&self, user_id: Uuid) -> AppResult<Vec<VoiceAgent>> {
        debug!("Listing voice agents for user {}", user_id);

        let rows = sqlx::query_as::<sqlx::Postgres, AgentRow>(
            r#"
            SELECT id, name, phone_number, status, created_at
            FROM voice_agents
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing voice agents: {}", e);
            AppError::Database(format!("Failed to fetch voice agents: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_numbers(&self, user_id: Uuid) -> AppResult<Vec<InboundNumber>> {
        debug!("Listing inbound numbers for user {}", user_id);

        let rows = sqlx::query_as::<sqlx::Postgres, NumberRow>(
            r#"
            SELECT id, phone_number, phone_label, created_at
            FROM inbound_numbers
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing inbound numbers: {}", e);
            AppError::Database(format!("Failed to fetch inbound numbers: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_number(&self, user_id: Uuid, number_id: Uuid) -> AppResult<Option<InboundNumber>> {
        let row = sqlx::query_as::<sqlx::Postgres, NumberRow>(
            r#"
            SELECT id, phone_number, phone_label, created_at
            FROM inbound_numbers
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(number_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding inbound number {}: {}", number_id, e);
            AppError::Database(format!("Failed to find inbound number: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    name: String,
    phone_number: Option<String>,
    status: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AgentRow> for VoiceAgent {
    fn from(row: AgentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            phone_number: row.phone_number,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NumberRow {
    id: Uuid,
    phone_number: String,
    phone_label: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<NumberRow> for InboundNumber {
    fn from(row: NumberRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            phone_label: row.phone_label,
            created_at: row.created_at,
        }
    }
}
