//! Call history repository implementation
//!
//! Read-only access to `call_history`. The lead flag has been stored as a
//! boolean, text and integer over time, so it is read as JSON and normalized
//! here before any caller sees it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    models::{normalize_lead_flag, CallFilter, CallRecord, CallStatus},
    traits::CallRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call history repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self))]
    async fn list_calls(
        &self,
        user_id: Uuid,
        filter: &CallFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<CallRecord>> {
        debug!(
            "Listing calls for user {} agent={:?} number={:?} limit={:?}",
            user_id, filter.agent_id, filter.called_number, limit
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRow>(
            r#"
            SELECT
                id, caller_number, called_number,
                call_status,
                call_duration::bigint AS call_duration,
                call_start_time, call_end_time, call_answered_time,
                call_forwarded_to,
                call_cost::numeric AS call_cost,
                COALESCE(recording_url, '') <> '' AS has_recording,
                COALESCE(transcript, '') <> '' AS has_transcript,
                to_jsonb(is_lead) AS is_lead,
                agent_id, inbound_number_id, deleted_at
            FROM call_history
            WHERE user_id = $1
              AND deleted_at IS NULL
              AND ($2::uuid IS NULL OR agent_id = $2)
              AND ($3::text IS NULL OR called_number = $3)
            ORDER BY call_start_time DESC NULLS LAST
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(filter.agent_id)
        .bind(filter.called_number.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing calls for user {}: {}", user_id, e);
            AppError::Database(format!("Failed to fetch call history: {}", e))
        })?;

        debug!("Fetched {} call records", rows.len());

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    caller_number: Option<String>,
    called_number: Option<String>,
    call_status: Option<String>,
    call_duration: Option<i64>,
    call_start_time: Option<DateTime<Utc>>,
    call_end_time: Option<DateTime<Utc>>,
    call_answered_time: Option<DateTime<Utc>>,
    call_forwarded_to: Option<String>,
    call_cost: Option<Decimal>,
    has_recording: Option<bool>,
    has_transcript: Option<bool>,
    is_lead: Option<JsonValue>,
    agent_id: Option<Uuid>,
    inbound_number_id: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<CallRow> for CallRecord {
    fn from(row: CallRow) -> Self {
        let status = row.call_status.as_deref().and_then(|raw| {
            let parsed = CallStatus::from_str(raw);
            if parsed.is_none() {
                warn!("Call {} has unknown status '{}'", row.id, raw);
            }
            parsed
        });

        Self {
            id: row.id,
            caller_number: row.caller_number,
            called_number: row.called_number,
            status,
            duration_seconds: row.call_duration,
            start_time: row.call_start_time,
            end_time: row.call_end_time,
            answered_time: row.call_answered_time,
            forwarded_to: row.call_forwarded_to,
            cost: row.call_cost,
            has_recording: row.has_recording.unwrap_or(false),
            has_transcript: row.has_transcript.unwrap_or(false),
            is_lead: normalize_lead_flag(row.is_lead.as_ref()),
            agent_id: row.agent_id,
            inbound_number_id: row.inbound_number_id,
            deleted_at: row.deleted_at,
        }
    }
}
