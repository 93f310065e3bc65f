//! Credit repository implementation
//!
//! Balances live in `user_credits`. Every movement of credits goes through
//! a stored procedure so the balance and the transaction log change together.
//! Purchase grants are issued by the purchase repository inside the
//! settlement transaction.

use async_trait::async_trait;
use dnai_core::{
    models::{AgentCreditDeduction, CallCreditDeduction, CreditBalance},
    traits::CreditRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CreditRepository
pub struct PgCreditRepository {
    pool: PgPool,
}

impl PgCreditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditRepository for PgCreditRepository {
    #[instrument(skip(self))]
    async fn find_balance(&self, user_id: Uuid) -> AppResult<Option<CreditBalance>> {
        debug!("Finding credit balance for user {}", user_id);

        let row = sqlx::query_as::<sqlx::Postgres, CreditRow>(
            r#"
            SELECT
                user_id,
                COALESCE(balance, 0) AS balance,
                COALESCE(total_purchased, 0) AS total_purchased,
                COALESCE(total_used, 0) AS total_used,
                COALESCE(services_paused, FALSE) AS services_paused,
                COALESCE(low_credit_threshold, 0) AS low_credit_threshold
            FROM user_credits
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching credit balance for {}: {}", user_id, e);
            AppError::Database(format!("Failed to fetch credit balance: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn create_balance(&self, user_id: Uuid) -> AppResult<CreditBalance> {
        info!("Creating zero credit balance for user {}", user_id);

        // A concurrent first read may have inserted the row already.
        let row = sqlx::query_as::<sqlx::Postgres, CreditRow>(
            r#"
            INSERT INTO user_credits (user_id, balance, total_purchased, total_used)
            VALUES ($1, 0, 0, 0)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING
                user_id,
                COALESCE(balance, 0) AS balance,
                COALESCE(total_purchased, 0) AS total_purchased,
                COALESCE(total_used, 0) AS total_used,
                COALESCE(services_paused, FALSE) AS services_paused,
                COALESCE(low_credit_threshold, 0) AS low_credit_threshold
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating credit balance for {}: {}", user_id, e);
            AppError::Database(format!("Failed to create credit balance: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(user_id = %deduction.user_id, call_id = %deduction.call_id))]
    async fn deduct_call_credits(&self, deduction: &CallCreditDeduction) -> AppResult<Option<Decimal>> {
        let deducted: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT deduct_call_credits(
                p_user_id => $1,
                p_call_id => $2,
                p_agent_id => $3,
                p_duration_seconds => $4,
                p_credits_per_minute => $5
            )::numeric
            "#,
        )
        .bind(deduction.user_id)
        .bind(deduction.call_id)
        .bind(deduction.agent_id)
        .bind(deduction.duration_seconds)
        .bind(deduction.credits_per_minute)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Error deducting call credits: {}", e);
            AppError::Database(format!("Failed to deduct call credits: {}", e))
        })?;

        debug!("deduct_call_credits returned {:?}", deducted);
        Ok(deducted)
    }

    #[instrument(skip(self), fields(user_id = %deduction.user_id, agent_id = %deduction.agent_id))]
    async fn deduct_agent_creation_credits(
        &self,
        deduction: &AgentCreditDeduction,
    ) -> AppResult<Option<Decimal>> {
        let deducted: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT deduct_agent_creation_credits(
                p_user_id => $1,
                p_agent_id => $2,
                p_agent_name => $3
            )::numeric
            "#,
        )
        .bind(deduction.user_id)
        .bind(deduction.agent_id)
        .bind(&deduction.agent_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Error deducting agent creation credits: {}", e);
            AppError::Database(format!("Failed to deduct agent creation credits: {}", e))
        })?;

        Ok(deducted)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CreditRow {
    user_id: Uuid,
    balance: Decimal,
    total_purchased: Decimal,
    total_used: Decimal,
    services_paused: bool,
    low_credit_threshold: Decimal,
}

impl From<CreditRow> for CreditBalance {
    fn from(row: CreditRow) -> Self {
        Self {
            user_id: row.user_id,
            balance: row.balance,
            total_purchased: row.total_purchased,
            total_used: row.total_used,
            services_paused: row.services_paused,
            low_credit_threshold: row.low_credit_threshold,
        }
    }
}
