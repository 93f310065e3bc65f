//! Purchase and invoice repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    models::{CreditGrant, NewInvoice, NewPurchase, PaymentStatus, Purchase},
    traits::PurchaseRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PURCHASE_COLUMNS: &str = r#"
    id, user_id, amount,
    COALESCE(discount_amount, 0) AS discount_amount,
    COALESCE(total_amount, amount) AS total_amount,
    credits_amount, currency, payment_status,
    payment_provider_id, coupon_id, completed_at, created_at
"#;

/// PostgreSQL implementation of PurchaseRepository
pub struct PgPurchaseRepository {
    pool: PgPool,
}

impl PgPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_status(s: &str) -> PaymentStatus {
        PaymentStatus::from_str(s).unwrap_or_else(|| {
            warn!("Unknown payment status '{}', treating as pending", s);
            PaymentStatus::Pending
        })
    }
}

#[async_trait]
impl PurchaseRepository for PgPurchaseRepository {
    #[instrument(skip(self, purchase), fields(user_id = %purchase.user_id))]
    async fn create(&self, purchase: &NewPurchase) -> AppResult<Purchase> {
        let query = format!(
            r#"
            INSERT INTO purchases (
                user_id, amount, subtotal, discount_amount, total_amount,
                credits_amount, currency, payment_status, coupon_id
            )
            VALUES ($1, $2, $2, $3, $4, $5, $6, 'pending', $7)
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, PurchaseRow>(&query)
            .bind(purchase.user_id)
            .bind(purchase.amount)
            .bind(purchase.discount_amount)
            .bind(purchase.total_amount)
            .bind(purchase.credits_amount)
            .bind(&purchase.currency)
            .bind(purchase.coupon_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating purchase: {}", e);
                AppError::Database(format!("Failed to create purchase: {}", e))
            })?;

        info!("Created pending purchase {}", row.id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Purchase>> {
        let query = format!("SELECT {} FROM purchases WHERE id = $1", PURCHASE_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, PurchaseRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding purchase {}: {}", id, e);
                AppError::Database(format!("Failed to find purchase: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn set_provider_session(&self, id: Uuid, session_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE purchases SET payment_provider_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error attaching session to purchase {}: {}", id, e);
            AppError::Database(format!("Failed to update purchase: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self, provider_response, grant), fields(credits = %grant.amount))]
    async fn settle(
        &self,
        id: Uuid,
        provider_id: &str,
        provider_response: &JsonValue,
        grant: &CreditGrant,
    ) -> AppResult<Option<Purchase>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start settlement transaction: {}", e);
            AppError::Database(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            r#"
            UPDATE purchases
            SET payment_status = 'completed',
                completed_at = NOW(),
                payment_provider_id = $2,
                payment_provider_response = $3,
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'completed'
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, PurchaseRow>(&query)
            .bind(id)
            .bind(provider_id)
            .bind(provider_response)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error completing purchase {}: {}", id, e);
                AppError::Database(format!("Failed to update purchase: {}", e))
            })?;

        let Some(row) = row else {
            debug!("Purchase {} missing or already completed", id);
            return Ok(None);
        };

        sqlx::query(
            r#"
            SELECT add_credits(
                p_user_id => $1,
                p_amount => $2,
                p_transaction_type => $3,
                p_purchase_id => $4
            )
            "#,
        )
        .bind(grant.user_id)
        .bind(grant.amount)
        .bind(&grant.transaction_type)
        .bind(grant.purchase_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Error adding credits for purchase {}: {}", id, e);
            AppError::Database(format!("Failed to add credits: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement of purchase {}: {}", id, e);
            AppError::Database(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Purchase {} settled, {} credits granted", id, grant.amount);
        Ok(Some(row.into()))
    }

    #[instrument(skip(self, provider_response))]
    async fn mark_failed(&self, id: Uuid, provider_response: &JsonValue) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET payment_status = 'failed',
                payment_provider_response = $2,
                updated_at = NOW()
            WHERE id = $1 AND payment_status = 'pending'
            "#,
        )
        .bind(id)
        .bind(provider_response)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error failing purchase {}: {}", id, e);
            AppError::Database(format!("Failed to update purchase: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn generate_invoice_number(&self) -> AppResult<Option<String>> {
        let number: Option<String> = sqlx::query_scalar("SELECT generate_invoice_number()::text")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Error generating invoice number: {}", e);
                AppError::Database(format!("Failed to generate invoice number: {}", e))
            })?;

        Ok(number.filter(|n| !n.is_empty()))
    }

    #[instrument(skip(self, invoice), fields(purchase_id = %invoice.purchase_id))]
    async fn create_invoice(&self, invoice: &NewInvoice) -> AppResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO invoices (
                user_id, invoice_number, invoice_date, purchase_id,
                subtotal, discount_amount, total_amount, currency,
                status, paid_at, items, email_sent
            )
            VALUES ($1, $2, CURRENT_DATE, $3, $4, $5, $6, $7, 'paid', NOW(), $8, FALSE)
            RETURNING id
            "#,
        )
        .bind(invoice.user_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.purchase_id)
        .bind(invoice.subtotal)
        .bind(invoice.discount_amount)
        .bind(invoice.total_amount)
        .bind(&invoice.currency)
        .bind(&invoice.items)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating invoice: {}", e);
            AppError::Database(format!("Failed to create invoice: {}", e))
        })?;

        info!("Created invoice {} ({})", invoice.invoice_number, id);
        Ok(id)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    discount_amount: Decimal,
    total_amount: Decimal,
    credits_amount: Decimal,
    currency: String,
    payment_status: String,
    payment_provider_id: Option<String>,
    coupon_id: Option<Uuid>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            discount_amount: row.discount_amount,
            total_amount: row.total_amount,
            credits_amount: row.credits_amount,
            currency: row.currency,
            payment_status: PgPurchaseRepository::parse_status(&row.payment_status),
            payment_provider_id: row.payment_provider_id,
            coupon_id: row.coupon_id,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}
