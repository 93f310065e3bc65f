//! Coupon repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    models::{Coupon, CouponUsageData, DiscountType},
    traits::CouponRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of CouponRepository
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_discount_type(s: &str) -> DiscountType {
        DiscountType::from_str(s).unwrap_or_else(|| {
            warn!("Unknown discount type '{}', treating as fixed", s);
            DiscountType::Fixed
        })
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    #[instrument(skip(self))]
    async fn find_active_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
        debug!("Looking up coupon {}", code);

        let row = sqlx::query_as::<sqlx::Postgres, CouponRow>(
            r#"
            SELECT
                id, code, description, discount_type, discount_value,
                minimum_purchase_amount, maximum_discount_amount,
                COALESCE(currency, 'USD') AS currency,
                valid_from, valid_until, usage_limit,
                COALESCE(usage_count, 0) AS usage_count,
                COALESCE(per_user_limit, 1) AS per_user_limit,
                is_active, applicable_to,
                COALESCE(metadata, '{}'::jsonb) AS metadata
            FROM coupon_codes
            WHERE code = $1 AND is_active = TRUE
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding coupon {}: {}", code, e);
            AppError::Database(format!("Failed to find coupon: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn count_user_usage(&self, coupon_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_usage WHERE coupon_id = $1 AND user_id = $2",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting coupon usage: {}", e);
            AppError::Database(format!("Failed to count coupon usage: {}", e))
        })?;

        Ok(count)
    }

    #[instrument(skip(self), fields(coupon_id = %usage.coupon_id, user_id = %usage.user_id))]
    async fn insert_usage(&self, usage: &CouponUsageData) -> AppResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO coupon_usage (coupon_id, user_id, invoice_id, purchase_id, discount_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(usage.coupon_id)
        .bind(usage.user_id)
        .bind(usage.invoice_id)
        .bind(usage.purchase_id)
        .bind(usage.discount_amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording coupon usage: {}", e);
            AppError::Database(format!("Failed to record coupon usage: {}", e))
        })?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn increment_usage_count(&self, coupon_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE coupon_codes
            SET usage_count = COALESCE(usage_count, 0) + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(coupon_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating coupon usage count: {}", e);
            AppError::Database(format!("Failed to update coupon usage count: {}", e))
        })?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    discount_type: String,
    discount_value: Decimal,
    minimum_purchase_amount: Option<Decimal>,
    maximum_discount_amount: Option<Decimal>,
    currency: String,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    usage_count: i32,
    per_user_limit: i32,
    is_active: bool,
    applicable_to: Option<String>,
    metadata: JsonValue,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            description: row.description,
            discount_type: PgCouponRepository::parse_discount_type(&row.discount_type),
            discount_value: row.discount_value,
            minimum_purchase_amount: row.minimum_purchase_amount,
            maximum_discount_amount: row.maximum_discount_amount,
            currency: row.currency,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            per_user_limit: row.per_user_limit,
            is_active: row.is_active,
            applicable_to: row.applicable_to,
            metadata: row.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_discount_type() {
        assert_eq!(
            PgCouponRepository::parse_discount_type("percentage"),
            DiscountType::Percentage
        );
        assert_eq!(PgCouponRepository::parse_discount_type("FIXED"), DiscountType::Fixed);
        assert_eq!(PgCouponRepository::parse_discount_type("bogus"), DiscountType::Fixed);
    }
}
