//! Coupon validation and redemption

use chrono::{DateTime, Utc};
use dnai_core::{
    models::{Coupon, CouponCategory, CouponUsageData, DiscountType},
    traits::CouponRepository,
    AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Why a coupon was rejected, in the order the checks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    CodeRequired,
    Invalid,
    NotYetValid,
    Expired,
    LimitReached,
    UserLimitReached,
    BelowMinimum,
    CategoryMismatch,
}

/// Outcome of a coupon validation
#[derive(Debug, Clone, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub coupon: Option<Coupon>,
    pub discount_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CouponRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CouponValidation {
    fn accepted(coupon: Coupon, discount_amount: Decimal) -> Self {
        Self {
            valid: true,
            coupon: Some(coupon),
            discount_amount,
            reason: None,
            error: None,
        }
    }

    fn rejected(reason: CouponRejection, coupon: Option<Coupon>, message: String) -> Self {
        Self {
            valid: false,
            coupon,
            discount_amount: Decimal::ZERO,
            reason: Some(reason),
            error: Some(message),
        }
    }
}

/// Discount a coupon grants on `amount`, before any eligibility check.
///
/// Clamped to the coupon's maximum discount and then to the amount itself.
pub fn calculate_discount(coupon: &Coupon, amount: Decimal) -> Decimal {
    let mut discount = match coupon.discount_type {
        DiscountType::Percentage => amount * coupon.discount_value / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => coupon.discount_value,
    };

    if let Some(max) = coupon.maximum_discount_amount.filter(|m| !m.is_zero()) {
        discount = discount.min(max);
    }

    discount.min(amount).max(Decimal::ZERO)
}

/// Coupon evaluator
pub struct CouponEvaluator<R: CouponRepository> {
    coupon_repo: Arc<R>,
}

impl<R: CouponRepository> CouponEvaluator<R> {
    pub fn new(coupon_repo: Arc<R>) -> Self {
        Self { coupon_repo }
    }

    /// Check whether `code` can discount a purchase of `amount`.
    ///
    /// Rejections are returned as values; the first failing check wins.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        amount: Decimal,
        category: CouponCategory,
        now: DateTime<Utc>,
    ) -> CouponValidation {
        let code = Coupon::normalize_code(code);
        if code.is_empty() {
            return CouponValidation::rejected(
                CouponRejection::CodeRequired,
                None,
                "Coupon code is required".to_string(),
            );
        }

        let coupon = match self.coupon_repo.find_active_by_code(&code).await {
            Ok(Some(coupon)) => coupon,
            Ok(None) => {
                debug!("No active coupon {}", code);
                return Self::invalid();
            }
            Err(e) => {
                error!("Failed to look up coupon {}: {}", code, e);
                return Self::invalid();
            }
        };

        if now < coupon.valid_from {
            return CouponValidation::rejected(
                CouponRejection::NotYetValid,
                Some(coupon),
                "Coupon code is not yet valid".to_string(),
            );
        }

        if coupon.valid_until.is_some_and(|until| now > until) {
            return CouponValidation::rejected(
                CouponRejection::Expired,
                Some(coupon),
                "Coupon code has expired".to_string(),
            );
        }

        if coupon.global_limit_reached() {
            return CouponValidation::rejected(
                CouponRejection::LimitReached,
                Some(coupon),
                "Coupon code has reached its usage limit".to_string(),
            );
        }

        match self.coupon_repo.count_user_usage(coupon.id, user_id).await {
            Ok(used) if used >= i64::from(coupon.per_user_limit) => {
                return CouponValidation::rejected(
                    CouponRejection::UserLimitReached,
                    Some(coupon),
                    "You have already used this coupon code the maximum number of times"
                        .to_string(),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping per-user limit for coupon {}: {}", coupon.code, e);
            }
        }

        if let Some(minimum) = coupon.minimum_purchase_amount.filter(|m| !m.is_zero()) {
            if amount < minimum {
                return CouponValidation::rejected(
                    CouponRejection::BelowMinimum,
                    Some(coupon),
                    format!("Minimum purchase amount of ${} required", minimum.normalize()),
                );
            }
        }

        if !coupon.applies_to(category) {
            return CouponValidation::rejected(
                CouponRejection::CategoryMismatch,
                Some(coupon),
                "This coupon code is not applicable to this purchase type".to_string(),
            );
        }

        let discount = calculate_discount(&coupon, amount);
        debug!("Coupon {} grants {} on {}", coupon.code, discount, amount);

        CouponValidation::accepted(coupon, discount)
    }

    fn invalid() -> CouponValidation {
        CouponValidation::rejected(
            CouponRejection::Invalid,
            None,
            "Invalid or expired coupon code".to_string(),
        )
    }

    /// Record a redemption.
    ///
    /// The usage row must be written; the counter bump is best effort and
    /// never undoes the usage row.
    #[instrument(skip(self))]
    pub async fn record_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        discount_amount: Decimal,
        invoice_id: Option<Uuid>,
        purchase_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let usage = CouponUsageData {
            coupon_id,
            user_id,
            discount_amount,
            invoice_id,
            purchase_id,
        };

        let usage_id = self.coupon_repo.insert_usage(&usage).await?;

        if let Err(e) = self.coupon_repo.increment_usage_count(coupon_id).await {
            error!("Error updating coupon usage count for {}: {}", coupon_id, e);
        }

        info!("Recorded usage {} of coupon {}", usage_id, coupon_id);
        Ok(usage_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use dnai_core::AppError;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    pub(crate) struct MockCouponRepository {
        pub coupon: Option<Coupon>,
        pub user_usage: i64,
        pub fail_usage_count: bool,
        pub fail_increment: bool,
        pub usages: Mutex<Vec<CouponUsageData>>,
        pub increments: Mutex<u32>,
    }

    #[async_trait]
    impl CouponRepository for MockCouponRepository {
        async fn find_active_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
            Ok(self.coupon.clone().filter(|c| c.code == code && c.is_active))
        }

        async fn count_user_usage(&self, _coupon_id: Uuid, _user_id: Uuid) -> AppResult<i64> {
            if self.fail_usage_count {
                return Err(AppError::Database("connection reset".to_string()));
            }
            Ok(self.user_usage)
        }

        async fn insert_usage(&self, usage: &CouponUsageData) -> AppResult<Uuid> {
            self.usages.lock().push(usage.clone());
            Ok(Uuid::new_v4())
        }

        async fn increment_usage_count(&self, _coupon_id: Uuid) -> AppResult<()> {
            if self.fail_increment {
                return Err(AppError::Database("update failed".to_string()));
            }
            *self.increments.lock() += 1;
            Ok(())
        }
    }

    pub(crate) fn half_off() -> Coupon {
        Coupon {
            code: "HALF".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(50),
            maximum_discount_amount: Some(dec!(5)),
            ..Default::default()
        }
    }

    fn evaluator(repo: MockCouponRepository) -> CouponEvaluator<MockCouponRepository> {
        CouponEvaluator::new(Arc::new(repo))
    }

    fn with_coupon(coupon: Coupon) -> MockCouponRepository {
        MockCouponRepository {
            coupon: Some(coupon),
            ..Default::default()
        }
    }

    async fn validate(
        evaluator: &CouponEvaluator<MockCouponRepository>,
        code: &str,
        amount: Decimal,
    ) -> CouponValidation {
        evaluator
            .validate(code, Uuid::new_v4(), amount, CouponCategory::Purchases, Utc::now())
            .await
    }

    #[tokio::test]
    async fn test_percentage_discount_is_clamped() {
        let evaluator = evaluator(with_coupon(half_off()));

        let result = validate(&evaluator, "half", dec!(20)).await;
        assert!(result.valid);
        assert_eq!(result.discount_amount, dec!(5));

        let result = validate(&evaluator, " HALF ", dec!(6)).await;
        assert!(result.valid);
        assert_eq!(result.discount_amount, dec!(3));
    }

    #[tokio::test]
    async fn test_below_minimum_rejected_before_discount() {
        let mut coupon = half_off();
        coupon.minimum_purchase_amount = Some(dec!(10));
        let evaluator = evaluator(with_coupon(coupon));

        let result = validate(&evaluator, "HALF", dec!(4)).await;

        assert!(!result.valid);
        assert_eq!(result.reason, Some(CouponRejection::BelowMinimum));
        assert_eq!(result.discount_amount, Decimal::ZERO);
        assert_eq!(
            result.error.as_deref(),
            Some("Minimum purchase amount of $10 required")
        );
    }

    #[tokio::test]
    async fn test_per_user_limit_reached() {
        let mut repo = with_coupon(half_off());
        repo.user_usage = 1;
        let evaluator = evaluator(repo);

        let result = validate(&evaluator, "HALF", dec!(20)).await;

        assert!(!result.valid);
        assert_eq!(result.reason, Some(CouponRejection::UserLimitReached));
        assert!(result.error.unwrap().contains("maximum number of times"));
        assert_eq!(result.discount_amount, Decimal::ZERO);
        assert!(result.coupon.is_some());
    }

    #[tokio::test]
    async fn test_usage_lookup_failure_skips_per_user_check() {
        let mut repo = with_coupon(half_off());
        repo.user_usage = 10;
        repo.fail_usage_count = true;
        let evaluator = evaluator(repo);

        let result = validate(&evaluator, "HALF", dec!(20)).await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_missing_and_unknown_codes() {
        let evaluator = evaluator(with_coupon(half_off()));

        let result = validate(&evaluator, "   ", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::CodeRequired));
        assert_eq!(result.error.as_deref(), Some("Coupon code is required"));

        let result = validate(&evaluator, "NOPE", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::Invalid));
        assert!(result.coupon.is_none());
    }

    #[tokio::test]
    async fn test_validity_window() {
        let mut coupon = half_off();
        coupon.valid_from = Utc::now() + Duration::days(1);
        let result = validate(&evaluator(with_coupon(coupon)), "HALF", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::NotYetValid));

        let mut coupon = half_off();
        coupon.valid_until = Some(Utc::now() - Duration::hours(1));
        let result = validate(&evaluator(with_coupon(coupon)), "HALF", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::Expired));
    }

    #[tokio::test]
    async fn test_global_limit_checked_before_per_user_limit() {
        let mut coupon = half_off();
        coupon.usage_limit = Some(100);
        coupon.usage_count = 100;
        let mut repo = with_coupon(coupon);
        repo.user_usage = 5;

        let result = validate(&evaluator(repo), "HALF", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::LimitReached));
    }

    #[tokio::test]
    async fn test_category_mismatch() {
        let mut coupon = half_off();
        coupon.applicable_to = Some("subscriptions".to_string());
        let evaluator = evaluator(with_coupon(coupon));

        let result = validate(&evaluator, "HALF", dec!(20)).await;
        assert_eq!(result.reason, Some(CouponRejection::CategoryMismatch));

        let result = evaluator
            .validate(
                "HALF",
                Uuid::new_v4(),
                dec!(20),
                CouponCategory::Subscriptions,
                Utc::now(),
            )
            .await;
        assert!(result.valid);
    }

    #[test]
    fn test_fixed_discount_never_exceeds_amount() {
        let coupon = Coupon {
            discount_type: DiscountType::Fixed,
            discount_value: dec!(25),
            ..Default::default()
        };

        assert_eq!(calculate_discount(&coupon, dec!(100)), dec!(25));
        assert_eq!(calculate_discount(&coupon, dec!(10)), dec!(10));
    }

    #[test]
    fn test_zero_maximum_means_unlimited() {
        let coupon = Coupon {
            discount_value: dec!(50),
            maximum_discount_amount: Some(Decimal::ZERO),
            ..Default::default()
        };

        assert_eq!(calculate_discount(&coupon, dec!(20)), dec!(10));
    }

    #[tokio::test]
    async fn test_record_usage_survives_counter_failure() {
        let repo = Arc::new(MockCouponRepository {
            fail_increment: true,
            ..Default::default()
        });
        let evaluator = CouponEvaluator::new(repo.clone());
        let coupon_id = Uuid::new_v4();
        let purchase_id = Uuid::new_v4();

        let result = evaluator
            .record_usage(coupon_id, Uuid::new_v4(), dec!(5), None, Some(purchase_id))
            .await;

        assert!(result.is_ok());
        let usages = repo.usages.lock();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].purchase_id, Some(purchase_id));
        assert_eq!(*repo.increments.lock(), 0);
    }

    #[tokio::test]
    async fn test_record_usage_increments_counter() {
        let repo = Arc::new(MockCouponRepository::default());
        let evaluator = CouponEvaluator::new(repo.clone());

        evaluator
            .record_usage(Uuid::new_v4(), Uuid::new_v4(), dec!(2.5), None, None)
            .await
            .unwrap();

        assert_eq!(*repo.increments.lock(), 1);
    }
}
