//! Coupon DTOs

use dnai_core::models::CouponCategory;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CouponValidateRequest {
    #[validate(length(max = 64))]
    pub code: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: CouponCategory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponRedeemRequest {
    pub coupon_id: Uuid,
    pub discount_amount: Decimal,
    pub invoice_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CouponRedeemResponse {
    pub usage_id: Uuid,
}
