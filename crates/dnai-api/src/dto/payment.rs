//! Payment DTOs

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequestBody {
    /// Price in major currency units before any discount
    pub amount: Decimal,
    pub coupon_code: Option<String>,
    /// Defaults to the billing page of the app
    #[validate(url)]
    pub success_url: Option<String>,
    #[validate(url)]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Session ID is required"))]
    pub session_id: String,
}

/// Stripe sends its signature in this header
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";
