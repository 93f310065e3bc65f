//! Credit purchases and invoices

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Payment status of a credit purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credit purchase row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Price before discount
    pub amount: Decimal,
    pub discount_amount: Decimal,
    /// Amount actually charged
    pub total_amount: Decimal,
    pub credits_amount: Decimal,
    pub currency: String,
    pub payment_status: PaymentStatus,
    /// Checkout session id once the user has been redirected
    pub payment_provider_id: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a pending purchase before redirecting to checkout
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub credits_amount: Decimal,
    pub currency: String,
    pub coupon_id: Option<Uuid>,
}

/// Data for inserting a paid invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub user_id: Uuid,
    pub purchase_id: Uuid,
    pub invoice_number: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    /// Line items as stored on the invoice
    pub items: JsonValue,
}

/// What the payment provider needs to open a hosted checkout page
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub purchase_id: Uuid,
    pub user_id: Uuid,
    /// Amount to charge, in major currency units
    pub amount: Decimal,
    pub credits_amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted checkout page created by the payment provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Provider-side state of a checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayment {
    pub session_id: String,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: String,
    pub payment_intent: Option<String>,
    /// Total in major currency units
    pub amount_total: Option<Decimal>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: JsonValue,
}

impl SessionPayment {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// Fallback invoice number used when the numbering procedure fails
pub fn fallback_invoice_number(now: DateTime<Utc>) -> String {
    format!("INV-{}", now.timestamp_millis())
}
