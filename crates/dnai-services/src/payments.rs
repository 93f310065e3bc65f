//! Credit purchases through Stripe Checkout
//!
//! - `StripeGateway` talks to the Stripe REST API (form encoded, amounts in cents)
//! - `PaymentService` creates pending purchases and their checkout sessions
//! - `WebhookProcessor` verifies signed events and settles purchases

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    config::StripeConfig,
    models::{
        fallback_invoice_number, CheckoutRequest, CheckoutSession, CouponCategory, NewInvoice,
        NewPurchase, PaymentStatus, Purchase, SessionPayment,
    },
    traits::{CouponRepository, PaymentGateway, PurchaseRepository},
    AppError, AppResult,
};
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::WEBHOOK_TOLERANCE_SECS;
use crate::coupon::CouponEvaluator;
use crate::credits::{credits_for_amount, purchase_grant};

type HmacSha256 = Hmac<Sha256>;

/// Amount in the smallest currency unit, rounded half away from zero
pub fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::from(cents) / Decimal::ONE_HUNDRED
}

/// Name of the checkout line item
pub fn credit_purchase_description(credits: Decimal) -> String {
    format!("Credit Purchase - {} credits", credits.normalize())
}

// ==================== Stripe gateway ====================

/// Stripe Checkout client
pub struct StripeGateway {
    http_client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<JsonValue>,
    amount_total: Option<i64>,
    currency: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    metadata: JsonValue,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn ensure_configured(&self) -> AppResult<()> {
        if self.secret_key.is_empty() {
            return Err(AppError::PaymentProvider(
                "Payment provider is not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("Stripe returned {}", status));
            error!("Stripe request failed ({}): {}", status, message);
            return Err(AppError::PaymentProvider(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::PaymentProvider(format!("Unreadable Stripe response: {}", e)))
    }
}

/// Form fields of a Checkout Session for one credit purchase
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let credits = request.credits_amount.normalize().to_string();
    let purchase_id = request.purchase_id.to_string();
    let user_id = request.user_id.to_string();

    let fields: [(&str, String); 17] = [
        ("mode", "payment".to_string()),
        ("payment_method_types[0]", "card".to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        (
            "line_items[0][price_data][currency]",
            request.currency.to_lowercase(),
        ),
        (
            "line_items[0][price_data][unit_amount]",
            to_cents(request.amount).to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            credit_purchase_description(request.credits_amount),
        ),
        (
            "line_items[0][price_data][product_data][description]",
            format!("Purchase {} credits for your account", credits),
        ),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("client_reference_id", purchase_id.clone()),
        ("metadata[purchase_id]", purchase_id.clone()),
        ("metadata[user_id]", user_id.clone()),
        ("metadata[credits_amount]", credits.clone()),
        ("metadata[type]", "credit_purchase".to_string()),
        // copied onto the payment intent so failure events can find the purchase
        ("payment_intent_data[metadata][purchase_id]", purchase_id),
        ("payment_intent_data[metadata][user_id]", user_id),
        ("payment_intent_data[metadata][credits_amount]", credits),
    ];

    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn payment_intent_id(value: Option<JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(id) => Some(id),
        JsonValue::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(purchase_id = %request.purchase_id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> AppResult<CheckoutSession> {
        self.ensure_configured()?;

        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(|e| {
                error!("Stripe checkout request failed: {}", e);
                AppError::PaymentProvider(e.to_string())
            })?;

        let session: StripeSession = Self::read_response(response).await?;
        let url = session.url.ok_or_else(|| {
            AppError::PaymentProvider("Invalid response from checkout session creation".to_string())
        })?;

        info!("Created checkout session {}", session.id);
        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> AppResult<SessionPayment> {
        self.ensure_configured()?;

        let response = self
            .http_client
            .get(format!("{}/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!("Stripe session lookup failed: {}", e);
                AppError::PaymentProvider(e.to_string())
            })?;

        let session: StripeSession = Self::read_response(response).await?;

        Ok(SessionPayment {
            session_id: session.id,
            payment_status: session.payment_status.unwrap_or_else(|| "unpaid".to_string()),
            payment_intent: payment_intent_id(session.payment_intent),
            amount_total: session.amount_total.map(from_cents),
            currency: session.currency,
            customer_email: session
                .customer_email
                .or_else(|| session.customer_details.and_then(|d| d.email)),
            metadata: session.metadata,
        })
    }
}

// ==================== Webhook signatures ====================

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
///
/// Any `v1` entry may match. The timestamp must be within `tolerance_secs`
/// of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: DateTime<Utc>,
    tolerance_secs: i64,
) -> AppResult<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::WebhookSignature("Missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::WebhookSignature("Missing v1 signature".to_string()));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::WebhookSignature("Malformed timestamp".to_string()))?;
    if (now.timestamp() - signed_at).abs() > tolerance_secs {
        return Err(AppError::WebhookSignature(
            "Timestamp outside the tolerance zone".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if !matched {
        return Err(AppError::WebhookSignature(
            "No signatures found matching the expected signature".to_string(),
        ));
    }

    Ok(())
}

/// Build a `Stripe-Signature` header value for `payload`
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

// ==================== Webhook processing ====================

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: JsonValue,
}

/// What a webhook event changed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    PurchaseCompleted {
        purchase_id: Uuid,
        credits: Decimal,
        invoice_number: Option<String>,
    },
    AlreadyProcessed {
        purchase_id: Uuid,
    },
    PurchaseFailed {
        purchase_id: Uuid,
    },
    Acknowledged {
        event_type: String,
    },
}

fn metadata_value<'a>(object: &'a JsonValue, key: &str) -> Option<&'a str> {
    object
        .get("metadata")
        .and_then(|m| m.get(key))
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
}

fn metadata_uuid(object: &JsonValue, key: &str) -> Option<Uuid> {
    metadata_value(object, key).and_then(|v| Uuid::parse_str(v).ok())
}

/// Settles purchases from Stripe events
pub struct WebhookProcessor<P: PurchaseRepository, K: CouponRepository> {
    purchase_repo: Arc<P>,
    coupons: CouponEvaluator<K>,
    webhook_secret: String,
}

impl<P: PurchaseRepository, K: CouponRepository> WebhookProcessor<P, K> {
    pub fn new(purchase_repo: Arc<P>, coupon_repo: Arc<K>, webhook_secret: String) -> Self {
        Self {
            purchase_repo,
            coupons: CouponEvaluator::new(coupon_repo),
            webhook_secret,
        }
    }

    /// Verify and process a raw webhook delivery
    #[instrument(skip(self, payload, signature))]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> AppResult<WebhookOutcome> {
        if self.webhook_secret.is_empty() {
            error!("Stripe webhook secret is not configured");
            return Err(AppError::Config("Webhook secret not configured".to_string()));
        }

        verify_webhook_signature(payload, signature, &self.webhook_secret, now, WEBHOOK_TOLERANCE_SECS)
            .map_err(|e| {
                warn!("Webhook signature verification failed: {}", e);
                e
            })?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook event: {}", e)))?;

        self.process_event(event).await
    }

    /// Dispatch an already verified event
    pub async fn process_event(&self, event: WebhookEvent) -> AppResult<WebhookOutcome> {
        debug!("Processing webhook event {} ({})", event.id, event.event_type);

        match event.event_type.as_str() {
            "checkout.session.completed" => self.checkout_completed(&event.data.object).await,
            "payment_intent.payment_failed" => self.payment_failed(&event.data.object).await,
            "payment_intent.succeeded" => {
                info!(
                    "PaymentIntent succeeded: {}",
                    event.data.object.get("id").and_then(|v| v.as_str()).unwrap_or("-")
                );
                Ok(WebhookOutcome::Acknowledged {
                    event_type: event.event_type,
                })
            }
            other => {
                info!("Unhandled event type: {}", other);
                Ok(WebhookOutcome::Acknowledged {
                    event_type: event.event_type,
                })
            }
        }
    }

    async fn checkout_completed(&self, session: &JsonValue) -> AppResult<WebhookOutcome> {
        let session_id = session.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        info!("Checkout session completed: {}", session_id);

        let Some(purchase_id) = metadata_uuid(session, "purchase_id") else {
            error!("Missing purchase_id in session metadata");
            return Ok(WebhookOutcome::Acknowledged {
                event_type: "checkout.session.completed".to_string(),
            });
        };

        let Some(pending) = self.purchase_repo.find_by_id(purchase_id).await? else {
            error!("Checkout session {} refers to unknown purchase {}", session_id, purchase_id);
            return Ok(WebhookOutcome::Acknowledged {
                event_type: "checkout.session.completed".to_string(),
            });
        };
        if pending.payment_status == PaymentStatus::Completed {
            info!("Purchase {} already settled, skipping", purchase_id);
            return Ok(WebhookOutcome::AlreadyProcessed { purchase_id });
        }

        if let Some(owner) = metadata_uuid(session, "user_id") {
            if owner != pending.user_id {
                warn!(
                    "Session {} names user {} but purchase {} belongs to {}",
                    session_id, owner, purchase_id, pending.user_id
                );
            }
        }

        let credits = metadata_value(session, "credits_amount")
            .and_then(|v| v.parse::<Decimal>().ok())
            .unwrap_or(pending.credits_amount);
        let grant = purchase_grant(pending.user_id, credits, purchase_id);

        let Some(purchase) = self
            .purchase_repo
            .settle(purchase_id, session_id, session, &grant)
            .await?
        else {
            info!("Purchase {} settled concurrently, skipping", purchase_id);
            return Ok(WebhookOutcome::AlreadyProcessed { purchase_id });
        };

        let invoice = self.issue_invoice(&purchase, credits).await;
        self.record_coupon_usage(&purchase, invoice.as_ref().map(|(id, _)| *id))
            .await;

        info!("Successfully processed payment for purchase {}", purchase_id);
        Ok(WebhookOutcome::PurchaseCompleted {
            purchase_id,
            credits,
            invoice_number: invoice.map(|(_, number)| number),
        })
    }

    /// Count the coupon of a settled purchase against its limits
    async fn record_coupon_usage(&self, purchase: &Purchase, invoice_id: Option<Uuid>) {
        let Some(coupon_id) = purchase.coupon_id else {
            return;
        };

        if let Err(e) = self
            .coupons
            .record_usage(
                coupon_id,
                purchase.user_id,
                purchase.discount_amount,
                invoice_id,
                Some(purchase.id),
            )
            .await
        {
            error!("Error recording coupon usage for purchase {}: {}", purchase.id, e);
        }
    }

    /// Invoice a settled purchase; failures are logged only
    async fn issue_invoice(&self, purchase: &Purchase, credits: Decimal) -> Option<(Uuid, String)> {
        let invoice_number = match self.purchase_repo.generate_invoice_number().await {
            Ok(Some(number)) => number,
            Ok(None) => fallback_invoice_number(Utc::now()),
            Err(e) => {
                warn!("Falling back to a timestamp invoice number: {}", e);
                fallback_invoice_number(Utc::now())
            }
        };

        let invoice = NewInvoice {
            user_id: purchase.user_id,
            purchase_id: purchase.id,
            invoice_number: invoice_number.clone(),
            subtotal: purchase.amount,
            discount_amount: purchase.discount_amount,
            total_amount: purchase.total_amount,
            currency: purchase.currency.clone(),
            items: json!([{
                "description": credit_purchase_description(credits),
                "quantity": 1,
                "unit_price": purchase.amount,
                "total": purchase.total_amount,
            }]),
        };

        match self.purchase_repo.create_invoice(&invoice).await {
            Ok(id) => Some((id, invoice_number)),
            Err(e) => {
                error!("Error creating invoice for purchase {}: {}", purchase.id, e);
                None
            }
        }
    }

    async fn payment_failed(&self, intent: &JsonValue) -> AppResult<WebhookOutcome> {
        let intent_id = intent.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        info!("Payment failed: {}", intent_id);

        let Some(purchase_id) = metadata_uuid(intent, "purchase_id") else {
            return Ok(WebhookOutcome::Acknowledged {
                event_type: "payment_intent.payment_failed".to_string(),
            });
        };

        if self.purchase_repo.mark_failed(purchase_id, intent).await? {
            Ok(WebhookOutcome::PurchaseFailed { purchase_id })
        } else {
            Ok(WebhookOutcome::AlreadyProcessed { purchase_id })
        }
    }
}

// ==================== Checkout ====================

/// A created checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub purchase_id: Uuid,
    pub session_id: String,
    pub url: String,
    pub amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub credits_amount: Decimal,
}

/// Result of checking a session after the redirect back from Stripe
#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub session_id: String,
    pub payment_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub metadata: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Starts credit purchases
pub struct PaymentService<P, G, K>
where
    P: PurchaseRepository,
    G: PaymentGateway,
    K: CouponRepository,
{
    purchase_repo: Arc<P>,
    gateway: Arc<G>,
    coupons: CouponEvaluator<K>,
    currency: String,
}

impl<P, G, K> PaymentService<P, G, K>
where
    P: PurchaseRepository,
    G: PaymentGateway,
    K: CouponRepository,
{
    pub fn new(purchase_repo: Arc<P>, gateway: Arc<G>, coupon_repo: Arc<K>, currency: &str) -> Self {
        Self {
            purchase_repo,
            gateway,
            coupons: CouponEvaluator::new(coupon_repo),
            currency: currency.to_string(),
        }
    }

    /// Create a pending purchase of `amount` and its Stripe checkout.
    ///
    /// Credits are granted for the full amount; a coupon only lowers the charge.
    /// The coupon is stored on the purchase and counted once it is paid.
    #[instrument(skip(self, success_url, cancel_url))]
    pub async fn start_checkout(
        &self,
        user_id: Uuid,
        amount: Decimal,
        coupon_code: Option<&str>,
        success_url: &str,
        cancel_url: &str,
    ) -> AppResult<CheckoutOutcome> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Amount must be greater than 0".to_string()));
        }

        let mut discount = Decimal::ZERO;
        let mut coupon_id = None;

        if let Some(code) = coupon_code.filter(|c| !c.trim().is_empty()) {
            let validation = self
                .coupons
                .validate(code, user_id, amount, CouponCategory::Purchases, Utc::now())
                .await;

            if !validation.valid {
                return Err(AppError::Validation(
                    validation
                        .error
                        .unwrap_or_else(|| "Invalid or expired coupon code".to_string()),
                ));
            }

            discount = validation.discount_amount;
            coupon_id = validation.coupon.map(|c| c.id);
        }

        let total = amount - discount;
        if total <= Decimal::ZERO {
            return Err(AppError::Validation(
                "The discounted total must be greater than 0".to_string(),
            ));
        }

        let credits = credits_for_amount(amount);
        let purchase = self
            .purchase_repo
            .create(&NewPurchase {
                user_id,
                amount,
                discount_amount: discount,
                total_amount: total,
                credits_amount: credits,
                currency: self.currency.clone(),
                coupon_id,
            })
            .await?;

        let session = self
            .gateway
            .create_checkout_session(&CheckoutRequest {
                purchase_id: purchase.id,
                user_id,
                amount: total,
                credits_amount: credits,
                currency: self.currency.clone(),
                success_url: success_url.to_string(),
                cancel_url: cancel_url.to_string(),
            })
            .await?;

        self.purchase_repo
            .set_provider_session(purchase.id, &session.session_id)
            .await?;

        info!(
            "Checkout {} started for purchase {} ({} credits)",
            session.session_id, purchase.id, credits
        );

        Ok(CheckoutOutcome {
            purchase_id: purchase.id,
            session_id: session.session_id,
            url: session.url,
            amount,
            discount_amount: discount,
            total_amount: total,
            credits_amount: credits,
        })
    }

    /// Check a checkout session of `user_id`
    #[instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> AppResult<PaymentVerification> {
        if session_id.trim().is_empty() {
            return Err(AppError::MissingField("session_id".to_string()));
        }

        let session = self.gateway.retrieve_session(session_id).await?;

        let owner = session
            .metadata
            .get("user_id")
            .and_then(|v| v.as_str())
            .and_then(|v| Uuid::parse_str(v).ok());
        if let Some(owner) = owner {
            if owner != user_id {
                warn!("User {} tried to verify session {} of {}", user_id, session_id, owner);
                return Err(AppError::Forbidden);
            }
        }

        let paid = session.is_paid();
        Ok(PaymentVerification {
            success: paid,
            session_id: session.session_id,
            payment_status: session.payment_status,
            payment_intent: session.payment_intent,
            amount_total: session.amount_total,
            currency: session.currency,
            customer_email: session.customer_email,
            metadata: session.metadata,
            error: if paid {
                None
            } else {
                Some("Payment not completed".to_string())
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::tests::{half_off, MockCouponRepository};
    use chrono::TimeZone;
    use dnai_core::models::CreditGrant;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    const SECRET: &str = "whsec_test_secret";

    #[derive(Default)]
    struct MockPurchaseRepository {
        purchases: Mutex<Vec<Purchase>>,
        invoices: Mutex<Vec<NewInvoice>>,
        invoice_number: Option<String>,
        grants: Mutex<Vec<CreditGrant>>,
        /// Settlements that fail on the credit grant before one succeeds
        failing_grants: Mutex<u32>,
    }

    impl MockPurchaseRepository {
        fn with_pending(purchase: Purchase) -> Self {
            Self {
                purchases: Mutex::new(vec![purchase]),
                ..Default::default()
            }
        }

        fn status_of(&self, id: Uuid) -> Option<PaymentStatus> {
            self.purchases
                .lock()
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.payment_status)
        }
    }

    #[async_trait]
    impl PurchaseRepository for MockPurchaseRepository {
        async fn create(&self, purchase: &NewPurchase) -> AppResult<Purchase> {
            let created = Purchase {
                id: Uuid::new_v4(),
                user_id: purchase.user_id,
                amount: purchase.amount,
                discount_amount: purchase.discount_amount,
                total_amount: purchase.total_amount,
                credits_amount: purchase.credits_amount,
                currency: purchase.currency.clone(),
                payment_status: PaymentStatus::Pending,
                payment_provider_id: None,
                coupon_id: purchase.coupon_id,
                completed_at: None,
                created_at: Utc::now(),
            };
            self.purchases.lock().push(created.clone());
            Ok(created)
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Purchase>> {
            Ok(self.purchases.lock().iter().find(|p| p.id == id).cloned())
        }

        async fn set_provider_session(&self, id: Uuid, session_id: &str) -> AppResult<()> {
            if let Some(p) = self.purchases.lock().iter_mut().find(|p| p.id == id) {
                p.payment_provider_id = Some(session_id.to_string());
            }
            Ok(())
        }

        async fn settle(
            &self,
            id: Uuid,
            provider_id: &str,
            _provider_response: &JsonValue,
            grant: &CreditGrant,
        ) -> AppResult<Option<Purchase>> {
            let mut purchases = self.purchases.lock();
            let Some(p) = purchases
                .iter_mut()
                .find(|p| p.id == id && p.payment_status != PaymentStatus::Completed)
            else {
                return Ok(None);
            };

            let mut failing = self.failing_grants.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::Database("transient".to_string()));
            }

            p.payment_status = PaymentStatus::Completed;
            p.payment_provider_id = Some(provider_id.to_string());
            p.completed_at = Some(Utc::now());
            self.grants.lock().push(grant.clone());
            Ok(Some(p.clone()))
        }

        async fn mark_failed(&self, id: Uuid, _provider_response: &JsonValue) -> AppResult<bool> {
            let mut purchases = self.purchases.lock();
            match purchases
                .iter_mut()
                .find(|p| p.id == id && p.payment_status == PaymentStatus::Pending)
            {
                Some(p) => {
                    p.payment_status = PaymentStatus::Failed;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn generate_invoice_number(&self) -> AppResult<Option<String>> {
            Ok(self.invoice_number.clone())
        }

        async fn create_invoice(&self, invoice: &NewInvoice) -> AppResult<Uuid> {
            self.invoices.lock().push(invoice.clone());
            Ok(Uuid::new_v4())
        }
    }

    #[derive(Default)]
    struct MockGateway {
        requests: Mutex<Vec<CheckoutRequest>>,
        session: Option<SessionPayment>,
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> AppResult<CheckoutSession> {
            self.requests.lock().push(request.clone());
            Ok(CheckoutSession {
                session_id: "cs_test_123".to_string(),
                url: "https://checkout.stripe.com/c/pay/cs_test_123".to_string(),
            })
        }

        async fn retrieve_session(&self, _session_id: &str) -> AppResult<SessionPayment> {
            self.session
                .clone()
                .ok_or_else(|| AppError::PaymentProvider("No such checkout.session".to_string()))
        }
    }

    fn pending_purchase(user_id: Uuid) -> Purchase {
        Purchase {
            id: Uuid::new_v4(),
            user_id,
            amount: dec!(20),
            discount_amount: dec!(0),
            total_amount: dec!(20),
            credits_amount: dec!(100),
            currency: "usd".to_string(),
            payment_status: PaymentStatus::Pending,
            payment_provider_id: None,
            coupon_id: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn completed_event(purchase: &Purchase) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_123",
                "payment_status": "paid",
                "metadata": {
                    "purchase_id": purchase.id.to_string(),
                    "user_id": purchase.user_id.to_string(),
                    "credits_amount": "100",
                    "type": "credit_purchase"
                }
            }}
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_to_cents_rounds_half_up() {
        assert_eq!(to_cents(dec!(20)), 2000);
        assert_eq!(to_cents(dec!(19.995)), 2000);
        assert_eq!(to_cents(dec!(0.014)), 1);
        assert_eq!(from_cents(1999), dec!(19.99));
    }

    #[test]
    fn test_checkout_form_fields() {
        let request = CheckoutRequest {
            purchase_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(15.50),
            credits_amount: dec!(100.00),
            currency: "USD".to_string(),
            success_url: "https://app.example.com/billing?success=true".to_string(),
            cancel_url: "https://app.example.com/billing".to_string(),
        };

        let form = checkout_form(&request);
        let field = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(field("mode"), "payment");
        assert_eq!(field("line_items[0][price_data][unit_amount]"), "1550");
        assert_eq!(field("line_items[0][price_data][currency]"), "usd");
        assert_eq!(
            field("line_items[0][price_data][product_data][name]"),
            "Credit Purchase - 100 credits"
        );
        assert_eq!(field("client_reference_id"), request.purchase_id.to_string());
        assert_eq!(field("metadata[type]"), "credit_purchase");
        assert_eq!(
            field("payment_intent_data[metadata][purchase_id]"),
            request.purchase_id.to_string()
        );
    }

    #[test]
    fn test_signature_roundtrip_and_tampering() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_webhook_payload(payload, SECRET, now().timestamp()).unwrap();

        assert!(verify_webhook_signature(payload, &header, SECRET, now(), 300).is_ok());

        let tampered = br#"{"id":"evt_2"}"#;
        assert!(matches!(
            verify_webhook_signature(tampered, &header, SECRET, now(), 300),
            Err(AppError::WebhookSignature(_))
        ));

        assert!(verify_webhook_signature(payload, &header, "whsec_other", now(), 300).is_err());
    }

    #[test]
    fn test_signature_rejects_stale_and_malformed_headers() {
        let payload = b"{}";
        let stale = sign_webhook_payload(payload, SECRET, now().timestamp() - 301).unwrap();
        assert!(verify_webhook_signature(payload, &stale, SECRET, now(), 300).is_err());

        assert!(verify_webhook_signature(payload, "v1=abc", SECRET, now(), 300).is_err());
        assert!(verify_webhook_signature(payload, "t=123", SECRET, now(), 300).is_err());
        assert!(verify_webhook_signature(payload, "", SECRET, now(), 300).is_err());
    }

    #[test]
    fn test_signature_accepts_any_v1_entry() {
        let payload = b"{}";
        let valid = sign_webhook_payload(payload, SECRET, now().timestamp()).unwrap();
        let v1 = valid.split(",v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", now().timestamp(), v1);

        assert!(verify_webhook_signature(payload, &header, SECRET, now(), 300).is_ok());
    }

    #[tokio::test]
    async fn test_checkout_completed_settles_once() {
        let user_id = Uuid::new_v4();
        let purchase = pending_purchase(user_id);
        let purchases = Arc::new(MockPurchaseRepository {
            invoice_number: Some("INV-2026-000042".to_string()),
            ..MockPurchaseRepository::with_pending(purchase.clone())
        });
        let credits = Arc::new(MockCouponRepository::default());
        let processor = WebhookProcessor::new(purchases.clone(), credits.clone(), SECRET.into());

        let outcome = processor.process_event(completed_event(&purchase)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::PurchaseCompleted {
                purchase_id: purchase.id,
                credits: dec!(100),
                invoice_number: Some("INV-2026-000042".to_string()),
            }
        );
        assert_eq!(purchases.status_of(purchase.id), Some(PaymentStatus::Completed));
        {
            let grants = purchases.grants.lock();
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].transaction_type, "purchase");
            assert_eq!(grants[0].purchase_id, Some(purchase.id));
        }
        {
            let invoices = purchases.invoices.lock();
            assert_eq!(invoices.len(), 1);
            assert_eq!(invoices[0].items[0]["description"], "Credit Purchase - 100 credits");
        }

        // redelivery changes nothing
        let again = processor.process_event(completed_event(&purchase)).await.unwrap();
        assert_eq!(again, WebhookOutcome::AlreadyProcessed { purchase_id: purchase.id });
        assert_eq!(purchases.grants.lock().len(), 1);
        assert_eq!(purchases.invoices.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_grant_is_settled_on_redelivery() {
        let purchase = pending_purchase(Uuid::new_v4());
        let purchases = Arc::new(MockPurchaseRepository {
            failing_grants: Mutex::new(1),
            ..MockPurchaseRepository::with_pending(purchase.clone())
        });
        let processor = WebhookProcessor::new(
            purchases.clone(),
            Arc::new(MockCouponRepository::default()),
            SECRET.into(),
        );

        let first = processor.process_event(completed_event(&purchase)).await;
        assert!(matches!(first, Err(AppError::Database(_))));
        assert_eq!(purchases.status_of(purchase.id), Some(PaymentStatus::Pending));
        assert!(purchases.grants.lock().is_empty());
        assert!(purchases.invoices.lock().is_empty());

        let retry = processor.process_event(completed_event(&purchase)).await.unwrap();
        assert!(matches!(retry, WebhookOutcome::PurchaseCompleted { .. }));
        assert_eq!(purchases.status_of(purchase.id), Some(PaymentStatus::Completed));
        assert_eq!(purchases.grants.lock().len(), 1);
        assert_eq!(purchases.invoices.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_coupon_counted_only_once_paid() {
        let purchases = Arc::new(MockPurchaseRepository::default());
        let coupons = Arc::new(MockCouponRepository {
            coupon: Some(half_off()),
            ..Default::default()
        });
        let service = PaymentService::new(
            purchases.clone(),
            Arc::new(MockGateway::default()),
            coupons.clone(),
            "usd",
        );
        let user_id = Uuid::new_v4();

        let outcome = service
            .start_checkout(user_id, dec!(20), Some("half"), "https://ok", "https://cancel")
            .await
            .unwrap();

        let pending = purchases.find_by_id(outcome.purchase_id).await.unwrap().unwrap();
        assert_eq!(pending.payment_status, PaymentStatus::Pending);
        assert_eq!(pending.coupon_id, coupons.coupon.as_ref().map(|c| c.id));
        assert!(coupons.usages.lock().is_empty());
        assert_eq!(*coupons.increments.lock(), 0);

        let processor = WebhookProcessor::new(purchases.clone(), coupons.clone(), SECRET.into());
        processor.process_event(completed_event(&pending)).await.unwrap();
        processor.process_event(completed_event(&pending)).await.unwrap();

        let usages = coupons.usages.lock();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].user_id, user_id);
        assert_eq!(usages[0].discount_amount, dec!(5));
        assert_eq!(usages[0].purchase_id, Some(pending.id));
        assert!(usages[0].invoice_id.is_some());
        assert_eq!(*coupons.increments.lock(), 1);
    }

    #[tokio::test]
    async fn test_invoice_number_falls_back_to_timestamp() {
        let purchase = pending_purchase(Uuid::new_v4());
        let purchases = Arc::new(MockPurchaseRepository::with_pending(purchase.clone()));
        let processor = WebhookProcessor::new(
            purchases.clone(),
            Arc::new(MockCouponRepository::default()),
            SECRET.into(),
        );

        processor.process_event(completed_event(&purchase)).await.unwrap();

        assert!(purchases.invoices.lock()[0].invoice_number.starts_with("INV-"));
    }

    #[tokio::test]
    async fn test_payment_failed_marks_pending_purchase() {
        let purchase = pending_purchase(Uuid::new_v4());
        let purchases = Arc::new(MockPurchaseRepository::with_pending(purchase.clone()));
        let processor = WebhookProcessor::new(
            purchases.clone(),
            Arc::new(MockCouponRepository::default()),
            SECRET.into(),
        );
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": "pi_1",
                "metadata": { "purchase_id": purchase.id.to_string() }
            }}
        }))
        .unwrap();

        let outcome = processor.process_event(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::PurchaseFailed { purchase_id: purchase.id });
        assert_eq!(purchases.status_of(purchase.id), Some(PaymentStatus::Failed));
    }

    #[tokio::test]
    async fn test_unhandled_events_are_acknowledged() {
        let processor = WebhookProcessor::new(
            Arc::new(MockPurchaseRepository::default()),
            Arc::new(MockCouponRepository::default()),
            SECRET.into(),
        );
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_3",
            "type": "customer.created",
            "data": { "object": {} }
        }))
        .unwrap();

        let outcome = processor.process_event(event).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Acknowledged {
                event_type: "customer.created".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_handle_rejects_bad_signature_and_missing_secret() {
        let payload = br#"{"id":"evt_1","type":"customer.created","data":{"object":{}}}"#;
        let processor = WebhookProcessor::new(
            Arc::new(MockPurchaseRepository::default()),
            Arc::new(MockCouponRepository::default()),
            SECRET.into(),
        );

        let result = processor.handle(payload, "t=1,v1=00", now()).await;
        assert!(matches!(result, Err(AppError::WebhookSignature(_))));

        let header = sign_webhook_payload(payload, SECRET, now().timestamp()).unwrap();
        assert!(processor.handle(payload, &header, now()).await.is_ok());

        let unconfigured = WebhookProcessor::new(
            Arc::new(MockPurchaseRepository::default()),
            Arc::new(MockCouponRepository::default()),
            String::new(),
        );
        assert!(matches!(
            unconfigured.handle(payload, &header, now()).await,
            Err(AppError::Config(_))
        ));
    }

    fn payment_service(
        gateway: Arc<MockGateway>,
        coupons: MockCouponRepository,
    ) -> (
        Arc<MockPurchaseRepository>,
        PaymentService<MockPurchaseRepository, MockGateway, MockCouponRepository>,
    ) {
        let purchases = Arc::new(MockPurchaseRepository::default());
        let service = PaymentService::new(purchases.clone(), gateway, Arc::new(coupons), "usd");
        (purchases, service)
    }

    #[tokio::test]
    async fn test_start_checkout_without_coupon() {
        let gateway = Arc::new(MockGateway::default());
        let (purchases, service) = payment_service(gateway.clone(), MockCouponRepository::default());
        let user_id = Uuid::new_v4();

        let outcome = service
            .start_checkout(user_id, dec!(20), None, "https://ok", "https://cancel")
            .await
            .unwrap();

        assert_eq!(outcome.credits_amount, dec!(100));
        assert_eq!(outcome.total_amount, dec!(20));
        assert_eq!(outcome.session_id, "cs_test_123");

        let stored = purchases.find_by_id(outcome.purchase_id).await.unwrap().unwrap();
        assert_eq!(stored.payment_provider_id.as_deref(), Some("cs_test_123"));
        assert_eq!(gateway.requests.lock()[0].amount, dec!(20));
    }

    #[tokio::test]
    async fn test_start_checkout_applies_coupon() {
        let gateway = Arc::new(MockGateway::default());
        let coupons = MockCouponRepository {
            coupon: Some(half_off()),
            ..Default::default()
        };
        let (_purchases, service) = payment_service(gateway.clone(), coupons);

        let outcome = service
            .start_checkout(Uuid::new_v4(), dec!(20), Some("half"), "https://ok", "https://cancel")
            .await
            .unwrap();

        assert_eq!(outcome.discount_amount, dec!(5));
        assert_eq!(outcome.total_amount, dec!(15));
        // credits follow the undiscounted amount
        assert_eq!(outcome.credits_amount, dec!(100));
        assert_eq!(gateway.requests.lock()[0].amount, dec!(15));
    }

    #[tokio::test]
    async fn test_start_checkout_rejects_bad_input() {
        let (_p, service) =
            payment_service(Arc::new(MockGateway::default()), MockCouponRepository::default());

        let result = service
            .start_checkout(Uuid::new_v4(), dec!(0), None, "https://ok", "https://cancel")
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = service
            .start_checkout(Uuid::new_v4(), dec!(10), Some("NOPE"), "https://ok", "https://cancel")
            .await;
        match result {
            Err(AppError::Validation(message)) => {
                assert_eq!(message, "Invalid or expired coupon code")
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.purchase_id)),
        }
    }

    #[tokio::test]
    async fn test_verify_payment() {
        let user_id = Uuid::new_v4();
        let gateway = Arc::new(MockGateway {
            session: Some(SessionPayment {
                session_id: "cs_test_123".to_string(),
                payment_status: "paid".to_string(),
                payment_intent: Some("pi_1".to_string()),
                amount_total: Some(dec!(20)),
                currency: Some("usd".to_string()),
                customer_email: None,
                metadata: json!({ "user_id": user_id.to_string() }),
            }),
            ..Default::default()
        });
        let (_p, service) = payment_service(gateway, MockCouponRepository::default());

        let verification = service.verify_payment(user_id, "cs_test_123").await.unwrap();
        assert!(verification.success);
        assert_eq!(verification.amount_total, Some(dec!(20)));
        assert!(verification.error.is_none());

        let other_user = service.verify_payment(Uuid::new_v4(), "cs_test_123").await;
        assert!(matches!(other_user, Err(AppError::Forbidden)));
    }
}
