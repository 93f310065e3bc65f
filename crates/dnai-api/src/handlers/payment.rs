//! Payment handlers
//!
//! Checkout creation, post-redirect verification and the Stripe webhook.
//! The webhook is authenticated by its signature, not by a bearer token.

use crate::dto::{
    validate_request, ApiResponse, CheckoutRequestBody, VerifyPaymentRequest,
    STRIPE_SIGNATURE_HEADER,
};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use dnai_auth::AuthenticatedUser;
use dnai_core::{AppConfig, AppError};
use dnai_db::{PgCouponRepository, PgPurchaseRepository};
use dnai_services::{PaymentService, StripeGateway, WebhookProcessor};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument, warn};

fn success_url(app_url: &str) -> String {
    format!(
        "{}/billing?payment=success&session_id={{CHECKOUT_SESSION_ID}}",
        app_url.trim_end_matches('/')
    )
}

fn cancel_url(app_url: &str) -> String {
    format!("{}/billing?payment=canceled", app_url.trim_end_matches('/'))
}

fn payment_service(
    pool: &PgPool,
    gateway: Arc<StripeGateway>,
    currency: &str,
) -> PaymentService<PgPurchaseRepository, StripeGateway, PgCouponRepository> {
    PaymentService::new(
        Arc::new(PgPurchaseRepository::new(pool.clone())),
        gateway,
        Arc::new(PgCouponRepository::new(pool.clone())),
        currency,
    )
}

/// Create a pending purchase and its Stripe checkout page
///
/// POST /api/v1/payments/checkout
#[instrument(skip(pool, config, gateway, user, req), fields(user_id = %user.user_id))]
pub async fn create_checkout(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    gateway: web::Data<StripeGateway>,
    user: AuthenticatedUser,
    req: web::Json<CheckoutRequestBody>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Checkout")?;

    let req = req.into_inner();
    let success = req
        .success_url
        .unwrap_or_else(|| success_url(&config.app.url));
    let cancel = req.cancel_url.unwrap_or_else(|| cancel_url(&config.app.url));

    let outcome = payment_service(pool.get_ref(), gateway.into_inner(), &config.stripe.currency)
        .start_checkout(
            user.user_id,
            req.amount,
            req.coupon_code.as_deref(),
            &success,
            &cancel,
        )
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(outcome)))
}

/// POST /api/v1/payments/verify
#[instrument(skip(pool, config, gateway, user, req), fields(user_id = %user.user_id))]
pub async fn verify_payment(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    gateway: web::Data<StripeGateway>,
    user: AuthenticatedUser,
    req: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Payment verification")?;

    let verification =
        payment_service(pool.get_ref(), gateway.into_inner(), &config.stripe.currency)
            .verify_payment(user.user_id, &req.session_id)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(verification)))
}

/// Signed Stripe events; the raw body is needed for the signature
///
/// POST /api/v1/payments/webhook
#[instrument(skip(pool, config, req, body))]
pub async fn stripe_webhook(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook without {} header", STRIPE_SIGNATURE_HEADER);
            AppError::WebhookSignature("Missing signature header".to_string())
        })?;

    let processor = WebhookProcessor::new(
        Arc::new(PgPurchaseRepository::new(pool.get_ref().clone())),
        Arc::new(PgCouponRepository::new(pool.get_ref().clone())),
        config.stripe.webhook_secret.clone(),
    );

    let outcome = processor.handle(&body, signature, Utc::now()).await?;
    info!(?outcome, "Webhook processed");

    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true, "outcome": outcome })))
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/checkout", web::post().to(create_checkout))
            .route("/verify", web::post().to(verify_payment))
            .route("/webhook", web::post().to(stripe_webhook)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_redirect_urls() {
        assert_eq!(
            success_url("https://app.duhanashrah.ai/"),
            "https://app.duhanashrah.ai/billing?payment=success&session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            cancel_url("https://app.duhanashrah.ai"),
            "https://app.duhanashrah.ai/billing?payment=canceled"
        );
    }
}
