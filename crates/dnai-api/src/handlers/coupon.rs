//! Coupon handlers

use crate::dto::{
    validate_request, ApiResponse, CouponRedeemRequest, CouponRedeemResponse,
    CouponValidateRequest,
};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use dnai_auth::AuthenticatedUser;
use dnai_core::AppError;
use dnai_db::PgCouponRepository;
use dnai_services::CouponEvaluator;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};

fn evaluator(pool: &PgPool) -> CouponEvaluator<PgCouponRepository> {
    CouponEvaluator::new(Arc::new(PgCouponRepository::new(pool.clone())))
}

/// Rejections are returned with 200 and `valid: false`
///
/// POST /api/v1/coupons/validate
#[instrument(skip(pool, user, req), fields(user_id = %user.user_id))]
pub async fn validate_coupon(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    req: web::Json<CouponValidateRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Coupon validation")?;

    let validation = evaluator(pool.get_ref())
        .validate(&req.code, user.user_id, req.amount, req.category, Utc::now())
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(validation)))
}

/// POST /api/v1/coupons/redeem
#[instrument(skip(pool, user, req), fields(user_id = %user.user_id))]
pub async fn redeem_coupon(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    req: web::Json<CouponRedeemRequest>,
) -> Result<HttpResponse, AppError> {
    let usage_id = evaluator(pool.get_ref())
        .record_usage(
            req.coupon_id,
            user.user_id,
            req.discount_amount,
            req.invoice_id,
            req.purchase_id,
        )
        .await?;

    info!(coupon_id = %req.coupon_id, %usage_id, "Coupon redeemed");
    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        CouponRedeemResponse { usage_id },
        "Coupon usage recorded",
    )))
}

/// Configure coupon routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coupons")
            .route("/validate", web::post().to(validate_coupon))
            .route("/redeem", web::post().to(redeem_coupon)),
    );
}
