//! Credit handlers

use crate::dto::{
    validate_request, AgentDeductionRequest, ApiResponse, CallDeductionRequest,
    CreditBalanceResponse, CreditCheckRequest,
};
use actix_web::{web, HttpResponse};
use dnai_auth::AuthenticatedUser;
use dnai_core::AppError;
use dnai_db::PgCreditRepository;
use dnai_services::CreditLedger;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};

fn ledger(pool: &PgPool) -> CreditLedger<PgCreditRepository> {
    CreditLedger::new(Arc::new(PgCreditRepository::new(pool.clone())))
}

/// Current balance; `data` is null when it cannot be read
///
/// GET /api/v1/credits
#[instrument(skip(pool, user), fields(user_id = %user.user_id))]
pub async fn get_balance(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let balance = ledger(pool.get_ref())
        .get_balance(user.user_id)
        .await
        .map(CreditBalanceResponse::from);

    Ok(HttpResponse::Ok().json(ApiResponse::success(balance)))
}

/// POST /api/v1/credits/check
#[instrument(skip(pool, user, req), fields(user_id = %user.user_id))]
pub async fn check_credits(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    req: web::Json<CreditCheckRequest>,
) -> Result<HttpResponse, AppError> {
    let check = ledger(pool.get_ref())
        .has_enough_credits(user.user_id, req.required)
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(check)))
}

/// POST /api/v1/credits/deduct/call
#[instrument(skip(pool, user, req), fields(user_id = %user.user_id))]
pub async fn deduct_call(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    req: web::Json<CallDeductionRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Call deduction")?;

    let outcome = ledger(pool.get_ref())
        .deduct_call_credits(user.user_id, req.call_id, req.agent_id, req.duration_seconds)
        .await;

    if outcome.success {
        info!(call_id = %req.call_id, credits = %outcome.credits_deducted, "Call credits deducted");
    }
    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}

/// POST /api/v1/credits/deduct/agent
#[instrument(skip(pool, user, req), fields(user_id = %user.user_id))]
pub async fn deduct_agent(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    req: web::Json<AgentDeductionRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Agent deduction")?;

    let outcome = ledger(pool.get_ref())
        .deduct_agent_creation_credits(user.user_id, req.agent_id, &req.agent_name)
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}

/// Configure credit routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/credits")
            .route("", web::get().to(get_balance))
            .route("/check", web::post().to(check_credits))
            .route("/deduct/call", web::post().to(deduct_call))
            .route("/deduct/agent", web::post().to(deduct_agent)),
    );
}
