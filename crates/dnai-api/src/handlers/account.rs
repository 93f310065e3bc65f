//! Account verification handlers
//!
//! Onboarding progress, phone verification, 2FA backup codes, login
//! activity and the password policy.

use crate::dto::{
    validate_request, ApiResponse, BackupCodeRequest, LoginActivityRequest,
    LoginActivityResponse, OnboardingQuery, OnboardingResponse, PasswordCheckRequest,
    SendPhoneCodeRequest, VerifyPhoneRequest,
};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use dnai_auth::{validate_password, AuthenticatedUser};
use dnai_core::AppError;
use dnai_db::PgVerificationRepository;
use dnai_services::{
    LoginAttempt, SendGridEmailSender, TwilioSmsSender, VerificationService,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

type Verification =
    VerificationService<PgVerificationRepository, TwilioSmsSender, SendGridEmailSender>;

fn verification(
    pool: &PgPool,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
) -> Verification {
    VerificationService::new(
        Arc::new(PgVerificationRepository::new(pool.clone())),
        sms.into_inner(),
        email.into_inner(),
    )
}

/// GET /api/v1/account/onboarding
#[instrument(skip(pool, sms, email, user), fields(user_id = %user.user_id))]
pub async fn get_onboarding(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    query: web::Query<OnboardingQuery>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let step = verification(pool.get_ref(), sms, email)
        .onboarding_step(user.user_id, query.two_factor_passed)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(OnboardingResponse { step })))
}

/// POST /api/v1/account/phone/send-code
#[instrument(skip(pool, sms, email, user, req), fields(user_id = %user.user_id))]
pub async fn send_phone_code(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
    req: web::Json<SendPhoneCodeRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Phone code")?;

    let expires_at = verification(pool.get_ref(), sms, email)
        .send_phone_code(user.user_id, &req.phone_number, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        serde_json::json!({ "expires_at": expires_at }),
        "Verification code sent",
    )))
}

/// POST /api/v1/account/phone/verify
#[instrument(skip(pool, sms, email, user, req), fields(user_id = %user.user_id))]
pub async fn verify_phone(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
    req: web::Json<VerifyPhoneRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Phone verification")?;

    verification(pool.get_ref(), sms, email)
        .verify_phone_code(user.user_id, &req.phone_number, &req.code, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        serde_json::json!({ "verified": true }),
        "Phone number verified",
    )))
}

/// POST /api/v1/account/2fa/backup-code
#[instrument(skip(pool, sms, email, user, req), fields(user_id = %user.user_id))]
pub async fn use_backup_code(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
    req: web::Json<BackupCodeRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Backup code")?;

    verification(pool.get_ref(), sms, email)
        .use_backup_code(user.user_id, &req.code)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "verified": true }))))
}

/// GET /api/v1/account/login-activity
#[instrument(skip(pool, sms, email, user), fields(user_id = %user.user_id))]
pub async fn list_login_activity(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let activities = verification(pool.get_ref(), sms, email)
        .login_activity(user.user_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(LoginActivityResponse { activities })))
}

/// Record the sign-in that issued the caller's token
///
/// POST /api/v1/account/login-activity
#[instrument(skip(pool, sms, email, user, http, req), fields(user_id = %user.user_id))]
pub async fn record_login(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
    http: HttpRequest,
    req: Option<web::Json<LoginActivityRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    let attempt = LoginAttempt {
        user_id: user.user_id,
        email: user.email.clone(),
        session_id: req.session_id.or_else(|| user.claims.session_id.clone()),
        ip_address: http
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string),
        user_agent: http
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        used_two_factor: req.used_two_factor,
    };

    let record = verification(pool.get_ref(), sms, email)
        .record_login(&attempt)
        .await?;

    info!(new_device = record.new_device, "Login recorded");
    Ok(HttpResponse::Created().json(ApiResponse::success(record)))
}

/// DELETE /api/v1/account/login-activity/{id}
#[instrument(skip(pool, sms, email, user), fields(user_id = %user.user_id))]
pub async fn revoke_session(
    pool: web::Data<PgPool>,
    sms: web::Data<TwilioSmsSender>,
    email: web::Data<SendGridEmailSender>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    verification(pool.get_ref(), sms, email)
        .revoke_session(user.user_id, path.into_inner())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/account/password/check
pub async fn check_password(
    _user: AuthenticatedUser,
    req: web::Json<PasswordCheckRequest>,
) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(validate_password(&req.password)))
}

/// Configure account routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/account")
            .route("/onboarding", web::get().to(get_onboarding))
            .route("/phone/send-code", web::post().to(send_phone_code))
            .route("/phone/verify", web::post().to(verify_phone))
            .route("/2fa/backup-code", web::post().to(use_backup_code))
            .route("/login-activity", web::get().to(list_login_activity))
            .route("/login-activity", web::post().to(record_login))
            .route("/login-activity/{id}", web::delete().to(revoke_session))
            .route("/password/check", web::post().to(check_password)),
    );
}
