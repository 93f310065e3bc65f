//! Notification handlers

use crate::dto::{validate_request, ApiResponse, SendEmailRequest};
use actix_web::{web, HttpResponse};
use dnai_auth::AuthenticatedUser;
use dnai_core::models::EmailMessage;
use dnai_core::traits::EmailSender;
use dnai_core::AppError;
use dnai_services::SendGridEmailSender;
use tracing::instrument;

/// Send a transactional email
///
/// POST /api/v1/notifications/email
#[instrument(skip(sender, user, req), fields(user_id = %user.user_id))]
pub async fn send_email(
    sender: web::Data<SendGridEmailSender>,
    user: AuthenticatedUser,
    req: web::Json<SendEmailRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*req, "Email")?;

    let message = EmailMessage::from(req.into_inner());
    let receipt = sender.send(&message).await?;

    Ok(HttpResponse::Accepted().json(ApiResponse::with_message(receipt, "Email sent")))
}

/// Configure notification routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/notifications").route("/email", web::post().to(send_email)));
}
