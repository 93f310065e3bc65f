//! Notification DTOs

use dnai_core::models::EmailMessage;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendEmailRequest {
    #[validate(email)]
    pub to: String,
    #[validate(length(min = 1, max = 255, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub html: String,
    pub text: Option<String>,
    #[validate(email)]
    pub from: Option<String>,
}

impl From<SendEmailRequest> for EmailMessage {
    fn from(req: SendEmailRequest) -> Self {
        Self {
            to: req.to,
            subject: req.subject,
            html: req.html,
            text: req.text,
            from: req.from,
        }
    }
}
