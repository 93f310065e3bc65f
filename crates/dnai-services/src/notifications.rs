//! Outbound email and SMS
//!
//! Both senders only report whether the provider accepted the message;
//! delivery is not tracked.

use async_trait::async_trait;
use dnai_core::{
    config::{EmailConfig, SmsConfig},
    models::{DeliveryReceipt, EmailMessage, SmsMessage},
    traits::{EmailSender, SmsSender},
    AppError, AppResult,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Remove markup, leaving the text between tags
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text
}

fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// SendGrid v3 mail sender
pub struct SendGridEmailSender {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    default_from: String,
}

impl SendGridEmailSender {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        Ok(Self {
            http_client: http_client()?,
            api_key: config.sendgrid_api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            default_from: config.from_address.clone(),
        })
    }

    fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        let text = message
            .text
            .clone()
            .unwrap_or_else(|| strip_html(&message.html));
        let from = message.from.as_deref().unwrap_or(&self.default_from);

        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": from },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": message.html }
            ]
        })
    }
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        if self.api_key.is_empty() {
            return Err(AppError::EmailDelivery(
                "Email provider is not configured".to_string(),
            ));
        }

        let response = self
            .http_client
            .post(format!("{}/mail/send", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| {
                error!("Email request failed: {}", e);
                AppError::EmailDelivery(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SendGrid rejected email ({}): {}", status, body);
            return Err(AppError::EmailDelivery(format!(
                "Provider returned {}",
                status
            )));
        }

        let provider_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        info!("Email accepted by SendGrid");
        Ok(DeliveryReceipt { provider_id })
    }
}

/// Twilio-style SMS sender
pub struct TwilioSmsSender {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: Option<String>,
}

impl TwilioSmsSender {
    pub fn new(config: &SmsConfig) -> AppResult<Self> {
        Ok(Self {
            http_client: http_client()?,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    #[instrument(skip(self, message))]
    async fn send(&self, message: &SmsMessage) -> AppResult<DeliveryReceipt> {
        if !self.is_configured() {
            return Err(AppError::SmsDelivery(
                "SMS gateway is not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let form = [
            ("To", message.to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", message.body.as_str()),
        ];

        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("SMS request failed: {}", e);
                AppError::SmsDelivery(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SMS gateway rejected message ({}): {}", status, body);
            return Err(AppError::SmsDelivery(format!("Gateway returned {}", status)));
        }

        let sent: TwilioMessage = response
            .json()
            .await
            .map_err(|e| AppError::SmsDelivery(format!("Unreadable gateway response: {}", e)))?;

        debug!("SMS accepted: {:?}", sent.sid);
        Ok(DeliveryReceipt {
            provider_id: sent.sid,
        })
    }
}
