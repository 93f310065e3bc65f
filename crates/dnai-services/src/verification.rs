//! Account verification
//!
//! Onboarding step resolution, phone OTP, 2FA backup codes and login activity.

use chrono::{DateTime, Duration, Utc};
use dnai_core::{
    models::{
        DeviceInfo, EmailMessage, LoginActivity, NewLoginActivity, NewNotification, NewPhoneToken,
        OnboardingStep, SecurityEvent, SmsMessage, VerificationProfile,
    },
    traits::{EmailSender, SmsSender, VerificationRepository},
    AppError, AppResult,
};
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{KNOWN_DEVICE_LOOKBACK, LOGIN_ACTIVITY_LIMIT, OTP_EXPIRY_MINUTES};

/// Next onboarding screen for `profile`.
///
/// Two-factor only applies when enabled and not yet passed this session;
/// KYC is required until documents have been submitted.
pub fn resolve_onboarding_step(
    profile: &VerificationProfile,
    two_factor_passed: bool,
) -> OnboardingStep {
    if !profile.email_verified {
        OnboardingStep::VerifyEmail
    } else if !profile.phone_verified {
        OnboardingStep::VerifyPhone
    } else if profile.two_factor_enabled && !two_factor_passed {
        OnboardingStep::TwoFactor
    } else if !profile.kyc_submitted() {
        OnboardingStep::Kyc
    } else {
        OnboardingStep::Complete
    }
}

/// Hex SHA-256 of an OTP code
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

pub fn otp_message(code: &str) -> String {
    format!(
        "Your DNAi verification code is: {}. This code will expire in {} minutes.",
        code, OTP_EXPIRY_MINUTES
    )
}

fn first_match<'a>(user_agent: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| user_agent.find(c).map(|pos| (pos, *c)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, c)| c)
}

/// Device type, browser and OS from a user agent string.
///
/// The browser is the first known name followed by `/version`; the OS is the
/// first known platform name. Either is "Unknown" otherwise.
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let is_mobile = ["Mobile", "Android", "iPhone", "iPad"]
        .iter()
        .any(|m| user_agent.contains(m));

    let browser = ["Chrome/", "Firefox/", "Safari/", "Edge/", "Opera/"]
        .into_iter()
        .filter_map(|b| {
            user_agent.find(b).and_then(|pos| {
                let version = &user_agent[pos + b.len()..];
                version
                    .starts_with(|c: char| c.is_ascii_digit() || c == '.')
                    .then_some((pos, b.trim_end_matches('/')))
            })
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, b)| b)
        .unwrap_or("Unknown");

    let os = first_match(user_agent, &["Windows", "Mac", "Linux", "Android", "iOS"])
        .unwrap_or("Unknown");

    DeviceInfo {
        device_type: if is_mobile { "mobile" } else { "desktop" }.to_string(),
        browser: browser.to_string(),
        os: os.to_string(),
    }
}

/// A sign-in to record
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub used_two_factor: bool,
}

/// Result of recording a sign-in
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LoginRecord {
    pub device: DeviceInfo,
    pub new_device: bool,
    pub alert_sent: bool,
}

pub struct VerificationService<V, S, E>
where
    V: VerificationRepository,
    S: SmsSender,
    E: EmailSender,
{
    verification_repo: Arc<V>,
    sms: Arc<S>,
    email: Arc<E>,
}

impl<V, S, E> VerificationService<V, S, E>
where
    V: VerificationRepository,
    S: SmsSender,
    E: EmailSender,
{
    pub fn new(verification_repo: Arc<V>, sms: Arc<S>, email: Arc<E>) -> Self {
        Self {
            verification_repo,
            sms,
            email,
        }
    }

    #[instrument(skip(self))]
    pub async fn onboarding_step(
        &self,
        user_id: Uuid,
        two_factor_passed: bool,
    ) -> AppResult<OnboardingStep> {
        let profile = self
            .verification_repo
            .find_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", user_id)))?;

        Ok(resolve_onboarding_step(&profile, two_factor_passed))
    }

    /// Store a fresh OTP for `phone_number` and text it to the user
    #[instrument(skip(self))]
    pub async fn send_phone_code(
        &self,
        user_id: Uuid,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(AppError::MissingField("phone_number".to_string()));
        }

        let code = generate_otp();
        let expires_at = now + Duration::minutes(OTP_EXPIRY_MINUTES);

        self.verification_repo
            .create_phone_token(&NewPhoneToken {
                user_id,
                phone_number: phone_number.to_string(),
                code_hash: hash_code(&code),
                expires_at,
            })
            .await?;

        self.sms
            .send(&SmsMessage {
                to: phone_number.to_string(),
                body: otp_message(&code),
            })
            .await?;

        info!("Sent phone verification code to user {}", user_id);
        Ok(expires_at)
    }

    /// Check an OTP against the newest usable token for the phone
    #[instrument(skip(self, code))]
    pub async fn verify_phone_code(
        &self,
        user_id: Uuid,
        phone_number: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let phone_number = phone_number.trim();
        let tokens = self
            .verification_repo
            .pending_phone_tokens(user_id, phone_number)
            .await?;

        let code_hash = hash_code(code);
        let matched = tokens
            .iter()
            .find(|t| t.is_usable(now) && t.code_hash == code_hash);

        let Some(token) = matched else {
            if let Some(newest) = tokens.iter().find(|t| t.is_usable(now)) {
                if let Err(e) = self.verification_repo.increment_token_attempts(newest.id).await {
                    warn!("Error counting failed attempt on {}: {}", newest.id, e);
                }
            }
            debug!("No matching verification code for user {}", user_id);
            return Err(AppError::VerificationFailed(
                "Invalid or expired verification code".to_string(),
            ));
        };

        self.verification_repo.mark_token_used(token.id).await?;
        self.verification_repo
            .set_phone_verified(user_id, phone_number)
            .await?;

        self.log_event(
            user_id,
            "phone_verified",
            json!({ "phone_number": phone_number }),
        )
        .await;
        self.notify(
            user_id,
            "phone_verification",
            "Phone Number Verified",
            "Your phone number has been successfully verified.",
        )
        .await;

        info!("Phone verified for user {}", user_id);
        Ok(())
    }

    /// Consume a 2FA backup code; codes compare case-insensitively
    #[instrument(skip(self, code))]
    pub async fn use_backup_code(&self, user_id: Uuid, code: &str) -> AppResult<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::MissingField("code".to_string()));
        }

        if !self
            .verification_repo
            .consume_backup_code(user_id, &code.to_uppercase())
            .await?
        {
            return Err(AppError::VerificationFailed("Invalid backup code".to_string()));
        }

        self.log_event(user_id, "2fa_backup_code_used", json!({ "used_backup_code": true }))
            .await;
        Ok(())
    }

    /// Record a sign-in and mail a login alert.
    ///
    /// A device is new when none of the previous logins share its device
    /// type and browser. The alert is best effort.
    #[instrument(skip(self, attempt), fields(user_id = %attempt.user_id))]
    pub async fn record_login(&self, attempt: &LoginAttempt) -> AppResult<LoginRecord> {
        let device = parse_user_agent(attempt.user_agent.as_deref().unwrap_or_default());

        let previous = self
            .verification_repo
            .recent_login_activity(attempt.user_id, KNOWN_DEVICE_LOOKBACK)
            .await
            .unwrap_or_else(|e| {
                warn!("Error loading previous logins: {}", e);
                Vec::new()
            });
        let new_device = !previous.iter().any(|login| {
            login.device_type.as_deref() == Some(device.device_type.as_str())
                && login.browser.as_deref() == Some(device.browser.as_str())
        });

        self.verification_repo
            .log_login_activity(&NewLoginActivity {
                user_id: attempt.user_id,
                session_id: attempt.session_id.clone(),
                ip_address: attempt.ip_address.clone(),
                user_agent: attempt.user_agent.clone(),
                login_method: if attempt.used_two_factor { "2fa" } else { "email" }.to_string(),
            })
            .await?;

        let alert_sent = match attempt.email.as_deref() {
            Some(to) => self.send_login_alert(to, attempt, &device, new_device).await,
            None => false,
        };

        Ok(LoginRecord {
            device,
            new_device,
            alert_sent,
        })
    }

    async fn send_login_alert(
        &self,
        to: &str,
        attempt: &LoginAttempt,
        device: &DeviceInfo,
        new_device: bool,
    ) -> bool {
        let summary = format!("{} • {} • {}", device.device_type, device.os, device.browser);
        let ip = attempt.ip_address.as_deref().unwrap_or("Unknown");
        let (subject, heading) = if new_device {
            ("New device sign-in to your DNAi account", "New device sign-in")
        } else {
            ("New sign-in to your DNAi account", "New sign-in")
        };

        let message = EmailMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html: format!(
                "<h2>{}</h2><p>Device: {}</p><p>IP address: {}</p>\
                 <p>If this wasn't you, revoke the session from your security settings.</p>",
                heading, summary, ip
            ),
            text: None,
            from: None,
        };

        match self.email.send(&message).await {
            Ok(_) => true,
            Err(e) => {
                error!("Error sending login alert email: {}", e);
                false
            }
        }
    }

    pub async fn login_activity(&self, user_id: Uuid) -> AppResult<Vec<LoginActivity>> {
        self.verification_repo
            .recent_login_activity(user_id, LOGIN_ACTIVITY_LIMIT)
            .await
    }

    /// Close one of the user's active sessions
    #[instrument(skip(self))]
    pub async fn revoke_session(&self, user_id: Uuid, activity_id: Uuid) -> AppResult<()> {
        let session_id = self
            .verification_repo
            .recent_login_activity(user_id, LOGIN_ACTIVITY_LIMIT)
            .await?
            .into_iter()
            .find(|a| a.id == activity_id)
            .and_then(|a| a.session_id);

        if !self
            .verification_repo
            .deactivate_login(user_id, activity_id)
            .await?
        {
            return Err(AppError::NotFound(format!("active session {}", activity_id)));
        }

        self.log_event(
            user_id,
            "session_revoked",
            json!({ "session_id": session_id, "activity_id": activity_id }),
        )
        .await;
        self.notify(
            user_id,
            "security_alert",
            "Session Revoked",
            "A login session has been revoked from your account.",
        )
        .await;

        Ok(())
    }

    async fn log_event(&self, user_id: Uuid, event_type: &str, details: serde_json::Value) {
        let event = SecurityEvent {
            user_id,
            event_type: event_type.to_string(),
            severity: "medium".to_string(),
            details,
        };
        if let Err(e) = self.verification_repo.log_security_event(&event).await {
            warn!("Error logging security event {}: {}", event_type, e);
        }
    }

    async fn notify(&self, user_id: Uuid, notification_type: &str, title: &str, message: &str) {
        let notification = NewNotification {
            user_id,
            notification_type: notification_type.to_string(),
            title: title.to_string(),
            message: message.to_string(),
        };
        if let Err(e) = self.verification_repo.create_notification(&notification).await {
            warn!("Error creating {} notification: {}", notification_type, e);
        }
    }
}
