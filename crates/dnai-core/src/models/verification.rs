//! Account verification state, security logs and notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Verification flags kept on the user profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationProfile {
    pub user_id: Uuid,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub phone_number: Option<String>,
    pub two_factor_enabled: bool,
    /// pending, submitted, approved or rejected; `None` until the flow starts
    pub kyc_status: Option<String>,
}

impl VerificationProfile {
    /// KYC counts as done once documents have been handed in
    pub fn kyc_submitted(&self) -> bool {
        matches!(
            self.kyc_status.as_deref(),
            Some("submitted") | Some("approved") | Some("rejected")
        )
    }
}

/// The next onboarding screen the user has to pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    VerifyEmail,
    VerifyPhone,
    TwoFactor,
    Kyc,
    Complete,
}

/// Wrong guesses after which a phone code stops being accepted
pub const MAX_PHONE_CODE_ATTEMPTS: i32 = 5;

/// A stored phone OTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone_number: String,
    /// Hex SHA-256 of the code; the plain code is never stored
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PhoneVerificationToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none()
            && self.expires_at > now
            && self.attempts < MAX_PHONE_CODE_ATTEMPTS
    }
}

/// Data for inserting a phone OTP
#[derive(Debug, Clone)]
pub struct NewPhoneToken {
    pub user_id: Uuid,
    pub phone_number: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Device details parsed from a user agent string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: String,
    pub browser: String,
    pub os: String,
}

/// A recorded sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub login_method: String,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Arguments of the `log_login_activity` procedure
#[derive(Debug, Clone)]
pub struct NewLoginActivity {
    pub user_id: Uuid,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_method: String,
}

/// Arguments of the `log_security_event` procedure
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub user_id: Uuid,
    pub event_type: String,
    pub severity: String,
    pub details: JsonValue,
}

/// Arguments of the `create_notification` procedure
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_usable() {
        let now = Utc::now();
        let mut token = PhoneVerificationToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            phone_number: "+15551234567".to_string(),
            code_hash: String::new(),
            expires_at: now + Duration::minutes(10),
            attempts: 0,
            used_at: None,
            created_at: now,
        };
        assert!(token.is_usable(now));

        token.used_at = Some(now);
        assert!(!token.is_usable(now));

        token.used_at = None;
        assert!(!token.is_usable(now + Duration::minutes(11)));

        token.attempts = MAX_PHONE_CODE_ATTEMPTS - 1;
        assert!(token.is_usable(now));
        token.attempts = MAX_PHONE_CODE_ATTEMPTS;
        assert!(!token.is_usable(now));
    }

    #[test]
    fn test_kyc_submitted() {
        let mut profile = VerificationProfile::default();
        assert!(!profile.kyc_submitted());
        profile.kyc_status = Some("pending".to_string());
        assert!(!profile.kyc_submitted());
        profile.kyc_status = Some("submitted".to_string());
        assert!(profile.kyc_submitted());
    }
}
