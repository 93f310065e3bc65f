//! Account verification DTOs

use dnai_core::models::{LoginActivity, OnboardingStep};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnboardingQuery {
    /// Whether the user already passed 2FA in this session
    #[serde(default)]
    pub two_factor_passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingResponse {
    pub step: OnboardingStep,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendPhoneCodeRequest {
    #[validate(length(min = 7, max = 20, message = "Invalid phone number"))]
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPhoneRequest {
    #[validate(length(min = 7, max = 20, message = "Invalid phone number"))]
    pub phone_number: String,
    #[validate(length(equal = 6, message = "Verification code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BackupCodeRequest {
    #[validate(length(min = 1, message = "Please enter a backup code"))]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginActivityRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub used_two_factor: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginActivityResponse {
    pub activities: Vec<LoginActivity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordCheckRequest {
    pub password: String,
}
