//! Common traits for repositories and external gateways
//!
//! Defines abstractions for database access and the third-party services
//! (payments, email, SMS) the business logic talks to.

use crate::error::AppError;
use crate::models::{
    AgentCreditDeduction, CallCreditDeduction, CallFilter, CallRecord, CheckoutRequest,
    CheckoutSession, Coupon, CouponUsageData, CreditBalance, CreditGrant, DeliveryReceipt,
    EmailMessage, InboundNumber, LoginActivity, NewInvoice, NewLoginActivity, NewNotification,
    NewPhoneToken, NewPurchase, Package, PackageFeature, PackageVariable, PhoneVerificationToken,
    Purchase, SecurityEvent, SessionPayment, SmsMessage, VerificationProfile, VoiceAgent,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Call history, read-only
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Non-deleted calls of a user, newest first, nulls last.
    ///
    /// The lead flag is normalized on the way out.
    async fn list_calls(
        &self,
        user_id: Uuid,
        filter: &CallFilter,
        limit: Option<i64>,
    ) -> Result<Vec<CallRecord>, AppError>;
}

/// Voice agents and inbound numbers
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn list_agents(&self, user_id: Uuid) -> Result<Vec<VoiceAgent>, AppError>;

    async fn list_numbers(&self, user_id: Uuid) -> Result<Vec<InboundNumber>, AppError>;

    async fn find_number(
        &self,
        user_id: Uuid,
        number_id: Uuid,
    ) -> Result<Option<InboundNumber>, AppError>;
}

/// Credit balances and the credit stored procedures
#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// `Ok(None)` when the user has no balance row yet
    async fn find_balance(&self, user_id: Uuid) -> Result<Option<CreditBalance>, AppError>;

    /// Insert a zero balance row
    async fn create_balance(&self, user_id: Uuid) -> Result<CreditBalance, AppError>;

    /// Returns the credits the procedure reports as deducted, if any
    async fn deduct_call_credits(
        &self,
        deduction: &CallCreditDeduction,
    ) -> Result<Option<Decimal>, AppError>;

    async fn deduct_agent_creation_credits(
        &self,
        deduction: &AgentCreditDeduction,
    ) -> Result<Option<Decimal>, AppError>;
}

/// Coupon codes and their usage
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Active coupon with exactly this (already normalized) code
    async fn find_active_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError>;

    async fn count_user_usage(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64, AppError>;

    /// Insert a usage row, returning its id
    async fn insert_usage(&self, usage: &CouponUsageData) -> Result<Uuid, AppError>;

    /// Bump the coupon's usage counter
    async fn increment_usage_count(&self, coupon_id: Uuid) -> Result<(), AppError>;
}

/// Pricing packages
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Active packages ordered by sort order
    async fn list_active(&self) -> Result<Vec<Package>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>, AppError>;

    async fn list_features(&self, package_ids: &[Uuid]) -> Result<Vec<PackageFeature>, AppError>;

    async fn list_variables(&self, package_ids: &[Uuid])
        -> Result<Vec<PackageVariable>, AppError>;
}

/// Credit purchases and invoices
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn create(&self, purchase: &NewPurchase) -> Result<Purchase, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Purchase>, AppError>;

    async fn set_provider_session(&self, id: Uuid, session_id: &str) -> Result<(), AppError>;

    /// Mark a purchase completed and credit `grant` in one transaction.
    ///
    /// Returns `None` when the purchase does not exist or was already
    /// completed. When the grant fails nothing is committed and the purchase
    /// stays pending, so a redelivered event settles it.
    async fn settle(
        &self,
        id: Uuid,
        provider_id: &str,
        provider_response: &serde_json::Value,
        grant: &CreditGrant,
    ) -> Result<Option<Purchase>, AppError>;

    /// Returns whether a pending purchase was updated
    async fn mark_failed(
        &self,
        id: Uuid,
        provider_response: &serde_json::Value,
    ) -> Result<bool, AppError>;

    async fn generate_invoice_number(&self) -> Result<Option<String>, AppError>;

    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Uuid, AppError>;
}

/// Verification flags, OTP tokens, backup codes and security logs
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn find_profile(&self, user_id: Uuid)
        -> Result<Option<VerificationProfile>, AppError>;

    async fn create_phone_token(
        &self,
        token: &NewPhoneToken,
    ) -> Result<PhoneVerificationToken, AppError>;

    /// Unused tokens for the user and phone, newest first
    async fn pending_phone_tokens(
        &self,
        user_id: Uuid,
        phone_number: &str,
    ) -> Result<Vec<PhoneVerificationToken>, AppError>;

    async fn mark_token_used(&self, token_id: Uuid) -> Result<(), AppError>;

    async fn increment_token_attempts(&self, token_id: Uuid) -> Result<(), AppError>;

    async fn set_phone_verified(&self, user_id: Uuid, phone_number: &str)
        -> Result<(), AppError>;

    /// Remove a matching unused backup code; `false` when none matched
    async fn consume_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, AppError>;

    async fn log_security_event(&self, event: &SecurityEvent) -> Result<(), AppError>;

    async fn create_notification(&self, notification: &NewNotification)
        -> Result<(), AppError>;

    async fn log_login_activity(&self, activity: &NewLoginActivity) -> Result<(), AppError>;

    async fn recent_login_activity(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LoginActivity>, AppError>;

    /// Close an active session of the user; `false` when nothing matched
    async fn deactivate_login(&self, user_id: Uuid, activity_id: Uuid) -> Result<bool, AppError>;
}

/// Hosted payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionPayment, AppError>;
}

/// Transactional email provider
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, AppError>;
}

/// SMS provider
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt, AppError>;
}
