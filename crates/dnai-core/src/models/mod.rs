//! Domain models for the DNAi backend
//!
//! This module contains all the core domain models used throughout the application.

pub mod agent;
pub mod call;
pub mod coupon;
pub mod credit;
pub mod notification;
pub mod package;
pub mod purchase;
pub mod verification;

pub use agent::{InboundNumber, VoiceAgent};
pub use call::{normalize_lead_flag, CallFilter, CallRecord, CallStatus};
pub use coupon::{Coupon, CouponCategory, CouponUsageData, DiscountType};
pub use credit::{AgentCreditDeduction, CallCreditDeduction, CreditBalance, CreditGrant};
pub use notification::{DeliveryReceipt, EmailMessage, SmsMessage};
pub use package::{
    render_feature_template, Package, PackageFeature, PackageVariable, PackageWithDetails,
};
pub use purchase::{
    fallback_invoice_number, CheckoutRequest, CheckoutSession, NewInvoice, NewPurchase,
    PaymentStatus, Purchase, SessionPayment,
};
pub use verification::{
    DeviceInfo, LoginActivity, NewLoginActivity, NewNotification, NewPhoneToken, OnboardingStep,
    PhoneVerificationToken, SecurityEvent, VerificationProfile, MAX_PHONE_CODE_ATTEMPTS,
};
