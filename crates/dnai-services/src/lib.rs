//! Business logic services for the DNAi backend
//!
//! This crate contains the logic behind the dashboard, the credit ledger,
//! coupons, payments and account verification.
//!
//! # Architecture
//!
//! - Pure computations (statistics, formatting, UA parsing) are free functions
//! - Stateful services own their repositories behind `Arc` and are generic
//!   over the repository traits, so tests run against in-memory mocks
//! - Outbound integrations (Stripe, SendGrid, SMS) implement the gateway
//!   traits from `dnai-core`
//!
//! # Services
//!
//! - `DashboardService` - Filtered call reads feeding the two formatters
//! - `stats` - Period statistics and status breakdown for the dashboard
//! - `recent_calls` - Display rows for the recent-calls table
//! - `CouponEvaluator` - Coupon validation and usage recording
//! - `CreditLedger` - Balance reads, sufficiency checks and deductions
//! - `PaymentService` / `WebhookProcessor` - Credit purchases through Stripe
//! - `PackageCatalog` - Pricing packages with rendered features
//! - `VerificationService` - Onboarding, phone OTP, backup codes, login activity
//! - `RequestSequencer` - Standalone latest-request-wins primitive for callers
//!   that issue overlapping reads

pub mod coupon;
pub mod credits;
pub mod dashboard;
pub mod notifications;
pub mod packages;
pub mod payments;
pub mod recent_calls;
pub mod sequencer;
pub mod stats;
pub mod verification;

pub use coupon::{CouponEvaluator, CouponRejection, CouponValidation};
pub use credits::{CreditCheck, CreditLedger, DeductionOutcome};
pub use dashboard::{resolve_timezone, DashboardService};
pub use notifications::{strip_html, SendGridEmailSender, TwilioSmsSender};
pub use packages::PackageCatalog;
pub use payments::{
    verify_webhook_signature, CheckoutOutcome, PaymentService, PaymentVerification,
    StripeGateway, WebhookOutcome, WebhookProcessor,
};
pub use recent_calls::{format_recent_calls, RecentCallRow};
pub use sequencer::{RequestSequencer, RequestTicket};
pub use stats::{compute_statistics, CallStatusBreakdown, DashboardStatistics, TimeRange};
pub use verification::{
    parse_user_agent, resolve_onboarding_step, LoginAttempt, LoginRecord, VerificationService,
};

/// Business logic constants
pub mod constants {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Credits charged per minute of call time
    pub const CALL_CREDITS_PER_MINUTE: Decimal = dec!(3);

    /// Credits charged for creating a voice agent
    pub const AGENT_CREATION_CREDITS: Decimal = dec!(5);

    /// Credits bought by one unit of currency ($1 = 5 credits)
    pub const CREDITS_PER_DOLLAR: Decimal = dec!(5);

    /// Rows shown in the recent-calls table
    pub const RECENT_CALLS_LIMIT: i64 = 15;

    /// Phone OTP lifetime in minutes
    pub const OTP_EXPIRY_MINUTES: i64 = 10;

    /// Accepted clock skew for webhook signatures, in seconds
    pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

    /// Login activity rows returned to the account page
    pub const LOGIN_ACTIVITY_LIMIT: i64 = 50;

    /// Previous logins compared when deciding whether a device is new
    pub const KNOWN_DEVICE_LOOKBACK: i64 = 5;
}
