//! API layer for the DNAi backend
//!
//! HTTP handlers for the dashboard, credits, coupons, packages, payments,
//! account verification and notifications.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

pub use dto::ApiResponse;

pub use handlers::{
    configure_accounts, configure_coupons, configure_credits, configure_dashboard,
    configure_notifications, configure_packages, configure_payments, health_check,
};
