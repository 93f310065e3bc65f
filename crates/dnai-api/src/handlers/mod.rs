//! HTTP request handlers

pub mod account;
pub mod coupon;
pub mod credit;
pub mod dashboard;
pub mod notification;
pub mod package;
pub mod payment;

use actix_web::HttpResponse;

pub use account::configure as configure_accounts;
pub use coupon::configure as configure_coupons;
pub use credit::configure as configure_credits;
pub use dashboard::configure as configure_dashboard;
pub use notification::configure as configure_notifications;
pub use package::configure as configure_packages;
pub use payment::configure as configure_payments;

/// Health check endpoint
///
/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "dnai-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
