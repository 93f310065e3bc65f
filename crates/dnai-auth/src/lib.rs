//! Authentication for the DNAi backend
//!
//! Identity is managed by the hosted auth service. This crate validates the
//! access tokens it issues, exposes the caller as an Actix-web extractor and
//! enforces the password policy.
//!
//! ## Using the extractor in Actix-web
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use dnai_auth::AuthenticatedUser;
//!
//! async fn protected_route(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::AuthenticatedUser;
pub use password::{validate_password, PasswordCheck};
