//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in dnai-core, using sqlx for PostgreSQL access.

pub mod agent_repo;
pub mod call_repo;
pub mod coupon_repo;
pub mod credit_repo;
pub mod package_repo;
pub mod purchase_repo;
pub mod verification_repo;

pub use agent_repo::PgAgentRepository;
pub use call_repo::PgCallRepository;
pub use coupon_repo::PgCouponRepository;
pub use credit_repo::PgCreditRepository;
pub use package_repo::PgPackageRepository;
pub use purchase_repo::PgPurchaseRepository;
pub use verification_repo::PgVerificationRepository;
