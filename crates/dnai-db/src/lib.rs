//! DNAi Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the DNAi backend. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for all domain entities
//! - Stored procedure calls for credit movements, invoices and security logs
//!
//! Every query is scoped to the requesting user and excludes soft-deleted rows.

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use dnai_core::{AppError, AppResult};
pub use sqlx::PgPool;
