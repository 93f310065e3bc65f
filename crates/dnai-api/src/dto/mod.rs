//! Data Transfer Objects (DTOs) for API requests and responses

pub mod account;
pub mod common;
pub mod coupon;
pub mod credit;
pub mod dashboard;
pub mod notification;
pub mod package;
pub mod payment;

pub use account::*;
pub use common::*;
pub use coupon::*;
pub use credit::*;
pub use dashboard::*;
pub use notification::*;
pub use package::*;
pub use payment::*;
