//! Credit DTOs

use dnai_core::models::CreditBalance;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Balance card
#[derive(Debug, Clone, Serialize)]
pub struct CreditBalanceResponse {
    pub balance: Decimal,
    pub total_purchased: Decimal,
    pub total_used: Decimal,
    pub services_paused: bool,
    pub low_credit_threshold: Decimal,
    pub is_low: bool,
}

impl From<CreditBalance> for CreditBalanceResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            is_low: balance.is_low(),
            balance: balance.balance,
            total_purchased: balance.total_purchased,
            total_used: balance.total_used,
            services_paused: balance.services_paused,
            low_credit_threshold: balance.low_credit_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditCheckRequest {
    pub required: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallDeductionRequest {
    pub call_id: Uuid,
    pub agent_id: Uuid,
    #[validate(range(min = 0, message = "Duration cannot be negative"))]
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AgentDeductionRequest {
    pub agent_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Agent name is required"))]
    pub agent_name: String,
}
