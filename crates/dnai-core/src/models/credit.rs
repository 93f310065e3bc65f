//! Credit balance model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user credit balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: Uuid,

    /// Spendable credits
    pub balance: Decimal,

    pub total_purchased: Decimal,

    pub total_used: Decimal,

    /// Set by the backend when the balance is exhausted; blocks billable operations
    pub services_paused: bool,

    /// Balance under which the UI shows a low-credit warning
    pub low_credit_threshold: Decimal,
}

impl CreditBalance {
    /// A fresh, empty balance for a user that has never bought credits
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            total_purchased: Decimal::ZERO,
            total_used: Decimal::ZERO,
            services_paused: false,
            low_credit_threshold: Decimal::ZERO,
        }
    }

    #[inline]
    pub fn is_low(&self) -> bool {
        self.balance <= self.low_credit_threshold
    }
}

/// Arguments of the `deduct_call_credits` procedure
#[derive(Debug, Clone)]
pub struct CallCreditDeduction {
    pub user_id: Uuid,
    pub call_id: Uuid,
    pub agent_id: Uuid,
    pub duration_seconds: i64,
    pub credits_per_minute: Decimal,
}

/// Arguments of the `deduct_agent_creation_credits` procedure
#[derive(Debug, Clone)]
pub struct AgentCreditDeduction {
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
}

/// Arguments of the `add_credits` procedure
#[derive(Debug, Clone)]
pub struct CreditGrant {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: String,
    pub purchase_id: Option<Uuid>,
}
