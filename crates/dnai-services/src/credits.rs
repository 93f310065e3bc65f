//! Credit ledger
//!
//! Reads balances, decides whether a billable operation may run, and asks
//! the database procedures to deduct credits. Balance mutations happen only
//! inside those procedures.

use dnai_core::{
    models::{AgentCreditDeduction, CallCreditDeduction, CreditBalance, CreditGrant},
    traits::CreditRepository,
    AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{AGENT_CREATION_CREDITS, CALL_CREDITS_PER_MINUTE, CREDITS_PER_DOLLAR};

/// Result of a sufficiency check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditCheck {
    pub has_enough: bool,
    pub current_balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CreditCheck {
    fn insufficient(current_balance: Decimal, message: String) -> Self {
        Self {
            has_enough: false,
            current_balance,
            message: Some(message),
        }
    }
}

/// Result of a deduction request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeductionOutcome {
    pub success: bool,
    pub credits_deducted: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeductionOutcome {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            credits_deducted: Decimal::ZERO,
            error: Some(message),
        }
    }
}

/// Credits charged for a call of `duration_seconds`
pub fn call_credits(duration_seconds: i64) -> Decimal {
    Decimal::from(duration_seconds.max(0)) / Decimal::from(60) * CALL_CREDITS_PER_MINUTE
}

/// Credits bought by `amount` of money
pub fn credits_for_amount(amount: Decimal) -> Decimal {
    amount * CREDITS_PER_DOLLAR
}

/// Credit ledger service
pub struct CreditLedger<R: CreditRepository> {
    credit_repo: Arc<R>,
}

impl<R: CreditRepository> CreditLedger<R> {
    pub fn new(credit_repo: Arc<R>) -> Self {
        Self { credit_repo }
    }

    /// Balance of a user, creating a zero balance on first access.
    ///
    /// `None` when the balance can neither be read nor created.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> Option<CreditBalance> {
        match self.credit_repo.find_balance(user_id).await {
            Ok(Some(balance)) => Some(balance),
            Ok(None) => {
                debug!("No credit balance for user {}, creating one", user_id);
                match self.credit_repo.create_balance(user_id).await {
                    Ok(balance) => Some(balance),
                    Err(e) => {
                        error!("Error creating credits record for {}: {}", user_id, e);
                        None
                    }
                }
            }
            Err(e) => {
                error!("Error fetching credit balance for {}: {}", user_id, e);
                None
            }
        }
    }

    /// Whether the user can pay `required` credits right now
    #[instrument(skip(self))]
    pub async fn has_enough_credits(&self, user_id: Uuid, required: Decimal) -> CreditCheck {
        let Some(balance) = self.get_balance(user_id).await else {
            return CreditCheck::insufficient(
                Decimal::ZERO,
                "Unable to check credit balance. Please try again.".to_string(),
            );
        };

        if balance.services_paused {
            return CreditCheck::insufficient(
                balance.balance,
                "Your services are paused due to insufficient credits. Please purchase credits to continue."
                    .to_string(),
            );
        }

        if balance.balance < required {
            return CreditCheck::insufficient(
                balance.balance,
                format!(
                    "Insufficient credits. This operation requires {} credits. Your current balance: {:.2} credits.",
                    required.normalize(),
                    balance.balance.round_dp(2)
                ),
            );
        }

        CreditCheck {
            has_enough: true,
            current_balance: balance.balance,
            message: None,
        }
    }

    /// Charge a finished call at the per-minute rate
    #[instrument(skip(self))]
    pub async fn deduct_call_credits(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        agent_id: Uuid,
        duration_seconds: i64,
    ) -> DeductionOutcome {
        let expected = call_credits(duration_seconds);
        let deduction = CallCreditDeduction {
            user_id,
            call_id,
            agent_id,
            duration_seconds,
            credits_per_minute: CALL_CREDITS_PER_MINUTE,
        };

        match self.credit_repo.deduct_call_credits(&deduction).await {
            Ok(reported) => {
                let credits = reported.filter(|c| !c.is_zero()).unwrap_or(expected);
                info!("Deducted {} credits for call {}", credits, call_id);
                DeductionOutcome {
                    success: true,
                    credits_deducted: credits,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Error deducting call credits for {}: {}", call_id, e);
                DeductionOutcome::failed(e.to_string())
            }
        }
    }

    /// Charge the creation of a voice agent
    #[instrument(skip(self))]
    pub async fn deduct_agent_creation_credits(
        &self,
        user_id: Uuid,
        agent_id: Uuid,
        agent_name: &str,
    ) -> DeductionOutcome {
        let deduction = AgentCreditDeduction {
            user_id,
            agent_id,
            agent_name: agent_name.to_string(),
        };

        match self.credit_repo.deduct_agent_creation_credits(&deduction).await {
            Ok(reported) => {
                let credits = reported
                    .filter(|c| !c.is_zero())
                    .unwrap_or(AGENT_CREATION_CREDITS);
                info!("Deducted {} credits for agent {}", credits, agent_id);
                DeductionOutcome {
                    success: true,
                    credits_deducted: credits,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Error deducting agent creation credits for {}: {}", agent_id, e);
                DeductionOutcome::failed(e.to_string())
            }
        }
    }
}

/// Arguments for crediting a settled purchase
pub fn purchase_grant(user_id: Uuid, credits: Decimal, purchase_id: Uuid) -> CreditGrant {
    CreditGrant {
        user_id,
        amount: credits,
        transaction_type: "purchase".to_string(),
        purchase_id: Some(purchase_id),
    }
}
