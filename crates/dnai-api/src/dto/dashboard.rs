//! Dashboard DTOs

use dnai_core::models::{InboundNumber, VoiceAgent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query string shared by the dashboard endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    /// today, week, month or all
    pub range: Option<String>,
    pub agent_id: Option<Uuid>,
    pub number_id: Option<Uuid>,
    /// IANA zone of the viewer, e.g. `America/New_York`
    pub tz: Option<String>,
}

/// Entry of the agent / number selectors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub id: Uuid,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl From<VoiceAgent> for FilterOption {
    fn from(agent: VoiceAgent) -> Self {
        Self {
            id: agent.id,
            label: agent.name,
            phone_number: agent.phone_number,
        }
    }
}

impl From<InboundNumber> for FilterOption {
    fn from(number: InboundNumber) -> Self {
        Self {
            id: number.id,
            label: number.display_name().to_string(),
            phone_number: Some(number.phone_number),
        }
    }
}
