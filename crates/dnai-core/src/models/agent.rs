//! Voice agents and inbound numbers
//!
//! These are the two dimensions the dashboard can be filtered by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured voice agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAgent {
    pub id: Uuid,
    pub name: String,
    pub phone_number: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A phone number routed to the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundNumber {
    pub id: Uuid,
    pub phone_number: String,
    pub phone_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InboundNumber {
    /// Label for selectors, falling back to the number itself
    pub fn display_name(&self) -> &str {
        self.phone_label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.phone_number)
    }
}
