//! Call record model
//!
//! A logged inbound/outbound call as written by the telephony backend.
//! This service only ever reads these rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Call status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Answered,
    Missed,
    Failed,
    NoAnswer,
    Canceled,
    Busy,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallStatus {
    /// Parse from the stored string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "answered" => Some(CallStatus::Answered),
            "missed" => Some(CallStatus::Missed),
            "failed" => Some(CallStatus::Failed),
            "no-answer" => Some(CallStatus::NoAnswer),
            "canceled" => Some(CallStatus::Canceled),
            "busy" => Some(CallStatus::Busy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Answered => "answered",
            CallStatus::Missed => "missed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Canceled => "canceled",
            CallStatus::Busy => "busy",
        }
    }

    /// Missed, failed, no-answer, canceled and busy all count as missed
    #[inline]
    pub fn is_missed(&self) -> bool {
        !matches!(self, CallStatus::Answered)
    }
}

/// Normalize the lead flag as stored in the row store.
///
/// The column has been written as a boolean, a string and an integer over
/// time. `true`, `"true"`, `1` and `"t"` are leads; anything else is not.
pub fn normalize_lead_flag(value: Option<&JsonValue>) -> bool {
    match value {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::String(s)) => s == "true" || s == "t",
        Some(JsonValue::Number(n)) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// A call history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,

    pub caller_number: Option<String>,

    pub called_number: Option<String>,

    /// `None` when the stored status is missing or outside the vocabulary
    pub status: Option<CallStatus>,

    /// Duration in seconds
    pub duration_seconds: Option<i64>,

    pub start_time: Option<DateTime<Utc>>,

    pub end_time: Option<DateTime<Utc>>,

    pub answered_time: Option<DateTime<Utc>>,

    pub forwarded_to: Option<String>,

    pub cost: Option<Decimal>,

    pub has_recording: bool,

    pub has_transcript: bool,

    /// Already normalized, see [`normalize_lead_flag`]
    pub is_lead: bool,

    pub agent_id: Option<Uuid>,

    pub inbound_number_id: Option<Uuid>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    #[inline]
    pub fn is_answered(&self) -> bool {
        self.status == Some(CallStatus::Answered)
    }

    #[inline]
    pub fn is_missed(&self) -> bool {
        self.status.map(|s| s.is_missed()).unwrap_or(false)
    }

    /// Forwarding is an overlay on top of the status
    #[inline]
    pub fn is_forwarded(&self) -> bool {
        self.forwarded_to
            .as_deref()
            .map(|f| !f.is_empty())
            .unwrap_or(false)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Duration when present and positive
    #[inline]
    pub fn billable_duration(&self) -> Option<i64> {
        self.duration_seconds.filter(|d| *d > 0)
    }
}

impl Default for CallRecord {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            caller_number: None,
            called_number: None,
            status: None,
            duration_seconds: None,
            start_time: None,
            end_time: None,
            answered_time: None,
            forwarded_to: None,
            cost: None,
            has_recording: false,
            has_transcript: false,
            is_lead: false,
            agent_id: None,
            inbound_number_id: None,
            deleted_at: None,
        }
    }
}

/// Agent / number filter applied before aggregation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFilter {
    pub agent_id: Option<Uuid>,
    /// Matches the record's called number
    pub called_number: Option<String>,
}
