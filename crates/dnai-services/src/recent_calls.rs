//! Recent calls table
//!
//! Formats the newest call records into display rows.

use chrono::{DateTime, TimeZone, Utc};
use dnai_core::models::{CallRecord, VoiceAgent};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::RECENT_CALLS_LIMIT;

const UNASSIGNED_AGENT: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecentCallStatus {
    Answered,
    Missed,
    Forwarded,
}

impl RecentCallStatus {
    /// Forwarding wins over the call status
    pub fn resolve(record: &CallRecord) -> Self {
        if record.is_forwarded() {
            RecentCallStatus::Forwarded
        } else if record.is_answered() {
            RecentCallStatus::Answered
        } else {
            RecentCallStatus::Missed
        }
    }
}

/// One row of the recent calls table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentCallRow {
    pub id: Uuid,
    pub caller_number: String,
    pub called_number: String,
    pub duration: String,
    pub status: RecentCallStatus,
    pub time: String,
    pub cost: String,
    pub is_lead: bool,
    pub agent_name: String,
    pub has_recording: bool,
    pub has_transcript: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// `m:ss`, or `h:mm:ss` from one hour on
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "0:00".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Long form for KPI cards: "45s", "2m 5s", "1h 1m"
pub fn format_duration_long(seconds: i64) -> String {
    if seconds <= 0 {
        return "0s".to_string();
    }

    if seconds >= 3600 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Cost with four decimals, e.g. `$0.0125`
pub fn format_cost(cost: Option<Decimal>) -> String {
    format!("${:.4}", cost.unwrap_or(Decimal::ZERO).round_dp(4))
}

/// "Just now", "5m ago", "3h ago", "2d ago", then a short date in the
/// viewer's time zone
pub fn relative_time<Tz: TimeZone>(timestamp: Option<DateTime<Utc>>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(at) = timestamp else {
        return "-".to_string();
    };

    let elapsed = now.with_timezone(&Utc) - at;
    let minutes = elapsed.num_minutes();
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        at.with_timezone(&now.timezone())
            .format("%b %-d")
            .to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Format the newest records, at most [`RECENT_CALLS_LIMIT`] of them.
///
/// `records` are expected newest first, as the repository returns them.
pub fn format_recent_calls<Tz: TimeZone>(
    records: &[CallRecord],
    agents: &[VoiceAgent],
    now: &DateTime<Tz>,
) -> Vec<RecentCallRow>
where
    Tz::Offset: std::fmt::Display,
{
    let agent_names: HashMap<Uuid, &str> = agents.iter().map(|a| (a.id, a.name.as_str())).collect();

    records
        .iter()
        .filter(|r| !r.is_deleted())
        .take(RECENT_CALLS_LIMIT as usize)
        .map(|record| RecentCallRow {
            id: record.id,
            caller_number: non_empty(record.caller_number.as_deref())
                .unwrap_or("Unknown")
                .to_string(),
            called_number: non_empty(record.called_number.as_deref())
                .unwrap_or("-")
                .to_string(),
            duration: format_duration(record.duration_seconds.unwrap_or(0)),
            status: RecentCallStatus::resolve(record),
            time: relative_time(record.start_time, now),
            cost: format_cost(record.cost),
            is_lead: record.is_lead,
            agent_name: record
                .agent_id
                .and_then(|id| agent_names.get(&id).copied())
                .filter(|name| !name.is_empty())
                .unwrap_or(UNASSIGNED_AGENT)
                .to_string(),
            has_recording: record.has_recording,
            has_transcript: record.has_transcript,
            started_at: record.start_time,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dnai_core::models::CallStatus;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap()
    }

    fn agent(name: &str) -> VoiceAgent {
        VoiceAgent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone_number: None,
            status: Some("active".to_string()),
            created_at: now(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(5), "0:05");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3661), "1:01:01");
        assert_eq!(format_duration(-3), "0:00");
    }

    #[test]
    fn test_format_duration_long() {
        assert_eq!(format_duration_long(0), "0s");
        assert_eq!(format_duration_long(45), "45s");
        assert_eq!(format_duration_long(125), "2m 5s");
        assert_eq!(format_duration_long(3661), "1h 1m");
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(Some(dec!(0.0125))), "$0.0125");
        assert_eq!(format_cost(Some(dec!(1.5))), "$1.5000");
        assert_eq!(format_cost(Some(dec!(0.123456))), "$0.1235");
        assert_eq!(format_cost(None), "$0.0000");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = now();
        assert_eq!(relative_time(None, &now), "-");
        assert_eq!(relative_time(Some(now - Duration::seconds(30)), &now), "Just now");
        assert_eq!(relative_time(Some(now - Duration::minutes(5)), &now), "5m ago");
        assert_eq!(relative_time(Some(now - Duration::minutes(59)), &now), "59m ago");
        assert_eq!(relative_time(Some(now - Duration::hours(3)), &now), "3h ago");
        assert_eq!(relative_time(Some(now - Duration::days(2)), &now), "2d ago");
        assert_eq!(relative_time(Some(now - Duration::days(9)), &now), "Mar 1");
    }

    #[test]
    fn test_short_date_uses_viewer_zone() {
        let tokyo = now().with_timezone(&chrono_tz::Asia::Tokyo);
        // 20:00 UTC on Feb 20 is already Feb 21 in Tokyo
        let at = Utc.with_ymd_and_hms(2026, 2, 20, 20, 0, 0).unwrap();
        assert_eq!(relative_time(Some(at), &tokyo), "Feb 21");
    }

    #[test]
    fn test_status_precedence() {
        let mut record = CallRecord {
            status: Some(CallStatus::Answered),
            forwarded_to: Some("+15551234567".to_string()),
            ..Default::default()
        };
        assert_eq!(RecentCallStatus::resolve(&record), RecentCallStatus::Forwarded);

        record.forwarded_to = None;
        assert_eq!(RecentCallStatus::resolve(&record), RecentCallStatus::Answered);

        record.status = Some(CallStatus::Busy);
        assert_eq!(RecentCallStatus::resolve(&record), RecentCallStatus::Missed);

        record.status = None;
        assert_eq!(RecentCallStatus::resolve(&record), RecentCallStatus::Missed);
    }

    #[test]
    fn test_row_fallbacks() {
        let sales = agent("Sales Bot");
        let known = CallRecord {
            caller_number: Some("+15550001111".to_string()),
            called_number: Some("+15550002222".to_string()),
            agent_id: Some(sales.id),
            duration_seconds: Some(65),
            has_recording: true,
            start_time: Some(now() - Duration::minutes(2)),
            ..Default::default()
        };
        let orphan = CallRecord {
            agent_id: Some(Uuid::new_v4()),
            ..Default::default()
        };

        let rows = format_recent_calls(&[known, orphan], &[sales], &now());

        assert_eq!(rows[0].agent_name, "Sales Bot");
        assert_eq!(rows[0].duration, "1:05");
        assert_eq!(rows[0].time, "2m ago");
        assert!(rows[0].has_recording);
        assert!(!rows[0].has_transcript);

        assert_eq!(rows[1].agent_name, "Unassigned");
        assert_eq!(rows[1].caller_number, "Unknown");
        assert_eq!(rows[1].called_number, "-");
        assert_eq!(rows[1].time, "-");
        assert_eq!(rows[1].cost, "$0.0000");
    }

    #[test]
    fn test_rows_are_capped() {
        let records: Vec<CallRecord> = (0..20).map(|_| CallRecord::default()).collect();
        let rows = format_recent_calls(&records, &[], &now());
        assert_eq!(rows.len(), RECENT_CALLS_LIMIT as usize);
    }
}
