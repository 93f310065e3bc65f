//! Dashboard call statistics
//!
//! Turns the call records of one account into the KPI cards of the
//! dashboard. The KPIs honor the selected time range; the status breakdown
//! and the lead count are always computed over every record passed in.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use dnai_core::models::CallRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dashboard time range selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl TimeRange {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" => Some(TimeRange::Today),
            "week" => Some(TimeRange::Week),
            "month" => Some(TimeRange::Month),
            "all" => Some(TimeRange::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Today => "today",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::All => "all",
        }
    }

    /// Display label of the range selector
    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::Today => "Today",
            TimeRange::Week => "This Week",
            TimeRange::Month => "This Month",
            TimeRange::All => "All Time",
        }
    }

    /// Caption shown under the delta badges
    pub fn comparison_label(&self) -> &'static str {
        match self {
            TimeRange::Today => "vs yesterday",
            TimeRange::Week => "vs last week",
            TimeRange::Month => "vs last month",
            TimeRange::All => "all time",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KPI values of one period
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodStatistics {
    pub total_calls: i64,
    pub answered_calls: i64,
    pub missed_calls: i64,
    pub forwarded_calls: i64,
    /// Whole seconds
    pub average_duration: i64,
    pub total_duration: i64,
    pub total_cost: Decimal,
    pub leads_count: i64,
    /// Percent, 0-100
    pub answer_rate: i64,
}

/// Relative change against the previous period; `None` hides the badge
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatDeltas {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_calls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_calls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_calls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_duration: Option<f64>,
}

/// All-time status donut. `forwarded` overlaps the other buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallStatusBreakdown {
    pub completed: i64,
    pub failed: i64,
    pub in_progress: i64,
    pub forwarded: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStatistics {
    pub time_range: TimeRange,
    pub period_label: &'static str,
    pub comparison_label: &'static str,
    #[serde(flatten)]
    pub current: PeriodStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<PeriodStatistics>,
    pub changes: StatDeltas,
    pub status_breakdown: CallStatusBreakdown,
}

impl DashboardStatistics {
    /// Zeroed statistics, shown when the call history cannot be loaded
    pub fn empty(time_range: TimeRange) -> Self {
        Self {
            time_range,
            period_label: time_range.label(),
            comparison_label: time_range.comparison_label(),
            current: PeriodStatistics::default(),
            previous: None,
            changes: StatDeltas::default(),
            status_breakdown: CallStatusBreakdown::default(),
        }
    }
}

/// Half-open `[start, end)` interval; missing bounds are unbounded
#[derive(Debug, Clone, Copy)]
struct Window {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl Window {
    const UNBOUNDED: Window = Window {
        start: None,
        end: None,
    };

    fn contains(&self, record: &CallRecord) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }

        let Some(at) = record.start_time else {
            return false;
        };

        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

/// Local midnight of the day containing `now`
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let naive = now.date_naive().and_time(NaiveTime::MIN);

    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        // midnight skipped by a DST jump
        .unwrap_or_else(|| now.timezone().from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

fn start_of_previous_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    match now.date_naive().pred_opt() {
        Some(day) => {
            let naive = day.and_time(NaiveTime::MIN);
            now.timezone()
                .from_local_datetime(&naive)
                .earliest()
                .unwrap_or_else(|| now.timezone().from_utc_datetime(&naive))
                .with_timezone(&Utc)
        }
        None => start_of_day(now) - Duration::days(1),
    }
}

/// Current and previous window for a range
fn windows<Tz: TimeZone>(range: TimeRange, now: &DateTime<Tz>) -> (Window, Option<Window>) {
    let now_utc = now.with_timezone(&Utc);

    match range {
        TimeRange::Today => {
            let today = start_of_day(now);
            (
                Window {
                    start: Some(today),
                    end: None,
                },
                Some(Window {
                    start: Some(start_of_previous_day(now)),
                    end: Some(today),
                }),
            )
        }
        TimeRange::Week | TimeRange::Month => {
            let span = if range == TimeRange::Week {
                Duration::days(7)
            } else {
                Duration::days(30)
            };
            let start = now_utc - span;
            (
                Window {
                    start: Some(start),
                    end: None,
                },
                Some(Window {
                    start: Some(start - span),
                    end: Some(start),
                }),
            )
        }
        TimeRange::All => (Window::UNBOUNDED, None),
    }
}

/// `(current - previous) / previous`, with 1.0 standing in for growth from zero
pub fn percent_change(current: i64, previous: i64) -> Option<f64> {
    if previous == 0 {
        return if current > 0 { Some(1.0) } else { None };
    }

    Some((current - previous) as f64 / previous as f64)
}

fn rounded_ratio(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    (numerator as f64 / denominator as f64).round() as i64
}

fn period_statistics<'a, I>(records: I) -> PeriodStatistics
where
    I: Iterator<Item = &'a CallRecord>,
{
    let mut stats = PeriodStatistics::default();
    let mut timed_calls = 0;

    for record in records {
        stats.total_calls += 1;

        if record.is_answered() {
            stats.answered_calls += 1;
        }
        if record.is_missed() {
            stats.missed_calls += 1;
        }
        if record.is_forwarded() {
            stats.forwarded_calls += 1;
        }
        if let Some(duration) = record.billable_duration() {
            stats.total_duration += duration;
            timed_calls += 1;
        }
        stats.total_cost += record.cost.unwrap_or(Decimal::ZERO);
    }

    stats.average_duration = rounded_ratio(stats.total_duration, timed_calls);
    stats.answer_rate = rounded_ratio(stats.answered_calls * 100, stats.total_calls);
    stats
}

fn status_breakdown<'a, I>(records: I) -> CallStatusBreakdown
where
    I: Iterator<Item = &'a CallRecord>,
{
    let mut breakdown = CallStatusBreakdown::default();

    for record in records {
        breakdown.total += 1;

        if record.is_answered() {
            if record.end_time.is_some() {
                breakdown.completed += 1;
            } else {
                breakdown.in_progress += 1;
            }
        } else if record.is_missed() {
            breakdown.failed += 1;
        }

        if record.is_forwarded() {
            breakdown.forwarded += 1;
        }
    }

    breakdown
}

/// Compute the dashboard statistics for `time_range` as seen at `now`.
///
/// `now` carries the viewer's time zone, which decides where "today" starts.
/// Soft-deleted records are ignored. Never fails: missing optional fields
/// count as zero or absent.
pub fn compute_statistics<Tz: TimeZone>(
    records: &[CallRecord],
    time_range: TimeRange,
    now: DateTime<Tz>,
) -> DashboardStatistics {
    let live = || records.iter().filter(|r| !r.is_deleted());
    let (current_window, previous_window) = windows(time_range, &now);

    let mut current = period_statistics(live().filter(|r| current_window.contains(r)));
    current.leads_count = live().filter(|r| r.is_lead).count() as i64;

    let previous =
        previous_window.map(|window| period_statistics(live().filter(|r| window.contains(r))));

    let changes = match &previous {
        Some(prev) => StatDeltas {
            total_calls: percent_change(current.total_calls, prev.total_calls),
            answered_calls: percent_change(current.answered_calls, prev.answered_calls),
            missed_calls: percent_change(current.missed_calls, prev.missed_calls),
            average_duration: percent_change(current.average_duration, prev.average_duration),
        },
        None => StatDeltas::default(),
    };

    DashboardStatistics {
        time_range,
        period_label: time_range.label(),
        comparison_label: time_range.comparison_label(),
        current,
        previous,
        changes,
        status_breakdown: status_breakdown(live()),
    }
}
