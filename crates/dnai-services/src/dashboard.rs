//! Dashboard reads
//!
//! Loads the caller's call records once per request and hands them to the
//! statistics and recent-call formatters. Read failures degrade to empty
//! results so the dashboard still renders.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dnai_core::{
    models::{CallFilter, InboundNumber, VoiceAgent},
    traits::{AgentRepository, CallRepository},
    AppResult,
};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::constants::RECENT_CALLS_LIMIT;
use crate::recent_calls::{format_recent_calls, RecentCallRow};
use crate::stats::{compute_statistics, DashboardStatistics, TimeRange};

/// Viewer's zone from an IANA name, falling back to `default`, then UTC
pub fn resolve_timezone(requested: Option<&str>, default: &str) -> Tz {
    requested
        .and_then(|name| name.trim().parse::<Tz>().ok())
        .or_else(|| default.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

pub struct DashboardService<C: CallRepository, A: AgentRepository> {
    call_repo: Arc<C>,
    agent_repo: Arc<A>,
}

impl<C: CallRepository, A: AgentRepository> DashboardService<C, A> {
    pub fn new(call_repo: Arc<C>, agent_repo: Arc<A>) -> Self {
        Self {
            call_repo,
            agent_repo,
        }
    }

    /// Turn the selector ids into a record filter.
    ///
    /// The number selector filters on the called number, so it is looked up
    /// first. `None` means the number does not belong to the user.
    async fn resolve_filter(
        &self,
        user_id: Uuid,
        agent_id: Option<Uuid>,
        number_id: Option<Uuid>,
    ) -> AppResult<Option<CallFilter>> {
        let called_number = match number_id {
            Some(id) => match self.agent_repo.find_number(user_id, id).await? {
                Some(number) => Some(number.phone_number),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(CallFilter {
            agent_id,
            called_number,
        }))
    }

    #[instrument(skip(self))]
    pub async fn statistics(
        &self,
        user_id: Uuid,
        time_range: TimeRange,
        agent_id: Option<Uuid>,
        number_id: Option<Uuid>,
        now: DateTime<Tz>,
    ) -> DashboardStatistics {
        let filter = match self.resolve_filter(user_id, agent_id, number_id).await {
            Ok(Some(filter)) => filter,
            Ok(None) => {
                warn!("Number {:?} not found for user {}", number_id, user_id);
                return DashboardStatistics::empty(time_range);
            }
            Err(e) => {
                error!("Error resolving dashboard filter: {}", e);
                return DashboardStatistics::empty(time_range);
            }
        };

        match self.call_repo.list_calls(user_id, &filter, None).await {
            Ok(records) => compute_statistics(&records, time_range, now),
            Err(e) => {
                error!("Error fetching calls for statistics: {}", e);
                DashboardStatistics::empty(time_range)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn recent_calls(
        &self,
        user_id: Uuid,
        agent_id: Option<Uuid>,
        number_id: Option<Uuid>,
        now: DateTime<Tz>,
    ) -> Vec<RecentCallRow> {
        let filter = match self.resolve_filter(user_id, agent_id, number_id).await {
            Ok(Some(filter)) => filter,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Error resolving dashboard filter: {}", e);
                return Vec::new();
            }
        };

        let (records, agents) = tokio::join!(
            self.call_repo
                .list_calls(user_id, &filter, Some(RECENT_CALLS_LIMIT)),
            self.agent_repo.list_agents(user_id),
        );

        let records = records.unwrap_or_else(|e| {
            error!("Error fetching recent calls: {}", e);
            Vec::new()
        });
        let agents = agents.unwrap_or_else(|e| {
            warn!("Error fetching agents, names fall back: {}", e);
            Vec::new()
        });

        format_recent_calls(&records, &agents, &now)
    }

    pub async fn agents(&self, user_id: Uuid) -> AppResult<Vec<VoiceAgent>> {
        self.agent_repo.list_agents(user_id).await
    }

    pub async fn numbers(&self, user_id: Uuid) -> AppResult<Vec<InboundNumber>> {
        self.agent_repo.list_numbers(user_id).await
    }
}

/// Current time in the viewer's zone
pub fn now_in(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use dnai_core::models::{CallRecord, CallStatus};
    use dnai_core::AppError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockCallRepository {
        records: Vec<CallRecord>,
        fail: bool,
        filters: Mutex<Vec<CallFilter>>,
    }

    #[async_trait]
    impl CallRepository for MockCallRepository {
        async fn list_calls(
            &self,
            _user_id: Uuid,
            filter: &CallFilter,
            limit: Option<i64>,
        ) -> AppResult<Vec<CallRecord>> {
            if self.fail {
                return Err(AppError::Database("connection refused".to_string()));
            }
            self.filters.lock().push(filter.clone());
            let matching = self.records.iter().filter(|r| {
                filter.agent_id.map_or(true, |id| r.agent_id == Some(id))
                    && filter
                        .called_number
                        .as_ref()
                        .map_or(true, |n| r.called_number.as_ref() == Some(n))
            });
            Ok(matching
                .take(limit.unwrap_or(i64::MAX) as usize)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MockAgentRepository {
        agents: Vec<VoiceAgent>,
        numbers: Vec<InboundNumber>,
    }

    #[async_trait]
    impl AgentRepository for MockAgentRepository {
        async fn list_agents(&self, _user_id: Uuid) -> AppResult<Vec<VoiceAgent>> {
            Ok(self.agents.clone())
        }

        async fn list_numbers(&self, _user_id: Uuid) -> AppResult<Vec<InboundNumber>> {
            Ok(self.numbers.clone())
        }

        async fn find_number(
            &self,
            _user_id: Uuid,
            number_id: Uuid,
        ) -> AppResult<Option<InboundNumber>> {
            Ok(self.numbers.iter().find(|n| n.id == number_id).cloned())
        }
    }

    fn now() -> DateTime<Tz> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0)
            .unwrap()
            .with_timezone(&Tz::UTC)
    }

    fn call(called: &str, status: CallStatus, minutes_ago: i64) -> CallRecord {
        CallRecord {
            called_number: Some(called.to_string()),
            status: Some(status),
            duration_seconds: Some(60),
            start_time: Some(now().with_timezone(&Utc) - Duration::minutes(minutes_ago)),
            ..Default::default()
        }
    }

    fn number(phone: &str) -> InboundNumber {
        InboundNumber {
            id: Uuid::new_v4(),
            phone_number: phone.to_string(),
            phone_label: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_timezone() {
        assert_eq!(
            resolve_timezone(Some("America/New_York"), "UTC"),
            chrono_tz::America::New_York
        );
        assert_eq!(
            resolve_timezone(Some("Mars/Olympus"), "Europe/Paris"),
            chrono_tz::Europe::Paris
        );
        assert_eq!(resolve_timezone(None, "nonsense"), Tz::UTC);
    }

    #[tokio::test]
    async fn test_number_filter_uses_called_number() {
        let main = number("+15550001111");
        let calls = Arc::new(MockCallRepository {
            records: vec![
                call("+15550001111", CallStatus::Answered, 10),
                call("+15550002222", CallStatus::Answered, 20),
                call("+15550001111", CallStatus::Missed, 30),
            ],
            ..Default::default()
        });
        let agents = Arc::new(MockAgentRepository {
            numbers: vec![main.clone()],
            ..Default::default()
        });
        let service = DashboardService::new(calls.clone(), agents);

        let stats = service
            .statistics(Uuid::new_v4(), TimeRange::Today, None, Some(main.id), now())
            .await;

        assert_eq!(stats.current.total_calls, 2);
        assert_eq!(stats.current.answered_calls, 1);
        assert_eq!(
            calls.filters.lock()[0].called_number.as_deref(),
            Some("+15550001111")
        );
    }

    #[tokio::test]
    async fn test_unknown_number_yields_empty_results() {
        let calls = Arc::new(MockCallRepository {
            records: vec![call("+15550001111", CallStatus::Answered, 10)],
            ..Default::default()
        });
        let service = DashboardService::new(calls.clone(), Arc::new(MockAgentRepository::default()));

        let stats = service
            .statistics(Uuid::new_v4(), TimeRange::All, None, Some(Uuid::new_v4()), now())
            .await;
        assert_eq!(stats.current.total_calls, 0);

        let rows = service
            .recent_calls(Uuid::new_v4(), None, Some(Uuid::new_v4()), now())
            .await;
        assert!(rows.is_empty());
        assert!(calls.filters.lock().is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_empty() {
        let service = DashboardService::new(
            Arc::new(MockCallRepository {
                fail: true,
                ..Default::default()
            }),
            Arc::new(MockAgentRepository::default()),
        );

        let stats = service
            .statistics(Uuid::new_v4(), TimeRange::Week, None, None, now())
            .await;
        assert_eq!(stats, DashboardStatistics::empty(TimeRange::Week));

        let rows = service.recent_calls(Uuid::new_v4(), None, None, now()).await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_recent_calls_are_limited() {
        let records = (0..20)
            .map(|i| call("+15550001111", CallStatus::Answered, i))
            .collect();
        let service = DashboardService::new(
            Arc::new(MockCallRepository {
                records,
                ..Default::default()
            }),
            Arc::new(MockAgentRepository::default()),
        );

        let rows = service.recent_calls(Uuid::new_v4(), None, None, now()).await;
        assert_eq!(rows.len(), 15);
        assert_eq!(rows[0].time, "Just now");
        assert_eq!(rows[0].agent_name, "Unassigned");
    }
}
