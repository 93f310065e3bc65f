//! Dashboard handlers
//!
//! KPI statistics, the recent-calls table and the filter selectors.

use crate::dto::{ApiResponse, DashboardQuery, FilterOption};
use actix_web::{web, HttpResponse};
use dnai_auth::AuthenticatedUser;
use dnai_core::{AppConfig, AppError};
use dnai_db::{PgAgentRepository, PgCallRepository};
use dnai_services::dashboard::now_in;
use dnai_services::{resolve_timezone, DashboardService, TimeRange};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};

fn dashboard_service(pool: &PgPool) -> DashboardService<PgCallRepository, PgAgentRepository> {
    DashboardService::new(
        Arc::new(PgCallRepository::new(pool.clone())),
        Arc::new(PgAgentRepository::new(pool.clone())),
    )
}

fn parse_range(range: Option<&str>) -> Result<TimeRange, AppError> {
    match range {
        Some(r) if !r.trim().is_empty() => TimeRange::parse(r)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown time range '{}'", r))),
        _ => Ok(TimeRange::default()),
    }
}

/// Period statistics with deltas and the status breakdown
///
/// GET /api/v1/dashboard/stats
#[instrument(skip(pool, config, user), fields(user_id = %user.user_id))]
pub async fn get_stats(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DashboardQuery>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let range = parse_range(query.range.as_deref())?;
    let tz = resolve_timezone(query.tz.as_deref(), &config.dashboard.default_timezone);
    debug!(range = %range, tz = %tz, "Computing dashboard statistics");

    let stats = dashboard_service(pool.get_ref())
        .statistics(user.user_id, range, query.agent_id, query.number_id, now_in(tz))
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// The 15 most recent calls as display rows
///
/// GET /api/v1/dashboard/recent-calls
#[instrument(skip(pool, config, user), fields(user_id = %user.user_id))]
pub async fn get_recent_calls(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DashboardQuery>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let tz = resolve_timezone(query.tz.as_deref(), &config.dashboard.default_timezone);

    let rows = dashboard_service(pool.get_ref())
        .recent_calls(user.user_id, query.agent_id, query.number_id, now_in(tz))
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

/// GET /api/v1/agents
#[instrument(skip(pool, user), fields(user_id = %user.user_id))]
pub async fn list_agents(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let agents = dashboard_service(pool.get_ref())
        .agents(user.user_id)
        .await?;

    let options: Vec<FilterOption> = agents.into_iter().map(FilterOption::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(options)))
}

/// GET /api/v1/numbers
#[instrument(skip(pool, user), fields(user_id = %user.user_id))]
pub async fn list_numbers(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let numbers = dashboard_service(pool.get_ref())
        .numbers(user.user_id)
        .await?;

    let options: Vec<FilterOption> = numbers.into_iter().map(FilterOption::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(options)))
}

/// Configure dashboard routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/dashboard")
            .route("/stats", web::get().to(get_stats))
            .route("/recent-calls", web::get().to(get_recent_calls)),
    )
    .route("/agents", web::get().to(list_agents))
    .route("/numbers", web::get().to(list_numbers));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range(None).unwrap(), TimeRange::All);
        assert_eq!(parse_range(Some("")).unwrap(), TimeRange::All);
        assert_eq!(parse_range(Some("Week")).unwrap(), TimeRange::Week);
        assert!(matches!(
            parse_range(Some("decade")),
            Err(AppError::InvalidInput(_))
        ));
    }
}
