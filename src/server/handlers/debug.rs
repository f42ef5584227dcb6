//! Diagnostics, mounted only when `DEBUG_ENDPOINTS` is enabled

use crate::core::auth::{AuthContext, AuthPolicy};
use crate::core::error::AppResult;
use crate::core::watchlist::{self, UserSetup};
use crate::jobs::{JobKind, RunOptions};
use crate::server::extractors::CurrentUser;
use crate::server::host::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

const CRON_LOG_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

/// Whether a cron key would be accepted; the configured key is never echoed
#[derive(Debug, Serialize, PartialEq)]
pub struct CronAuthReport {
    pub keys_match: bool,
    pub expected_exists: bool,
    pub provided_exists: bool,
    pub expected_length: usize,
    pub provided_length: usize,
}

impl CronAuthReport {
    pub fn new(expected: Option<&str>, provided: Option<&str>) -> Self {
        Self {
            keys_match: AuthPolicy::CronOnly.check(&AuthContext::from_cron_key(expected, provided)),
            expected_exists: expected.is_some(),
            provided_exists: provided.is_some(),
            expected_length: expected.map_or(0, str::len),
            provided_length: provided.map_or(0, str::len),
        }
    }
}

pub async fn cron_auth(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Json<CronAuthReport> {
    Json(CronAuthReport::new(
        state.config.cron_secret_key.as_deref(),
        query.key.as_deref(),
    ))
}

pub async fn user_setup(
    user: CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserSetup>> {
    Ok(Json(
        watchlist::user_setup(state.store.as_ref(), &user.user_id).await?,
    ))
}

pub async fn cron_logs(State(state): State<AppState>) -> Response {
    match state.store.recent_cron_logs(CRON_LOG_LIMIT).await {
        Ok(rows) => Json(json!({
            "success": true,
            "total_runs": rows.len(),
            "recent_runs": rows,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Evening summary for every user, regardless of the market clock
pub async fn evening_summary(State(state): State<AppState>) -> Response {
    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    match state.jobs.run(JobKind::EveningSummaryTest, options).await {
        Ok(report) => Json(json!({
            "success": true,
            "run_id": report.run_id,
            "job": report.job,
            "timestamp": Utc::now().to_rfc3339(),
            "totals": {
                "users_processed": report.totals.users_processed,
                "users_skipped": report.totals.users_skipped,
                "notifications_sent": report.totals.notifications_sent,
                "errors": report.errors,
            },
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_auth_report() {
        let report = CronAuthReport::new(Some("secret"), Some("secret"));
        assert!(report.keys_match);
        assert_eq!(report.expected_length, 6);

        let report = CronAuthReport::new(None, Some("anything"));
        assert!(!report.keys_match);
        assert!(!report.expected_exists);
        assert_eq!(report.provided_length, 8);

        let body = serde_json::to_value(CronAuthReport::new(Some("secret"), None)).unwrap();
        assert!(body.get("expected_key").is_none());
        assert!(!body.to_string().contains("secret"));
    }
}
