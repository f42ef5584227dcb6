//! `/cron/*` endpoints for the external scheduler

use crate::jobs::{JobKind, RunOptions, RunReport};
use crate::server::extractors::CronCaller;
use crate::server::host::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct CronQuery {
    /// Unparseable values fall back to the default of 1
    hours_back: Option<String>,
    force: Option<String>,
}

impl CronQuery {
    fn options(&self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            hours_back: self
                .hours_back
                .as_deref()
                .and_then(|h| h.trim().parse().ok())
                .unwrap_or(defaults.hours_back),
            force: self.force.as_deref() == Some("true"),
            now: None,
        }
    }
}

#[derive(Serialize)]
struct CronResponse<'a> {
    ok: bool,
    #[serde(flatten)]
    report: &'a RunReport,
}

async fn run(state: AppState, job: JobKind, query: CronQuery) -> Response {
    match state.jobs.run(job, query.options()).await {
        Ok(report) => Json(CronResponse {
            ok: true,
            report: &report,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(job = job.name(), error = %e, "cron run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn bse_announcements(
    _: CronCaller,
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> Response {
    run(state, JobKind::BseAnnouncements, query).await
}

pub async fn hourly_spike_alerts(
    _: CronCaller,
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> Response {
    run(state, JobKind::HourlySpikeAlerts, query).await
}

pub async fn evening_summary(
    _: CronCaller,
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> Response {
    run(state, JobKind::EveningSummary, query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_options() {
        let query = CronQuery {
            hours_back: Some("6".to_string()),
            force: Some("true".to_string()),
        };
        let options = query.options();
        assert_eq!(options.hours_back, 6);
        assert!(options.force);

        let garbage = CronQuery {
            hours_back: Some("soon".to_string()),
            force: Some("yes".to_string()),
        };
        let options = garbage.options();
        assert_eq!(options.hours_back, 1);
        assert!(!options.force);
    }
}
