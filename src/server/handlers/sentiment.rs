//! Sentiment dashboard and its JSON endpoints

use super::page_context;
use crate::core::error::AppResult;
use crate::sentiment::visualizations;
use crate::server::extractors::{CurrentUser, ValidJson};
use crate::server::host::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

const SUMMARY_SCRIPS: usize = 5;
const SUMMARY_HOURS: i64 = 6;

pub async fn sentiment_page(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Html<String>> {
    let mut context = page_context(&jar, &state);
    context.insert("scrips", &state.store.list_scrips(&user.user_id).await?);
    context.insert("user_email", &user.email.unwrap_or_default());
    state.templates.render("sentiment_analysis.html", &context)
}

fn default_hours_back() -> i64 {
    24
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Stock symbol and company name required"))]
    pub stock_symbol: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Stock symbol and company name required"))]
    pub company_name: String,
    #[serde(default = "default_hours_back")]
    pub hours_back: i64,
}

pub async fn analyze_sentiment(
    user: CurrentUser,
    State(state): State<AppState>,
    ValidJson(request): ValidJson<AnalyzeRequest>,
) -> Response {
    tracing::info!(
        user_id = %user.user_id,
        symbol = %request.stock_symbol,
        hours_back = request.hours_back,
        "sentiment analysis requested"
    );
    let report = state
        .sentiment
        .analyze_stock(&request.stock_symbol, &request.company_name, request.hours_back)
        .await;
    let charts = visualizations(&report);

    Json(json!({
        "success": true,
        "sentiment_data": report,
        "visualizations": charts,
    }))
    .into_response()
}

#[derive(Debug, Serialize)]
struct SummaryItem {
    bse_code: String,
    company_name: String,
    sentiment_score: f64,
    mood: crate::sentiment::Mood,
    confidence: crate::sentiment::Confidence,
    data_points: usize,
}

/// Six-hour sentiment for the first few watchlist scrips
pub async fn sentiment_summary(user: CurrentUser, State(state): State<AppState>) -> Response {
    let scrips = match state.store.list_scrips(&user.user_id).await {
        Ok(scrips) => scrips,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let analyses = scrips.iter().take(SUMMARY_SCRIPS).map(|scrip| {
        // search by ticker when the catalog knows one
        let symbol = state
            .catalog
            .yahoo_symbol(&scrip.bse_code)
            .unwrap_or(&scrip.bse_code);
        state
            .sentiment
            .analyze_stock(symbol, scrip.display_name(), SUMMARY_HOURS)
    });
    let reports = join_all(analyses).await;

    let summary_data: Vec<SummaryItem> = scrips
        .iter()
        .zip(reports)
        .map(|(scrip, report)| SummaryItem {
            bse_code: scrip.bse_code.clone(),
            company_name: scrip.company_name.clone(),
            sentiment_score: report.average_sentiment,
            mood: report.summary.overall_mood,
            confidence: report.summary.confidence,
            data_points: report.total_data_points,
        })
        .collect();

    Json(json!({ "success": true, "summary_data": summary_data })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_request_requires_symbol_and_name() {
        let request: AnalyzeRequest =
            serde_json::from_value(json!({ "stock_symbol": "RELIANCE" })).unwrap();
        assert_eq!(request.hours_back, 24);
        assert!(request.validate().is_err());

        let request: AnalyzeRequest = serde_json::from_value(json!({
            "stock_symbol": "RELIANCE",
            "company_name": "Reliance Industries",
            "hours_back": 6
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }
}
