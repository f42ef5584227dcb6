//! The signed-in user's dashboard and watchlist forms
//!
//! Every form handler redirects back to `/` with a flash describing the
//! outcome.

use super::page_context;
use crate::bse::CATEGORIES;
use crate::core::error::{AppError, AppResult};
use crate::core::watchlist::{self, RecipientChange};
use crate::server::extractors::{CurrentUser, redirect_with_flash};
use crate::server::host::AppState;
use axum::{
    Json,
    extract::{Query, State},
    response::{Html, Response},
};
use axum_extra::extract::{Form, cookie::CookieJar};
use serde::Deserialize;
use serde_json::{Value, json};

const DASHBOARD: &str = "/";
const DEFAULT_ANNOUNCEMENT_HOURS: i64 = 24;

pub async fn dashboard(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Html<String>> {
    let store = state.store.as_ref();
    let mut context = page_context(&jar, &state);
    context.insert("monitored_scrips", &store.list_scrips(&user.user_id).await?);
    context.insert(
        "telegram_recipients",
        &store.list_recipients(&user.user_id).await?,
    );
    context.insert("category_prefs", &store.category_prefs(&user.user_id).await?);
    context.insert("categories", &CATEGORIES);
    context.insert("user_email", &user.email.clone().unwrap_or_default());
    context.insert("user_phone", &user.phone.clone().unwrap_or_default());
    state.templates.render("dashboard.html", &context)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    query: String,
}

/// Company lookup for the add-scrip autocomplete
pub async fn search(
    _: CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Json<Value> {
    Json(json!({ "matches": state.catalog.search(&params.query) }))
}

pub async fn send_script_messages(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Response {
    let outcome = async {
        let scrips = state.store.list_scrips(&user.user_id).await?;
        let recipients = state.store.list_recipients(&user.user_id).await?;
        if scrips.is_empty() {
            return Ok(("info", "No scrips to monitor. Please add scrips first.".to_string()));
        }
        if recipients.is_empty() {
            return Ok((
                "info",
                "No Telegram recipients found. Please add a recipient first.".to_string(),
            ));
        }
        let sent = state
            .notifier
            .send_market_summary(&user.user_id, &scrips, &recipients)
            .await?;
        Ok::<_, AppError>(if sent > 0 {
            ("success", format!("Successfully sent {sent} message(s)!"))
        } else {
            (
                "info",
                "No messages were sent. Check scrips and recipients.".to_string(),
            )
        })
    }
    .await;

    let (category, message) = outcome.unwrap_or_else(|e| {
        tracing::error!(user_id = %user.user_id, error = %e, "market summary failed");
        ("error", format!("Error sending messages: {e}"))
    });
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

#[derive(Debug, Default, Deserialize)]
pub struct AnnouncementsForm {
    #[serde(default)]
    hours_back: Option<String>,
}

pub async fn send_bse_announcements(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AnnouncementsForm>,
) -> Response {
    let hours_back = form
        .hours_back
        .as_deref()
        .and_then(|h| h.trim().parse().ok())
        .unwrap_or(DEFAULT_ANNOUNCEMENT_HOURS);

    let outcome = async {
        let scrips = state.store.list_scrips(&user.user_id).await?;
        let recipients = state.store.list_recipients(&user.user_id).await?;
        if scrips.is_empty() {
            return Ok(("info", "No scrips to monitor. Please add scrips first.".to_string()));
        }
        if recipients.is_empty() {
            return Ok((
                "info",
                "No Telegram recipients found. Please add a recipient first.".to_string(),
            ));
        }
        let sent = state
            .notifier
            .send_announcements(&user.user_id, &scrips, &recipients, hours_back)
            .await?;
        Ok::<_, AppError>(if sent > 0 {
            (
                "success",
                format!("Sent announcements summary to {sent} recipient(s)."),
            )
        } else {
            (
                "warning",
                "No new announcements found in the selected period.".to_string(),
            )
        })
    }
    .await;

    let (category, message) = outcome.unwrap_or_else(|e| {
        tracing::error!(user_id = %user.user_id, error = %e, "announcement delivery failed");
        ("error", format!("Error sending BSE announcements: {e}"))
    });
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

#[derive(Debug, Default, Deserialize)]
pub struct ScripForm {
    #[serde(default)]
    scrip_code: String,
    #[serde(default)]
    company_name: Option<String>,
}

pub async fn add_scrip(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ScripForm>,
) -> Response {
    let added = watchlist::add_scrip(
        state.store.as_ref(),
        &state.catalog,
        &user.user_id,
        &form.scrip_code,
        form.company_name.as_deref(),
    )
    .await;

    let (category, message) = match added {
        Ok(scrip) => ("success", format!("Added {} to your watchlist.", scrip.company_name)),
        Err(AppError::Validation(message)) => ("error", message),
        Err(AppError::NotFound { .. }) => (
            "error",
            "Scrip code not found. Please check the BSE code.".to_string(),
        ),
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "add scrip failed");
            ("error", format!("Failed to add scrip: {e}"))
        }
    };
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

pub async fn delete_scrip(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ScripForm>,
) -> Response {
    let code = form.scrip_code.trim();
    let (category, message) = match state.store.delete_scrip(&user.user_id, code).await {
        Ok(()) => ("success", format!("Scrip {code} removed from your watchlist.")),
        Err(e) => ("error", format!("Failed to remove scrip: {e}")),
    };
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipientForm {
    #[serde(default)]
    chat_id: String,
}

pub async fn add_recipient(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RecipientForm>,
) -> Response {
    let chat_id = form.chat_id.trim();
    let changed = watchlist::add_recipient(state.store.as_ref(), &user.user_id, chat_id).await;
    let (category, message) = match changed {
        Ok(RecipientChange::Added | RecipientChange::Unchanged) => {
            ("success", format!("Added recipient {chat_id}."))
        }
        Ok(RecipientChange::Reassigned { .. }) => (
            "success",
            format!("Added recipient {chat_id}. It was moved from another account."),
        ),
        Err(AppError::Validation(message)) => ("error", message),
        Err(e) => ("error", format!("Failed to add recipient: {e}")),
    };
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

pub async fn delete_recipient(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RecipientForm>,
) -> Response {
    let chat_id = form.chat_id.trim();
    let (category, message) = match state.store.delete_recipient(&user.user_id, chat_id).await {
        Ok(()) => ("success", format!("Recipient {chat_id} removed.")),
        Err(e) => ("error", format!("Failed to remove recipient: {e}")),
    };
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    categories: Vec<String>,
}

pub async fn set_category_prefs(
    user: CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CategoryForm>,
) -> Response {
    let saved =
        watchlist::set_category_prefs(state.store.as_ref(), &user.user_id, &form.categories).await;
    let (category, message) = match saved {
        Ok(_) => ("success", "Category preferences saved."),
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "saving category preferences failed");
            ("error", "Failed to save preferences.")
        }
    };
    redirect_with_flash(jar, &state, category, message, DASHBOARD)
}
