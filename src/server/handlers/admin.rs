//! Admin panel: every user's watchlist, cron history and data purge
//!
//! Forms post the target `user_id` and redirect back to that user's page.

use super::{page_context, page_context_with};
use crate::core::auth::secrets_match;
use crate::core::error::{AppError, AppResult};
use crate::core::watchlist;
use crate::jobs::summarize_runs;
use crate::server::extractors::{AdminUser, redirect_with_flash};
use crate::server::host::AppState;
use crate::server::session::Flash;
use axum::{
    extract::{Path, State},
    response::{Html, Response},
};
use axum_extra::extract::{Form, cookie::CookieJar};
use serde::Deserialize;
use uuid::Uuid;

const ADMIN_HOME: &str = "/admin/";
const CRON_LOG_ROWS: usize = 500;

fn user_page(user_id: &Uuid) -> String {
    format!("/admin/user/{user_id}")
}

pub async fn dashboard(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Html<String>> {
    let mut context = page_context(&jar, &state);
    context.insert("users", &state.store.list_profiles().await?);
    context.insert("selected_user", &None::<()>);
    state.templates.render("admin_dashboard.html", &context)
}

pub async fn view_user(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Path(user_id): Path<Uuid>,
) -> AppResult<Html<String>> {
    let users = state.store.list_profiles().await?;
    let (selected, extra) = match watchlist::user_details(state.store.as_ref(), &user_id).await {
        Ok(details) => (Some(details), Vec::new()),
        Err(AppError::NotFound { .. }) => (
            None,
            vec![Flash {
                category: "error",
                message: format!("User {user_id} not found."),
            }],
        ),
        Err(e) => return Err(e),
    };

    let mut context = page_context_with(&jar, &state, extra);
    context.insert("users", &users);
    context.insert("selected_user", &selected);
    state.templates.render("admin_dashboard.html", &context)
}

pub async fn cron_runs(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Html<String>> {
    let (rows, extra) = match state.store.recent_cron_logs(CRON_LOG_ROWS).await {
        Ok(rows) => (rows, Vec::new()),
        Err(e) => {
            tracing::warn!(error = %e, "cron log query failed");
            (
                Vec::new(),
                vec![Flash {
                    category: "warning",
                    message: format!("Query error: {e}"),
                }],
            )
        }
    };

    let mut context = page_context_with(&jar, &state, extra);
    context.insert("runs", &summarize_runs(&rows));
    state.templates.render("admin_cron_runs.html", &context)
}

#[derive(Debug, Deserialize)]
pub struct AdminScripForm {
    user_id: Uuid,
    #[serde(default)]
    scrip_code: String,
    #[serde(default)]
    company_name: Option<String>,
}

pub async fn add_scrip(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AdminScripForm>,
) -> Response {
    let added = watchlist::add_scrip(
        state.store.as_ref(),
        &state.catalog,
        &form.user_id,
        &form.scrip_code,
        form.company_name.as_deref(),
    )
    .await;
    let (category, message) = match added {
        Ok(scrip) => ("success", format!("Added {} for the user.", scrip.company_name)),
        Err(e) => ("error", e.to_string()),
    };
    redirect_with_flash(jar, &state, category, message, &user_page(&form.user_id))
}

pub async fn delete_scrip(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AdminScripForm>,
) -> Response {
    let code = form.scrip_code.trim();
    let (category, message) = match state.store.delete_scrip(&form.user_id, code).await {
        Ok(()) => ("success", format!("Scrip {code} removed.")),
        Err(e) => ("error", e.to_string()),
    };
    redirect_with_flash(jar, &state, category, message, &user_page(&form.user_id))
}

#[derive(Debug, Deserialize)]
pub struct AdminRecipientForm {
    user_id: Uuid,
    #[serde(default)]
    chat_id: String,
}

pub async fn add_recipient(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AdminRecipientForm>,
) -> Response {
    let chat_id = form.chat_id.trim();
    let (category, message) =
        match watchlist::add_recipient(state.store.as_ref(), &form.user_id, chat_id).await {
            Ok(_) => ("success", format!("Added recipient {chat_id}.")),
            Err(e) => ("error", e.to_string()),
        };
    redirect_with_flash(jar, &state, category, message, &user_page(&form.user_id))
}

pub async fn delete_recipient(
    _: AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AdminRecipientForm>,
) -> Response {
    let chat_id = form.chat_id.trim();
    let (category, message) = match state.store.delete_recipient(&form.user_id, chat_id).await {
        Ok(()) => ("success", format!("Recipient {chat_id} removed.")),
        Err(e) => ("error", e.to_string()),
    };
    redirect_with_flash(jar, &state, category, message, &user_page(&form.user_id))
}

#[derive(Debug, Default, Deserialize)]
pub struct PurgeForm {
    #[serde(default)]
    secret: String,
}

/// Delete every other user's announcements, scrips and recipients
///
/// Disabled unless `ADMIN_PURGE_SECRET` is configured.
pub async fn purge(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<PurgeForm>,
) -> Response {
    let authorized = state
        .config
        .admin_purge_secret
        .as_deref()
        .filter(|expected| !expected.is_empty())
        .is_some_and(|expected| secrets_match(expected, &form.secret));
    if !authorized {
        tracing::warn!(user_id = %admin.user_id, "purge rejected");
        return redirect_with_flash(
            jar,
            &state,
            "error",
            "Invalid secret for purge operation.",
            ADMIN_HOME,
        );
    }

    let (category, message) = match state.store.purge_except(&admin.user_id).await {
        Ok(()) => {
            tracing::warn!(kept = %admin.user_id, "purged all other users' data");
            ("success", "Purge complete. Kept only your data.".to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "purge failed");
            ("error", format!("Purge failed: {e}"))
        }
    };
    redirect_with_flash(jar, &state, category, message, ADMIN_HOME)
}
