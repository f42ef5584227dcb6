//! HTTP handlers, grouped by area

pub mod admin;
pub mod auth;
pub mod cron;
pub mod dashboard;
pub mod debug;
pub mod health;
pub mod sentiment;

use crate::server::host::AppState;
use crate::server::session::{Flash, take_flashes};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;

/// Template context with the flashes pending for this session
pub(crate) fn page_context(jar: &CookieJar, state: &AppState) -> Context {
    page_context_with(jar, state, Vec::new())
}

/// Like [`page_context`], adding flashes raised while handling the request
pub(crate) fn page_context_with(jar: &CookieJar, state: &AppState, extra: Vec<Flash>) -> Context {
    let mut flashes = take_flashes(jar, &state.sessions);
    flashes.extend(extra);

    let mut context = Context::new();
    context.insert("flashes", &flashes);
    context
}
