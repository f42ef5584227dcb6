//! Sign-in with an identity-provider token, and sign-out

use super::page_context;
use crate::core::error::{AppError, AppResult};
use crate::identity::find_or_create_user;
use crate::server::extractors::redirect_with_flash;
use crate::server::host::AppState;
use crate::server::session::{SessionUser, session_cookie, session_id};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
struct TokenRequest {
    #[serde(default)]
    token: Option<String>,
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": error.into() })),
    )
        .into_response()
}

pub async fn login_page(State(state): State<AppState>, jar: CookieJar) -> AppResult<Html<String>> {
    let mut context = page_context(&jar, &state);
    // public web config for the client SDK
    context.insert(
        "firebase",
        &json!({
            "apiKey": state.config.firebase_api_key,
            "authDomain": state.config.firebase_auth_domain,
            "projectId": state.config.firebase_project_id,
        }),
    );
    state.templates.render("login.html", &context)
}

pub async fn verify_phone_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    sign_in(state, jar, body).await
}

pub async fn verify_google_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    sign_in(state, jar, body).await
}

/// Verify the posted `{ "token": ... }` and open a session for its user
async fn sign_in(state: AppState, jar: CookieJar, body: Bytes) -> Response {
    let token = serde_json::from_slice::<TokenRequest>(&body)
        .ok()
        .and_then(|request| request.token)
        .filter(|token| !token.trim().is_empty());
    let Some(token) = token else {
        return failure(StatusCode::BAD_REQUEST, "No token provided.");
    };

    let identity = match state.verifier.verify(&token).await {
        Ok(identity) => identity,
        Err(AppError::Auth(message)) => {
            tracing::warn!(error = %message, "sign-in token rejected");
            return failure(StatusCode::UNAUTHORIZED, message);
        }
        Err(e) => {
            tracing::error!(error = %e, "token verification failed");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An unexpected error occurred: {e}"),
            );
        }
    };

    let user = match find_or_create_user(state.store.as_ref(), &identity).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(uid = %identity.uid, error = %e, "user resolution failed");
            return failure(StatusCode::UNAUTHORIZED, e.to_string());
        }
    };

    if user.email.is_none() && user.phone.is_none() {
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication succeeded but no user context could be established.",
        );
    }

    if let Some(previous) = session_id(&jar) {
        state.sessions.remove(&previous);
    }
    let session = state.sessions.create(Some(SessionUser {
        user_id: user.user_id,
        email: user.email,
        phone: user.phone,
    }));
    tracing::info!(user_id = %user.user_id, provider = %identity.provider, "user signed in");

    (
        jar.add(session_cookie(session, state.secure_cookies())),
        Json(json!({ "success": true })),
    )
        .into_response()
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(id) = session_id(&jar) {
        state.sessions.remove(&id);
    }
    // the flash lands in a fresh anonymous session
    redirect_with_flash(
        jar,
        &state,
        "success",
        "You have been successfully logged out.",
        "/login",
    )
}
