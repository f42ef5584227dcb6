//! Request extractors for the route guards
//!
//! - [`CurrentUser`]: signed-in session, else redirect to `/login`
//! - [`AdminUser`]: signed-in administrator, else redirect to `/`
//! - [`CronCaller`]: `?key=` matching `CRON_SECRET_KEY`, else 403
//! - [`ValidJson`]: JSON body checked with `validator`

use crate::core::auth::{AuthContext, AuthPolicy};
use crate::server::host::AppState;
use crate::server::session::{SessionUser, flash, session_id};
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// Signed-in user of the current request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: String,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CurrentUser {
    pub fn context(&self) -> AuthContext {
        AuthContext::User {
            user_id: self.user_id,
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Flash `message` and redirect to `to`
pub(crate) fn redirect_with_flash(
    jar: CookieJar,
    state: &AppState,
    category: &'static str,
    message: impl Into<String>,
    to: &str,
) -> Response {
    let jar = flash(
        jar,
        &state.sessions,
        state.config.secure_cookies,
        category,
        message,
    );
    (jar, Redirect::to(to)).into_response()
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let found = session_id(&jar)
            .and_then(|id| state.sessions.user(&id).map(|user| (id, user)));

        match found {
            Some((session_id, SessionUser { user_id, email, phone })) => Ok(CurrentUser {
                session_id,
                user_id,
                email,
                phone,
            }),
            None => Err(redirect_with_flash(
                jar,
                state,
                "warning",
                "You must be logged in to view this page.",
                "/login",
            )),
        }
    }
}

/// Signed-in user whose profile carries `is_admin`
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let jar = CookieJar::from_headers(&parts.headers);

        let context = match state.store.profile_by_id(&user.user_id).await {
            Ok(Some(profile)) if profile.is_admin => AuthContext::Admin {
                user_id: profile.id,
                email: profile.email,
            },
            Ok(_) => user.context(),
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "admin lookup failed");
                return Err(redirect_with_flash(
                    jar,
                    state,
                    "error",
                    format!("Admin access error: {e}"),
                    "/",
                ));
            }
        };

        if AuthPolicy::AdminOnly.check(&context) {
            Ok(AdminUser(user))
        } else {
            tracing::warn!(user_id = %user.user_id, "non-admin tried to open the admin panel");
            Err(redirect_with_flash(
                jar,
                state,
                "error",
                "You do not have permission to access this page.",
                "/",
            ))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// The scheduler, authenticated by the `key` query parameter
#[derive(Debug, Clone, Copy)]
pub struct CronCaller;

impl FromRequestParts<AppState> for CronCaller {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = Query::<KeyQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query.key)
            .unwrap_or_default();
        let context = AuthContext::from_cron_key(
            state.config.cron_secret_key.as_deref(),
            provided.as_deref(),
        );

        if AuthPolicy::CronOnly.check(&context) {
            Ok(CronCaller)
        } else {
            tracing::warn!(path = %parts.uri.path(), "cron call rejected");
            Err((StatusCode::FORBIDDEN, "Unauthorized").into_response())
        }
    }
}

/// JSON body that passed its `validator` rules
///
/// Rejections are `400 { "error": <first message>, "errors": {...} }`.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(payload): Json<T> = match Json::from_request(req, state).await {
            Ok(json) => json,
            Err(e) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid JSON",
                        "details": e.body_text()
                    })),
                )
                    .into_response());
            }
        };

        match payload.validate() {
            Ok(()) => Ok(ValidJson(payload)),
            Err(errors) => Err((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": first_message(&errors),
                    "errors": errors
                })),
            )
                .into_response()),
        }
    }
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|list| list.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct Payload {
        #[validate(length(min = 1, message = "name required"))]
        name: String,
    }

    #[test]
    fn test_first_message_uses_custom_message() {
        let payload = Payload {
            name: String::new(),
        };
        let errors = payload.validate().unwrap_err();
        assert_eq!(first_message(&errors), "name required");
    }

    #[test]
    fn test_key_query_parses_alongside_other_params() {
        let uri: axum::http::Uri = "/cron/bse_announcements?hours_back=2&key=abc".parse().unwrap();
        let Query(query) = Query::<KeyQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.key.as_deref(), Some("abc"));
    }
}
