//! Sign-in token verification and profile resolution
//!
//! The browser signs in with Firebase (Google or phone) and posts the ID
//! token. The token is checked against the Identity Toolkit, then mapped to
//! a local profile by provider uid or email, creating one on first login.

use crate::core::error::{AppError, AppResult, UpstreamError};
use crate::core::model::ProviderColumn;
use crate::core::store::Store;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Domain of the synthetic emails given to accounts without one
pub const PLACEHOLDER_DOMAIN: &str = "@yourapp.com";

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Sign-in provider id, e.g. `google.com` or `phone`
    pub provider: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> AppResult<VerifiedIdentity>;
}

/// Identity Toolkit `accounts:lookup`
pub struct FirebaseVerifier {
    client: Client,
    lookup_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    phone_number: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderInfo {
    provider_id: String,
    email: Option<String>,
}

impl FirebaseVerifier {
    const SERVICE: &'static str = "firebase";

    pub fn new(api_base: &str, api_key: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("cannot build Firebase client: {}", e)))?;

        Ok(Self {
            client,
            lookup_url: format!("{}/v1/accounts:lookup", api_base.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

impl LookupUser {
    fn into_identity(self) -> VerifiedIdentity {
        let provider = self
            .provider_user_info
            .iter()
            .map(|p| p.provider_id.as_str())
            .find(|p| *p == "google.com")
            .or_else(|| {
                self.provider_user_info
                    .iter()
                    .map(|p| p.provider_id.as_str())
                    .find(|p| *p == "phone")
            })
            .or_else(|| self.provider_user_info.first().map(|p| p.provider_id.as_str()))
            .unwrap_or("password")
            .to_string();

        let email = non_empty(self.email).or_else(|| {
            self.provider_user_info
                .iter()
                .find_map(|p| non_empty(p.email.clone()))
        });

        VerifiedIdentity {
            uid: self.local_id,
            email,
            phone: non_empty(self.phone_number),
            provider,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> AppResult<VerifiedIdentity> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("FIREBASE_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .post(&self.lookup_url)
            .query(&[("key", api_key)])
            .json(&json!({ "idToken": id_token }))
            .send()
            .await
            .map_err(|e| UpstreamError::transport(Self::SERVICE, e))?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::info!(body = %body, "Firebase rejected ID token");
            return Err(AppError::Auth("Invalid or expired ID token".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(Self::SERVICE, status.as_u16(), body).into());
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(Self::SERVICE, e))?;
        lookup
            .users
            .into_iter()
            .next()
            .map(LookupUser::into_identity)
            .ok_or_else(|| AppError::Auth("No account matches the ID token".to_string()))
    }
}

/// Fixed token table for development and tests
#[derive(Default)]
pub struct StaticVerifier {
    identities: HashMap<String, VerifiedIdentity>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
        self.identities.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, id_token: &str) -> AppResult<VerifiedIdentity> {
        self.identities
            .get(id_token)
            .cloned()
            .ok_or_else(|| AppError::Auth("Unknown ID token".to_string()))
    }
}

/// Session identity of a signed-in user
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn is_placeholder(email: Option<&str>) -> bool {
    email.is_none_or(|e| e.is_empty() || e.ends_with(PLACEHOLDER_DOMAIN))
}

/// Map a verified identity to a profile, creating one on first sign-in
pub async fn find_or_create_user(
    store: &dyn Store,
    identity: &VerifiedIdentity,
) -> AppResult<ResolvedUser> {
    let column = ProviderColumn::for_provider(&identity.provider);

    let mut profile = store.profile_by_provider_uid(column, &identity.uid).await?;
    if profile.is_none() {
        if let Some(email) = identity.email.as_deref() {
            profile = store.profile_by_email(email).await?;
            if let Some(found) = &profile {
                store.set_provider_uid(&found.id, column, &identity.uid).await?;
                tracing::info!(user_id = %found.id, column = column.column(), "linked provider uid by email");
            }
        }
    }

    if let Some(mut profile) = profile {
        if let Some(email) = identity.email.as_deref() {
            if is_placeholder(profile.email.as_deref()) {
                match store.update_profile_email(&profile.id, email).await {
                    Ok(()) => profile.email = Some(email.to_string()),
                    Err(e) => tracing::warn!(user_id = %profile.id, error = %e, "could not replace placeholder email"),
                }
            }
        }
        return Ok(ResolvedUser {
            user_id: profile.id,
            email: profile.email,
            phone: identity.phone.clone(),
        });
    }

    let email = match (&identity.email, &identity.phone) {
        (Some(email), _) => email.clone(),
        (None, Some(phone)) => format!("{}{}", phone, PLACEHOLDER_DOMAIN),
        (None, None) => format!("{}{}", identity.uid, PLACEHOLDER_DOMAIN),
    };
    let created = store
        .create_profile(&email, identity.phone.as_deref(), column, &identity.uid)
        .await?;
    tracing::info!(user_id = %created.id, provider = %identity.provider, "created profile on first sign-in");

    Ok(ResolvedUser {
        user_id: created.id,
        email: created.email,
        phone: identity.phone.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Profile;
    use crate::storage::InMemoryStore;
    use axum::http::StatusCode;
    use axum::{Json, Router};
    use serde_json::Value;

    fn google(uid: &str, email: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            uid: uid.to_string(),
            email: email.map(String::from),
            phone: None,
            provider: "google.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_then_finds_by_uid() {
        let store = InMemoryStore::new();
        let identity = google("g-1", Some("a@b.com"));

        let first = find_or_create_user(&store, &identity).await.unwrap();
        assert_eq!(first.email.as_deref(), Some("a@b.com"));

        let again = find_or_create_user(&store, &identity).await.unwrap();
        assert_eq!(again.user_id, first.user_id);
        assert_eq!(store.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_links_existing_profile_by_email() {
        let store = InMemoryStore::new();
        let existing = Profile::new(Some("a@b.com".to_string()));
        store.insert_profile(existing.clone()).unwrap();

        let resolved = find_or_create_user(&store, &google("g-2", Some("a@b.com")))
            .await
            .unwrap();
        assert_eq!(resolved.user_id, existing.id);

        let linked = store
            .profile_by_provider_uid(ProviderColumn::GoogleUid, "g-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(linked.id, existing.id);
    }

    #[tokio::test]
    async fn test_phone_user_gets_placeholder_then_real_email() {
        let store = InMemoryStore::new();
        let phone = VerifiedIdentity {
            uid: "p-1".to_string(),
            email: None,
            phone: Some("+919800000000".to_string()),
            provider: "phone".to_string(),
        };

        let created = find_or_create_user(&store, &phone).await.unwrap();
        assert_eq!(created.email.as_deref(), Some("+919800000000@yourapp.com"));
        assert_eq!(created.phone.as_deref(), Some("+919800000000"));

        let with_email = VerifiedIdentity {
            email: Some("real@b.com".to_string()),
            ..phone
        };
        let updated = find_or_create_user(&store, &with_email).await.unwrap();
        assert_eq!(updated.user_id, created.user_id);
        assert_eq!(updated.email.as_deref(), Some("real@b.com"));
    }

    #[tokio::test]
    async fn test_uid_placeholder_when_nothing_known() {
        let store = InMemoryStore::new();
        let bare = VerifiedIdentity {
            uid: "anon-7".to_string(),
            email: None,
            phone: None,
            provider: "anonymous".to_string(),
        };
        let created = find_or_create_user(&store, &bare).await.unwrap();
        assert_eq!(created.email.as_deref(), Some("anon-7@yourapp.com"));
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticVerifier::new().with_identity("tok", google("g", None));
        assert_eq!(verifier.verify("tok").await.unwrap().uid, "g");
        assert!(matches!(verifier.verify("other").await, Err(AppError::Auth(_))));
    }

    async fn mock_toolkit() -> String {
        // the lookup path has a colon in it, so serve it as the fallback
        let app = Router::new().fallback(|Json(body): Json<Value>| async move {
            if body["idToken"] != "good" {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": { "message": "INVALID_ID_TOKEN" } })),
                );
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({ "users": [{
                    "localId": "uid-1",
                    "providerUserInfo": [
                        { "providerId": "phone" },
                        { "providerId": "google.com", "email": "g@b.com" }
                    ]
                }] })),
            )
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_firebase_lookup() {
        let base = mock_toolkit().await;
        let verifier = FirebaseVerifier::new(&base, Some("key".to_string())).unwrap();

        let identity = verifier.verify("good").await.unwrap();
        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.provider, "google.com");
        assert_eq!(identity.email.as_deref(), Some("g@b.com"));

        assert!(matches!(verifier.verify("bad").await, Err(AppError::Auth(_))));

        let unconfigured = FirebaseVerifier::new(&base, None).unwrap();
        assert!(matches!(unconfigured.verify("good").await, Err(AppError::Config(_))));
    }
}
