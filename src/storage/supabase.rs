//! Supabase implementation of Store
//!
//! Tables are reached through PostgREST (`/rest/v1/{table}`) and new users are
//! created with the GoTrue admin API (`/auth/v1/admin/users`). All calls use
//! the service-role key; per-user scoping is done by the callers.

use crate::core::error::{AppError, AppResult, UpstreamError};
use crate::core::model::{
    CronRunLog, MonitoredScrip, Profile, ProviderColumn, SeenAnnouncement, TelegramRecipient,
};
use crate::core::store::Store;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

const SERVICE: &str = "supabase";

/// Store backed by a Supabase project
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct AdminUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct OwnerRow {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct CategoryRow {
    category: String,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Config(format!("cannot build Supabase client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{}", table))
    }

    async fn send(builder: RequestBuilder) -> AppResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(UpstreamError::from_status(SERVICE, status.as_u16(), body).into())
        }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> AppResult<Vec<T>> {
        let response = Self::send(self.table(Method::GET, table).query(query)).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| UpstreamError::invalid_payload(SERVICE, e).into())
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        mut query: Vec<(&str, String)>,
    ) -> AppResult<Option<T>> {
        query.push(("limit", "1".to_string()));
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert(&self, table: &str, body: &Value) -> AppResult<()> {
        Self::send(
            self.table(Method::POST, table)
                .header("Prefer", "return=minimal")
                .json(body),
        )
        .await
        .map(|_| ())
    }

    async fn update(&self, table: &str, filters: &[(&str, String)], body: &Value) -> AppResult<()> {
        Self::send(
            self.table(Method::PATCH, table)
                .query(filters)
                .header("Prefer", "return=minimal")
                .json(body),
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> AppResult<()> {
        Self::send(self.table(Method::DELETE, table).query(filters))
            .await
            .map(|_| ())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn neq(value: impl std::fmt::Display) -> String {
    format!("neq.{}", value)
}

const PROFILE_COLUMNS: &str = "id,email,is_admin,google_uid,firebase_uid";

#[async_trait]
impl Store for SupabaseStore {
    async fn ping(&self) -> AppResult<()> {
        self.select::<Value>(
            "profiles",
            &[("select", "id".to_string()), ("limit", "1".to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn profile_by_id(&self, id: &Uuid) -> AppResult<Option<Profile>> {
        self.select_one(
            "profiles",
            vec![("select", PROFILE_COLUMNS.to_string()), ("id", eq(id))],
        )
        .await
    }

    async fn profile_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        self.select_one(
            "profiles",
            vec![("select", PROFILE_COLUMNS.to_string()), ("email", eq(email))],
        )
        .await
    }

    async fn profile_by_provider_uid(
        &self,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Option<Profile>> {
        self.select_one(
            "profiles",
            vec![("select", PROFILE_COLUMNS.to_string()), (column.column(), eq(uid))],
        )
        .await
    }

    async fn create_profile(
        &self,
        email: &str,
        phone: Option<&str>,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Profile> {
        let mut attrs = json!({ "email": email, "email_confirm": true });
        if let Some(phone) = phone {
            attrs["phone"] = json!(phone);
            attrs["phone_confirm"] = json!(true);
        }

        let response =
            Self::send(self.request(Method::POST, "/auth/v1/admin/users").json(&attrs)).await?;
        let user: AdminUser = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(SERVICE, e))?;

        let email = user.email.unwrap_or_else(|| email.to_string());

        // The profile row is normally created by a trigger on auth.users; the
        // upsert covers projects without it.
        let mut row = json!({ "id": user.id, "email": email });
        row[column.column()] = json!(uid);
        Self::send(
            self.table(Method::POST, "profiles")
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&row),
        )
        .await?;

        let mut profile = Profile::new(Some(email));
        profile.id = user.id;
        profile.set_provider_uid(column, uid);
        Ok(profile)
    }

    async fn set_provider_uid(
        &self,
        id: &Uuid,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<()> {
        let mut body = json!({});
        body[column.column()] = json!(uid);
        self.update("profiles", &[("id", eq(id))], &body).await
    }

    async fn update_profile_email(&self, id: &Uuid, email: &str) -> AppResult<()> {
        self.update("profiles", &[("id", eq(id))], &json!({ "email": email }))
            .await?;

        // Keeping auth.users in sync is best effort
        let synced = Self::send(
            self.request(Method::PUT, &format!("/auth/v1/admin/users/{}", id))
                .json(&json!({ "email": email })),
        )
        .await;
        if let Err(e) = synced {
            tracing::warn!(user_id = %id, error = %e, "failed to update auth email");
        }
        Ok(())
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        self.select(
            "profiles",
            &[
                ("select", PROFILE_COLUMNS.to_string()),
                ("order", "email.asc".to_string()),
            ],
        )
        .await
    }

    async fn list_scrips(&self, user_id: &Uuid) -> AppResult<Vec<MonitoredScrip>> {
        self.select(
            "monitored_scrips",
            &[
                ("select", "user_id,bse_code,company_name".to_string()),
                ("user_id", eq(user_id)),
            ],
        )
        .await
    }

    async fn list_all_scrips(&self) -> AppResult<Vec<MonitoredScrip>> {
        self.select(
            "monitored_scrips",
            &[("select", "user_id,bse_code,company_name".to_string())],
        )
        .await
    }

    async fn add_scrip(&self, scrip: MonitoredScrip) -> AppResult<()> {
        self.insert("monitored_scrips", &serde_json::to_value(&scrip)?)
            .await
    }

    async fn delete_scrip(&self, user_id: &Uuid, bse_code: &str) -> AppResult<()> {
        self.delete(
            "monitored_scrips",
            &[("user_id", eq(user_id)), ("bse_code", eq(bse_code))],
        )
        .await
    }

    async fn list_recipients(&self, user_id: &Uuid) -> AppResult<Vec<TelegramRecipient>> {
        self.select(
            "telegram_recipients",
            &[
                ("select", "user_id,chat_id".to_string()),
                ("user_id", eq(user_id)),
            ],
        )
        .await
    }

    async fn list_all_recipients(&self) -> AppResult<Vec<TelegramRecipient>> {
        self.select(
            "telegram_recipients",
            &[("select", "user_id,chat_id".to_string())],
        )
        .await
    }

    async fn recipient_owner(&self, chat_id: &str) -> AppResult<Option<Uuid>> {
        let row: Option<OwnerRow> = self
            .select_one(
                "telegram_recipients",
                vec![("select", "user_id".to_string()), ("chat_id", eq(chat_id))],
            )
            .await?;
        Ok(row.map(|r| r.user_id))
    }

    async fn insert_recipient(&self, recipient: TelegramRecipient) -> AppResult<()> {
        self.insert("telegram_recipients", &serde_json::to_value(&recipient)?)
            .await
    }

    async fn reassign_recipient(&self, chat_id: &str, user_id: &Uuid) -> AppResult<()> {
        self.update(
            "telegram_recipients",
            &[("chat_id", eq(chat_id))],
            &json!({ "user_id": user_id }),
        )
        .await
    }

    async fn delete_recipient(&self, user_id: &Uuid, chat_id: &str) -> AppResult<()> {
        self.delete(
            "telegram_recipients",
            &[("user_id", eq(user_id)), ("chat_id", eq(chat_id))],
        )
        .await
    }

    async fn seen_announcement_exists(&self, user_id: &Uuid, news_id: &str) -> AppResult<bool> {
        let found: AppResult<Option<Value>> = self
            .select_one(
                "seen_announcements",
                vec![
                    ("select", "news_id".to_string()),
                    ("news_id", eq(news_id)),
                    ("user_id", eq(user_id)),
                ],
            )
            .await;

        match found {
            Ok(row) => Ok(row.is_some()),
            Err(e) => {
                // A missing table or outage must not block delivery
                tracing::warn!(error = %e, "seen_announcements lookup failed, treating as new");
                Ok(false)
            }
        }
    }

    async fn save_seen_announcement(&self, seen: SeenAnnouncement) -> AppResult<()> {
        self.insert("seen_announcements", &serde_json::to_value(&seen)?)
            .await
    }

    async fn category_prefs(&self, user_id: &Uuid) -> AppResult<Vec<String>> {
        let rows: Vec<CategoryRow> = self
            .select(
                "user_category_prefs",
                &[("select", "category".to_string()), ("user_id", eq(user_id))],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.category).collect())
    }

    async fn set_category_prefs(&self, user_id: &Uuid, categories: &[String]) -> AppResult<()> {
        self.delete("user_category_prefs", &[("user_id", eq(user_id))])
            .await?;
        if categories.is_empty() {
            return Ok(());
        }

        let rows: Vec<Value> = categories
            .iter()
            .map(|c| json!({ "user_id": user_id, "category": c }))
            .collect();
        self.insert("user_category_prefs", &Value::Array(rows)).await
    }

    async fn insert_cron_log(&self, log: CronRunLog) -> AppResult<()> {
        self.insert("cron_run_logs", &serde_json::to_value(&log)?)
            .await
    }

    async fn recent_cron_logs(&self, limit: usize) -> AppResult<Vec<CronRunLog>> {
        self.select(
            "cron_run_logs",
            &[
                ("select", "*".to_string()),
                ("order", "id.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn purge_except(&self, keep: &Uuid) -> AppResult<()> {
        for table in ["seen_announcements", "monitored_scrips", "telegram_recipients"] {
            self.delete(table, &[("user_id", neq(keep))]).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    const OWNER: &str = "11111111-1111-1111-1111-111111111111";
    const CREATED: &str = "22222222-2222-2222-2222-222222222222";

    #[derive(Debug, Clone)]
    struct Call {
        method: String,
        path: String,
        query: String,
        prefer: Option<String>,
        apikey: Option<String>,
        body: Value,
    }

    type Calls = Arc<Mutex<Vec<Call>>>;

    /// PostgREST and GoTrue stand-in that records every request
    async fn postgrest(
        State(calls): State<Calls>,
        method: axum::http::Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> AxumResponse {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let call = Call {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            prefer: header("prefer"),
            apikey: header("apikey"),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        };
        calls.lock().unwrap().push(call.clone());

        match (call.method.as_str(), call.path.as_str()) {
            ("GET", "/rest/v1/seen_announcements") => {
                (StatusCode::NOT_FOUND, "relation does not exist").into_response()
            }
            ("GET", "/rest/v1/telegram_recipients") if call.query.contains("chat_id=eq.12345") => {
                Json(json!([{ "user_id": OWNER }])).into_response()
            }
            ("GET", _) => Json(json!([])).into_response(),
            ("POST", "/auth/v1/admin/users") => {
                Json(json!({ "id": CREATED, "email": call.body["email"] })).into_response()
            }
            _ => StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn stand_in() -> (SupabaseStore, Calls) {
        let calls: Calls = Arc::default();
        let app = Router::new().fallback(postgrest).with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        let store = SupabaseStore::new(format!("http://{}/", addr), "service-key").unwrap();
        (store, calls)
    }

    fn calls_to(calls: &Calls, method: &str, path: &str) -> Vec<Call> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_seen_lookup_failure_counts_as_new() {
        let (store, calls) = stand_in().await;
        let user = Uuid::new_v4();

        assert!(!store.seen_announcement_exists(&user, "n-1").await.unwrap());

        let lookups = calls_to(&calls, "GET", "/rest/v1/seen_announcements");
        assert_eq!(lookups.len(), 1);
        assert!(lookups[0].query.contains("news_id=eq.n-1"));
        assert!(lookups[0].query.contains(&format!("user_id=eq.{}", user)));
        assert!(lookups[0].query.contains("limit=1"));
        assert_eq!(lookups[0].apikey.as_deref(), Some("service-key"));
    }

    #[tokio::test]
    async fn test_recipient_owner_and_reassign() {
        let (store, calls) = stand_in().await;
        let new_owner = Uuid::new_v4();

        assert_eq!(
            store.recipient_owner("12345").await.unwrap(),
            Some(Uuid::parse_str(OWNER).unwrap())
        );
        assert_eq!(store.recipient_owner("999").await.unwrap(), None);

        store.reassign_recipient("12345", &new_owner).await.unwrap();
        let patches = calls_to(&calls, "PATCH", "/rest/v1/telegram_recipients");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].query, "chat_id=eq.12345");
        assert_eq!(patches[0].body, json!({ "user_id": new_owner }));
        assert_eq!(patches[0].prefer.as_deref(), Some("return=minimal"));
    }

    #[tokio::test]
    async fn test_purge_keeps_one_user() {
        let (store, calls) = stand_in().await;
        let keep = Uuid::new_v4();

        store.purge_except(&keep).await.unwrap();

        for table in ["seen_announcements", "monitored_scrips", "telegram_recipients"] {
            let deletes = calls_to(&calls, "DELETE", &format!("/rest/v1/{}", table));
            assert_eq!(deletes.len(), 1, "{table}");
            assert_eq!(deletes[0].query, format!("user_id=neq.{}", keep));
        }
        assert!(calls_to(&calls, "DELETE", "/rest/v1/profiles").is_empty());
    }

    #[tokio::test]
    async fn test_create_profile_through_admin_api() {
        let (store, calls) = stand_in().await;

        let profile = store
            .create_profile("a@example.com", Some("+91980"), ProviderColumn::GoogleUid, "g-1")
            .await
            .unwrap();
        assert_eq!(profile.id, Uuid::parse_str(CREATED).unwrap());
        assert_eq!(profile.email.as_deref(), Some("a@example.com"));
        assert_eq!(profile.google_uid.as_deref(), Some("g-1"));

        let users = calls_to(&calls, "POST", "/auth/v1/admin/users");
        assert_eq!(users[0].body["email_confirm"], true);
        assert_eq!(users[0].body["phone"], "+91980");

        let rows = calls_to(&calls, "POST", "/rest/v1/profiles");
        assert_eq!(rows[0].body["id"], CREATED);
        assert_eq!(rows[0].body["google_uid"], "g-1");
        assert!(rows[0].prefer.as_deref().unwrap().contains("merge-duplicates"));
    }

    #[test]
    fn test_filter_helpers() {
        let id = Uuid::nil();
        assert_eq!(eq(id), "eq.00000000-0000-0000-0000-000000000000");
        assert_eq!(neq("x"), "neq.x");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = SupabaseStore::new("https://abc.supabase.co/", "key").unwrap();
        assert_eq!(store.base_url, "https://abc.supabase.co");
    }
}
