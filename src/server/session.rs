//! Cookie sessions and one-shot flash messages
//!
//! The cookie only carries a random id; user identity and pending flashes
//! live server side in [`SessionStore`].

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "bse_monitor_session";
pub const SESSION_MAX_AGE: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flash {
    /// `success`, `info`, `warning` or `error`
    pub category: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub flashes: Vec<Flash>,
    pub created_at: i64,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, user: Option<SessionUser>) -> String {
        let session_id = Uuid::new_v4().to_string();
        let data = SessionData {
            user,
            flashes: Vec::new(),
            created_at: chrono::Utc::now().timestamp(),
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(session_id.clone(), data);
        }
        session_id
    }

    pub fn get(&self, session_id: &str) -> Option<SessionData> {
        self.sessions.read().ok()?.get(session_id).cloned()
    }

    pub fn user(&self, session_id: &str) -> Option<SessionUser> {
        self.get(session_id)?.user
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false)
    }

    fn push_flash(&self, session_id: &str, flash: Flash) {
        if let Ok(mut sessions) = self.sessions.write() {
            if let Some(data) = sessions.get_mut(session_id) {
                data.flashes.push(flash);
            }
        }
    }

    /// Pending flashes, removed from the session
    pub fn take_flashes(&self, session_id: &str) -> Vec<Flash> {
        self.sessions
            .write()
            .ok()
            .and_then(|mut sessions| {
                sessions
                    .get_mut(session_id)
                    .map(|data| std::mem::take(&mut data.flashes))
            })
            .unwrap_or_default()
    }

    pub fn remove(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(session_id);
        }
    }

    pub fn cleanup_expired(&self, max_age_seconds: i64) {
        let cutoff = chrono::Utc::now().timestamp() - max_age_seconds;
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.retain(|_, data| data.created_at > cutoff);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn session_cookie(session_id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, session_id))
        .http_only(true)
        .secure(secure)
        // must reach top-level navigations from other sites
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_MAX_AGE))
        .path("/")
        .build()
}

pub fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string())
}

/// Queue a flash, creating an anonymous session (and cookie) when needed
pub fn flash(
    jar: CookieJar,
    sessions: &SessionStore,
    secure: bool,
    category: &'static str,
    message: impl Into<String>,
) -> CookieJar {
    let flash = Flash {
        category,
        message: message.into(),
    };
    match session_id(&jar).filter(|id| sessions.exists(id)) {
        Some(id) => {
            sessions.push_flash(&id, flash);
            jar
        }
        None => {
            let id = sessions.create(None);
            sessions.push_flash(&id, flash);
            jar.add(session_cookie(id, secure))
        }
    }
}

/// Flashes for the page being rendered
pub fn take_flashes(jar: &CookieJar, sessions: &SessionStore) -> Vec<Flash> {
    session_id(jar)
        .map(|id| sessions.take_flashes(&id))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> SessionUser {
        SessionUser {
            user_id: Uuid::new_v4(),
            email: Some("a@b.com".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let store = SessionStore::new();
        let signed_in = user();
        let id = store.create(Some(signed_in.clone()));
        assert_eq!(store.user(&id), Some(signed_in));
        assert_eq!(store.user("missing"), None);

        store.remove(&id);
        assert!(store.is_empty());
    }

    #[test]
    fn test_flash_creates_anonymous_session() {
        let store = SessionStore::new();
        let jar = flash(CookieJar::new(), &store, false, "warning", "log in first");

        let id = session_id(&jar).unwrap();
        assert_eq!(store.user(&id), None);

        let flashes = take_flashes(&jar, &store);
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].category, "warning");
        // one-shot
        assert!(take_flashes(&jar, &store).is_empty());
    }

    #[test]
    fn test_flash_reuses_existing_session() {
        let store = SessionStore::new();
        let id = store.create(Some(user()));
        let jar = CookieJar::new().add(session_cookie(id.clone(), false));

        let jar = flash(jar, &store, false, "success", "saved");
        assert_eq!(session_id(&jar), Some(id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stale_cookie_gets_new_session() {
        let store = SessionStore::new();
        let jar = CookieJar::new().add(session_cookie("gone".to_string(), false));
        let jar = flash(jar, &store, false, "info", "hello");
        assert_ne!(session_id(&jar).as_deref(), Some("gone"));
    }

    #[test]
    fn test_cleanup_expired() {
        let store = SessionStore::new();
        store.create(None);
        store.cleanup_expired(-10);
        assert!(store.is_empty());
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("abc".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
