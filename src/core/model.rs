//! Persisted records
//!
//! Field names follow the Supabase tables so rows (de)serialize as-is.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which provider-uid column a sign-in maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderColumn {
    GoogleUid,
    FirebaseUid,
}

impl ProviderColumn {
    pub fn column(&self) -> &'static str {
        match self {
            ProviderColumn::GoogleUid => "google_uid",
            ProviderColumn::FirebaseUid => "firebase_uid",
        }
    }

    /// `google.com` sign-ins use `google_uid`, everything else `firebase_uid`
    pub fn for_provider(sign_in_provider: &str) -> Self {
        if sign_in_provider == "google.com" {
            ProviderColumn::GoogleUid
        } else {
            ProviderColumn::FirebaseUid
        }
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub google_uid: Option<String>,
    #[serde(default)]
    pub firebase_uid: Option<String>,
}

impl Profile {
    pub fn new(email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            is_admin: false,
            google_uid: None,
            firebase_uid: None,
        }
    }

    pub fn provider_uid(&self, column: ProviderColumn) -> Option<&str> {
        match column {
            ProviderColumn::GoogleUid => self.google_uid.as_deref(),
            ProviderColumn::FirebaseUid => self.firebase_uid.as_deref(),
        }
    }

    pub fn set_provider_uid(&mut self, column: ProviderColumn, uid: &str) {
        match column {
            ProviderColumn::GoogleUid => self.google_uid = Some(uid.to_string()),
            ProviderColumn::FirebaseUid => self.firebase_uid = Some(uid.to_string()),
        }
    }
}

/// A scrip on a user's watchlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredScrip {
    pub user_id: Uuid,
    pub bse_code: String,
    pub company_name: String,
}

impl MonitoredScrip {
    /// Display name, falling back to the code
    pub fn display_name(&self) -> &str {
        if self.company_name.trim().is_empty() {
            &self.bse_code
        } else {
            &self.company_name
        }
    }
}

/// A Telegram chat receiving a user's notifications; `chat_id` is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramRecipient {
    pub user_id: Uuid,
    pub chat_id: String,
}

/// An announcement already delivered to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenAnnouncement {
    pub user_id: Uuid,
    pub news_id: String,
    pub scrip_code: String,
    pub headline: String,
    pub pdf_name: String,
    pub ann_date: DateTime<FixedOffset>,
    pub caption: String,
}

/// One row per user per cron run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronRunLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub run_id: Uuid,
    pub job: String,
    pub user_id: Option<Uuid>,
    pub processed: bool,
    pub notifications_sent: u32,
    pub recipients: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
}

/// Profile with its watchlist, as shown in the admin panel
#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    pub id: Uuid,
    pub email: String,
    pub scrips: Vec<MonitoredScrip>,
    pub recipients: Vec<TelegramRecipient>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_column_mapping() {
        assert_eq!(
            ProviderColumn::for_provider("google.com"),
            ProviderColumn::GoogleUid
        );
        assert_eq!(
            ProviderColumn::for_provider("phone"),
            ProviderColumn::FirebaseUid
        );
        assert_eq!(ProviderColumn::GoogleUid.column(), "google_uid");
    }

    #[test]
    fn test_profile_deserializes_sparse_row() {
        let id = Uuid::new_v4();
        let row = serde_json::json!({ "id": id, "email": "a@b.com" });
        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.id, id);
        assert!(!profile.is_admin);
        assert!(profile.google_uid.is_none());
    }

    #[test]
    fn test_scrip_display_name_falls_back_to_code() {
        let scrip = MonitoredScrip {
            user_id: Uuid::new_v4(),
            bse_code: "500325".to_string(),
            company_name: " ".to_string(),
        };
        assert_eq!(scrip.display_name(), "500325");
    }
}
