//! Storage trait over the application tables
//!
//! The service is agnostic to the backend: [`InMemoryStore`] serves tests and
//! local development, [`SupabaseStore`] talks to PostgREST.
//!
//! [`InMemoryStore`]: crate::storage::InMemoryStore
//! [`SupabaseStore`]: crate::storage::SupabaseStore

use crate::core::error::AppResult;
use crate::core::model::{
    CronRunLog, MonitoredScrip, Profile, ProviderColumn, SeenAnnouncement, TelegramRecipient,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check used by `/health`
    async fn ping(&self) -> AppResult<()>;

    // === Profiles ===

    async fn profile_by_id(&self, id: &Uuid) -> AppResult<Option<Profile>>;

    async fn profile_by_email(&self, email: &str) -> AppResult<Option<Profile>>;

    async fn profile_by_provider_uid(
        &self,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Option<Profile>>;

    /// Create a user (auth record and profile row)
    async fn create_profile(
        &self,
        email: &str,
        phone: Option<&str>,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Profile>;

    async fn set_provider_uid(&self, id: &Uuid, column: ProviderColumn, uid: &str)
    -> AppResult<()>;

    async fn update_profile_email(&self, id: &Uuid, email: &str) -> AppResult<()>;

    /// All profiles ordered by email
    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;

    // === Watchlists ===

    async fn list_scrips(&self, user_id: &Uuid) -> AppResult<Vec<MonitoredScrip>>;

    async fn list_all_scrips(&self) -> AppResult<Vec<MonitoredScrip>>;

    async fn add_scrip(&self, scrip: MonitoredScrip) -> AppResult<()>;

    async fn delete_scrip(&self, user_id: &Uuid, bse_code: &str) -> AppResult<()>;

    // === Telegram recipients ===

    async fn list_recipients(&self, user_id: &Uuid) -> AppResult<Vec<TelegramRecipient>>;

    async fn list_all_recipients(&self) -> AppResult<Vec<TelegramRecipient>>;

    /// Owner of a chat id, if the chat is registered at all
    async fn recipient_owner(&self, chat_id: &str) -> AppResult<Option<Uuid>>;

    async fn insert_recipient(&self, recipient: TelegramRecipient) -> AppResult<()>;

    async fn reassign_recipient(&self, chat_id: &str, user_id: &Uuid) -> AppResult<()>;

    async fn delete_recipient(&self, user_id: &Uuid, chat_id: &str) -> AppResult<()>;

    // === Announcements ===

    async fn seen_announcement_exists(&self, user_id: &Uuid, news_id: &str) -> AppResult<bool>;

    async fn save_seen_announcement(&self, seen: SeenAnnouncement) -> AppResult<()>;

    async fn category_prefs(&self, user_id: &Uuid) -> AppResult<Vec<String>>;

    /// Replace the user's category preferences
    async fn set_category_prefs(&self, user_id: &Uuid, categories: &[String]) -> AppResult<()>;

    // === Cron bookkeeping ===

    async fn insert_cron_log(&self, log: CronRunLog) -> AppResult<()>;

    /// Most recent rows first
    async fn recent_cron_logs(&self, limit: usize) -> AppResult<Vec<CronRunLog>>;

    // === Maintenance ===

    /// Delete announcements, scrips and recipients of everyone but `keep`
    async fn purge_except(&self, keep: &Uuid) -> AppResult<()>;
}
