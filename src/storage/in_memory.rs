//! In-memory implementation of Store for testing and development

use crate::core::error::{AppError, AppResult};
use crate::core::model::{
    CronRunLog, MonitoredScrip, Profile, ProviderColumn, SeenAnnouncement, TelegramRecipient,
};
use crate::core::store::Store;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    scrips: Vec<MonitoredScrip>,
    recipients: Vec<TelegramRecipient>,
    seen: Vec<SeenAnnouncement>,
    category_prefs: HashMap<Uuid, BTreeSet<String>>,
    cron_logs: Vec<CronRunLog>,
}

/// In-memory store implementation
///
/// Uses RwLock for thread-safe access. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a profile directly (seeding, tests)
    pub fn insert_profile(&self, profile: Profile) -> AppResult<()> {
        self.write()?.profiles.insert(profile.id, profile);
        Ok(())
    }

    /// All seen announcements (tests, debugging)
    pub fn seen_announcements(&self) -> AppResult<Vec<SeenAnnouncement>> {
        Ok(self.read()?.seen.clone())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| AppError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| AppError::Storage(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.read().map(|_| ())
    }

    async fn profile_by_id(&self, id: &Uuid) -> AppResult<Option<Profile>> {
        Ok(self.read()?.profiles.get(id).cloned())
    }

    async fn profile_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        Ok(self
            .read()?
            .profiles
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn profile_by_provider_uid(
        &self,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Option<Profile>> {
        Ok(self
            .read()?
            .profiles
            .values()
            .find(|p| p.provider_uid(column) == Some(uid))
            .cloned())
    }

    async fn create_profile(
        &self,
        email: &str,
        _phone: Option<&str>,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<Profile> {
        let mut tables = self.write()?;
        if tables
            .profiles
            .values()
            .any(|p| p.email.as_deref() == Some(email))
        {
            return Err(AppError::Storage(format!(
                "A user with email {} already exists",
                email
            )));
        }

        let mut profile = Profile::new(Some(email.to_string()));
        profile.set_provider_uid(column, uid);
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn set_provider_uid(
        &self,
        id: &Uuid,
        column: ProviderColumn,
        uid: &str,
    ) -> AppResult<()> {
        let mut tables = self.write()?;
        let profile = tables.profiles.get_mut(id).ok_or_else(|| AppError::NotFound {
            entity: "profile",
            key: id.to_string(),
        })?;
        profile.set_provider_uid(column, uid);
        Ok(())
    }

    async fn update_profile_email(&self, id: &Uuid, email: &str) -> AppResult<()> {
        let mut tables = self.write()?;
        let profile = tables.profiles.get_mut(id).ok_or_else(|| AppError::NotFound {
            entity: "profile",
            key: id.to_string(),
        })?;
        profile.email = Some(email.to_string());
        Ok(())
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.read()?.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(profiles)
    }

    async fn list_scrips(&self, user_id: &Uuid) -> AppResult<Vec<MonitoredScrip>> {
        Ok(self
            .read()?
            .scrips
            .iter()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_scrips(&self) -> AppResult<Vec<MonitoredScrip>> {
        Ok(self.read()?.scrips.clone())
    }

    async fn add_scrip(&self, scrip: MonitoredScrip) -> AppResult<()> {
        let mut tables = self.write()?;
        let exists = tables
            .scrips
            .iter()
            .any(|s| s.user_id == scrip.user_id && s.bse_code == scrip.bse_code);
        if !exists {
            tables.scrips.push(scrip);
        }
        Ok(())
    }

    async fn delete_scrip(&self, user_id: &Uuid, bse_code: &str) -> AppResult<()> {
        self.write()?
            .scrips
            .retain(|s| !(&s.user_id == user_id && s.bse_code == bse_code));
        Ok(())
    }

    async fn list_recipients(&self, user_id: &Uuid) -> AppResult<Vec<TelegramRecipient>> {
        Ok(self
            .read()?
            .recipients
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_recipients(&self) -> AppResult<Vec<TelegramRecipient>> {
        Ok(self.read()?.recipients.clone())
    }

    async fn recipient_owner(&self, chat_id: &str) -> AppResult<Option<Uuid>> {
        Ok(self
            .read()?
            .recipients
            .iter()
            .find(|r| r.chat_id == chat_id)
            .map(|r| r.user_id))
    }

    async fn insert_recipient(&self, recipient: TelegramRecipient) -> AppResult<()> {
        let mut tables = self.write()?;
        if tables.recipients.iter().any(|r| r.chat_id == recipient.chat_id) {
            return Err(AppError::Storage(format!(
                "chat_id {} is already registered",
                recipient.chat_id
            )));
        }
        tables.recipients.push(recipient);
        Ok(())
    }

    async fn reassign_recipient(&self, chat_id: &str, user_id: &Uuid) -> AppResult<()> {
        for recipient in self
            .write()?
            .recipients
            .iter_mut()
            .filter(|r| r.chat_id == chat_id)
        {
            recipient.user_id = *user_id;
        }
        Ok(())
    }

    async fn delete_recipient(&self, user_id: &Uuid, chat_id: &str) -> AppResult<()> {
        self.write()?
            .recipients
            .retain(|r| !(&r.user_id == user_id && r.chat_id == chat_id));
        Ok(())
    }

    async fn seen_announcement_exists(&self, user_id: &Uuid, news_id: &str) -> AppResult<bool> {
        Ok(self
            .read()?
            .seen
            .iter()
            .any(|s| &s.user_id == user_id && s.news_id == news_id))
    }

    async fn save_seen_announcement(&self, seen: SeenAnnouncement) -> AppResult<()> {
        self.write()?.seen.push(seen);
        Ok(())
    }

    async fn category_prefs(&self, user_id: &Uuid) -> AppResult<Vec<String>> {
        Ok(self
            .read()?
            .category_prefs
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_category_prefs(&self, user_id: &Uuid, categories: &[String]) -> AppResult<()> {
        let set: BTreeSet<String> = categories.iter().cloned().collect();
        self.write()?.category_prefs.insert(*user_id, set);
        Ok(())
    }

    async fn insert_cron_log(&self, mut log: CronRunLog) -> AppResult<()> {
        let mut tables = self.write()?;
        log.id = Some(tables.cron_logs.len() as i64 + 1);
        log.run_at.get_or_insert_with(Utc::now);
        tables.cron_logs.push(log);
        Ok(())
    }

    async fn recent_cron_logs(&self, limit: usize) -> AppResult<Vec<CronRunLog>> {
        Ok(self
            .read()?
            .cron_logs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn purge_except(&self, keep: &Uuid) -> AppResult<()> {
        let mut tables = self.write()?;
        tables.seen.retain(|s| &s.user_id == keep);
        tables.scrips.retain(|s| &s.user_id == keep);
        tables.recipients.retain(|r| &r.user_id == keep);
        Ok(())
    }
}
