//! Watchlist operations shared by the dashboard and the admin panel

use crate::bse::CATEGORIES;
use crate::catalog::CompanyCatalog;
use crate::core::error::{AppError, AppResult};
use crate::core::model::{MonitoredScrip, TelegramRecipient, UserDetails};
use crate::core::store::Store;
use serde::Serialize;
use uuid::Uuid;

/// Outcome of registering a chat id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientChange {
    Added,
    /// The chat already belonged to this user
    Unchanged,
    /// The chat moved over from another user
    Reassigned { previous_owner: Uuid },
}

/// Register `chat_id` for `user_id`
///
/// Chat ids are globally unique, so a chat owned by someone else is moved
/// to this user rather than duplicated.
pub async fn add_recipient(
    store: &dyn Store,
    user_id: &Uuid,
    chat_id: &str,
) -> AppResult<RecipientChange> {
    let chat_id = chat_id.trim();
    if chat_id.is_empty() {
        return Err(AppError::Validation("Chat ID is required.".to_string()));
    }

    match store.recipient_owner(chat_id).await? {
        Some(owner) if owner == *user_id => Ok(RecipientChange::Unchanged),
        Some(owner) => {
            store.reassign_recipient(chat_id, user_id).await?;
            tracing::info!(chat_id = %chat_id, from = %owner, to = %user_id, "recipient reassigned");
            Ok(RecipientChange::Reassigned {
                previous_owner: owner,
            })
        }
        None => {
            store
                .insert_recipient(TelegramRecipient {
                    user_id: *user_id,
                    chat_id: chat_id.to_string(),
                })
                .await?;
            Ok(RecipientChange::Added)
        }
    }
}

/// Add a scrip, resolving a blank company name from the catalog
pub async fn add_scrip(
    store: &dyn Store,
    catalog: &CompanyCatalog,
    user_id: &Uuid,
    bse_code: &str,
    company_name: Option<&str>,
) -> AppResult<MonitoredScrip> {
    let bse_code = bse_code.trim();
    if bse_code.is_empty() {
        return Err(AppError::Validation("Scrip code is required.".to_string()));
    }

    let company_name = match company_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => catalog
            .find_by_code(bse_code)
            .map(|c| c.company_name.clone())
            .ok_or_else(|| AppError::NotFound {
                entity: "scrip",
                key: bse_code.to_string(),
            })?,
    };

    let scrip = MonitoredScrip {
        user_id: *user_id,
        bse_code: bse_code.to_string(),
        company_name,
    };
    store.add_scrip(scrip.clone()).await?;
    Ok(scrip)
}

/// Keep known categories only, in canonical spelling and without duplicates
pub fn normalize_categories(selected: &[String]) -> Vec<String> {
    CATEGORIES
        .iter()
        .filter(|known| selected.iter().any(|s| s.trim().eq_ignore_ascii_case(known)))
        .map(|known| known.to_string())
        .collect()
}

pub async fn set_category_prefs(
    store: &dyn Store,
    user_id: &Uuid,
    selected: &[String],
) -> AppResult<Vec<String>> {
    let categories = normalize_categories(selected);
    store.set_category_prefs(user_id, &categories).await?;
    Ok(categories)
}

/// Everything configured for one user
#[derive(Debug, Clone, Serialize)]
pub struct UserSetup {
    pub user_id: Uuid,
    pub monitored_scrips: Vec<MonitoredScrip>,
    pub recipients: Vec<TelegramRecipient>,
    pub category_preferences: Vec<String>,
    pub scrip_count: usize,
    pub recipient_count: usize,
    pub category_count: usize,
}

pub async fn user_setup(store: &dyn Store, user_id: &Uuid) -> AppResult<UserSetup> {
    let monitored_scrips = store.list_scrips(user_id).await?;
    let recipients = store.list_recipients(user_id).await?;
    let category_preferences = store.category_prefs(user_id).await?;

    Ok(UserSetup {
        user_id: *user_id,
        scrip_count: monitored_scrips.len(),
        recipient_count: recipients.len(),
        category_count: category_preferences.len(),
        monitored_scrips,
        recipients,
        category_preferences,
    })
}

/// Profile plus watchlist, for the admin panel
pub async fn user_details(store: &dyn Store, user_id: &Uuid) -> AppResult<UserDetails> {
    let profile = store
        .profile_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "user",
            key: user_id.to_string(),
        })?;

    Ok(UserDetails {
        id: profile.id,
        email: profile.email.unwrap_or_default(),
        scrips: store.list_scrips(user_id).await?,
        recipients: store.list_recipients(user_id).await?,
    })
}
