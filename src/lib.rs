//! # bse-monitor
//!
//! Watchlists of BSE (Bombay Stock Exchange) scrips with Telegram delivery
//! of corporate announcements, price summaries and hourly spike alerts, plus
//! news and social sentiment reports.
//!
//! ## Layout
//!
//! - [`config`]: defaults, optional YAML file, environment overrides
//! - [`core`]: errors, records, the [`Store`](core::store::Store) seam,
//!   authorization and watchlist operations
//! - [`storage`]: in-memory and Supabase (PostgREST) stores
//! - [`catalog`], [`clock`]: company list and the IST market window
//! - [`telegram`], [`bse`], [`market`]: vendor clients
//! - [`notify`], [`jobs`]: per-user deliveries and cron runs
//! - [`sentiment`]: lexicon scoring over X, NewsAPI and RSS feeds
//! - [`identity`]: sign-in token verification and user resolution
//! - [`server`]: the axum application
//! - [`setup`]: the credential wizard behind `bse-monitor setup`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bse_monitor::prelude::*;
//!
//! let config = AppConfig::load()?;
//! let app = ServerBuilder::new()
//!     .with_config(config)
//!     .with_store(InMemoryStore::new())
//!     .build()?;
//! ```

pub mod bse;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod core;
pub mod identity;
pub mod jobs;
pub mod market;
pub mod notify;
pub mod sentiment;
pub mod server;
pub mod setup;
pub mod storage;
pub mod telegram;

/// Re-exports of commonly used types and traits
pub mod prelude {
    pub use crate::catalog::{Company, CompanyCatalog};
    pub use crate::config::AppConfig;
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy},
        error::{AppError, AppResult, UpstreamError},
        model::{MonitoredScrip, Profile, TelegramRecipient},
        store::Store,
    };
    pub use crate::identity::{IdentityVerifier, StaticVerifier, VerifiedIdentity};
    pub use crate::jobs::{CronRunner, JobKind, RunOptions, RunReport};
    pub use crate::sentiment::{SentimentReport, SentimentService};
    pub use crate::server::ServerBuilder;
    pub use crate::storage::{InMemoryStore, SupabaseStore};
}
