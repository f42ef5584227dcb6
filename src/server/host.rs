//! Server host holding the application state
//!
//! `ServerHost` is built once by the [`ServerBuilder`](super::ServerBuilder)
//! and shared with every handler as [`AppState`].

use crate::catalog::CompanyCatalog;
use crate::config::AppConfig;
use crate::core::store::Store;
use crate::identity::IdentityVerifier;
use crate::jobs::CronRunner;
use crate::notify::Notifier;
use crate::sentiment::SentimentService;
use crate::server::session::SessionStore;
use crate::server::templates::Templates;
use std::sync::Arc;

pub type AppState = Arc<ServerHost>;

/// Host context containing every service the routes use
pub struct ServerHost {
    pub config: Arc<AppConfig>,

    pub store: Arc<dyn Store>,

    /// BSE code to company name and Yahoo symbol
    pub catalog: Arc<CompanyCatalog>,

    /// Per-user Telegram deliveries from the dashboard
    pub notifier: Notifier,

    /// Cron jobs over all users
    pub jobs: CronRunner,

    pub sentiment: SentimentService,

    /// Checks sign-in tokens posted by the login page
    pub verifier: Arc<dyn IdentityVerifier>,

    pub sessions: SessionStore,

    pub templates: Templates,
}

impl ServerHost {
    pub fn secure_cookies(&self) -> bool {
        self.config.secure_cookies
    }
}
