//! ServerBuilder for fluent API to build the HTTP server

use super::host::ServerHost;
use super::router::build_router;
use super::session::{SESSION_MAX_AGE, SessionStore};
use super::templates::Templates;
use crate::bse::BseClient;
use crate::catalog::CompanyCatalog;
use crate::config::AppConfig;
use crate::core::error::AppResult;
use crate::core::store::Store;
use crate::identity::{FirebaseVerifier, IdentityVerifier};
use crate::jobs::CronRunner;
use crate::market::YahooClient;
use crate::notify::Notifier;
use crate::sentiment::SentimentService;
use crate::storage::{InMemoryStore, SupabaseStore};
use crate::telegram::TelegramClient;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Builder wiring the configuration, storage and vendor clients into a router
///
/// Anything not supplied explicitly is derived from the configuration.
///
/// # Example
///
/// ```ignore
/// let config = AppConfig::load()?;
/// ServerBuilder::new()
///     .with_config(config.clone())
///     .serve(&config.bind_addr())
///     .await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn Store>>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    catalog: Option<CompanyCatalog>,
    sentiment: Option<SentimentService>,
    custom_routes: Vec<Router>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            verifier: None,
            catalog: None,
            sentiment: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of the one derived from the Supabase settings
    pub fn with_store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn with_shared_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the Identity Toolkit verifier
    pub fn with_verifier(mut self, verifier: impl IdentityVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Use this catalog instead of loading `companies_csv`
    pub fn with_catalog(mut self, catalog: CompanyCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_sentiment(mut self, sentiment: SentimentService) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// Add routes outside the built-in table
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the host holding every service
    pub fn build_host(self) -> AppResult<(ServerHost, Vec<Router>)> {
        let config = Arc::new(self.config);
        let endpoints = &config.endpoints;

        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => default_store(&config)?,
        };

        let catalog = Arc::new(
            self.catalog
                .unwrap_or_else(|| CompanyCatalog::load(&config.companies_csv)),
        );

        let telegram =
            TelegramClient::new(&endpoints.telegram_api, config.telegram_bot_token.clone())?;
        if !telegram.is_configured() {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, Telegram delivery disabled");
        }
        let notifier = Notifier::new(
            store.clone(),
            catalog.clone(),
            YahooClient::new(
                &endpoints.yahoo_chart,
                Duration::from_secs(config.yahoo_cache_ttl),
            )?,
            BseClient::new(endpoints)?,
            telegram,
            config.spike_threshold_pct,
        );
        let jobs = CronRunner::new(store.clone(), notifier.clone());

        let sentiment = match self.sentiment {
            Some(sentiment) => sentiment,
            None => SentimentService::from_config(&config)?,
        };

        let verifier: Arc<dyn IdentityVerifier> = match self.verifier {
            Some(verifier) => verifier,
            None => Arc::new(FirebaseVerifier::new(
                &endpoints.identity_toolkit,
                config.firebase_api_key.clone(),
            )?),
        };

        if config.cron_secret_key.is_none() {
            tracing::warn!("CRON_SECRET_KEY not set, /cron endpoints will reject every call");
        }

        let host = ServerHost {
            config: config.clone(),
            store,
            catalog,
            notifier,
            jobs,
            sentiment,
            verifier,
            sessions: SessionStore::new(),
            templates: Templates::new()?,
        };
        Ok((host, self.custom_routes))
    }

    /// Build the router
    pub fn build(self) -> AppResult<Router> {
        let (host, custom_routes) = self.build_host()?;
        Ok(build_router(Arc::new(host), custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// Expired sessions are swept hourly while the server runs.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let (host, custom_routes) = self.build_host()?;
        let host = Arc::new(host);

        let sessions = host.sessions.clone();
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                sessions.cleanup_expired(SESSION_MAX_AGE);
            }
        });

        let app = build_router(host, custom_routes);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        sweeper.abort();
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn default_store(config: &AppConfig) -> AppResult<Arc<dyn Store>> {
    match (&config.supabase_url, &config.supabase_service_key) {
        (Some(url), Some(key)) if config.supabase_configured() => {
            tracing::info!(url = %url, "using Supabase storage");
            Ok(Arc::new(SupabaseStore::new(url.clone(), key.clone())?))
        }
        _ => {
            tracing::warn!(
                "SUPABASE_URL / SUPABASE_SERVICE_KEY not set, using in-memory storage (data is lost on restart)"
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticVerifier;

    fn builder() -> ServerBuilder {
        ServerBuilder::new()
            .with_store(InMemoryStore::new())
            .with_catalog(CompanyCatalog::default())
            .with_verifier(StaticVerifier::new())
            .with_sentiment(SentimentService::new(Vec::new()))
    }

    #[test]
    fn test_build_produces_router() {
        assert!(builder().build().is_ok());
    }

    #[test]
    fn test_build_host_keeps_supplied_services() {
        let (host, custom_routes) = builder()
            .with_custom_routes(Router::new())
            .build_host()
            .unwrap();
        assert!(host.sentiment.source_kinds().is_empty());
        assert!(host.catalog.is_empty());
        assert_eq!(custom_routes.len(), 1);
    }

    #[test]
    fn test_default_store_without_supabase_is_in_memory() {
        let config = AppConfig::default();
        assert!(!config.supabase_configured());
        assert!(default_store(&config).is_ok());
    }

    #[tokio::test]
    async fn test_custom_routes_are_served() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use axum::routing::get;
        use tower::ServiceExt;

        let app = builder()
            .with_custom_routes(Router::new().route("/version", get(|| async { "1" })))
            .build()
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
