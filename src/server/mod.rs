//! HTTP server: dashboard, admin panel, cron endpoints and JSON APIs
//!
//! [`ServerBuilder`] turns an [`AppConfig`](crate::config::AppConfig) into an
//! axum `Router` backed by a shared [`ServerHost`].

pub mod builder;
pub mod extractors;
pub mod handlers;
pub mod host;
pub mod router;
pub mod session;
pub mod templates;

pub use builder::ServerBuilder;
pub use host::{AppState, ServerHost};
pub use session::SessionStore;
