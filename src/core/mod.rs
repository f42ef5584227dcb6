//! Core types shared by every layer

pub mod auth;
pub mod error;
pub mod model;
pub mod store;
pub mod watchlist;

pub use auth::{AuthContext, AuthPolicy};
pub use error::{AppError, AppResult, UpstreamError};
pub use store::Store;
