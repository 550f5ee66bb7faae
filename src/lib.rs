//! Equipment Inventory
//!
//! Keeps a live, filterable view of an equipment collection stored in a
//! realtime JSON database and serves it over a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod form;
pub mod models;
pub mod remote;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
