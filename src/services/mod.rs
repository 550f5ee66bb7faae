//! Business logic services

pub mod auth;
pub mod equipment;
pub mod references;

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{config::AppConfig, repository::Repository};

/// Aborts a background feed task when the owning service goes away
#[derive(Debug)]
pub(crate) struct FeedTask(JoinHandle<()>);

impl FeedTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for FeedTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub equipment: equipment::EquipmentService,
    pub references: references::ReferenceService,
}

impl Services {
    /// Create all services and start their live feeds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            auth: auth::AuthService::new(config.auth.clone()),
            equipment: equipment::EquipmentService::new(
                repository.equipment.clone(),
                Duration::from_millis(config.remote.read_timeout_ms),
            ),
            references: references::ReferenceService::new(repository.references),
        }
    }
}
