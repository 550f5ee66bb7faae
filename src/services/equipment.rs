//! Equipment service

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::FeedTask;
use crate::{
    error::{AppError, AppResult, TransportError},
    filter::EquipmentFilter,
    models::equipment::{EquipmentDraft, EquipmentId, EquipmentRecord},
    repository::equipment::{EquipmentRepository, EquipmentView, RecordState},
};

/// Filtered slice of the live collection
#[derive(Debug, Clone)]
pub struct EquipmentListing {
    pub items: Vec<EquipmentRecord>,
    /// Present while the live feed is failing and `items` may be stale
    pub stale: Option<String>,
}

/// Keeps one live mirror of the equipment collection and serves reads from it
#[derive(Clone)]
pub struct EquipmentService {
    repository: EquipmentRepository,
    /// How long a details lookup waits for the first snapshot
    read_timeout: Duration,
    view: watch::Receiver<EquipmentView>,
    _feed: Arc<FeedTask>,
}

impl EquipmentService {
    pub fn new(repository: EquipmentRepository, read_timeout: Duration) -> Self {
        let (sender, view) = watch::channel(EquipmentView::default());
        let mut feed = repository.subscribe_all();

        let task = FeedTask::spawn(async move {
            while feed.changed().await {
                sender.send_replace(feed.view().clone());
            }
            tracing::info!("Equipment feed ended");
        });

        Self {
            repository,
            read_timeout,
            view,
            _feed: Arc::new(task),
        }
    }

    /// Receiver that observes every new view of the collection
    pub fn subscribe(&self) -> watch::Receiver<EquipmentView> {
        self.view.clone()
    }

    /// Whether the first snapshot has arrived
    pub fn is_ready(&self) -> bool {
        self.view.borrow().loaded
    }

    pub fn list(&self, filter: &EquipmentFilter) -> EquipmentListing {
        let view = self.view.borrow().clone();
        EquipmentListing {
            items: filter.apply(&view.records),
            stale: view.error,
        }
    }

    /// Read one record through a short-lived subscription
    pub async fn get_by_id(&self, id: &EquipmentId) -> AppResult<EquipmentRecord> {
        let mut watch = self.repository.watch(id);
        let state = tokio::time::timeout(self.read_timeout, watch.next())
            .await
            .map_err(|_| AppError::Transport(TransportError::Timeout))?;

        match state {
            Some(RecordState::Loaded(record)) => Ok(record),
            Some(RecordState::NotFound) => Err(AppError::NotFound(format!("Equipment {} not found", id))),
            Some(RecordState::Failed(message)) => Err(AppError::Transport(TransportError::Stream(message))),
            None => Err(AppError::Transport(TransportError::Stream(
                "subscription closed".to_string(),
            ))),
        }
    }

    pub async fn create(&self, draft: &EquipmentDraft) -> AppResult<EquipmentId> {
        self.repository.create(draft).await
    }

    pub async fn update(&self, id: &EquipmentId, draft: &EquipmentDraft) -> AppResult<()> {
        self.repository.update(id, draft).await
    }

    pub async fn delete(&self, id: &EquipmentId) -> AppResult<()> {
        self.repository.delete(id).await
    }
}
