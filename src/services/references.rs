//! Reference data service

use std::sync::Arc;

use tokio::sync::watch;

use super::FeedTask;
use crate::{
    models::reference::{ReferenceCollection, ReferenceItem},
    repository::references::ReferenceLoader,
};

/// Keeps the equipment types and statuses lists current
#[derive(Clone)]
pub struct ReferenceService {
    types: watch::Receiver<Arc<Vec<ReferenceItem>>>,
    statuses: watch::Receiver<Arc<Vec<ReferenceItem>>>,
    _feeds: Arc<[FeedTask; 2]>,
}

impl ReferenceService {
    pub fn new(loader: ReferenceLoader) -> Self {
        let (types, types_task) = Self::follow(&loader, ReferenceCollection::Types);
        let (statuses, statuses_task) = Self::follow(&loader, ReferenceCollection::Statuses);
        Self {
            types,
            statuses,
            _feeds: Arc::new([types_task, statuses_task]),
        }
    }

    fn follow(
        loader: &ReferenceLoader,
        collection: ReferenceCollection,
    ) -> (watch::Receiver<Arc<Vec<ReferenceItem>>>, FeedTask) {
        let (sender, receiver) = watch::channel(Arc::new(Vec::new()));
        let mut feed = loader.subscribe(collection);

        let task = FeedTask::spawn(async move {
            while let Some(items) = feed.next().await {
                tracing::debug!(collection = %feed.collection(), count = items.len(), "Reference list updated");
                sender.send_replace(Arc::new(items));
            }
        });
        (receiver, task)
    }

    /// Current list, empty until loaded
    pub fn list(&self, collection: ReferenceCollection) -> Arc<Vec<ReferenceItem>> {
        match collection {
            ReferenceCollection::Types => self.types.borrow().clone(),
            ReferenceCollection::Statuses => self.statuses.borrow().clone(),
        }
    }

    pub fn subscribe(&self, collection: ReferenceCollection) -> watch::Receiver<Arc<Vec<ReferenceItem>>> {
        match collection {
            ReferenceCollection::Types => self.types.clone(),
            ReferenceCollection::Statuses => self.statuses.clone(),
        }
    }
}
