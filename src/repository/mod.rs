//! Repository layer over the remote realtime database

pub mod equipment;
pub mod references;

use std::sync::Arc;

use crate::{config::CollectionsConfig, remote::RemoteStore};

/// Main repository struct holding the remote store handle
#[derive(Clone)]
pub struct Repository {
    pub store: Arc<dyn RemoteStore>,
    pub equipment: equipment::EquipmentRepository,
    pub references: references::ReferenceLoader,
}

impl Repository {
    /// Create a new repository on top of `store`
    pub fn new(store: Arc<dyn RemoteStore>, collections: &CollectionsConfig, instance_id: u16) -> Self {
        Self {
            equipment: equipment::EquipmentRepository::new(
                store.clone(),
                &collections.equipment,
                instance_id,
            ),
            references: references::ReferenceLoader::new(
                store.clone(),
                &collections.types,
                &collections.statuses,
            ),
            store,
        }
    }
}
