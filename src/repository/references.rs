//! Reference data loader (equipment types and statuses)

use std::sync::Arc;

use serde_json::Value;

use crate::{
    models::reference::{ReferenceCollection, ReferenceItem},
    remote::{DbPath, RemoteStore, Subscription},
};

#[derive(Clone)]
pub struct ReferenceLoader {
    store: Arc<dyn RemoteStore>,
    types: DbPath,
    statuses: DbPath,
}

impl ReferenceLoader {
    pub fn new(store: Arc<dyn RemoteStore>, types: &str, statuses: &str) -> Self {
        Self {
            store,
            types: DbPath::parse(types),
            statuses: DbPath::parse(statuses),
        }
    }

    fn path(&self, collection: ReferenceCollection) -> &DbPath {
        match collection {
            ReferenceCollection::Types => &self.types,
            ReferenceCollection::Statuses => &self.statuses,
        }
    }

    /// Subscribe to one lookup collection
    pub fn subscribe(&self, collection: ReferenceCollection) -> ReferenceFeed {
        ReferenceFeed {
            collection,
            subscription: self.store.subscribe(self.path(collection)),
        }
    }
}

/// Live list of reference items; every change replaces the whole list
pub struct ReferenceFeed {
    collection: ReferenceCollection,
    subscription: Subscription,
}

impl ReferenceFeed {
    pub fn collection(&self) -> ReferenceCollection {
        self.collection
    }

    /// Next full list. Missing data and transport failures both read as empty.
    pub async fn next(&mut self) -> Option<Vec<ReferenceItem>> {
        let event = self.subscription.next_event().await?;
        let items = match event {
            Ok(snapshot) => decode_references(snapshot.as_ref()),
            Err(e) => {
                tracing::warn!(collection = %self.collection, error = %e, "Failed to load reference data");
                Vec::new()
            }
        };
        Some(items)
    }
}

/// Turn a `{id: {name, ..}}` object into items, keeping key order
pub fn decode_references(snapshot: Option<&Value>) -> Vec<ReferenceItem> {
    let entries: Vec<(String, &Value)> = match snapshot {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        // Integer-like keys can come back as a sparse array
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|(id, entry)| match entry.get("name").and_then(Value::as_str) {
            Some(name) => Some(ReferenceItem {
                id,
                name: name.to_string(),
            }),
            None => {
                tracing::warn!(id = %id, "Skipping reference entry without a name");
                None
            }
        })
        .collect()
}
