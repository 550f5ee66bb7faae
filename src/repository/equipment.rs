//! Equipment repository: live collection mirror and validated writes

use std::sync::Arc;

use serde_json::Value;

use crate::{
    config::MAX_INSTANCE_ID,
    error::{AppError, AppResult, DecodeError, TransportError},
    models::equipment::{EquipmentDraft, EquipmentId, EquipmentRecord, StoredEquipment},
    remote::{DbPath, RemoteStore, Subscription},
};

const LOAD_FAILED: &str = "Failed to load equipment.";
const RECORD_LOAD_FAILED: &str = "Failed to load data.";

/// Time-ordered id source for new equipment
pub struct IdGenerator(snowflaked::sync::Generator);

impl IdGenerator {
    /// `instance` must differ between concurrently writing processes and
    /// be at most [`MAX_INSTANCE_ID`]
    pub fn new(instance: u16) -> Self {
        debug_assert!(instance <= MAX_INSTANCE_ID, "instance id out of range");
        Self(snowflaked::sync::Generator::new(instance))
    }

    pub fn next_id(&self) -> EquipmentId {
        EquipmentId::new(self.0.generate::<u64>().to_string())
    }
}

#[derive(Clone)]
pub struct EquipmentRepository {
    store: Arc<dyn RemoteStore>,
    collection: DbPath,
    ids: Arc<IdGenerator>,
}

impl EquipmentRepository {
    pub fn new(store: Arc<dyn RemoteStore>, collection: &str, instance_id: u16) -> Self {
        Self {
            store,
            collection: DbPath::parse(collection),
            ids: Arc::new(IdGenerator::new(instance_id)),
        }
    }

    fn record_path(&self, id: &EquipmentId) -> AppResult<DbPath> {
        check_id(id)?;
        Ok(self.collection.child(id.as_str()))
    }

    /// Mirror the whole equipment collection
    pub fn subscribe_all(&self) -> EquipmentFeed {
        EquipmentFeed::new(self.store.subscribe(&self.collection))
    }

    /// Follow a single record
    pub fn watch(&self, id: &EquipmentId) -> RecordWatch {
        let subscription = match self.record_path(id) {
            Ok(path) => Some(self.store.subscribe(&path)),
            Err(_) => None,
        };
        RecordWatch {
            id: id.clone(),
            subscription,
            finished: false,
        }
    }

    /// Validate and persist a new record under a freshly minted id
    pub async fn create(&self, draft: &EquipmentDraft) -> AppResult<EquipmentId> {
        if let Err(errors) = draft.check() {
            tracing::debug!(%errors, "Rejected equipment draft");
            return Err(AppError::Validation(errors));
        }

        let id = self.ids.next_id();
        let path = self.record_path(&id)?;
        let stored = StoredEquipment::from(draft.clone());

        self.store.set(&path, stored.to_value()).await.map_err(|e| {
            tracing::error!(%id, error = %e, "Failed to create equipment");
            AppError::Transport(e)
        })?;

        tracing::info!(%id, name = %draft.name, "Equipment created");
        Ok(id)
    }

    /// Validate and overwrite the full record at `id`
    pub async fn update(&self, id: &EquipmentId, draft: &EquipmentDraft) -> AppResult<()> {
        if let Err(errors) = draft.check() {
            tracing::debug!(%id, %errors, "Rejected equipment draft");
            return Err(AppError::Validation(errors));
        }

        let path = self.record_path(id)?;
        let stored = StoredEquipment::from(draft.clone());

        self.store.set(&path, stored.to_value()).await.map_err(|e| {
            tracing::error!(%id, error = %e, "Failed to save equipment");
            AppError::Transport(e)
        })?;

        tracing::info!(%id, "Equipment saved");
        Ok(())
    }

    /// Remove the record at `id`; removing an absent record succeeds
    pub async fn delete(&self, id: &EquipmentId) -> AppResult<()> {
        let path = self.record_path(id)?;

        self.store.remove(&path).await.map_err(|e| {
            tracing::error!(%id, error = %e, "Failed to delete equipment");
            AppError::Transport(e)
        })?;

        tracing::info!(%id, "Equipment deleted");
        Ok(())
    }
}

/// Ids become path segments, so they may not contain reserved characters
fn check_id(id: &EquipmentId) -> AppResult<()> {
    let raw = id.as_str();
    if raw.is_empty() || raw.contains(['/', '.', '#', '$', '[', ']']) {
        return Err(AppError::BadRequest(format!("Invalid equipment id: {:?}", raw)));
    }
    Ok(())
}

/// Decode a collection snapshot. Malformed entries are skipped.
pub fn decode_collection(
    collection: &DbPath,
    snapshot: Option<&Value>,
) -> Result<Vec<EquipmentRecord>, DecodeError> {
    let entries: Vec<(String, &Value)> = match snapshot {
        None => return Ok(Vec::new()),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        // Integer-like keys can come back as a sparse array
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Some(other) => {
            return Err(DecodeError::new(
                collection.to_string(),
                format!("expected an object of records, found {}", other),
            ))
        }
    };

    let records = entries
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(key, value)| match EquipmentRecord::decode(EquipmentId::new(key), value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed equipment record");
                None
            }
        })
        .collect();

    Ok(records)
}

/// Current state of the mirrored collection
#[derive(Debug, Clone, Default)]
pub struct EquipmentView {
    pub records: Arc<Vec<EquipmentRecord>>,
    /// Whether at least one snapshot was received
    pub loaded: bool,
    /// Set while the feed is failing; `records` is then the last good list
    pub error: Option<String>,
}

/// Live mirror of the equipment collection.
///
/// Each snapshot replaces the list wholesale. A failed notification keeps
/// the previous list and records an error until the next good snapshot.
pub struct EquipmentFeed {
    subscription: Subscription,
    view: EquipmentView,
}

impl EquipmentFeed {
    fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            view: EquipmentView::default(),
        }
    }

    /// Wait for the next notification and fold it into the view.
    /// Returns `false` once the subscription has ended.
    pub async fn changed(&mut self) -> bool {
        match self.subscription.next_event().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, event: Result<Option<Value>, TransportError>) {
        let decoded = event
            .map_err(|e| e.to_string())
            .and_then(|snapshot| {
                decode_collection(self.subscription.path(), snapshot.as_ref())
                    .map_err(|e| e.to_string())
            });

        match decoded {
            Ok(records) => {
                tracing::debug!(count = records.len(), "Equipment snapshot received");
                self.view = EquipmentView {
                    records: Arc::new(records),
                    loaded: true,
                    error: None,
                };
            }
            Err(reason) => {
                tracing::error!(error = %reason, "Equipment feed failed, serving last known list");
                self.view.error = Some(LOAD_FAILED.to_string());
            }
        }
    }

    pub fn view(&self) -> &EquipmentView {
        &self.view
    }

    pub fn records(&self) -> &[EquipmentRecord] {
        &self.view.records
    }

    pub fn error(&self) -> Option<&str> {
        self.view.error.as_deref()
    }
}

/// State of a single watched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    Loaded(EquipmentRecord),
    NotFound,
    Failed(String),
}

/// Live view of one record
pub struct RecordWatch {
    id: EquipmentId,
    subscription: Option<Subscription>,
    finished: bool,
}

impl RecordWatch {
    pub async fn next(&mut self) -> Option<RecordState> {
        let Some(subscription) = self.subscription.as_mut() else {
            // An id that cannot name a record is reported once as absent
            if self.finished {
                return None;
            }
            self.finished = true;
            return Some(RecordState::NotFound);
        };

        let state = match subscription.next_event().await? {
            Ok(None) => RecordState::NotFound,
            Ok(Some(value)) => match EquipmentRecord::decode(self.id.clone(), &value) {
                Ok(record) => RecordState::Loaded(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed equipment record");
                    RecordState::Failed(e.to_string())
                }
            },
            Err(e) => {
                tracing::error!(id = %self.id, error = %e, "Failed to load equipment record");
                RecordState::Failed(RECORD_LOAD_FAILED.to_string())
            }
        };
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::EquipmentField,
        remote::{MemoryStore, MockRemoteStore},
    };
    use serde_json::json;
    use std::collections::HashSet;

    fn draft(name: &str) -> EquipmentDraft {
        EquipmentDraft {
            name: name.to_string(),
            equipment_type: "Laptop".to_string(),
            location: "Lab1".to_string(),
            status: "Active".to_string(),
            description: String::new(),
            serial_number: String::new(),
            model: "M1".to_string(),
        }
    }

    fn setup() -> (MemoryStore, EquipmentRepository) {
        let store = MemoryStore::with_data(json!({
            "equipmentTypes": {"t1": {"name": "Laptop"}, "t2": {"name": "Printer"}},
            "equipmentStatuses": {"s1": {"name": "Active"}, "s2": {"name": "Retired"}}
        }));
        let repo = EquipmentRepository::new(Arc::new(store.clone()), "equipment", 1);
        (store, repo)
    }

    #[test]
    fn test_id_generator_is_distinct() {
        let ids = IdGenerator::new(3);
        let generated: HashSet<EquipmentId> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 1000);
    }

    #[tokio::test]
    async fn test_create_writes_exact_fields_under_new_id() {
        let (store, repo) = setup();
        let before = store.get(&DbPath::parse("equipment"));
        assert!(before.is_none());

        let id = tokio_test::assert_ok!(repo.create(&draft("X1")).await);

        let stored = store.get(&DbPath::parse("equipment")).unwrap();
        assert_eq!(stored.as_object().unwrap().len(), 1);
        assert_eq!(
            stored[id.as_str()],
            json!({
                "name": "X1",
                "type": "Laptop",
                "location": "Lab1",
                "status": "Active",
                "description": "",
                "serialNumber": "",
                "model": "M1"
            })
        );
    }

    #[tokio::test]
    async fn test_create_with_empty_name_writes_nothing() {
        let (store, repo) = setup();
        let err = repo.create(&draft("")).await.unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert!(errors.contains(EquipmentField::Name));
                assert_eq!(errors.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_draft_never_reaches_remote() {
        let mut mock = MockRemoteStore::new();
        mock.expect_set().never();
        mock.expect_remove().never();
        let repo = EquipmentRepository::new(Arc::new(mock), "equipment", 1);

        let result = repo.create(&EquipmentDraft::default()).await;
        assert!(matches!(result, Err(AppError::Validation(ref e)) if e.len() == 5));

        let result = repo
            .update(&EquipmentId::new("1"), &EquipmentDraft::default())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_whole_record() {
        let (store, repo) = setup();
        let mut original = draft("X1");
        original.description = "old description".to_string();
        original.serial_number = "42".to_string();
        let id = repo.create(&original).await.unwrap();

        let replacement = draft("X1 renamed");
        repo.update(&id, &replacement).await.unwrap();

        let stored = store.get(&DbPath::parse("equipment").child(id.as_str())).unwrap();
        assert_eq!(stored["name"], "X1 renamed");
        assert_eq!(stored["description"], "");
        assert_eq!(stored["serialNumber"], "");
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let (store, repo) = setup();
        store.fail_writes(Some("network unreachable"));
        let result = repo.create(&draft("X1")).await;
        assert!(matches!(result, Err(AppError::Transport(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_and_tolerates_missing() {
        let (store, repo) = setup();
        let id = repo.create(&draft("X1")).await.unwrap();
        repo.delete(&id).await.unwrap();
        assert!(store.get(&DbPath::parse("equipment")).is_none());

        tokio_test::assert_ok!(repo.delete(&EquipmentId::new("does-not-exist")).await);
    }

    #[tokio::test]
    async fn test_reserved_characters_in_id_are_rejected() {
        let (_store, repo) = setup();
        let result = repo.delete(&EquipmentId::new("../equipmentTypes")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_feed_follows_writes() {
        let (_store, repo) = setup();
        let mut feed = repo.subscribe_all();
        assert!(feed.changed().await);
        assert!(feed.view().loaded);
        assert!(feed.records().is_empty());

        let id = repo.create(&draft("X1")).await.unwrap();
        assert!(feed.changed().await);
        assert_eq!(feed.records().len(), 1);
        assert_eq!(feed.records()[0].id, id);
        assert_eq!(feed.records()[0].to_draft(), draft("X1"));
    }

    #[tokio::test]
    async fn test_feed_keeps_last_list_on_error() {
        let (store, repo) = setup();
        repo.create(&draft("X1")).await.unwrap();
        let mut feed = repo.subscribe_all();
        feed.changed().await;
        assert_eq!(feed.records().len(), 1);

        store.inject_error(&DbPath::parse("equipment"), TransportError::Timeout);
        feed.changed().await;
        assert_eq!(feed.records().len(), 1);
        assert_eq!(feed.error(), Some(LOAD_FAILED));

        repo.create(&draft("X2")).await.unwrap();
        feed.changed().await;
        assert_eq!(feed.records().len(), 2);
        assert_eq!(feed.error(), None);
    }

    #[tokio::test]
    async fn test_dropping_feed_deregisters() {
        let (store, repo) = setup();
        let feed = repo.subscribe_all();
        assert_eq!(store.listener_count(), 1);
        drop(feed);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_decode_collection_skips_malformed_entries() {
        let value = json!({
            "1": {"name": "A", "type": "Laptop", "location": "L", "status": "Active"},
            "2": {"type": "Laptop"},
            "3": null
        });
        let records = decode_collection(&DbPath::parse("equipment"), Some(&value)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "1");
    }

    #[test]
    fn test_decode_collection_rejects_scalar() {
        let result = decode_collection(&DbPath::parse("equipment"), Some(&json!(5)));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_watch_reports_not_found_then_loaded() {
        let (_store, repo) = setup();
        let id = EquipmentId::new("1700000000000");
        let mut watch = repo.watch(&id);
        assert_eq!(watch.next().await, Some(RecordState::NotFound));

        repo.update(&id, &draft("X1")).await.unwrap();
        match watch.next().await {
            Some(RecordState::Loaded(record)) => assert_eq!(record.name, "X1"),
            other => panic!("expected loaded record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watch_distinguishes_transport_failure() {
        let (store, repo) = setup();
        let id = EquipmentId::new("7");
        let mut watch = repo.watch(&id);
        watch.next().await;
        store.inject_error(&DbPath::parse("equipment/7"), TransportError::Timeout);
        assert_eq!(
            watch.next().await,
            Some(RecordState::Failed(RECORD_LOAD_FAILED.to_string()))
        );
    }

    #[tokio::test]
    async fn test_scenario_create_then_retrieve_by_id() {
        let (store, repo) = setup();
        let types = crate::repository::references::decode_references(
            store.get(&DbPath::parse("equipmentTypes")).as_ref(),
        );
        let statuses = crate::repository::references::decode_references(
            store.get(&DbPath::parse("equipmentStatuses")).as_ref(),
        );
        assert_eq!(types.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["Laptop", "Printer"]);
        assert_eq!(statuses.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["Active", "Retired"]);

        let id = repo.create(&draft("X1")).await.unwrap();
        let mut watch = repo.watch(&id);
        let Some(RecordState::Loaded(record)) = watch.next().await else {
            panic!("record should be retrievable by its new id");
        };
        assert_eq!(record.name, "X1");
        assert!(record.equipment_type.resolves_in(&types));
        assert!(record.status.resolves_in(&statuses));
        assert_eq!(record.location, "Lab1");
        assert_eq!(record.model, "M1");
    }
}
