//! In-process realtime store
//!
//! Keeps the whole JSON tree in memory and fans out snapshots to every
//! listener whose path overlaps a write. Used by the `memory` backend and
//! throughout the test suite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{remove_at, value_at, write_at, DbPath, RemoteEvent, RemoteStore, Subscription};
use crate::error::TransportError;

struct Listener {
    path: DbPath,
    sender: mpsc::UnboundedSender<RemoteEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    listeners: HashMap<u64, Listener>,
    next_listener_id: u64,
    write_count: u64,
    failing_writes: Option<String>,
}

impl Inner {
    fn notify(&mut self, changed: &DbPath) {
        let root = &self.root;
        self.listeners.retain(|_, listener| {
            if !listener.path.overlaps(changed) {
                return true;
            }
            let snapshot = value_at(root, &listener.path).cloned();
            listener.sender.send(Ok(snapshot)).is_ok()
        });
    }
}

/// Shared in-memory JSON tree
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree
    pub fn with_data(root: Value) -> Self {
        let store = Self::new();
        store.lock().root = root;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the tree itself intact
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current value at `path`, bypassing subscriptions
    pub fn get(&self, path: &DbPath) -> Option<Value> {
        value_at(&self.lock().root, path).cloned()
    }

    /// Number of successful writes and removals so far
    pub fn write_count(&self) -> u64 {
        self.lock().write_count
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Make every following write fail with `message`, or succeed again with `None`
    pub fn fail_writes(&self, message: Option<&str>) {
        self.lock().failing_writes = message.map(str::to_string);
    }

    /// Deliver a transport error to every listener overlapping `path`
    pub fn inject_error(&self, path: &DbPath, error: TransportError) {
        let mut inner = self.lock();
        inner.listeners.retain(|_, listener| {
            if !listener.path.overlaps(path) {
                return true;
            }
            listener.sender.send(Err(error.clone())).is_ok()
        });
    }

    fn check_writable(inner: &Inner) -> Result<(), TransportError> {
        match &inner.failing_writes {
            Some(message) => Err(TransportError::Request(message.clone())),
            None => Ok(()),
        }
    }

    fn deregister(inner: &Weak<Mutex<Inner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            let mut guard = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.listeners.remove(&id);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn subscribe(&self, path: &DbPath) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        let id = inner.next_listener_id;
        inner.next_listener_id += 1;

        let initial = value_at(&inner.root, path).cloned();
        // The receiver is alive here, so the initial send cannot fail
        let _ = sender.send(Ok(initial));
        inner.listeners.insert(
            id,
            Listener {
                path: path.clone(),
                sender,
            },
        );
        drop(inner);

        tracing::debug!(%path, listener = id, "Subscribed to memory store");

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(path.clone(), receiver, move || {
            MemoryStore::deregister(&weak, id)
        })
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<(), TransportError> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        write_at(&mut inner.root, path, value);
        inner.write_count += 1;
        inner.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &DbPath) -> Result<(), TransportError> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        remove_at(&mut inner.root, path);
        inner.write_count += 1;
        inner.notify(path);
        Ok(())
    }
}
