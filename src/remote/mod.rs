//! Remote collection client
//!
//! The inventory talks to a hosted JSON tree through two capabilities:
//! subscribing to a path (receiving the full value there on every change)
//! and writing or removing the full value at a path.

pub mod firebase;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;

/// Full value at a subscribed path; `None` when the path holds no data
pub type Snapshot = Option<Value>;

/// One notification delivered to a subscriber
pub type RemoteEvent = Result<Snapshot, TransportError>;

/// Slash-separated location in the JSON tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbPath(Vec<String>);

impl DbPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut next = self.clone();
        next.0.extend(
            segment
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        next
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &DbPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Whether a write at one path can change the value at the other
    pub fn overlaps(&self, other: &DbPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl std::fmt::Display for DbPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl From<&str> for DbPath {
    fn from(path: &str) -> Self {
        DbPath::parse(path)
    }
}

/// Live subscription handle.
///
/// Yields a [`RemoteEvent`] per change, starting with the current value.
/// Dropping the handle deregisters the listener.
pub struct Subscription {
    path: DbPath,
    receiver: mpsc::UnboundedReceiver<RemoteEvent>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        path: DbPath,
        receiver: mpsc::UnboundedReceiver<RemoteEvent>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn path(&self) -> &DbPath {
        &self.path
    }

    /// Wait for the next notification; `None` once the store side closed
    pub async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(deregister) = self.on_drop.take() {
            tracing::debug!(path = %self.path, "Deregistering subscription");
            deregister();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("path", &self.path).finish()
    }
}

/// Capability set the inventory needs from the realtime database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Subscribe to the full value at `path`
    fn subscribe(&self, path: &DbPath) -> Subscription;

    /// Atomically replace the value at `path`
    async fn set(&self, path: &DbPath, value: Value) -> Result<(), TransportError>;

    /// Delete the value at `path`; deleting a missing path succeeds
    async fn remove(&self, path: &DbPath) -> Result<(), TransportError>;
}

/// Value at `path`, treating JSON null as absent
pub(crate) fn value_at<'a>(root: &'a Value, path: &DbPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Write `value` at `path`, creating parents; null removes the node
pub(crate) fn write_at(root: &mut Value, path: &DbPath, value: Value) {
    if value.is_null() {
        remove_at(root, path);
        return;
    }

    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = object_mut(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(node).insert(last.clone(), value);
}

/// View `node` as an object. Arrays keep their elements under index keys;
/// any other value is replaced by an empty object.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    let converted = match node {
        Value::Object(_) => None,
        Value::Array(items) => Some(
            std::mem::take(items)
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        ),
        _ => Some(Map::new()),
    };
    if let Some(map) = converted {
        *node = Value::Object(map);
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

/// Remove the node at `path` and prune parents left empty
pub(crate) fn remove_at(root: &mut Value, path: &DbPath) {
    fn remove_rec(node: &mut Value, segments: &[String]) {
        let Some((first, rest)) = segments.split_first() else {
            *node = Value::Null;
            return;
        };
        if node.is_array() {
            object_mut(node);
        }
        if let Value::Object(map) = node {
            if rest.is_empty() {
                map.shift_remove(first);
            } else if let Some(child) = map.get_mut(first) {
                remove_rec(child, rest);
                let empty = match child {
                    Value::Null => true,
                    Value::Object(m) => m.is_empty(),
                    _ => false,
                };
                if empty {
                    map.shift_remove(first);
                }
            }
        }
    }

    remove_rec(root, path.segments());
    if matches!(root, Value::Object(m) if m.is_empty()) {
        *root = Value::Null;
    }
}
