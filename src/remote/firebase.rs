//! Firebase Realtime Database client over the REST protocol
//!
//! Writes are `PUT`/`DELETE` requests on `<url>/<path>.json`. Subscriptions
//! open a server-sent event stream on the same URL and rebuild the value at
//! the subscribed path from `put` and `patch` events.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use super::{write_at, DbPath, RemoteEvent, RemoteStore, Subscription};
use crate::config::RemoteConfig;
use crate::error::TransportError;

/// Remote store backed by a Firebase Realtime Database instance
#[derive(Clone)]
pub struct FirebaseStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    reconnect_delay: Duration,
    idle_timeout: Duration,
}

impl FirebaseStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            request_timeout: Duration::from_millis(config.read_timeout_ms),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            idle_timeout: Duration::from_millis(config.stream_idle_timeout_ms),
        })
    }

    fn url(&self, path: &DbPath) -> String {
        format!("{}{}.json", self.base_url, path)
    }

    fn query(&self, silent: bool) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(token) = &self.auth_token {
            query.push(("auth", token.clone()));
        }
        if silent {
            query.push(("print", "silent".to_string()));
        }
        query
    }

    /// Keep a stream open for `path`, reconnecting after failures until the
    /// subscriber goes away
    async fn run_stream(self, path: DbPath, sender: mpsc::UnboundedSender<RemoteEvent>) {
        loop {
            match self.stream_once(&path, &sender).await {
                Ok(()) => tracing::info!(%path, "Event stream closed by remote"),
                Err(e) => {
                    tracing::warn!(%path, error = %e, "Event stream failed");
                    if sender.send(Err(e)).is_err() {
                        return;
                    }
                }
            }
            if sender.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
            tracing::debug!(%path, "Reconnecting event stream");
        }
    }

    async fn stream_once(
        &self,
        path: &DbPath,
        sender: &mpsc::UnboundedSender<RemoteEvent>,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.url(path))
            .header(ACCEPT, "text/event-stream")
            .query(&self.query(false))
            .send()
            .await?
            .error_for_status()?;

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::default();
        let mut tree = Value::Null;

        loop {
            let Some(chunk) = tokio::time::timeout(self.idle_timeout, body.next())
                .await
                .map_err(|_| TransportError::Timeout)?
            else {
                break;
            };
            let chunk = chunk.map_err(|e| TransportError::Stream(e.to_string()))?;
            for message in decoder.push(&chunk) {
                if apply_event(&mut tree, &message)? {
                    let snapshot = if tree.is_null() { None } else { Some(tree.clone()) };
                    if sender.send(Ok(snapshot)).is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FirebaseStore {
    fn subscribe(&self, path: &DbPath) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.clone().run_stream(path.clone(), sender));
        tracing::debug!(%path, "Opened event stream");
        Subscription::new(path.clone(), receiver, move || handle.abort())
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<(), TransportError> {
        self.client
            .put(self.url(path))
            .query(&self.query(true))
            .timeout(self.request_timeout)
            .json(&value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove(&self, path: &DbPath) -> Result<(), TransportError> {
        self.client
            .delete(self.url(path))
            .query(&self.query(true))
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return every message it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(message) = parse_block(&String::from_utf8_lossy(&block)) {
                messages.push(message);
            }
        }
        messages
    }
}

fn parse_block(block: &str) -> Option<SseMessage> {
    let mut event = String::from("message");
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() && event == "message" {
        return None;
    }
    Some(SseMessage {
        event,
        data: data.join("\n"),
    })
}

#[derive(Deserialize)]
struct ChangePayload {
    path: String,
    data: Value,
}

/// Apply a Firebase stream event to the local copy of the subscribed value.
/// Returns whether the value changed.
pub(crate) fn apply_event(tree: &mut Value, message: &SseMessage) -> Result<bool, TransportError> {
    match message.event.as_str() {
        "put" => {
            let change = parse_change(&message.data)?;
            write_at(tree, &DbPath::parse(&change.path), change.data);
            Ok(true)
        }
        "patch" => {
            let change = parse_change(&message.data)?;
            let base = DbPath::parse(&change.path);
            match change.data {
                Value::Object(children) => {
                    for (key, value) in children {
                        write_at(tree, &base.child(&key), value);
                    }
                }
                other => write_at(tree, &base, other),
            }
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(TransportError::Cancelled(message.data.clone())),
        "auth_revoked" => Err(TransportError::Cancelled("credential expired".to_string())),
        other => {
            tracing::debug!(event = other, "Ignoring unknown stream event");
            Ok(false)
        }
    }
}

fn parse_change(data: &str) -> Result<ChangePayload, TransportError> {
    serde_json::from_str(data)
        .map_err(|e| TransportError::Stream(format!("invalid event payload: {}", e)))
}
