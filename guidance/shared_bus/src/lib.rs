#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Typed topics connecting the guidance services: inbound vehicle telemetry,
//! maneuver plans, published trajectories and telemetry events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Envelope wrapping every payload travelling over a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    /// Unique identifier.
    pub id: String,
    /// Component producing the message.
    pub source: String,
    /// Topic or event type (e.g. `trajectory`, `delegator.cycle.published`).
    pub topic: String,
    /// Time the envelope was created.
    pub timestamp: DateTime<Utc>,
    /// Carried value.
    pub payload: T,
}

impl<T> Message<T> {
    /// Wraps a payload in a freshly stamped envelope.
    #[must_use]
    pub fn new(source: impl Into<String>, topic: impl Into<String>, payload: T) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4()),
            source: source.into(),
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Telemetry event carrying an arbitrary JSON payload.
pub type EventRecord = Message<serde_json::Value>;

/// Publisher side of a topic.
#[async_trait]
pub trait Publisher<T>: Send + Sync {
    /// Publishes a message.
    async fn publish(&self, message: Message<T>) -> Result<()>;
}

/// Subscriber side of a topic.
#[async_trait]
pub trait Subscriber<T>: Send + Sync {
    /// Returns a receiver that yields every message published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<Message<T>>>;
}

/// In-memory broadcast topic retaining a bounded backlog of recent messages.
#[derive(Debug, Clone)]
pub struct MemoryTopic<T> {
    sender: broadcast::Sender<Message<T>>,
    backlog: Arc<Mutex<VecDeque<Message<T>>>>,
    capacity: usize,
}

impl<T: Clone> MemoryTopic<T> {
    /// Creates a new topic with the given capacity (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Snapshot of recent messages retained in memory, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message<T>> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Message<T>> {
        self.backlog.lock().back().cloned()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl<T> Publisher<T> for MemoryTopic<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn publish(&self, message: Message<T>) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(message.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No receivers is not an error: the backlog still holds the message.
        let _ = self.sender.send(message);
        Ok(())
    }
}

#[async_trait]
impl<T> Subscriber<T> for MemoryTopic<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn subscribe(&self) -> Result<broadcast::Receiver<Message<T>>> {
        Ok(self.sender.subscribe())
    }
}

/// File-backed publisher appending one JSON line per message.
#[derive(Debug, Clone)]
pub struct JsonLinesPublisher {
    path: PathBuf,
}

impl JsonLinesPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Destination file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<T> Publisher<T> for JsonLinesPublisher
where
    T: Serialize + Send + Sync + 'static,
{
    async fn publish(&self, message: Message<T>) -> Result<()> {
        let data = serde_json::to_vec(&message)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// Publishes to several sinks in order, stopping at the first failure.
#[derive(Clone)]
pub struct FanoutPublisher<T> {
    sinks: Vec<Arc<dyn Publisher<T>>>,
}

impl<T> FanoutPublisher<T> {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Publisher<T>>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl<T> Publisher<T> for FanoutPublisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn publish(&self, message: Message<T>) -> Result<()> {
        for sink in &self.sinks {
            sink.publish(message.clone()).await?;
        }
        Ok(())
    }
}
