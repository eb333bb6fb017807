//! The shared object store seam.
//!
//! The eviction manager only needs three capabilities from the store: a
//! push-based notification stream of object lifecycle events, metadata
//! lookup by object ID, and idempotent delete-by-ID. [`InMemoryObjectStore`]
//! implements the contract for tests and single-process sessions.

use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of an object in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps a raw store identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The deterministic ID under which a step's current output is stored.
    #[must_use]
    pub fn output_of(step: Uuid) -> Self {
        let digest = Sha256::digest(step.as_bytes());
        Self(hex::encode(&digest[..10]))
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object lifecycle event: something was sealed or deleted.
///
/// The store does not say which; a metadata lookup that returns `None`
/// identifies a deletion.
#[derive(Debug, Clone)]
pub struct StoreNotification {
    /// The object the event concerns.
    pub object: ObjectId,
}

/// The store capabilities the eviction manager consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Blocks until the next object lifecycle event.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChannelClosed`] once the owning session is torn down;
    /// [`StoreError::Notification`] for transient read failures.
    async fn next_notification(&self) -> Result<StoreNotification, StoreError>;

    /// Fetches an object's metadata; `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// [`StoreError::Metadata`] on lookup failure.
    async fn metadata(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deletes an object. Deleting an absent ID is a silent no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::Delete`] on transport failure.
    async fn delete(&self, id: &ObjectId) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    metadata: Option<Vec<u8>>,
}

/// A size-unbounded in-process store implementing the [`ObjectStore`]
/// contract, with plasma-style lifecycle notifications.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    objects: DashMap<ObjectId, StoredObject>,
    notify_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<StoreNotification>>>,
    notify_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StoreNotification>>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            objects: DashMap::new(),
            notify_tx: parking_lot::Mutex::new(Some(notify_tx)),
            notify_rx: tokio::sync::Mutex::new(notify_rx),
        }
    }

    /// Seals an object: stores its payload and metadata and emits a
    /// lifecycle notification.
    pub fn seal(&self, id: ObjectId, data: Vec<u8>, metadata: Option<Vec<u8>>) {
        self.objects
            .insert(id.clone(), StoredObject { data, metadata });
        self.notify(StoreNotification { object: id });
    }

    /// Whether an object is currently present.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// An object's payload, as a consumer would retrieve it.
    #[must_use]
    pub fn payload(&self, id: &ObjectId) -> Option<Vec<u8>> {
        self.objects.get(id).map(|obj| obj.data.clone())
    }

    /// Closes the notification channel, as session teardown does. Readers
    /// observe [`StoreError::ChannelClosed`] once the queue drains.
    pub fn close(&self) {
        self.notify_tx.lock().take();
    }

    fn notify(&self, notification: StoreNotification) {
        if let Some(tx) = self.notify_tx.lock().as_ref() {
            // A dropped receiver means the session is shutting down; the
            // notification is of no interest to anyone.
            let _ = tx.send(notification);
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn next_notification(&self) -> Result<StoreNotification, StoreError> {
        self.notify_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(StoreError::ChannelClosed)
    }

    async fn metadata(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.get(id).and_then(|obj| obj.metadata.clone()))
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), StoreError> {
        if self.objects.remove(id).is_some() {
            self.notify(StoreNotification { object: id.clone() });
        }
        Ok(())
    }
}
