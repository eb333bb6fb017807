//! The eviction manager's notification loop.
//!
//! One manager runs per active session. It watches the store's lifecycle
//! stream and, on every consumer-read acknowledgement, rebuilds its
//! consumption graph from the pipeline's current description (tolerating
//! concurrent structural edits by the user), carries surviving edge weights
//! forward, and deletes any output every declared consumer has retrieved.
//! Eviction is a memory optimization, not a correctness requirement, so
//! transient errors are logged and the loop moves on.

use crate::description::PipelineDescription;
use crate::errors::{DagrunError, StoreError};
use crate::eviction::{
    ConsumptionGraph, ControlKind, ControlMessage, ObjectId, ObjectStore, StoreNotification,
};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the manager reads the pipeline's current description from.
///
/// Loaded afresh on every processed read-ack so structural edits made while
/// the session runs are picked up.
pub trait DescriptionSource: Send + Sync + Debug {
    /// Loads the current description.
    ///
    /// # Errors
    ///
    /// Returns an error if the description cannot be read or parsed.
    fn load(&self) -> Result<PipelineDescription, DagrunError>;
}

/// Reads the description from a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileDescriptionSource {
    path: PathBuf,
}

impl FileDescriptionSource {
    /// Creates a source over the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DescriptionSource for FileDescriptionSource {
    fn load(&self) -> Result<PipelineDescription, DagrunError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A description held in memory behind a shared handle, so tests and
/// embedded sessions can swap it while the manager runs.
#[derive(Debug, Clone, Default)]
pub struct SharedDescriptionSource {
    description: Arc<RwLock<PipelineDescription>>,
}

impl SharedDescriptionSource {
    /// Creates a source over the given description.
    #[must_use]
    pub fn new(description: PipelineDescription) -> Self {
        Self {
            description: Arc::new(RwLock::new(description)),
        }
    }

    /// Replaces the description, as a concurrent user edit would.
    pub fn replace(&self, description: PipelineDescription) {
        *self.description.write() = description;
    }
}

impl DescriptionSource for SharedDescriptionSource {
    fn load(&self) -> Result<PipelineDescription, DagrunError> {
        Ok(self.description.read().clone())
    }
}

/// Frees shared-store objects once all of their declared consumers have
/// retrieved them.
pub struct EvictionManager {
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn DescriptionSource>,
    graph: ConsumptionGraph,
}

impl EvictionManager {
    /// Creates a manager over a store and a description source.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, source: Arc<dyn DescriptionSource>) -> Self {
        Self {
            store,
            source,
            graph: ConsumptionGraph::default(),
        }
    }

    /// Runs the notification loop until the store's channel closes.
    ///
    /// There is no other terminal state: the manager lives as long as the
    /// session and is torn down with it.
    pub async fn run(mut self) {
        loop {
            match self.store.next_notification().await {
                Ok(notification) => {
                    if let Err(err) = self.process(&notification).await {
                        warn!(object = %notification.object, error = %err,
                            "failed to process store notification");
                    }
                }
                Err(StoreError::ChannelClosed) => {
                    info!("store notification channel closed, eviction manager stopping");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "transient failure reading store notifications");
                }
            }
        }
    }

    /// Processes a single lifecycle notification; one iteration of the loop.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be fetched or the description
    /// cannot be loaded; the run loop logs and continues.
    pub async fn process(&mut self, notification: &StoreNotification) -> Result<(), DagrunError> {
        let Some(payload) = self.store.metadata(&notification.object).await? else {
            // Deletion events carry no metadata and need no processing.
            return Ok(());
        };

        let message = match ControlMessage::from_bytes(&payload) {
            Ok(message) => message,
            Err(err) => {
                debug!(object = %notification.object, error = %err,
                    "object metadata is not a control message, skipping");
                return Ok(());
            }
        };
        if message.kind != ControlKind::ReadAck {
            return Ok(());
        }

        // Rebuild against the current description so concurrent edits are
        // honored; weights survive only on edges that still exist.
        let description = self.source.load()?;
        let mut graph = ConsumptionGraph::from_description(&description);
        graph.carry_weights_from(&self.graph);
        graph.mark_retrieved(message.source, message.target);
        self.graph = graph;

        if !description.settings.auto_eviction {
            return Ok(());
        }

        for producer in self.graph.drained() {
            let output = ObjectId::output_of(producer);
            if let Err(err) = self.store.delete(&output).await {
                warn!(producer = %producer, object = %output, error = %err,
                    "failed to evict drained output");
            } else {
                debug!(producer = %producer, object = %output, "evicted output");
            }
        }

        // The ping has served its purpose.
        if let Err(err) = self.store.delete(&notification.object).await {
            warn!(object = %notification.object, error = %err,
                "failed to delete control-message object");
        }

        Ok(())
    }

    /// The current consumption graph, mostly for inspection in tests.
    #[must_use]
    pub fn graph(&self) -> &ConsumptionGraph {
        &self.graph
    }
}

impl Debug for EvictionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionManager")
            .field("source", &self.source)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{PipelineDescription, PipelineSettings};
    use crate::eviction::InMemoryObjectStore;
    use crate::testing::fixtures::description;
    use uuid::Uuid;

    fn with_auto_eviction(mut desc: PipelineDescription) -> PipelineDescription {
        desc.settings = PipelineSettings {
            auto_eviction: true,
        };
        desc
    }

    /// Seals a read-ack ping and hands the resulting notification back.
    async fn ack(store: &InMemoryObjectStore, source: Uuid, target: Uuid) -> StoreNotification {
        let ping = ObjectId::new(format!("ping-{source}-{target}"));
        let message = ControlMessage::read_ack(source, target);
        store.seal(ping, Vec::new(), Some(message.to_bytes().unwrap()));
        store.next_notification().await.unwrap()
    }

    fn fan_out() -> (PipelineDescription, Uuid, Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let desc = description(&[(a, "a", &[]), (b, "b", &[a]), (c, "c", &[a])]);
        (desc, a, b, c)
    }

    #[tokio::test]
    async fn test_output_survives_until_every_consumer_acks() {
        let (desc, a, b, c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let mut manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let output = ObjectId::output_of(a);
        store.seal(output.clone(), b"payload".to_vec(), None);
        let _ = store.next_notification().await.unwrap();

        let first = ack(&store, a, b).await;
        manager.process(&first).await.unwrap();
        assert!(store.contains(&output), "one ack must not evict");

        let second = ack(&store, a, c).await;
        manager.process(&second).await.unwrap();
        assert!(!store.contains(&output), "all acks must evict");
    }

    #[tokio::test]
    async fn test_auto_eviction_disabled_retains_everything() {
        let (desc, a, b, c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(desc));
        let mut manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let output = ObjectId::output_of(a);
        store.seal(output.clone(), b"payload".to_vec(), None);
        let _ = store.next_notification().await.unwrap();

        for consumer in [b, c] {
            let notification = ack(&store, a, consumer).await;
            manager.process(&notification).await.unwrap();
        }

        assert!(store.contains(&output));
        // The graph is still tracked for a later settings flip.
        assert_eq!(manager.graph().weight(a, b), Some(1));
        assert_eq!(manager.graph().weight(a, c), Some(1));
    }

    #[tokio::test]
    async fn test_weights_survive_concurrent_description_edits() {
        let (desc, a, b, c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let mut manager = EvictionManager::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::clone(&source) as Arc<dyn DescriptionSource>,
        );

        let output = ObjectId::output_of(a);
        store.seal(output.clone(), b"payload".to_vec(), None);
        let _ = store.next_notification().await.unwrap();

        let first = ack(&store, a, b).await;
        manager.process(&first).await.unwrap();
        assert!(store.contains(&output));

        // The user deletes step c; a's only remaining consumer has already
        // acked, so the next notification cycle evicts.
        let edited = with_auto_eviction(description(&[(a, "a", &[]), (b, "b", &[a])]));
        source.replace(edited);

        let unrelated = ack(&store, b, Uuid::new_v4()).await;
        manager.process(&unrelated).await.unwrap();

        assert!(!store.contains(&output));
        assert_eq!(manager.graph().weight(a, c), None);
    }

    #[tokio::test]
    async fn test_ping_object_is_cleaned_up() {
        let (desc, a, b, _c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let mut manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let notification = ack(&store, a, b).await;
        manager.process(&notification).await.unwrap();

        assert!(!store.contains(&notification.object));
    }

    #[tokio::test]
    async fn test_non_message_metadata_is_skipped() {
        let (desc, _a, _b, _c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let mut manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let id = ObjectId::new("opaque");
        store.seal(id.clone(), Vec::new(), Some(b"just bytes".to_vec()));
        let notification = store.next_notification().await.unwrap();

        manager.process(&notification).await.unwrap();
        assert!(store.contains(&id), "unparseable metadata is not a ping");
    }

    #[tokio::test]
    async fn test_deletion_notifications_are_skipped() {
        let (desc, a, _b, _c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let mut manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let output = ObjectId::output_of(a);
        store.seal(output.clone(), Vec::new(), None);
        store.delete(&output).await.unwrap();

        let sealed = store.next_notification().await.unwrap();
        let deleted = store.next_notification().await.unwrap();
        manager.process(&sealed).await.unwrap();
        manager.process(&deleted).await.unwrap();

        assert_eq!(manager.graph().node_count(), 0);
    }

    #[tokio::test]
    async fn test_run_loop_drains_and_stops_on_close() {
        let (desc, a, b, c) = fan_out();
        let store = Arc::new(InMemoryObjectStore::new());
        let source = Arc::new(SharedDescriptionSource::new(with_auto_eviction(desc)));
        let manager =
            EvictionManager::new(Arc::clone(&store) as Arc<dyn ObjectStore>, source);

        let output = ObjectId::output_of(a);
        store.seal(output.clone(), b"payload".to_vec(), None);
        for consumer in [b, c] {
            let ping = ObjectId::new(format!("ping-{consumer}"));
            let message = ControlMessage::read_ack(a, consumer);
            store.seal(ping, Vec::new(), Some(message.to_bytes().unwrap()));
        }
        store.close();

        // The loop processes the queued notifications, then observes the
        // closed channel and returns.
        manager.run().await;

        assert!(!store.contains(&output));
    }
}
