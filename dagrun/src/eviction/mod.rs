//! Best-effort reclamation of intermediate outputs.
//!
//! Steps pass data through a shared object store; once every declared
//! consumer of an output has retrieved it, the output is dead weight. The
//! manager in this module watches the store's notification stream and
//! deletes drained outputs when auto-eviction is enabled.

mod graph;
mod manager;
mod message;
mod store;

pub use graph::ConsumptionGraph;
pub use manager::{
    DescriptionSource, EvictionManager, FileDescriptionSource, SharedDescriptionSource,
};
pub use message::{ControlKind, ControlMessage};
pub use store::{InMemoryObjectStore, ObjectId, ObjectStore, StoreNotification};
