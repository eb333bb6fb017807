//! # Dagrun
//!
//! The pipeline execution core: a declarative DAG of steps, derivation
//! operations over it, a concurrent execution driver, and a companion
//! data-eviction manager that reclaims intermediate outputs from a shared
//! object store once every consumer has read them.
//!
//! - **Pipeline / Step**: build a DAG from an on-disk description, derive
//!   induced subgraphs and ancestor closures as independent copies
//! - **Driver**: run the DAG from its sentinel, fanning out across
//!   independent branches with at-most-once execution per step
//! - **Eviction**: watch the store's notification stream and free outputs
//!   all declared consumers have retrieved
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dagrun::prelude::*;
//!
//! let description: PipelineDescription = serde_json::from_str(&raw)?;
//! let pipeline = Arc::new(Pipeline::for_run(&description, &RunKind::Full)?);
//!
//! let driver = PipelineDriver::from_config(&RunnerConfig::LocalProcess {
//!     interpreter: "python3".into(),
//! });
//! driver.run(pipeline).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod description;
pub mod driver;
pub mod errors;
pub mod events;
pub mod eviction;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::description::{
        PipelineDescription, PipelineSettings, RunKind, StepDescription,
    };
    pub use crate::driver::{
        NoOpRunner, PipelineDriver, RunnerConfig, WaitPolicy, WorkUnitHandle, WorkUnitRunner,
    };
    pub use crate::errors::{
        DagrunError, MalformedPipelineError, StoreError, WorkUnitFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::eviction::{
        ConsumptionGraph, ControlMessage, DescriptionSource, EvictionManager,
        FileDescriptionSource, InMemoryObjectStore, ObjectId, ObjectStore,
    };
    pub use crate::pipeline::{Pipeline, Step, StepKind};
    pub use crate::utils::{generate_uuid, iso_timestamp};
}
