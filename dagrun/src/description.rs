//! The on-disk pipeline description contract.
//!
//! A description is the document the orchestration layer hands to the core:
//! a `steps` mapping from step UUID to step properties plus a `settings`
//! object. Schema migration between document versions is handled upstream;
//! the document is consumed as-is here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A full pipeline description as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Human-readable pipeline name.
    #[serde(default)]
    pub name: String,
    /// Mapping from step UUID to the step's properties.
    #[serde(default)]
    pub steps: HashMap<Uuid, StepDescription>,
    /// Pipeline-level settings.
    #[serde(default)]
    pub settings: PipelineSettings,
}

impl PipelineDescription {
    /// Creates an empty description with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Inserts a step description, keyed by its UUID.
    pub fn insert_step(&mut self, step: StepDescription) {
        self.steps.insert(step.uuid, step);
    }
}

/// Properties of a single step in a pipeline description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescription {
    /// Display name.
    pub name: String,
    /// Unique identity within the pipeline.
    pub uuid: Uuid,
    /// UUIDs of the step's parents, in declaration order.
    #[serde(default)]
    pub incoming_connections: Vec<Uuid>,
    /// Path of the file this step executes, if any.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Image reference for container-backed execution, if any.
    #[serde(default)]
    pub image: Option<String>,
    /// Arbitrary metadata bag.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepDescription {
    /// Creates a minimal step description.
    #[must_use]
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid,
            incoming_connections: Vec::new(),
            file_path: None,
            image: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the parent connections.
    #[must_use]
    pub fn with_incoming(mut self, parents: impl IntoIterator<Item = Uuid>) -> Self {
        self.incoming_connections = parents.into_iter().collect();
        self
    }

    /// Sets the file reference.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the image reference.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Pipeline-level settings carried by the description.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Whether produced objects are deleted automatically once every
    /// declared consumer has retrieved them.
    #[serde(default)]
    pub auto_eviction: bool,
}

/// Selects which part of a pipeline a run covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunKind {
    /// The whole pipeline.
    Full,
    /// The induced subgraph over an explicit step selection.
    Selection {
        /// Steps to keep.
        steps: Vec<Uuid>,
    },
    /// The ancestor closure of an explicit step selection, exclusive of the
    /// selection itself unless `inclusive` is set.
    #[serde(alias = "incoming")]
    Ancestors {
        /// Traversal roots.
        steps: Vec<Uuid>,
        /// Whether the roots themselves are part of the run.
        #[serde(default)]
        inclusive: bool,
    },
}
