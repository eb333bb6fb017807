//! The step data model.

use crate::description::StepDescription;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// What a node in the DAG represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// A real step with a unit of work attached.
    Task,
    /// The virtual terminal node whose parents are all childless steps.
    Sentinel,
}

/// A single DAG node: identity, edges, and an execution reference.
///
/// `parents` and `children` are UUID lists resolved against the owning
/// [`crate::pipeline::Pipeline`]'s step arena, never direct object
/// references. `children` is always derived from the parent lists of the
/// other steps in the same snapshot and is recomputed on every structural
/// change.
#[derive(Debug)]
pub struct Step {
    uuid: Uuid,
    name: String,
    file_path: Option<String>,
    image: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
    parents: Vec<Uuid>,
    children: Vec<Uuid>,
    kind: StepKind,
    /// Scoped to a single run; reset once the run finishes.
    started: AtomicBool,
}

impl Step {
    /// Builds a step from its description. Children are wired later by the
    /// owning pipeline.
    #[must_use]
    pub fn from_description(description: &StepDescription) -> Self {
        Self {
            uuid: description.uuid,
            name: description.name.clone(),
            file_path: description.file_path.clone(),
            image: description.image.clone(),
            metadata: description.metadata.clone(),
            parents: description.incoming_connections.clone(),
            children: Vec::new(),
            kind: StepKind::Task,
            started: AtomicBool::new(false),
        }
    }

    /// Builds the virtual sentinel node for a set of leaf steps.
    #[must_use]
    pub fn sentinel(parents: Vec<Uuid>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: "sentinel".to_string(),
            file_path: None,
            image: None,
            metadata: HashMap::new(),
            parents,
            children: Vec::new(),
            kind: StepKind::Sentinel,
            started: AtomicBool::new(false),
        }
    }

    /// Converts back to the on-disk description shape. The written
    /// `incoming_connections` always match the current parent list.
    #[must_use]
    pub fn to_description(&self) -> StepDescription {
        StepDescription {
            name: self.name.clone(),
            uuid: self.uuid,
            incoming_connections: self.parents.clone(),
            file_path: self.file_path.clone(),
            image: self.image.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// The step's identity.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File reference executed by this step, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    /// Image reference for container-backed execution, if any.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Arbitrary metadata bag.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// UUIDs of this step's parents.
    #[must_use]
    pub fn parents(&self) -> &[Uuid] {
        &self.parents
    }

    /// UUIDs of this step's children (derived, recomputed on rebuild).
    #[must_use]
    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    /// Whether this is a real step or the sentinel placeholder.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Whether this step has started within the current run.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Atomically flips the started flag; returns `true` for the caller that
    /// won the transition. Losing callers must not run the unit of work.
    pub fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    /// Clears the started flag so the owning pipeline can be re-run.
    pub fn reset_started(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub(crate) fn set_parents(&mut self, parents: Vec<Uuid>) {
        self.parents = parents;
    }

    pub(crate) fn set_children(&mut self, children: Vec<Uuid>) {
        self.children = children;
    }

    pub(crate) fn push_child(&mut self, child: Uuid) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn clear_children(&mut self) {
        self.children.clear();
    }
}

impl Clone for Step {
    /// Deep copy; the started flag's current value is carried over.
    fn clone(&self) -> Self {
        Self {
            uuid: self.uuid,
            name: self.name.clone(),
            file_path: self.file_path.clone(),
            image: self.image.clone(),
            metadata: self.metadata.clone(),
            parents: self.parents.clone(),
            children: self.children.clone(),
            kind: self.kind,
            started: AtomicBool::new(self.started.load(Ordering::Acquire)),
        }
    }
}
