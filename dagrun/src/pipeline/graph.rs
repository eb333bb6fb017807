//! The pipeline DAG: construction from a description and derivation
//! operations.
//!
//! Steps live in an arena keyed by UUID; `parents`/`children` are UUID lists
//! resolved against the arena, so the bidirectional edges never form
//! ownership cycles. The arena is a `BTreeMap` so iteration order is
//! deterministic.

use crate::description::{PipelineDescription, RunKind};
use crate::errors::MalformedPipelineError;
use crate::pipeline::Step;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// A full DAG of steps plus derivation operations.
#[derive(Debug)]
pub struct Pipeline {
    steps: BTreeMap<Uuid, Arc<Step>>,
    /// Lazily computed, cached for the pipeline's lifetime; invalidated by
    /// in-place mutation of the step set.
    sentinel: RwLock<Option<Arc<Step>>>,
}

impl Pipeline {
    /// Builds a pipeline from a parsed description.
    ///
    /// All steps are created first so forward references resolve, then
    /// parent/child links are wired in a second pass. Acyclicity is
    /// validated eagerly so execution can never recurse forever.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPipelineError`] if an `incoming_connections` entry
    /// references a UUID absent from the step map, or if the edges form a
    /// cycle. On error the half-built pipeline is discarded.
    pub fn build(description: &PipelineDescription) -> Result<Self, MalformedPipelineError> {
        let mut steps: BTreeMap<Uuid, Step> = description
            .steps
            .values()
            .map(|step| (step.uuid, Step::from_description(step)))
            .collect();

        Self::link(&mut steps)?;
        Self::ensure_acyclic(&steps)?;

        Ok(Self::seal(steps))
    }

    /// Builds the pipeline a run of the given kind executes: the full graph,
    /// an induced subgraph, or an ancestor closure.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPipelineError`] if the underlying description is
    /// structurally invalid.
    pub fn for_run(
        description: &PipelineDescription,
        kind: &RunKind,
    ) -> Result<Self, MalformedPipelineError> {
        let full = Self::build(description)?;

        Ok(match kind {
            RunKind::Full => full,
            RunKind::Selection { steps } => {
                full.induced_subgraph(&steps.iter().copied().collect())
            }
            RunKind::Ancestors { steps, inclusive } => {
                full.ancestors_of(&steps.iter().copied().collect(), *inclusive)
            }
        })
    }

    /// Looks up a step by UUID.
    #[must_use]
    pub fn step(&self, uuid: &Uuid) -> Option<&Arc<Step>> {
        self.steps.get(uuid)
    }

    /// Iterates all steps in UUID order.
    pub fn steps(&self) -> impl Iterator<Item = &Arc<Step>> {
        self.steps.values()
    }

    /// UUIDs of all steps, in deterministic order.
    pub fn uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.steps.keys().copied()
    }

    /// Whether the pipeline contains a step with the given UUID.
    #[must_use]
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.steps.contains_key(uuid)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns a new pipeline containing only the selected steps and the
    /// edges between them.
    ///
    /// Kept steps are deep copies: their parent lists are filtered to the
    /// selection (and their `incoming_connections` rewritten to match), and
    /// children are recomputed from the filtered parents so every retained
    /// edge appears symmetrically on both endpoints.
    #[must_use]
    pub fn induced_subgraph(&self, selection: &HashSet<Uuid>) -> Self {
        let mut kept: BTreeMap<Uuid, Step> = self
            .steps
            .iter()
            .filter(|(uuid, _)| selection.contains(uuid))
            .map(|(uuid, step)| {
                let mut copy = Step::clone(step);
                copy.set_parents(
                    step.parents()
                        .iter()
                        .copied()
                        .filter(|parent| selection.contains(parent))
                        .collect(),
                );
                copy.reset_started();
                (*uuid, copy)
            })
            .collect();

        Self::rewire(&mut kept);
        Self::seal(kept)
    }

    /// Returns a new pipeline containing the transitive parents of the
    /// selected steps.
    ///
    /// The selection is used as traversal roots; with `inclusive` set the
    /// roots themselves are part of the result. Each kept step's children
    /// are filtered to the steps the traversal reached, since anything
    /// outside that set will never execute in the derived pipeline; parent
    /// lists are carried in full (within an ancestor closure every parent of
    /// a kept step is itself kept).
    #[must_use]
    pub fn ancestors_of(&self, selection: &HashSet<Uuid>, inclusive: bool) -> Self {
        let mut visited: HashSet<Uuid> = selection
            .iter()
            .copied()
            .filter(|uuid| self.steps.contains_key(uuid))
            .collect();
        let mut stack: Vec<Uuid> = visited.iter().copied().collect();
        let mut kept: HashSet<Uuid> = if inclusive {
            visited.clone()
        } else {
            HashSet::new()
        };

        while let Some(uuid) = stack.pop() {
            let Some(step) = self.steps.get(&uuid) else {
                continue;
            };
            for parent in step.parents() {
                kept.insert(*parent);
                if visited.insert(*parent) {
                    stack.push(*parent);
                }
            }
        }

        let steps: BTreeMap<Uuid, Step> = self
            .steps
            .iter()
            .filter(|(uuid, _)| kept.contains(uuid))
            .map(|(uuid, step)| {
                let mut copy = Step::clone(step);
                copy.set_children(
                    step.children()
                        .iter()
                        .copied()
                        .filter(|child| kept.contains(child))
                        .collect(),
                );
                copy.reset_started();
                (*uuid, copy)
            })
            .collect();

        Self::seal(steps)
    }

    /// In-place variant of [`Self::induced_subgraph`]: restricts the
    /// receiver to the selected steps and drops everything else.
    ///
    /// Deliberately narrower than the copying derivations; the cached
    /// sentinel is invalidated because the leaf set may change.
    pub fn retain_steps(&mut self, selection: &HashSet<Uuid>) {
        let previous = std::mem::take(&mut self.steps);
        let mut kept: BTreeMap<Uuid, Step> = previous
            .into_iter()
            .filter(|(uuid, _)| selection.contains(uuid))
            .map(|(uuid, step)| {
                let mut step = Arc::try_unwrap(step).unwrap_or_else(|shared| Step::clone(&shared));
                step.set_parents(
                    step.parents()
                        .iter()
                        .copied()
                        .filter(|parent| selection.contains(parent))
                        .collect(),
                );
                (uuid, step)
            })
            .collect();

        Self::rewire(&mut kept);

        self.steps = kept
            .into_iter()
            .map(|(uuid, step)| (uuid, Arc::new(step)))
            .collect();
        *self.sentinel.write() = None;
    }

    /// The virtual terminal node whose parents are all childless steps.
    ///
    /// Computed lazily and cached; running the sentinel is the entry point
    /// that transitively runs the whole graph.
    #[must_use]
    pub fn sentinel(&self) -> Arc<Step> {
        if let Some(cached) = self.sentinel.read().as_ref() {
            return Arc::clone(cached);
        }

        let leaves: Vec<Uuid> = self
            .steps
            .values()
            .filter(|step| step.children().is_empty())
            .map(|step| step.uuid())
            .collect();
        let sentinel = Arc::new(Step::sentinel(leaves));

        let mut guard = self.sentinel.write();
        if let Some(cached) = guard.as_ref() {
            return Arc::clone(cached);
        }
        *guard = Some(Arc::clone(&sentinel));
        sentinel
    }

    /// Clears every step's started flag (the sentinel's included) so the
    /// same pipeline object can be run again.
    pub fn reset_started(&self) {
        for step in self.steps.values() {
            step.reset_started();
        }
        if let Some(sentinel) = self.sentinel.read().as_ref() {
            sentinel.reset_started();
        }
    }

    /// Wires children from parent lists, failing on a dangling parent
    /// reference. Used at construction, where the description is untrusted.
    fn link(steps: &mut BTreeMap<Uuid, Step>) -> Result<(), MalformedPipelineError> {
        for step in steps.values_mut() {
            step.clear_children();
        }

        let edges: Vec<(Uuid, Uuid)> = steps
            .values()
            .flat_map(|step| {
                let child = step.uuid();
                step.parents().iter().map(move |parent| (*parent, child))
            })
            .collect();

        for (parent, child) in edges {
            match steps.get_mut(&parent) {
                Some(step) => step.push_child(child),
                None => return Err(MalformedPipelineError::dangling_parent(child, parent)),
            }
        }

        Ok(())
    }

    /// Recomputes children from parent lists for a step set that is already
    /// closed under its parent references; edges to absent steps are
    /// silently dropped.
    fn rewire(steps: &mut BTreeMap<Uuid, Step>) {
        for step in steps.values_mut() {
            step.clear_children();
        }

        let edges: Vec<(Uuid, Uuid)> = steps
            .values()
            .flat_map(|step| {
                let child = step.uuid();
                step.parents().iter().map(move |parent| (*parent, child))
            })
            .collect();

        for (parent, child) in edges {
            if let Some(step) = steps.get_mut(&parent) {
                step.push_child(child);
            }
        }
    }

    fn ensure_acyclic(steps: &BTreeMap<Uuid, Step>) -> Result<(), MalformedPipelineError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Gray,
            Black,
        }

        fn visit(
            uuid: Uuid,
            steps: &BTreeMap<Uuid, Step>,
            colors: &mut HashMap<Uuid, Color>,
            path: &mut Vec<Uuid>,
        ) -> Result<(), MalformedPipelineError> {
            colors.insert(uuid, Color::Gray);
            path.push(uuid);

            let Some(step) = steps.get(&uuid) else {
                path.pop();
                colors.insert(uuid, Color::Black);
                return Ok(());
            };

            for parent in step.parents() {
                match colors.get(parent) {
                    Some(Color::Gray) => {
                        let start = path.iter().position(|seen| seen == parent).unwrap_or(0);
                        let mut cycle: Vec<Uuid> = path[start..].to_vec();
                        cycle.push(*parent);
                        return Err(MalformedPipelineError::cycle(cycle));
                    }
                    Some(Color::Black) => {}
                    None => visit(*parent, steps, colors, path)?,
                }
            }

            path.pop();
            colors.insert(uuid, Color::Black);
            Ok(())
        }

        let mut colors = HashMap::new();
        let mut path = Vec::new();
        for uuid in steps.keys() {
            if !colors.contains_key(uuid) {
                visit(*uuid, steps, &mut colors, &mut path)?;
            }
        }
        Ok(())
    }

    fn seal(steps: BTreeMap<Uuid, Step>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|(uuid, step)| (uuid, Arc::new(step)))
                .collect(),
            sentinel: RwLock::new(None),
        }
    }
}

impl Clone for Pipeline {
    /// Deep copy: steps are copied, the sentinel cache starts cold.
    fn clone(&self) -> Self {
        Self {
            steps: self
                .steps
                .iter()
                .map(|(uuid, step)| (*uuid, Arc::new(Step::clone(step))))
                .collect(),
            sentinel: RwLock::new(None),
        }
    }
}
