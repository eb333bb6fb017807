//! The edge-weighted consumption graph.
//!
//! Mirrors the pipeline's producer→consumer structure with one {0,1} weight
//! per edge: weight 1 means the consumer has retrieved the producer's output
//! since the graph was rebuilt or the output last evicted.

use crate::description::PipelineDescription;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Directed graph of (producer, consumer) edges with retrieval weights.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionGraph {
    /// producer -> consumer -> weight.
    edges: BTreeMap<Uuid, BTreeMap<Uuid, u8>>,
}

impl ConsumptionGraph {
    /// Builds the graph from a pipeline description, all weights zero.
    ///
    /// Every step gets a node; each `incoming_connections` entry becomes a
    /// producer→consumer edge. Connections referencing steps outside the
    /// description still get an edge node so the description is taken
    /// as-is — the eviction side never validates the pipeline.
    #[must_use]
    pub fn from_description(description: &PipelineDescription) -> Self {
        let mut edges: BTreeMap<Uuid, BTreeMap<Uuid, u8>> = description
            .steps
            .values()
            .map(|step| (step.uuid, BTreeMap::new()))
            .collect();

        for step in description.steps.values() {
            for parent in &step.incoming_connections {
                edges.entry(*parent).or_default().insert(step.uuid, 0);
            }
        }

        Self { edges }
    }

    /// Carries weights over from a previous graph for edges that still
    /// exist. Edges absent from this graph silently lose their weight.
    pub fn carry_weights_from(&mut self, previous: &Self) {
        for (producer, consumers) in &mut self.edges {
            let Some(previous_consumers) = previous.edges.get(producer) else {
                continue;
            };
            for (consumer, weight) in consumers {
                if let Some(previous_weight) = previous_consumers.get(consumer) {
                    *weight = *previous_weight;
                }
            }
        }
    }

    /// Records that `target` has retrieved `source`'s output. Returns true
    /// if the edge exists; marking it twice is a no-op.
    pub fn mark_retrieved(&mut self, source: Uuid, target: Uuid) -> bool {
        match self.edges.get_mut(&source).and_then(|c| c.get_mut(&target)) {
            Some(weight) => {
                *weight = 1;
                true
            }
            None => false,
        }
    }

    /// The weight of a specific edge, if it exists.
    #[must_use]
    pub fn weight(&self, source: Uuid, target: Uuid) -> Option<u8> {
        self.edges.get(&source).and_then(|c| c.get(&target)).copied()
    }

    /// Nodes whose every declared consumer has retrieved their output:
    /// out-degree equals the sum of outgoing edge weights.
    #[must_use]
    pub fn drained(&self) -> Vec<Uuid> {
        self.edges
            .iter()
            .filter(|(_, consumers)| {
                let total: usize = consumers.values().map(|w| usize::from(*w)).sum();
                consumers.len() == total
            })
            .map(|(producer, _)| *producer)
            .collect()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::description;

    #[test]
    fn test_edges_follow_incoming_connections() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let desc = description(&[(a, "a", &[]), (b, "b", &[a]), (c, "c", &[a])]);

        let graph = ConsumptionGraph::from_description(&desc);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.weight(a, b), Some(0));
        assert_eq!(graph.weight(a, c), Some(0));
        assert_eq!(graph.weight(b, a), None);
    }

    #[test]
    fn test_drained_requires_every_consumer() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let desc = description(&[(a, "a", &[]), (b, "b", &[a]), (c, "c", &[a])]);
        let mut graph = ConsumptionGraph::from_description(&desc);

        assert!(!graph.drained().contains(&a));

        assert!(graph.mark_retrieved(a, b));
        assert!(!graph.drained().contains(&a));

        assert!(graph.mark_retrieved(a, c));
        assert!(graph.drained().contains(&a));
    }

    #[test]
    fn test_nodes_without_consumers_are_trivially_drained() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let desc = description(&[(a, "a", &[]), (b, "b", &[a])]);
        let graph = ConsumptionGraph::from_description(&desc);

        // b has no outgoing edges, so 0 == 0.
        assert!(graph.drained().contains(&b));
        assert!(!graph.drained().contains(&a));
    }

    #[test]
    fn test_mark_retrieved_is_idempotent_and_edge_checked() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let desc = description(&[(a, "a", &[]), (b, "b", &[a])]);
        let mut graph = ConsumptionGraph::from_description(&desc);

        assert!(graph.mark_retrieved(a, b));
        assert!(graph.mark_retrieved(a, b));
        assert_eq!(graph.weight(a, b), Some(1));

        assert!(!graph.mark_retrieved(b, a));
        assert!(!graph.mark_retrieved(Uuid::new_v4(), b));
    }

    #[test]
    fn test_carry_weights_preserves_surviving_edges() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let before = description(&[(a, "a", &[]), (b, "b", &[a]), (c, "c", &[a])]);
        let mut old = ConsumptionGraph::from_description(&before);
        old.mark_retrieved(a, b);
        old.mark_retrieved(a, c);

        // The a -> c edge is removed by a concurrent edit.
        let after = description(&[(a, "a", &[]), (b, "b", &[a]), (c, "c", &[])]);
        let mut new = ConsumptionGraph::from_description(&after);
        new.carry_weights_from(&old);

        assert_eq!(new.weight(a, b), Some(1));
        assert_eq!(new.weight(a, c), None);
    }

    #[test]
    fn test_carry_weights_ignores_new_edges() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let before = description(&[(a, "a", &[]), (b, "b", &[])]);
        let old = ConsumptionGraph::from_description(&before);

        let after = description(&[(a, "a", &[]), (b, "b", &[a])]);
        let mut new = ConsumptionGraph::from_description(&after);
        new.carry_weights_from(&old);

        assert_eq!(new.weight(a, b), Some(0));
    }
}
