//! Pipeline description fixtures.

use crate::description::{PipelineDescription, StepDescription};
use uuid::Uuid;

/// Builds a description from `(uuid, name, parents)` triples.
#[must_use]
pub fn description(steps: &[(Uuid, &str, &[Uuid])]) -> PipelineDescription {
    let mut result = PipelineDescription::new("fixture");
    for (uuid, name, parents) in steps {
        result.insert_step(
            StepDescription::new(*uuid, *name).with_incoming(parents.iter().copied()),
        );
    }
    result
}

/// The classic fan-out/fan-in shape: `A -> B, A -> C, B -> D, C -> D`.
/// Returns the description and `[a, b, c, d]`.
#[must_use]
pub fn diamond() -> (PipelineDescription, [Uuid; 4]) {
    let [a, b, c, d] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let desc = description(&[
        (a, "a", &[]),
        (b, "b", &[a]),
        (c, "c", &[a]),
        (d, "d", &[b, c]),
    ]);
    (desc, [a, b, c, d])
}

/// A linear chain of `length` steps. Returns the description and the step
/// UUIDs in execution order.
#[must_use]
pub fn chain(length: usize) -> (PipelineDescription, Vec<Uuid>) {
    let uuids: Vec<Uuid> = (0..length).map(|_| Uuid::new_v4()).collect();
    let mut result = PipelineDescription::new("chain");
    for (index, uuid) in uuids.iter().enumerate() {
        let mut step = StepDescription::new(*uuid, format!("step-{index}"));
        if index > 0 {
            step = step.with_incoming([uuids[index - 1]]);
        }
        result.insert_step(step);
    }
    (result, uuids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diamond_shape() {
        let (desc, [a, b, c, d]) = diamond();
        assert_eq!(desc.steps.len(), 4);
        assert_eq!(desc.steps[&d].incoming_connections, vec![b, c]);
        assert_eq!(desc.steps[&b].incoming_connections, vec![a]);
        assert!(desc.steps[&a].incoming_connections.is_empty());
    }

    #[test]
    fn test_chain_links_each_step_to_its_predecessor() {
        let (desc, uuids) = chain(4);
        assert_eq!(uuids.len(), 4);
        for window in uuids.windows(2) {
            assert_eq!(desc.steps[&window[1]].incoming_connections, vec![window[0]]);
        }
    }
}
