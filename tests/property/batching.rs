use std::collections::BTreeMap;

use proptest::prelude::*;
use rebuildd::graph::{PlanNode, batch_nodes};

// Strategy for an acyclic forest of `n` artifacts: artifact i may only be
// layered on an artifact with a smaller index. Each artifact is independently
// allowed or denied.
fn forest_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<(Option<usize>, bool)>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec((any::<Option<usize>>(), proptest::bool::weighted(0.8)), n)
            .prop_map(|raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, (parent, allowed))| {
                        let parent = if i == 0 { None } else { parent.map(|p| p % i) };
                        (parent, allowed)
                    })
                    .collect()
            })
    })
}

fn name(i: usize) -> String {
    format!("img-{i:02}")
}

fn nodes(forest: &[(Option<usize>, bool)]) -> Vec<PlanNode<usize>> {
    forest
        .iter()
        .enumerate()
        .map(|(i, (parent, _))| PlanNode::new(name(i), parent.map(name), i))
        .collect()
}

proptest! {
    #[test]
    fn parents_always_land_in_earlier_batches(forest in forest_strategy(12)) {
        let allowed: Vec<bool> = forest.iter().map(|(_, a)| *a).collect();
        let plan = batch_nodes(nodes(&forest), |n| allowed[n.item]).unwrap();

        let batch_of: BTreeMap<&str, usize> =
            plan.iter().map(|a| (a.name.as_str(), a.batch)).collect();

        for artifact in plan.iter() {
            if let Some(parent) = &artifact.depends_on {
                let parent_batch = batch_of.get(parent.as_str()).copied();
                prop_assert!(parent_batch.is_some(), "{} depends on missing {}", artifact.name, parent);
                prop_assert!(parent_batch.unwrap() < artifact.batch);
            } else {
                prop_assert_eq!(artifact.batch, 0);
            }
        }
    }

    #[test]
    fn denied_artifacts_are_excluded_and_children_promoted(forest in forest_strategy(12)) {
        let allowed: Vec<bool> = forest.iter().map(|(_, a)| *a).collect();
        let plan = batch_nodes(nodes(&forest), |n| allowed[n.item]).unwrap();

        let planned: Vec<usize> = plan.iter().map(|a| a.item).collect();
        let expected: Vec<usize> = (0..forest.len()).filter(|i| allowed[*i]).collect();
        let mut sorted = planned.clone();
        sorted.sort();
        prop_assert_eq!(sorted, expected);

        // Each artifact hangs off its nearest allowed ancestor.
        for artifact in plan.iter() {
            let mut ancestor = forest[artifact.item].0;
            while let Some(a) = ancestor {
                if allowed[a] {
                    break;
                }
                ancestor = forest[a].0;
            }
            prop_assert_eq!(artifact.depends_on.clone(), ancestor.map(name));
        }
    }

    #[test]
    fn batching_ignores_input_order(forest in forest_strategy(12)) {
        let allowed: Vec<bool> = forest.iter().map(|(_, a)| *a).collect();
        let forward = batch_nodes(nodes(&forest), |n| allowed[n.item]).unwrap();

        let mut reversed_input = nodes(&forest);
        reversed_input.reverse();
        let reversed = batch_nodes(reversed_input, |n| allowed[n.item]).unwrap();

        prop_assert_eq!(forward.names(), reversed.names());
    }
}
