use std::sync::atomic::{AtomicU64, Ordering};

use crate::concurrency::{Executor, Partition};
use crate::config::DEFAULT_RELATIONSHIP_WEIGHT;
use crate::graph::Graph;
use crate::modularity::ModularityManager;

/// Compute the cumulative weight of every node and seed the community weights with them.
///
/// Unseeded runs start with every node in its own community. The node weights are computed
/// in parallel, the community weights and the returned total node weight are summed in node
/// order, independent of the partitioning.
pub(crate) fn init_weights<G: Graph>(
    executor: &Executor,
    graph: &G,
    communities: &[AtomicU64],
    manager: &ModularityManager<'_, G>,
    cumulative_node_weights: &mut [f64],
    is_seeded: bool,
) -> f64 {
    executor.run_on_chunks(cumulative_node_weights, |partition, weights| {
        init_partition(graph, partition, communities, weights, is_seeded)
    });

    let mut community_weights = vec![0.0; communities.len()];
    let mut total_node_weight = 0.0;
    for (community, weight) in communities.iter().zip(cumulative_node_weights.iter()) {
        community_weights[community.load(Ordering::Relaxed) as usize] += *weight;
        total_node_weight += *weight;
    }
    executor.run_on_chunks(&mut community_weights, |partition, weights| {
        for (community_id, weight) in partition.iter().zip(weights.iter()) {
            if *weight != 0.0 {
                manager.community_weight_update(community_id, *weight);
            }
        }
    });
    total_node_weight
}

fn init_partition<G: Graph>(
    graph: &G,
    partition: Partition,
    communities: &[AtomicU64],
    weights: &mut [f64],
    is_seeded: bool,
) {
    let graph = graph.concurrent_copy();
    for (node_id, weight) in partition.iter().zip(weights.iter_mut()) {
        if !is_seeded {
            communities[node_id as usize].store(node_id, Ordering::Relaxed);
        }
        let mut cumulative_weight = 0.0;
        graph.for_each_relationship(node_id, DEFAULT_RELATIONSHIP_WEIGHT, |_, _, w| {
            cumulative_weight += w;
            true
        });
        *weight = cumulative_weight;
    }
}
