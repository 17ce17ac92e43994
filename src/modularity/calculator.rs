use log::debug;
use serde::Serialize;

use crate::concurrency::Executor;
use crate::config::DEFAULT_RELATIONSHIP_WEIGHT;
use crate::graph::{CommunityId, Graph, NodeId};
use crate::modularity::community_modularity;
use crate::util::AtomicBitSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommunityModularity {
    pub community_id: CommunityId,
    pub modularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModularityResult {
    pub total_modularity: f64,
    /// Ascending by community id, live communities only.
    pub community_modularities: Vec<CommunityModularity>,
}

/// Weight aggregates of every community.
///
/// Relationships are summed per node in parallel, the node sums are then added up per
/// community in node order, so the result does not depend on the thread count.
pub struct CommunityStatistics {
    inside_relationships: Vec<f64>,
    total_community_relationships: Vec<f64>,
    live_communities: AtomicBitSet,
    // Sorted distinct community ids, present when the pass ran over densified ids.
    original_ids: Option<Vec<CommunityId>>,
    total_relationship_weight: f64,
}

impl CommunityStatistics {
    pub fn total_relationship_weight(&self) -> f64 {
        self.total_relationship_weight
    }

    /// Number of communities with at least one relationship.
    pub fn live_community_count(&self) -> usize {
        self.live_communities.cardinality()
    }

    /// `(community id, inside weight, total weight)` of every live community, ascending ids.
    pub fn communities(&self) -> impl Iterator<Item = (CommunityId, f64, f64)> + '_ {
        self.live_communities.ones().map(move |dense| {
            let community_id = match &self.original_ids {
                Some(original_ids) => original_ids[dense],
                None => dense as CommunityId,
            };
            (
                community_id,
                self.inside_relationships[dense],
                self.total_community_relationships[dense],
            )
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeSums {
    community: usize,
    inside: f64,
    total: f64,
}

/// Scores any static community assignment of a graph.
pub struct ModularityCalculator<'g, G, F> {
    graph: &'g G,
    community_of: F,
}

impl<'g, G, F> ModularityCalculator<'g, G, F>
where
    G: Graph,
    F: Fn(NodeId) -> CommunityId + Sync,
{
    pub fn new(graph: &'g G, community_of: F) -> Self {
        Self { graph, community_of }
    }

    pub fn compute(&self, executor: &Executor) -> ModularityResult {
        let statistics = self.statistics(executor);
        let total_weight = statistics.total_relationship_weight();
        let community_modularities = statistics.communities()
            .map(|(community_id, inside, total)| CommunityModularity {
                community_id,
                modularity: community_modularity(inside, total, total_weight),
            })
            .collect::<Vec<_>>();
        let total_modularity = community_modularities.iter().map(|c| c.modularity).sum();
        ModularityResult { total_modularity, community_modularities }
    }

    pub fn statistics(&self, executor: &Executor) -> CommunityStatistics {
        let node_count = self.graph.node_count();
        let original_ids = self.original_ids_if_sparse(executor);
        let community_count = match &original_ids {
            Some(original_ids) => original_ids.len(),
            None => node_count as usize,
        };
        debug!("Scoring {} nodes over at most {} communities", node_count, community_count);

        let dense_of = |node_id: NodeId| -> usize {
            let community_id = (self.community_of)(node_id);
            match &original_ids {
                // Every id is in the table, the lookup cannot miss.
                Some(original_ids) => original_ids.binary_search(&community_id).unwrap_or_else(|p| p),
                None => community_id as usize,
            }
        };

        let live_communities = AtomicBitSet::new(community_count);
        let mut node_sums = vec![NodeSums::default(); node_count as usize];
        executor.run_on_chunks(&mut node_sums, |partition, sums| {
            let graph = self.graph.concurrent_copy();
            for (node_id, node) in partition.iter().zip(sums.iter_mut()) {
                node.community = dense_of(node_id);
                graph.for_each_relationship(node_id, DEFAULT_RELATIONSHIP_WEIGHT, |_, target, weight| {
                    live_communities.set(node.community);
                    node.total += weight;
                    if dense_of(target) == node.community {
                        node.inside += weight;
                    }
                    true
                });
            }
        });

        let mut inside_relationships = vec![0.0; community_count];
        let mut total_community_relationships = vec![0.0; community_count];
        let mut total_relationship_weight = 0.0;
        for node in &node_sums {
            inside_relationships[node.community] += node.inside;
            total_community_relationships[node.community] += node.total;
            total_relationship_weight += node.total;
        }

        CommunityStatistics {
            inside_relationships,
            total_community_relationships,
            live_communities,
            original_ids,
            total_relationship_weight,
        }
    }

    // Community ids outside [0, node_count) are relabelled to their rank.
    fn original_ids_if_sparse(&self, executor: &Executor) -> Option<Vec<CommunityId>> {
        let node_count = self.graph.node_count();
        let max_id = executor.run_partitioned(node_count, |partition| {
            partition.iter().map(|node_id| (self.community_of)(node_id)).max()
        }).into_iter().flatten().max()?;
        if max_id < node_count {
            return None;
        }
        let mut original_ids = executor.run_partitioned(node_count, |partition| {
            partition.iter().map(|node_id| (self.community_of)(node_id)).collect::<Vec<_>>()
        }).concat();
        original_ids.sort_unstable();
        original_ids.dedup();
        Some(original_ids)
    }
}
