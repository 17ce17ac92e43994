use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DEFAULT_RELATIONSHIP_WEIGHT;
use crate::graph::{CommunityId, Graph, NodeId};
use crate::modularity::ModularityManager;

/// Gain of placing a node into a community, up to terms shared by every candidate.
///
/// `community_weight` must not include the node itself.
pub fn modularity_gain(
    weight_to_community: f64,
    node_weight: f64,
    community_weight: f64,
    total_node_weight: f64,
) -> f64 {
    if total_node_weight == 0.0 {
        return weight_to_community;
    }
    weight_to_community - node_weight * community_weight / total_node_weight
}

/// A node leaving one community for another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NodeMove {
    pub node_id: NodeId,
    pub from: CommunityId,
    pub to: CommunityId,
    pub node_weight: f64,
}

impl NodeMove {
    /// Record the weight change of this move, `updates` is indexed by community.
    pub fn record(&self, updates: &mut [f64]) {
        updates[self.from as usize] -= self.node_weight;
        updates[self.to as usize] += self.node_weight;
    }
}

/// Everything one color round reads and writes, borrowed from the orchestrator.
pub(crate) struct ColorRound<'r, 'g, G> {
    pub current: &'r [AtomicU64],
    pub next: &'r [AtomicU64],
    pub cumulative_node_weights: &'r [f64],
    pub manager: &'r ModularityManager<'g, G>,
    pub total_node_weight: f64,
}

impl<G: Graph> ColorRound<'_, '_, G> {
    /// Move each of `nodes` to its best community, returns the moves in the order of `nodes`.
    ///
    /// `nodes` must share one color, so none of them reads the community of another.
    pub fn optimize_nodes(&self, graph: &G, nodes: &[NodeId]) -> Vec<NodeMove> {
        let mut neighbor_weights = BTreeMap::new();
        let mut moves = Vec::new();
        for node_id in nodes {
            let node_id = *node_id;
            let current_community = self.current[node_id as usize].load(Ordering::Relaxed);
            let best_community = self.best_community(graph, node_id, current_community, &mut neighbor_weights);
            self.next[node_id as usize].store(best_community, Ordering::Relaxed);
            if best_community != current_community {
                moves.push(NodeMove {
                    node_id,
                    from: current_community,
                    to: best_community,
                    node_weight: self.cumulative_node_weights[node_id as usize],
                });
            }
        }
        moves
    }

    fn best_community(
        &self,
        graph: &G,
        node_id: NodeId,
        current_community: CommunityId,
        neighbor_weights: &mut BTreeMap<CommunityId, f64>,
    ) -> CommunityId {
        neighbor_weights.clear();
        neighbor_weights.insert(current_community, 0.0);
        graph.for_each_relationship(node_id, DEFAULT_RELATIONSHIP_WEIGHT, |_, target, weight| {
            if target != node_id {
                let community = self.current[target as usize].load(Ordering::Relaxed);
                *neighbor_weights.entry(community).or_insert(0.0) += weight;
            }
            true
        });

        let node_weight = self.cumulative_node_weights[node_id as usize];
        let mut best_community = current_community;
        let mut best_gain = modularity_gain(
            neighbor_weights[&current_community],
            node_weight,
            self.manager.community_weight(current_community) - node_weight,
            self.total_node_weight,
        );
        // Ascending ids and a strict comparison, ties keep the current or the smallest community.
        for (community, weight) in neighbor_weights.iter() {
            if *community == current_community {
                continue;
            }
            let gain = modularity_gain(
                *weight,
                node_weight,
                self.manager.community_weight(*community),
                self.total_node_weight,
            );
            if gain > best_gain {
                best_community = *community;
                best_gain = gain;
            }
        }
        best_community
    }
}
