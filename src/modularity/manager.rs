use std::sync::atomic::{AtomicU64, Ordering};

use portable_atomic::AtomicF64;

use crate::concurrency::Executor;
use crate::graph::{CommunityId, Graph};
use crate::modularity::calculator::ModularityCalculator;
use crate::modularity::community_modularity;

/// Running community weights of one optimization run.
///
/// `community_weight_update` may be called from any worker, but at most once per community
/// and phase, which keeps the weights independent of the thread schedule. `set_total_weight`
/// only runs between two phases.
pub struct ModularityManager<'g, G> {
    graph: &'g G,
    community_weights: Vec<AtomicF64>,
    total_weight: f64,
}

impl<'g, G: Graph> ModularityManager<'g, G> {
    pub fn create(graph: &'g G) -> Self {
        let community_weights = (0..graph.node_count()).map(|_| AtomicF64::new(0.0)).collect();
        Self { graph, community_weights, total_weight: 0.0 }
    }

    pub fn community_weight_update(&self, community_id: CommunityId, delta: f64) {
        self.community_weights[community_id as usize].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn community_weight(&self, community_id: CommunityId) -> f64 {
        self.community_weights[community_id as usize].load(Ordering::Relaxed)
    }

    /// Sum over all community weights, equals the total weight between two rounds.
    pub fn community_weight_sum(&self) -> f64 {
        self.community_weights.iter().map(|weight| weight.load(Ordering::Relaxed)).sum()
    }

    pub fn set_total_weight(&mut self, total_weight: f64) {
        self.total_weight = total_weight;
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn register_communities<'c>(&'c self, communities: &'c [AtomicU64]) -> RegisteredCommunities<'c, 'g, G> {
        RegisteredCommunities { manager: self, communities }
    }

    pub fn release(&mut self) {
        self.community_weights = Vec::new();
    }
}

/// A community assignment bound to the manager that scores it.
pub struct RegisteredCommunities<'c, 'g, G> {
    manager: &'c ModularityManager<'g, G>,
    communities: &'c [AtomicU64],
}

impl<G: Graph> RegisteredCommunities<'_, '_, G> {
    pub fn calculate_modularity(&self, executor: &Executor) -> f64 {
        let total_weight = self.manager.total_weight();
        if total_weight == 0.0 {
            return 0.0;
        }
        let communities = self.communities;
        let calculator = ModularityCalculator::new(self.manager.graph, |node_id| {
            communities[node_id as usize].load(Ordering::Relaxed)
        });
        calculator.statistics(executor)
            .communities()
            .map(|(_, inside, total)| community_modularity(inside, total, total_weight))
            .sum()
    }
}
