pub mod calculator;
pub mod manager;

pub use calculator::{CommunityModularity, CommunityStatistics, ModularityCalculator, ModularityResult};
pub use manager::{ModularityManager, RegisteredCommunities};

/// Contribution of one community to the total modularity.
///
/// `inside` is the weight of the relationships with both ends in the community, `total` is the
/// weight of all relationships starting in it and `total_weight` the weight of the whole graph,
/// every undirected edge counted from both ends. An empty graph scores zero.
pub fn community_modularity(inside: f64, total: f64, total_weight: f64) -> f64 {
    if total_weight == 0.0 {
        return 0.0;
    }
    (inside - total * total / total_weight) / total_weight
}
