use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::{CsrGraph, NodeId};

/// A generated graph together with the edge list it was built from and its planted labels.
pub struct PlantedPartition {
    pub graph: CsrGraph,
    pub edges: Vec<(NodeId, NodeId)>,
    pub labels: Vec<i64>,
}

/// Generate an undirected planted-partition graph.
///
/// Node `v` belongs to planted community `v / community_size`. Every unordered pair is
/// connected with probability `p_in` inside a community and `p_out` across communities.
/// The same `seed` always yields the same graph.
pub fn planted_partition(
    communities: u64,
    community_size: u64,
    p_in: f64,
    p_out: f64,
    seed: u64,
) -> PlantedPartition {
    let mut rng = StdRng::seed_from_u64(seed);
    let node_count = communities * community_size;
    let p_in = p_in.clamp(0.0, 1.0);
    let p_out = p_out.clamp(0.0, 1.0);

    let mut edges = Vec::new();
    for source in 0..node_count {
        for target in (source + 1)..node_count {
            let same = source / community_size == target / community_size;
            if rng.gen_bool(if same { p_in } else { p_out }) {
                edges.push((source, target));
            }
        }
    }

    let labels = (0..node_count).map(|v| (v / community_size) as i64).collect();
    let graph = CsrGraph::from_edges(node_count, edges.iter().copied(), false);
    PlantedPartition { graph, edges, labels }
}
