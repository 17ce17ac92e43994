use anyhow::Result;
use fixedbitset::FixedBitSet;
use log::debug;

use crate::concurrency::Executor;
use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_RELATIONSHIP_WEIGHT};
use crate::graph::{Graph, NodeId};

pub type ColorId = u64;

const UNCOLORED: ColorId = ColorId::MAX;

/// A color per node plus the set of colors in use.
#[derive(Debug, Clone)]
pub struct NodeColoring {
    pub colors: Vec<ColorId>,
    pub used_colors: FixedBitSet,
}

impl NodeColoring {
    pub fn from_colors(colors: Vec<ColorId>) -> Self {
        let max_color = colors.iter().copied().filter(|c| *c != UNCOLORED).max();
        let mut used_colors = FixedBitSet::with_capacity(max_color.map_or(0, |c| c as usize + 1));
        for color in &colors {
            if *color != UNCOLORED {
                used_colors.insert(*color as usize);
            }
        }
        Self { colors, used_colors }
    }

    pub fn color_of(&self, node_id: NodeId) -> ColorId {
        self.colors[node_id as usize]
    }

    pub fn number_of_colors(&self) -> usize {
        self.used_colors.count_ones(..)
    }

    /// Whether no two adjacent nodes share a color, self loops aside.
    pub fn is_proper<G: Graph>(&self, graph: &G) -> bool {
        (0..graph.node_count()).all(|node| {
            let color = self.color_of(node);
            let mut proper = color != UNCOLORED;
            graph.for_each_relationship(node, DEFAULT_RELATIONSHIP_WEIGHT, |source, target, _| {
                if source != target && self.color_of(target) == color {
                    proper = false;
                }
                proper
            });
            proper
        })
    }
}

/// Produces a proper node coloring, no two adjacent nodes may share a color.
/// Minimal colorings are welcome but not required.
pub trait Coloring<G: Graph> {
    fn color(&self, graph: &G, concurrency: usize, max_iterations: u32) -> Result<NodeColoring>;
}

/// Speculative parallel coloring with conflict resolution.
///
/// Every round the pending nodes pick the smallest color not used by their neighbors in
/// the previous round, then the higher id of each conflicting pair is queued again. Rounds
/// only read the previous snapshot, so the outcome does not depend on the thread count.
/// Nodes still pending after `max_iterations` rounds are colored sequentially.
#[derive(Debug, Clone)]
pub struct K1Coloring {
    min_batch_size: usize,
}

impl K1Coloring {
    pub fn new(min_batch_size: usize) -> Self {
        Self { min_batch_size }
    }
}

impl Default for K1Coloring {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

fn smallest_free_color<G: Graph>(graph: &G, node_id: NodeId, colors: &[ColorId]) -> ColorId {
    let mut neighbor_colors = Vec::new();
    graph.for_each_relationship(node_id, DEFAULT_RELATIONSHIP_WEIGHT, |_, target, _| {
        if target != node_id {
            neighbor_colors.push(colors[target as usize]);
        }
        true
    });
    // One of the first degree + 1 colors is always free.
    let bound = neighbor_colors.len() + 1;
    let mut forbidden = FixedBitSet::with_capacity(bound);
    for color in neighbor_colors {
        if color < bound as ColorId {
            forbidden.insert(color as usize);
        }
    }
    (0..bound).find(|color| !forbidden.contains(*color)).unwrap_or(bound) as ColorId
}

fn has_lower_conflict<G: Graph>(graph: &G, node_id: NodeId, colors: &[ColorId]) -> bool {
    let color = colors[node_id as usize];
    let mut conflict = false;
    graph.for_each_relationship(node_id, DEFAULT_RELATIONSHIP_WEIGHT, |_, target, _| {
        if target < node_id && colors[target as usize] == color {
            conflict = true;
        }
        !conflict
    });
    conflict
}

impl<G: Graph> Coloring<G> for K1Coloring {
    fn color(&self, graph: &G, concurrency: usize, max_iterations: u32) -> Result<NodeColoring> {
        let node_count = graph.node_count();
        let executor = Executor::new(concurrency, self.min_batch_size)?;
        let mut colors = vec![UNCOLORED; node_count as usize];
        let mut nodes_to_color: Vec<NodeId> = (0..node_count).collect();

        let mut iteration = 0u32;
        while !nodes_to_color.is_empty() && iteration < max_iterations {
            let picked = executor.run_partitioned(nodes_to_color.len() as u64, |partition| {
                let graph = graph.concurrent_copy();
                partition.iter()
                    .map(|position| smallest_free_color(&graph, nodes_to_color[position as usize], &colors))
                    .collect::<Vec<_>>()
            }).concat();
            for (node, color) in nodes_to_color.iter().zip(picked) {
                colors[*node as usize] = color;
            }

            nodes_to_color = executor.run_partitioned(nodes_to_color.len() as u64, |partition| {
                let graph = graph.concurrent_copy();
                partition.iter()
                    .map(|position| nodes_to_color[position as usize])
                    .filter(|node| has_lower_conflict(&graph, *node, &colors))
                    .collect::<Vec<_>>()
            }).concat();
            iteration += 1;
            debug!("Coloring round {}: {} nodes left to color", iteration, nodes_to_color.len());
        }

        // Finish sequentially, ascending ids, every choice sees the final colors of its neighbors.
        for node in nodes_to_color {
            colors[node as usize] = smallest_free_color(graph, node, &colors);
        }

        Ok(NodeColoring::from_colors(colors))
    }
}

/// Nodes grouped by color, colors ascending, node ids ascending within a color.
#[derive(Debug)]
pub struct ColorArray {
    nodes: Vec<NodeId>,
    offsets: Vec<usize>, // offsets[i]..offsets[i + 1] holds the nodes of the i-th color.
    colors: Vec<ColorId>,
}

impl ColorArray {
    pub fn create(coloring: &NodeColoring) -> Self {
        let colors: Vec<ColorId> = coloring.used_colors.ones().map(|c| c as ColorId).collect();
        let mut color_index = vec![0usize; coloring.used_colors.len()];
        for (index, color) in colors.iter().enumerate() {
            color_index[*color as usize] = index;
        }

        let mut counts = vec![0usize; colors.len()];
        for color in &coloring.colors {
            counts[color_index[*color as usize]] += 1;
        }
        let mut offsets = Vec::with_capacity(colors.len() + 1);
        offsets.push(0);
        for count in &counts {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + count);
        }

        let mut cursor = offsets[..colors.len()].to_vec();
        let mut nodes = vec![0 as NodeId; coloring.colors.len()];
        for (node, color) in coloring.colors.iter().enumerate() {
            let index = color_index[*color as usize];
            nodes[cursor[index]] = node as NodeId;
            cursor[index] += 1;
        }

        Self { nodes, offsets, colors }
    }

    pub fn number_of_colors(&self) -> usize {
        self.colors.len()
    }

    pub fn color_at(&self, index: usize) -> ColorId {
        self.colors[index]
    }

    pub fn nodes_of_color(&self, index: usize) -> &[NodeId] {
        &self.nodes[self.offsets[index]..self.offsets[index + 1]]
    }
}
