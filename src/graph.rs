use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{DEFAULT_RELATIONSHIP_WEIGHT, READ_BUFFER_SIZE};
use crate::error::ModularityError;

pub mod generator;

/// Dense node id in `[0, node_count)`.
pub type NodeId = u64;

/// Dense community id, the community a node currently belongs to.
pub type CommunityId = u64;

/// The read side of a graph as seen by the community algorithms.
pub trait Graph: Send + Sync {
    fn node_count(&self) -> u64;

    /// Visit every relationship starting at `node_id`.
    /// Relationships without a stored weight report `default_weight`.
    /// The consumer returns `false` to stop the traversal early.
    fn for_each_relationship<F>(&self, node_id: NodeId, default_weight: f64, consumer: F)
    where
        F: FnMut(NodeId, NodeId, f64) -> bool;

    /// An independent traversal handle, one per worker.
    fn concurrent_copy(&self) -> Self
    where
        Self: Sized;
}

/// Optional external community labels, one per node.
pub trait SeedProperty: Sync {
    fn long_value(&self, node_id: NodeId) -> i64;

    fn max_long_property_value(&self) -> Option<i64>;

    /// Number of nodes this property holds a value for.
    fn size(&self) -> u64;
}

impl SeedProperty for [i64] {
    fn long_value(&self, node_id: NodeId) -> i64 {
        self[node_id as usize]
    }

    fn max_long_property_value(&self) -> Option<i64> {
        self.iter().copied().max()
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl SeedProperty for Vec<i64> {
    fn long_value(&self, node_id: NodeId) -> i64 {
        self.as_slice().long_value(node_id)
    }

    fn max_long_property_value(&self) -> Option<i64> {
        self.as_slice().max_long_property_value()
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

// Adjacency in compressed sparse row layout.
struct CsrStorage {
    offsets: Vec<usize>, // offsets[v]..offsets[v + 1] indexes the relationships of v.
    targets: Vec<NodeId>,
    weights: Option<Vec<f64>>, // None for unweighted graphs.
}

/// Immutable in-memory graph, cheap to copy across workers.
#[derive(Clone)]
pub struct CsrGraph {
    storage: Arc<CsrStorage>,
    node_count: u64,
}

impl CsrGraph {
    /// Build an unweighted graph, every relationship reports the caller's default weight.
    pub fn from_edges(
        node_count: u64,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
        directed: bool,
    ) -> CsrGraph {
        let edges = edges.into_iter().map(|(s, t)| (s, t, None)).collect::<Vec<_>>();
        Self::build(node_count, edges, directed)
    }

    /// Build a weighted graph.
    pub fn from_weighted_edges(
        node_count: u64,
        edges: impl IntoIterator<Item = (NodeId, NodeId, f64)>,
        directed: bool,
    ) -> CsrGraph {
        let edges = edges.into_iter().map(|(s, t, w)| (s, t, Some(w))).collect::<Vec<_>>();
        Self::build(node_count, edges, directed)
    }

    fn build(node_count: u64, edges: Vec<(NodeId, NodeId, Option<f64>)>, directed: bool) -> CsrGraph {
        // Endpoints beyond the declared node count grow the graph.
        let node_count = edges.iter()
            .map(|(s, t, _)| s.max(t) + 1)
            .fold(node_count, u64::max);
        let is_weighted = edges.iter().any(|(_, _, w)| w.is_some());

        let mut degrees = vec![0usize; node_count as usize];
        for (s, t, _) in &edges {
            degrees[*s as usize] += 1;
            if !directed {
                degrees[*t as usize] += 1;
            }
        }

        let mut offsets = Vec::with_capacity(node_count as usize + 1);
        offsets.push(0usize);
        for degree in &degrees {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + degree);
        }
        let relationship_count = offsets[node_count as usize];

        let mut cursor = offsets[..node_count as usize].to_vec();
        let mut targets = vec![0 as NodeId; relationship_count];
        let mut weights = if is_weighted {
            Some(vec![DEFAULT_RELATIONSHIP_WEIGHT; relationship_count])
        } else {
            None
        };

        let mut put = |source: NodeId, target: NodeId, weight: Option<f64>| {
            let slot = cursor[source as usize];
            cursor[source as usize] += 1;
            targets[slot] = target;
            if let (Some(weights), Some(weight)) = (weights.as_mut(), weight) {
                weights[slot] = weight;
            }
        };
        for (s, t, w) in edges {
            put(s, t, w);
            if !directed {
                put(t, s, w);
            }
        }

        CsrGraph {
            storage: Arc::new(CsrStorage { offsets, targets, weights }),
            node_count,
        }
    }

    /// Number of stored (directed) relationships.
    pub fn relationship_count(&self) -> u64 {
        self.storage.targets.len() as u64
    }

    pub fn degree(&self, node_id: NodeId) -> usize {
        let offsets = &self.storage.offsets;
        offsets[node_id as usize + 1] - offsets[node_id as usize]
    }

    pub fn is_weighted(&self) -> bool {
        self.storage.weights.is_some()
    }

    /// Load a graph from a `.graph` file.
    ///
    /// The first line is a header and skipped. `v <id> <label> [seed]` declares a vertex,
    /// `e <src> <dst> [weight]` declares a relationship. Seeds are returned when at least
    /// one vertex carries one, vertices without a seed get `-1`.
    pub fn from_graph_file<P: AsRef<Path>>(
        file_path: P,
        directed: bool,
    ) -> Result<(CsrGraph, Option<Vec<i64>>)> {
        let file_path = file_path.as_ref();
        let graph_file = File::open(file_path)
            .with_context(|| format!("Failed to open graph file {}", file_path.display()))?;
        let graph_reader = BufReader::with_capacity(READ_BUFFER_SIZE, graph_file);

        let mut node_count = 0u64;
        let mut seeds = Vec::<(NodeId, i64)>::new();
        let mut edges = Vec::<(NodeId, NodeId, Option<f64>)>::new();
        for (index, line) in graph_reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.with_context(|| format!("Failed to read line {}", line_number))?;
            if line_number == 1 {
                // The header line, just skip it.
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.first() {
                Some(&"v") => {
                    let vertex_id: NodeId = parse_token(&tokens, 1, line_number)?;
                    node_count = node_count.max(vertex_id + 1);
                    if tokens.len() > 3 {
                        seeds.push((vertex_id, parse_token(&tokens, 3, line_number)?));
                    }
                }
                Some(&"e") => {
                    let src: NodeId = parse_token(&tokens, 1, line_number)?;
                    let dst: NodeId = parse_token(&tokens, 2, line_number)?;
                    let weight = if tokens.len() > 3 {
                        Some(parse_token::<f64>(&tokens, 3, line_number)?)
                    } else {
                        None
                    };
                    edges.push((src, dst, weight));
                }
                // Blank lines, comments and unknown records.
                _ => {}
            }
        }

        let graph = Self::build(node_count, edges, directed);
        let seeds = if seeds.is_empty() {
            None
        } else {
            let mut seed_values = vec![-1i64; graph.node_count as usize];
            for (vertex_id, seed) in seeds {
                seed_values[vertex_id as usize] = seed;
            }
            Some(seed_values)
        };
        Ok((graph, seeds))
    }
}

fn parse_token<T: std::str::FromStr>(tokens: &[&str], position: usize, line: usize) -> Result<T> {
    let token = tokens.get(position).ok_or_else(|| ModularityError::MalformedGraphFile {
        line,
        reason: format!("missing token {}", position),
    })?;
    token.parse::<T>().map_err(|_| {
        ModularityError::MalformedGraphFile {
            line,
            reason: format!("cannot parse '{}'", token),
        }
        .into()
    })
}

/// Write an edge list as a `.graph` file, readable by [`CsrGraph::from_graph_file`].
pub fn write_graph_file<P: AsRef<Path>>(
    file_path: P,
    node_count: u64,
    edges: &[(NodeId, NodeId)],
    labels: Option<&[i64]>,
) -> Result<()> {
    let file_path = file_path.as_ref();
    let file = File::create(file_path)
        .with_context(|| format!("Failed to create graph file {}", file_path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "t {} {}", node_count, edges.len())?;
    for vertex_id in 0..node_count {
        match labels {
            Some(labels) => writeln!(writer, "v {} 0 {}", vertex_id, labels[vertex_id as usize])?,
            None => writeln!(writer, "v {} 0", vertex_id)?,
        }
    }
    for (src, dst) in edges {
        writeln!(writer, "e {} {}", src, dst)?;
    }
    writer.flush()?;
    Ok(())
}

impl Graph for CsrGraph {
    fn node_count(&self) -> u64 {
        self.node_count
    }

    fn for_each_relationship<F>(&self, node_id: NodeId, default_weight: f64, mut consumer: F)
    where
        F: FnMut(NodeId, NodeId, f64) -> bool,
    {
        let storage = &self.storage;
        let start = storage.offsets[node_id as usize];
        let end = storage.offsets[node_id as usize + 1];
        for slot in start..end {
            let weight = match &storage.weights {
                Some(weights) => weights[slot],
                None => default_weight,
            };
            if !consumer(node_id, storage.targets[slot], weight) {
                break;
            }
        }
    }

    fn concurrent_copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod test_graph {
    use std::io::Write;

    use crate::error::ModularityError;
    use crate::graph::{CsrGraph, Graph, SeedProperty, write_graph_file};

    fn neighbors(graph: &CsrGraph, node: u64) -> Vec<(u64, f64)> {
        let mut result = vec![];
        graph.for_each_relationship(node, 1.0, |_, t, w| {
            result.push((t, w));
            true
        });
        result
    }

    #[test]
    fn test_undirected_edges_stored_twice() {
        let graph = CsrGraph::from_edges(3, vec![(0, 1), (1, 2)], false);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.relationship_count(), 4);
        assert_eq!(neighbors(&graph, 1), vec![(0, 1.0), (2, 1.0)]);
        assert!(!graph.is_weighted());
    }

    #[test]
    fn test_directed_and_default_weight() {
        let graph = CsrGraph::from_edges(2, vec![(0, 1)], true);
        let mut seen = vec![];
        graph.for_each_relationship(0, 3.5, |s, t, w| {
            seen.push((s, t, w));
            true
        });
        assert_eq!(seen, vec![(0, 1, 3.5)]);
        assert_eq!(graph.degree(1), 0);
    }

    #[test]
    fn test_weighted_edges_grow_node_count() {
        let graph = CsrGraph::from_weighted_edges(1, vec![(0, 4, 2.5)], false);
        assert_eq!(graph.node_count(), 5);
        assert_eq!(neighbors(&graph, 4), vec![(0, 2.5)]);
        assert_eq!(graph.degree(2), 0);
    }

    #[test]
    fn test_early_stop() {
        let graph = CsrGraph::from_edges(4, vec![(0, 1), (0, 2), (0, 3)], false);
        let mut visited = 0;
        graph.for_each_relationship(0, 1.0, |_, _, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_concurrent_copy_shares_storage() {
        let graph = CsrGraph::from_edges(3, vec![(0, 1), (1, 2)], false);
        let copy = graph.concurrent_copy();
        assert_eq!(neighbors(&graph, 1), neighbors(&copy, 1));
    }

    #[test]
    fn test_seed_property_on_vec() {
        let seeds = vec![7i64, 7, -1, 42];
        assert_eq!(seeds.long_value(2), -1);
        assert_eq!(seeds.max_long_property_value(), Some(42));
        assert_eq!(SeedProperty::size(&seeds), 4);
    }

    #[test]
    fn test_load_graph_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "t 4 3").unwrap();
        writeln!(file, "v 0 0 5").unwrap();
        writeln!(file, "v 1 0 5").unwrap();
        writeln!(file, "v 2 0").unwrap();
        writeln!(file, "v 3 0 9").unwrap();
        writeln!(file, "e 0 1 2.0").unwrap();
        writeln!(file, "e 1 2").unwrap();
        writeln!(file, "e 2 3").unwrap();
        let (graph, seeds) = CsrGraph::from_graph_file(file.path(), false).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.relationship_count(), 6);
        assert_eq!(seeds, Some(vec![5, 5, -1, 9]));
        assert_eq!(neighbors(&graph, 0), vec![(1, 2.0)]);
        assert_eq!(neighbors(&graph, 2), vec![(1, 1.0), (3, 1.0)]);
    }

    #[test]
    fn test_malformed_graph_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "t 2 1").unwrap();
        writeln!(file, "v 0 0").unwrap();
        writeln!(file, "e 0 x").unwrap();
        let err = CsrGraph::from_graph_file(file.path(), false).err().unwrap();
        match err.downcast_ref::<ModularityError>() {
            Some(ModularityError::MalformedGraphFile { line, .. }) => assert_eq!(*line, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triangle.graph");
        write_graph_file(&path, 3, &[(0, 1), (1, 2), (0, 2)], Some(&[1, 1, 2])).unwrap();
        let (graph, seeds) = CsrGraph::from_graph_file(&path, false).unwrap();
        assert_eq!(graph.relationship_count(), 6);
        assert_eq!(seeds, Some(vec![1, 1, 2]));
    }
}
