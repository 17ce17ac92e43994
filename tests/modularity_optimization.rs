use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use color_modularity::graph::generator::planted_partition;
use color_modularity::{
    CsrGraph, Executor, ModularityCalculator, ModularityError, ModularityOptimization,
    ModularityOptimizationConfig, ModularityOptimizationOutcome, ModularityOptimizationResult,
    SeedProperty, TerminationFlag,
};

fn config(concurrency: usize) -> ModularityOptimizationConfig {
    ModularityOptimizationConfig {
        concurrency,
        min_batch_size: 1,
        ..Default::default()
    }
}

fn run(graph: &CsrGraph, config: ModularityOptimizationConfig) -> ModularityOptimizationResult {
    ModularityOptimization::new(graph, config, None)
        .unwrap()
        .compute()
        .unwrap()
        .into_result()
        .unwrap()
}

fn two_triangles() -> CsrGraph {
    CsrGraph::from_edges(6, vec![(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)], false)
}

fn random_weighted_graph(seed: u64) -> CsrGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let node_count = rng.gen_range(10..60);
    let edge_count = rng.gen_range(node_count..node_count * 4);
    let edges = (0..edge_count)
        .map(|_| {
            (
                rng.gen_range(0..node_count),
                rng.gen_range(0..node_count),
                rng.gen_range(1..5) as f64,
            )
        })
        .collect::<Vec<_>>();
    CsrGraph::from_weighted_edges(node_count, edges, false)
}

// Two blocks of real weighted relationships, the weight sums depend on the order of addition.
fn real_weighted_blocks(node_count: u64, seed: u64) -> CsrGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let half = node_count / 2;
    let edges = (0..node_count * 8)
        .map(|_| {
            let source = rng.gen_range(0..node_count);
            let target = if rng.gen_bool(0.9) {
                source / half * half + rng.gen_range(0..half)
            } else {
                rng.gen_range(0..node_count)
            };
            (source, target, rng.gen::<f64>() * 2.3 + 0.1)
        })
        .collect::<Vec<_>>();
    CsrGraph::from_weighted_edges(node_count, edges, false)
}

// Relabel every community by its smallest node id.
fn canonical(result: &ModularityOptimizationResult) -> Vec<u64> {
    let mut smallest = HashMap::new();
    result.communities()
        .enumerate()
        .map(|(node_id, community)| *smallest.entry(community).or_insert(node_id as u64))
        .collect()
}

#[test]
fn test_two_triangles() {
    let graph = two_triangles();
    let mut partitions = vec![];
    for concurrency in [1, 4] {
        let result = run(&graph, config(concurrency));
        assert_eq!(result.community_count(), 2);
        assert_eq!(result.community_of(0), result.community_of(1));
        assert_eq!(result.community_of(1), result.community_of(2));
        assert_eq!(result.community_of(3), result.community_of(5));
        assert_ne!(result.community_of(0), result.community_of(3));
        assert!((result.modularity() - 0.5).abs() < 1e-9);
        assert!(result.did_converge());
        partitions.push(canonical(&result));
    }
    assert_eq!(partitions[0], partitions[1]);
}

#[test]
fn test_seeding_round_trip() {
    let graph = CsrGraph::from_edges(4, vec![(0, 1)], false);
    let seeds = vec![7i64, 7, -1, 42];
    let result = ModularityOptimization::new(&graph, config(2), Some(&seeds as &dyn SeedProperty))
        .unwrap()
        .compute()
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(result.community_of(0), 7);
    assert_eq!(result.community_of(1), 7);
    assert_eq!(result.community_of(3), 42);
    assert_ne!(result.community_of(2), 7);
    assert_ne!(result.community_of(2), 42);
}

#[test]
fn test_unseeded_nodes_apart_from_largest_seed() {
    let graph = CsrGraph::from_edges(3, Vec::<(u64, u64)>::new(), false);
    let seeds = vec![i64::MAX, -1, -1];
    let result = ModularityOptimization::new(&graph, config(2), Some(&seeds as &dyn SeedProperty))
        .unwrap()
        .compute()
        .unwrap()
        .into_result()
        .unwrap();
    let largest = i64::MAX as u64;
    assert_eq!(result.communities().collect::<Vec<_>>(), vec![largest, largest + 2, largest + 3]);
    assert_eq!(result.community_count(), 3);
}

#[test]
fn test_graph_without_relationships() {
    let graph = CsrGraph::from_edges(5, Vec::<(u64, u64)>::new(), false);
    let result = run(&graph, config(4));
    assert_eq!(result.modularity(), 0.0);
    assert_eq!(result.communities().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert!(result.did_converge());
}

#[test]
fn test_empty_graph() {
    let graph = CsrGraph::from_edges(0, Vec::<(u64, u64)>::new(), false);
    let result = run(&graph, config(2));
    assert_eq!(result.node_count(), 0);
    assert_eq!(result.modularity(), 0.0);
}

#[test]
fn test_single_iteration_converges() {
    let planted = planted_partition(3, 15, 0.4, 0.05, 11);
    let outcome = ModularityOptimization::new(
        &planted.graph,
        ModularityOptimizationConfig { max_iterations: 1, ..config(3) },
        None,
    )
    .unwrap()
    .compute()
    .unwrap();
    match outcome {
        ModularityOptimizationOutcome::Converged(result) => {
            assert!(result.did_converge());
            assert_eq!(result.iterations(), 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_outcome_matches_convergence() {
    let planted = planted_partition(4, 20, 0.3, 0.02, 5);
    let config = ModularityOptimizationConfig { max_iterations: 2, tolerance: 0.0, ..config(4) };
    match ModularityOptimization::new(&planted.graph, config, None).unwrap().compute().unwrap() {
        ModularityOptimizationOutcome::Converged(result) => assert!(result.did_converge()),
        ModularityOptimizationOutcome::IterationLimitReached(result) => {
            assert!(!result.did_converge());
            assert_eq!(result.iterations(), 2);
        }
        ModularityOptimizationOutcome::Cancelled => panic!("not cancelled"),
    }
}

#[test]
fn test_same_concurrency_is_repeatable() {
    let graph = random_weighted_graph(99);
    let first = run(&graph, config(4));
    let second = run(&graph, config(4));
    assert_eq!(first.communities().collect::<Vec<_>>(), second.communities().collect::<Vec<_>>());
    assert_eq!(first.modularity().to_bits(), second.modularity().to_bits());
    assert_eq!(first.iterations(), second.iterations());
}

#[test]
fn test_random_graphs_independent_of_concurrency() {
    let executor = Executor::new(2, 1).unwrap();
    for seed in 0..12 {
        let graph = random_weighted_graph(seed);
        let single = run(&graph, config(1));
        let multi = run(&graph, config(4));
        assert_eq!(canonical(&single), canonical(&multi), "seed {}", seed);
        assert_eq!(single.modularity().to_bits(), multi.modularity().to_bits(), "seed {}", seed);

        // The reported modularity agrees with an independent scoring of the partition.
        let communities = multi.communities().collect::<Vec<_>>();
        let scored = ModularityCalculator::new(&graph, |node_id| communities[node_id as usize])
            .compute(&executor);
        assert!((scored.total_modularity - multi.modularity()).abs() < 1e-9, "seed {}", seed);
    }
}

#[test]
fn test_real_weights_repeatable() {
    let graph = real_weighted_blocks(2000, 7);
    let first = run(&graph, config(8));
    let communities = first.communities().collect::<Vec<_>>();
    for _ in 0..5 {
        let again = run(&graph, config(8));
        assert_eq!(again.communities().collect::<Vec<_>>(), communities);
        assert_eq!(again.modularity().to_bits(), first.modularity().to_bits());
        assert_eq!(again.iterations(), first.iterations());
    }
}

#[test]
fn test_real_weights_independent_of_concurrency() {
    let graph = real_weighted_blocks(2000, 13);
    let single = run(&graph, config(1));
    let multi = run(&graph, config(4));
    assert_eq!(single.communities().collect::<Vec<_>>(), multi.communities().collect::<Vec<_>>());
    assert_eq!(single.modularity().to_bits(), multi.modularity().to_bits());
    assert_eq!(single.iterations(), multi.iterations());

    let executor = Executor::new(4, 1).unwrap();
    let communities = multi.communities().collect::<Vec<_>>();
    let scored = ModularityCalculator::new(&graph, |node_id| communities[node_id as usize]).compute(&executor);
    assert!((scored.total_modularity - multi.modularity()).abs() < 1e-9);
}

#[test]
fn test_planted_partition_found() {
    let planted = planted_partition(4, 20, 0.5, 0.01, 3);
    let result = run(&planted.graph, config(4));
    assert!(result.modularity() > 0.25, "modularity {}", result.modularity());
}

struct CountdownFlag {
    polls_left: AtomicU32,
}

impl TerminationFlag for CountdownFlag {
    fn is_running(&self) -> Result<bool> {
        let left = self.polls_left.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(false);
        }
        self.polls_left.store(left - 1, Ordering::SeqCst);
        Ok(true)
    }
}

struct BrokenFlag;

impl TerminationFlag for BrokenFlag {
    fn is_running(&self) -> Result<bool> {
        bail!("termination flag unavailable")
    }
}

#[test]
fn test_cancelled_mid_run() {
    let graph = two_triangles();
    for polls in [0, 1, 3] {
        let flag = Arc::new(CountdownFlag { polls_left: AtomicU32::new(polls) });
        let outcome = ModularityOptimization::new(&graph, config(2), None)
            .unwrap()
            .with_termination_flag(flag)
            .compute()
            .unwrap();
        assert!(outcome.is_cancelled(), "polls {}", polls);
        assert!(outcome.result().is_none());
    }
}

#[test]
fn test_termination_flag_error_propagates() {
    let graph = two_triangles();
    let err = ModularityOptimization::new(&graph, config(1), None)
        .unwrap()
        .with_termination_flag(Arc::new(BrokenFlag))
        .compute()
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "termination flag unavailable");
}

#[test]
fn test_invalid_config_rejected() {
    let graph = two_triangles();
    let err = ModularityOptimization::new(&graph, ModularityOptimizationConfig { max_iterations: 0, ..config(1) }, None)
        .err()
        .unwrap();
    assert_eq!(err.downcast_ref::<ModularityError>(), Some(&ModularityError::InvalidMaxIterations(0)));
}
