use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};

use crate::coloring::{ColorArray, Coloring, K1Coloring};
use crate::concurrency::Executor;
use crate::config::{ModularityOptimizationConfig, K1_COLORING_MAX_ITERATIONS};
use crate::error::ModularityError;
use crate::graph::{Graph, SeedProperty};
use crate::modularity::ModularityManager;
use crate::progress::{EmptyProgressTracker, ProgressTracker};
use crate::termination::{RunningFlag, TerminationFlag};

pub mod init;
pub mod result;
pub mod seeding;
pub mod task;

pub use result::{ModularityOptimizationOutcome, ModularityOptimizationResult};
pub use seeding::SeedMapping;

use seeding::init_seeding;
use task::ColorRound;

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationPhase {
    Uninitialized,
    Colored,
    Seeded,
    Initialized,
    Optimizing { iteration: u32, color_index: usize },
    Converged,
    IterationLimitReached,
    Cancelled,
}

/// Parallel local moving of nodes between communities, one color class at a time.
///
/// Nodes of one color are never adjacent, so all of them can move at once while reading
/// the communities of the previous round. Moves are written to `next_communities`, once every
/// worker of the round joined they are folded into `community_weight_updates` in node order
/// and each community weight receives a single update.
pub struct ModularityOptimization<'g, G: Graph> {
    graph: &'g G,
    config: ModularityOptimizationConfig,
    seed_property: Option<&'g dyn SeedProperty>,
    coloring: Box<dyn Coloring<G> + 'g>,
    termination_flag: Arc<dyn TerminationFlag>,
    progress_tracker: Box<dyn ProgressTracker + 'g>,
    executor: Executor,
    modularity_manager: ModularityManager<'g, G>,

    phase: OptimizationPhase,
    color_array: Option<ColorArray>,
    seed_mapping: Option<SeedMapping>,
    current_communities: Vec<AtomicU64>,
    next_communities: Vec<AtomicU64>,
    cumulative_node_weights: Vec<f64>,
    community_weight_updates: Vec<f64>,
    total_node_weight: f64,
    modularity: f64,
    iteration_counter: u32,
    did_converge: bool,
}

impl<'g, G: Graph> ModularityOptimization<'g, G> {
    pub fn new(
        graph: &'g G,
        config: ModularityOptimizationConfig,
        seed_property: Option<&'g dyn SeedProperty>,
    ) -> Result<Self> {
        config.validate()?;
        let node_count = graph.node_count();
        if let Some(seed_property) = seed_property {
            if seed_property.size() != node_count {
                return Err(ModularityError::NodeCountMismatch {
                    expected: node_count,
                    found: seed_property.size(),
                }.into());
            }
        }
        let executor = Executor::new(config.concurrency, config.min_batch_size)?;

        Ok(Self {
            graph,
            seed_property,
            coloring: Box::new(K1Coloring::new(config.min_batch_size)),
            termination_flag: Arc::new(RunningFlag::always()),
            progress_tracker: Box::new(EmptyProgressTracker),
            executor,
            modularity_manager: ModularityManager::create(graph),
            phase: OptimizationPhase::Uninitialized,
            color_array: None,
            seed_mapping: None,
            current_communities: (0..node_count).map(|_| AtomicU64::new(0)).collect(),
            next_communities: (0..node_count).map(|_| AtomicU64::new(0)).collect(),
            cumulative_node_weights: vec![0.0; node_count as usize],
            community_weight_updates: vec![0.0; node_count as usize],
            total_node_weight: 0.0,
            modularity: -1.0,
            iteration_counter: 0,
            did_converge: false,
            config,
        })
    }

    pub fn with_coloring<C: Coloring<G> + 'g>(mut self, coloring: C) -> Self {
        self.coloring = Box::new(coloring);
        self
    }

    pub fn with_termination_flag(mut self, termination_flag: Arc<dyn TerminationFlag>) -> Self {
        self.termination_flag = termination_flag;
        self
    }

    pub fn with_progress_tracker<P: ProgressTracker + 'g>(mut self, progress_tracker: P) -> Self {
        self.progress_tracker = Box::new(progress_tracker);
        self
    }

    pub fn phase(&self) -> OptimizationPhase {
        self.phase
    }

    fn enter_phase(&mut self, phase: OptimizationPhase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub fn compute(mut self) -> Result<ModularityOptimizationOutcome> {
        info!(
            "Modularity optimization over {} nodes, concurrency {}, at most {} iterations",
            self.graph.node_count(),
            self.config.concurrency,
            self.config.max_iterations
        );
        self.progress_tracker.begin_sub_task("ModularityOptimization");

        self.progress_tracker.begin_sub_task("initialization");
        self.compute_coloring()?;
        if !self.termination_flag.is_running()? {
            return Ok(self.cancel());
        }
        self.init_seeding()?;
        self.init_weights();
        self.progress_tracker.end_sub_task("initialization");

        self.progress_tracker.begin_sub_task("compute modularity");
        let number_of_colors = self.color_array.as_ref().map_or(0, ColorArray::number_of_colors);
        while self.iteration_counter < self.config.max_iterations {
            self.progress_tracker.begin_sub_task("iteration");
            let mut moved = 0;
            for color_index in 0..number_of_colors {
                self.enter_phase(OptimizationPhase::Optimizing { iteration: self.iteration_counter, color_index });
                if !self.termination_flag.is_running()? {
                    return Ok(self.cancel());
                }
                moved += self.optimize_color(color_index);
            }
            let improved = self.update_modularity();
            self.progress_tracker.end_sub_task("iteration");
            self.iteration_counter += 1;
            info!(
                "Iteration {} moved {} nodes, modularity {:.6}",
                self.iteration_counter, moved, self.modularity
            );
            if !improved {
                self.did_converge = true;
                break;
            }
        }
        // The first iteration always improves, a single one is a complete run.
        if self.config.max_iterations == 1 {
            self.did_converge = true;
        }
        self.progress_tracker.end_sub_task("compute modularity");
        self.progress_tracker.end_sub_task("ModularityOptimization");

        Ok(self.finish())
    }

    fn compute_coloring(&mut self) -> Result<()> {
        self.progress_tracker.begin_sub_task("coloring");
        let coloring = self.coloring.color(self.graph, self.executor.concurrency(), K1_COLORING_MAX_ITERATIONS)?;
        let color_array = ColorArray::create(&coloring);
        info!("Colored {} nodes with {} colors", self.graph.node_count(), color_array.number_of_colors());
        self.color_array = Some(color_array);
        self.enter_phase(OptimizationPhase::Colored);
        self.progress_tracker.end_sub_task("coloring");
        Ok(())
    }

    fn init_seeding(&mut self) -> Result<()> {
        if let Some(seed_property) = self.seed_property {
            let seed_mapping = init_seeding(seed_property, &self.current_communities)?;
            debug!("Seeded {} communities", seed_mapping.len());
            self.seed_mapping = Some(seed_mapping);
        }
        self.enter_phase(OptimizationPhase::Seeded);
        Ok(())
    }

    fn init_weights(&mut self) {
        let total_node_weight = init::init_weights(
            &self.executor,
            self.graph,
            &self.current_communities,
            &self.modularity_manager,
            &mut self.cumulative_node_weights,
            self.seed_mapping.is_some(),
        );
        self.total_node_weight = total_node_weight;
        self.modularity_manager.set_total_weight(total_node_weight);

        let current = &self.current_communities;
        let next = &self.next_communities;
        self.executor.for_each(self.graph.node_count(), |node_id| {
            next[node_id as usize].store(current[node_id as usize].load(Ordering::Relaxed), Ordering::Relaxed);
        });
        self.enter_phase(OptimizationPhase::Initialized);
    }

    fn optimize_color(&mut self, color_index: usize) -> u64 {
        let nodes = match &self.color_array {
            Some(color_array) => color_array.nodes_of_color(color_index),
            None => return 0,
        };

        let round = ColorRound {
            current: &self.current_communities,
            next: &self.next_communities,
            cumulative_node_weights: &self.cumulative_node_weights,
            manager: &self.modularity_manager,
            total_node_weight: self.total_node_weight,
        };
        let graph = self.graph;
        let moves = self.executor.run_partitioned(nodes.len() as u64, |partition| {
            let graph = graph.concurrent_copy();
            round.optimize_nodes(&graph, &nodes[partition.start as usize..partition.end() as usize])
        }).concat();

        // Every worker joined, the moves of this color become the current state.
        std::mem::swap(&mut self.current_communities, &mut self.next_communities);
        let current = &self.current_communities;
        let next = &self.next_communities;
        self.executor.for_each(nodes.len() as u64, |position| {
            let node_id = nodes[position as usize] as usize;
            next[node_id].store(current[node_id].load(Ordering::Relaxed), Ordering::Relaxed);
        });

        // Partitions come back in order, the deltas add up in node order for any split.
        for node_move in &moves {
            node_move.record(&mut self.community_weight_updates);
        }
        let manager = &self.modularity_manager;
        self.executor.run_on_chunks(&mut self.community_weight_updates, |partition, deltas| {
            for (community_id, delta) in partition.iter().zip(deltas.iter_mut()) {
                if *delta != 0.0 {
                    manager.community_weight_update(community_id, *delta);
                    *delta = 0.0;
                }
            }
        });
        moves.len() as u64
    }

    fn update_modularity(&mut self) -> bool {
        let old_modularity = self.modularity;
        self.modularity = self.calculate_modularity();
        self.iteration_counter == 0
            || (self.modularity > old_modularity && (self.modularity - old_modularity).abs() > self.config.tolerance)
    }

    fn calculate_modularity(&self) -> f64 {
        self.modularity_manager
            .register_communities(&self.current_communities)
            .calculate_modularity(&self.executor)
    }

    fn release_buffers(&mut self) {
        self.next_communities = Vec::new();
        self.community_weight_updates = Vec::new();
        self.cumulative_node_weights = Vec::new();
        self.color_array = None;
        self.modularity_manager.release();
    }

    fn cancel(mut self) -> ModularityOptimizationOutcome {
        info!("Modularity optimization cancelled in phase {:?}", self.phase);
        self.enter_phase(OptimizationPhase::Cancelled);
        self.release_buffers();
        self.current_communities = Vec::new();
        self.seed_mapping = None;
        ModularityOptimizationOutcome::Cancelled
    }

    fn finish(mut self) -> ModularityOptimizationOutcome {
        self.enter_phase(if self.did_converge {
            OptimizationPhase::Converged
        } else {
            OptimizationPhase::IterationLimitReached
        });
        self.release_buffers();
        let communities = std::mem::take(&mut self.current_communities)
            .into_iter()
            .map(AtomicU64::into_inner)
            .collect();
        let external_ids = self.seed_mapping.take().map(SeedMapping::into_external_ids);
        let result = ModularityOptimizationResult::new(
            communities,
            external_ids,
            self.modularity,
            self.iteration_counter,
            self.did_converge,
        );
        info!(
            "Modularity optimization finished after {} iterations, modularity {:.6}, {} communities",
            result.iterations(),
            result.modularity(),
            result.community_count()
        );
        match self.phase {
            OptimizationPhase::Converged => ModularityOptimizationOutcome::Converged(result),
            _ => ModularityOptimizationOutcome::IterationLimitReached(result),
        }
    }
}
