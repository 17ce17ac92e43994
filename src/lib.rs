pub mod coloring;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod graph;
pub mod logger;
pub mod modularity;
pub mod optimization;
pub mod progress;
pub mod termination;
pub mod util;

pub use coloring::{ColorArray, ColorId, Coloring, K1Coloring, NodeColoring};
pub use concurrency::{Executor, Partition};
pub use config::ModularityOptimizationConfig;
pub use error::ModularityError;
pub use graph::{CommunityId, CsrGraph, Graph, NodeId, SeedProperty};
pub use modularity::{ModularityCalculator, ModularityManager, ModularityResult};
pub use optimization::{
    ModularityOptimization, ModularityOptimizationOutcome, ModularityOptimizationResult, OptimizationPhase,
};
pub use progress::{EmptyProgressTracker, LoggingProgressTracker, ProgressTracker};
pub use termination::{RunningFlag, TerminationFlag};
