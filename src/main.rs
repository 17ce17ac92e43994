use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use color_modularity::config::DEFAULT_BATCH_SIZE;
use color_modularity::graph::generator::planted_partition;
use color_modularity::graph::write_graph_file;
use color_modularity::logger::init_logger;
use color_modularity::optimization::seeding::synthetic_label;
use color_modularity::{
    CsrGraph, Executor, Graph, LoggingProgressTracker, ModularityCalculator, ModularityError, ModularityOptimization,
    ModularityOptimizationConfig, RunningFlag, SeedProperty, TerminationFlag,
};

#[derive(Parser)]
#[command(name = "color_modularity")]
#[command(version)]
#[command(about = "Community detection by parallel, coloring based modularity optimization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect communities of a graph file
    Optimize(OptimizeArgs),

    /// Score the seed labels of a graph file
    Score(ScoreArgs),

    /// Write a planted partition graph file
    Generate(GenerateArgs),
}

#[derive(Args)]
struct OptimizeArgs {
    /// Input `.graph` file
    #[arg(short, long)]
    graph: PathBuf,

    /// Keep relationships directed instead of storing both directions
    #[arg(long)]
    directed: bool,

    /// Start from the seed labels of the graph file
    #[arg(long)]
    seeded: bool,

    /// YAML config, flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_iterations: Option<u32>,

    #[arg(long)]
    tolerance: Option<f64>,

    /// Worker threads, defaults to the number of cpus
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    min_batch_size: Option<usize>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the result as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ScoreArgs {
    /// Input `.graph` file with seed labels
    #[arg(short, long)]
    graph: PathBuf,

    #[arg(long)]
    directed: bool,

    #[arg(long)]
    concurrency: Option<usize>,

    /// Write the per community scores as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long, default_value_t = 4)]
    communities: u64,

    /// Nodes per community
    #[arg(long, default_value_t = 32)]
    size: u64,

    #[arg(long, default_value_t = 0.3)]
    p_in: f64,

    #[arg(long, default_value_t = 0.01)]
    p_out: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Optimize(args) => optimize(args),
        Commands::Score(args) => score(args),
        Commands::Generate(args) => generate(args),
    }
}

fn optimize_config(args: &OptimizeArgs) -> Result<ModularityOptimizationConfig> {
    let mut config = match &args.config {
        Some(path) => ModularityOptimizationConfig::from_yaml_file(path)?,
        None => ModularityOptimizationConfig {
            concurrency: num_cpus::get(),
            ..Default::default()
        },
    };
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(min_batch_size) = args.min_batch_size {
        config.min_batch_size = min_batch_size;
    }
    config.validate()?;
    Ok(config)
}

fn optimize(args: OptimizeArgs) -> Result<()> {
    let config = optimize_config(&args)?;
    let (graph, seeds) = CsrGraph::from_graph_file(&args.graph, args.directed)?;
    info!("Loaded {} nodes, {} relationships", graph.node_count(), graph.relationship_count());
    let seeds = if args.seeded {
        Some(seeds.context("The graph file carries no seed labels")?)
    } else {
        None
    };

    let termination_flag: Arc<dyn TerminationFlag> = Arc::new(match args.timeout_secs {
        Some(seconds) => RunningFlag::with_timeout(Duration::from_secs(seconds)),
        None => RunningFlag::always(),
    });
    let seed_property = seeds.as_ref().map(|seeds| seeds as &dyn SeedProperty);
    let outcome = ModularityOptimization::new(&graph, config, seed_property)?
        .with_termination_flag(termination_flag)
        .with_progress_tracker(LoggingProgressTracker::new())
        .compute()?;
    let result = match outcome.into_result() {
        Some(result) => result,
        None => bail!("Modularity optimization was cancelled"),
    };

    println!("modularity: {:.6}", result.modularity());
    println!("iterations: {}", result.iterations());
    println!("converged: {}", result.did_converge());
    println!("communities: {}", result.community_count());

    if let Some(output) = &args.output {
        let json = serde_json::json!({
            "modularity": result.modularity(),
            "iterations": result.iterations(),
            "did_converge": result.did_converge(),
            "communities": result.communities().collect::<Vec<_>>(),
        });
        std::fs::write(output, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Failed to write result to {}", output.display()))?;
    }
    Ok(())
}

fn score(args: ScoreArgs) -> Result<()> {
    let (graph, seeds) = CsrGraph::from_graph_file(&args.graph, args.directed)?;
    let seeds = seeds.context("The graph file carries no seed labels to score")?;
    let executor = Executor::new(args.concurrency.unwrap_or_else(num_cpus::get), DEFAULT_BATCH_SIZE)?;

    // Vertices without a label score as singletons.
    let max_seed = seeds.max_long_property_value();
    let labels = seeds.iter()
        .enumerate()
        .map(|(node_id, seed)| match *seed {
            seed if seed >= 0 => Ok(seed as u64),
            _ => synthetic_label(node_id as u64, max_seed)
                .ok_or_else(|| anyhow::Error::from(ModularityError::SeedLabelOverflow(node_id as u64))),
        })
        .collect::<Result<Vec<_>>>()?;
    let result = ModularityCalculator::new(&graph, |node_id| labels[node_id as usize]).compute(&executor);

    for community in &result.community_modularities {
        println!("{}\t{:.6}", community.community_id, community.modularity);
    }
    println!("total\t{:.6}", result.total_modularity);

    if let Some(output) = &args.output {
        std::fs::write(output, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("Failed to write scores to {}", output.display()))?;
    }
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    if args.size == 0 {
        bail!("Communities need at least one node");
    }
    let planted = planted_partition(args.communities, args.size, args.p_in, args.p_out, args.seed);
    write_graph_file(&args.output, planted.graph.node_count(), &planted.edges, Some(planted.labels.as_slice()))?;
    info!(
        "Wrote {} nodes and {} edges to {}",
        planted.graph.node_count(),
        planted.edges.len(),
        args.output.display()
    );
    Ok(())
}
