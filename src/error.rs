use derive_more::Display;

/// Errors raised by the modularity optimization itself.
/// Collaborator failures travel untouched inside `anyhow::Error`.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ModularityError {
    #[display(fmt = "Need to run at least one iteration, but got {}", _0)]
    InvalidMaxIterations(u32),
    #[display(fmt = "Concurrency must be at least 1, but got {}", _0)]
    InvalidConcurrency(usize),
    #[display(fmt = "Minimum batch size must be at least 1, but got {}", _0)]
    InvalidBatchSize(usize),
    #[display(fmt = "Tolerance must be a finite non-negative number, but got {}", _0)]
    InvalidTolerance(f64),
    #[display(fmt = "Expected {} seed values, but got {}", expected, found)]
    NodeCountMismatch { expected: u64, found: u64 },
    #[display(fmt = "No community id left for the unseeded node {}", _0)]
    SeedLabelOverflow(u64),
    #[display(fmt = "Malformed graph file at line {}: {}", line, reason)]
    MalformedGraphFile { line: usize, reason: String },
}

impl std::error::Error for ModularityError {}
