use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ModularityError;

pub(crate) const READ_BUFFER_SIZE :usize = 8 * 1024 * 1024;

/// Iteration cap handed to the coloring collaborator.
pub const K1_COLORING_MAX_ITERATIONS :u32 = 5;

pub const DEFAULT_MAX_ITERATIONS :u32 = 10;

pub const DEFAULT_TOLERANCE :f64 = 0.0001;

pub const DEFAULT_CONCURRENCY :usize = 4;

pub const DEFAULT_BATCH_SIZE :usize = 10_000;

/// Weight reported for relationships stored without one.
pub const DEFAULT_RELATIONSHIP_WEIGHT :f64 = 1.0;

/// Tuning knobs of one modularity optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModularityOptimizationConfig {
    /// Upper bound of optimization iterations, at least one.
    pub max_iterations: u32,
    /// Minimal modularity gain between two iterations to keep going.
    pub tolerance: f64,
    /// Number of worker threads.
    pub concurrency: usize,
    /// Smallest amount of nodes handed to a single partition task.
    pub min_batch_size: usize,
}

impl Default for ModularityOptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            concurrency: DEFAULT_CONCURRENCY,
            min_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ModularityOptimizationConfig {
    /// Parse a config from a YAML document, missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ModularityOptimizationConfig = serde_yaml::from_str(yaml)
            .context("Failed to parse modularity optimization config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 1 {
            return Err(ModularityError::InvalidMaxIterations(self.max_iterations).into());
        }
        if self.concurrency < 1 {
            return Err(ModularityError::InvalidConcurrency(self.concurrency).into());
        }
        if self.min_batch_size < 1 {
            return Err(ModularityError::InvalidBatchSize(self.min_batch_size).into());
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ModularityError::InvalidTolerance(self.tolerance).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_config {
    use std::io::Write;

    use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_TOLERANCE, ModularityOptimizationConfig};
    use crate::error::ModularityError;

    #[test]
    fn test_default_is_valid() {
        let config = ModularityOptimizationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.min_batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_partial_yaml() {
        let config = ModularityOptimizationConfig::from_yaml_str(
            "max_iterations: 3\nconcurrency: 2\n").unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = ModularityOptimizationConfig::from_yaml_str("max_iterations: 0\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ModularityError>(),
            Some(&ModularityError::InvalidMaxIterations(0))
        );
        assert_eq!(err.to_string(), "Need to run at least one iteration, but got 0");
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let config = ModularityOptimizationConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tolerance: 0.5").unwrap();
        writeln!(file, "min_batch_size: 1").unwrap();
        let config = ModularityOptimizationConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.min_batch_size, 1);
    }
}
