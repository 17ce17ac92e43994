use anyhow::{Context, Result};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// A contiguous range of ids handled by one worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: u64,
    pub length: u64,
}

impl Partition {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn iter(&self) -> std::ops::Range<u64> {
        self.start..self.end()
    }
}

/// Size of one batch so that `count` ids spread over `concurrency` tasks,
/// but no task gets fewer than `min_batch_size` ids.
pub fn adjusted_batch_size(count: u64, concurrency: usize, min_batch_size: usize) -> u64 {
    let concurrency = concurrency.max(1) as u64;
    count.div_ceil(concurrency).max(min_batch_size.max(1) as u64)
}

/// Split `[0, count)` into contiguous, non-empty partitions.
pub fn range_partition(concurrency: usize, count: u64, min_batch_size: usize) -> Vec<Partition> {
    let batch_size = adjusted_batch_size(count, concurrency, min_batch_size);
    (0..count)
        .step_by(batch_size as usize)
        .map(|start| Partition::new(start, batch_size.min(count - start)))
        .collect()
}

/// A bounded worker pool running one task per partition.
///
/// Every call blocks the driving thread until all tasks of the call have joined,
/// which is the barrier between two phases.
pub struct Executor {
    pool: ThreadPool,
    concurrency: usize,
    min_batch_size: usize,
}

impl Executor {
    pub fn new(concurrency: usize, min_batch_size: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|index| format!("modularity-worker-{}", index))
            .build()
            .context("Failed to build the worker pool")?;
        Ok(Self {
            pool,
            concurrency: concurrency.max(1),
            min_batch_size: min_batch_size.max(1),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn partitions(&self, count: u64) -> Vec<Partition> {
        range_partition(self.concurrency, count, self.min_batch_size)
    }

    /// Run `task` once per partition of `[0, count)`, results come back in partition order.
    pub fn run_partitioned<T, F>(&self, count: u64, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Partition) -> T + Send + Sync,
    {
        let partitions = self.partitions(count);
        self.pool.install(|| partitions.par_iter().map(|partition| task(*partition)).collect())
    }

    /// Run `task` once per partition of `data`, each task owning its sub-slice exclusively.
    pub fn run_on_chunks<D, T, F>(&self, data: &mut [D], task: F) -> Vec<T>
    where
        D: Send,
        T: Send,
        F: Fn(Partition, &mut [D]) -> T + Send + Sync,
    {
        if data.is_empty() {
            return Vec::new();
        }
        let batch_size = adjusted_batch_size(data.len() as u64, self.concurrency, self.min_batch_size);
        self.pool.install(|| {
            data.par_chunks_mut(batch_size as usize)
                .enumerate()
                .map(|(index, chunk)| {
                    let partition = Partition::new(index as u64 * batch_size, chunk.len() as u64);
                    task(partition, chunk)
                })
                .collect()
        })
    }

    /// Parallel loop over `[0, count)`.
    pub fn for_each<F>(&self, count: u64, action: F)
    where
        F: Fn(u64) + Send + Sync,
    {
        self.pool.install(|| (0..count).into_par_iter().for_each(|index| action(index)));
    }
}
