use std::time::Instant;

use log::info;

/// Receives begin/end notifications around the phases of an algorithm.
/// Correctness never depends on it.
pub trait ProgressTracker: Send {
    fn begin_sub_task(&mut self, name: &str);

    fn end_sub_task(&mut self, name: &str);
}

#[derive(Debug, Default)]
pub struct EmptyProgressTracker;

impl ProgressTracker for EmptyProgressTracker {
    fn begin_sub_task(&mut self, _name: &str) {}

    fn end_sub_task(&mut self, _name: &str) {}
}

/// Logs every sub task with the time it took.
#[derive(Debug, Default)]
pub struct LoggingProgressTracker {
    open_tasks: Vec<(String, Instant)>,
}

impl LoggingProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.open_tasks.len()
    }
}

impl ProgressTracker for LoggingProgressTracker {
    fn begin_sub_task(&mut self, name: &str) {
        info!("{}{} :: Start", "  ".repeat(self.open_tasks.len()), name);
        self.open_tasks.push((name.to_owned(), Instant::now()));
    }

    fn end_sub_task(&mut self, name: &str) {
        // Tolerate unbalanced calls, close the innermost task with this name.
        match self.open_tasks.iter().rposition(|(open, _)| open == name) {
            Some(position) => {
                let (_, started) = self.open_tasks.remove(position);
                info!(
                    "{}{} :: Finished in {:.3?}",
                    "  ".repeat(self.open_tasks.len()),
                    name,
                    started.elapsed()
                );
            }
            None => info!("{} :: Finished", name),
        }
    }
}
