//! Wave scheduler for dependency-ordered execution.
//!
//! The scheduler tracks which tasks remain and which have settled, and
//! hands out waves: every remaining task whose dependencies have all
//! settled. A wave is executed in chunks no wider than the concurrency
//! limit. Success or failure both count as settled.

use crate::clog_debug;
use crate::core::dag::TaskGraph;
use crate::core::task::{Priority, Task, TaskId};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Drives a [`TaskGraph`] wave by wave.
///
/// # Example
///
/// ```ignore
/// let graph = TaskGraph::build(&tasks)?;
/// graph.validate_acyclic()?;
/// let mut scheduler = WaveScheduler::new(&graph, &tasks);
/// while let Some(wave) = scheduler.next_wave()? {
///     for chunk in chunks(&wave, 3) {
///         // run chunk concurrently
///     }
///     scheduler.settle(&wave);
/// }
/// ```
pub struct WaveScheduler<'g> {
    graph: &'g TaskGraph,
    priorities: HashMap<TaskId, Priority>,
    remaining: HashSet<TaskId>,
    settled: HashSet<TaskId>,
    wave: usize,
}

impl<'g> WaveScheduler<'g> {
    /// Schedule every task in `graph`. `tasks` supplies priorities.
    pub fn new(graph: &'g TaskGraph, tasks: &[Task]) -> Self {
        Self {
            graph,
            priorities: tasks.iter().map(|t| (t.id.clone(), t.priority)).collect(),
            remaining: graph.task_ids().iter().cloned().collect(),
            settled: HashSet::new(),
            wave: 0,
        }
    }

    /// Compute the next wave, highest priority first.
    ///
    /// Returns `Ok(None)` once every task has settled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deadlock`] if tasks remain but none is ready.
    pub fn next_wave(&mut self) -> Result<Option<Vec<TaskId>>> {
        if self.remaining.is_empty() {
            return Ok(None);
        }

        let mut ready = self.graph.ready_tasks(&self.remaining, &self.settled);
        if ready.is_empty() {
            let mut remaining: Vec<TaskId> = self.remaining.iter().cloned().collect();
            remaining.sort();
            return Err(Error::Deadlock { remaining });
        }

        // Stable sort keeps submission order within a priority.
        ready.sort_by(|a, b| self.priority(b).cmp(&self.priority(a)));
        self.wave += 1;
        clog_debug!(
            "[scheduler] wave {} ready: {} task(s), {} remaining",
            self.wave,
            ready.len(),
            self.remaining.len()
        );
        Ok(Some(ready))
    }

    /// Mark tasks as settled so their dependents become ready.
    pub fn settle(&mut self, ids: &[TaskId]) {
        for id in ids {
            if self.remaining.remove(id) {
                self.settled.insert(id.clone());
            }
        }
    }

    /// 1-based number of the most recently issued wave.
    pub fn current_wave(&self) -> usize {
        self.wave
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_finished(&self) -> bool {
        self.remaining.is_empty()
    }

    fn priority(&self, id: &TaskId) -> Priority {
        self.priorities.get(id).copied().unwrap_or_default()
    }
}

/// Split a wave into sequential chunks of at most `size` tasks.
///
/// A `size` of zero is treated as one.
pub fn chunks(wave: &[TaskId], size: usize) -> Vec<Vec<TaskId>> {
    wave.chunks(size.max(1)).map(<[TaskId]>::to_vec).collect()
}

/// Compute the full wave plan for `tasks` without executing anything.
///
/// # Errors
///
/// Returns structural errors for duplicate ids, unknown dependencies or
/// cycles.
pub fn plan_waves(tasks: &[Task]) -> Result<Vec<Vec<TaskId>>> {
    let graph = TaskGraph::build(tasks)?;
    graph.validate_acyclic()?;

    let mut scheduler = WaveScheduler::new(&graph, tasks);
    let mut waves = Vec::new();
    while let Some(wave) = scheduler.next_wave()? {
        scheduler.settle(&wave);
        waves.push(wave);
    }
    Ok(waves)
}
