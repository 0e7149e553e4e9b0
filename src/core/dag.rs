//! Task dependency graph.
//!
//! `TaskGraph` is built once per run from the submitted task set. It keeps
//! the declared dependency lists (task id -> dependency ids) alongside a
//! petgraph `DiGraph` whose edges point from a dependency to its dependent.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// DFS marking used by cycle validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// The task dependency graph for one run.
pub struct TaskGraph {
    /// Edges run dependency -> dependent.
    graph: DiGraph<TaskId, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
    /// Declared dependencies per task, in declaration order.
    dependencies: HashMap<TaskId, Vec<TaskId>>,
    /// Task ids in submission order.
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// Build the graph from a task set.
    ///
    /// Cycles are not rejected here; call [`TaskGraph::validate_acyclic`]
    /// before scheduling.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Two tasks share an id
    /// - A task depends on an id that was never submitted
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut task_index = HashMap::with_capacity(tasks.len());
        let mut dependencies = HashMap::with_capacity(tasks.len());
        let mut order = Vec::with_capacity(tasks.len());

        for task in tasks {
            if task_index.contains_key(&task.id) {
                return Err(Error::DuplicateTask(task.id.clone()));
            }
            let index = graph.add_node(task.id.clone());
            task_index.insert(task.id.clone(), index);
            dependencies.insert(task.id.clone(), task.dependencies.clone());
            order.push(task.id.clone());
        }

        for task in tasks {
            let to = task_index[&task.id];
            for dep in &task.dependencies {
                let from = task_index.get(dep).ok_or_else(|| Error::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        Ok(Self {
            graph,
            task_index,
            dependencies,
            order,
        })
    }

    /// Reject the graph if any dependency chain loops back on itself.
    ///
    /// Depth-first traversal with an explicit stack, so very deep chains
    /// cannot exhaust the call stack. A dependency that is still on the
    /// in-progress stack is a back-edge, i.e. a cycle.
    ///
    /// # Errors
    /// Returns `Error::CircularDependency` with the offending path, e.g.
    /// `x -> y -> x` when `x` depends on `y` and `y` depends on `x`.
    pub fn validate_acyclic(&self) -> Result<()> {
        let mut state: HashMap<&TaskId, Visit> = HashMap::with_capacity(self.order.len());

        for root in &self.order {
            if state.contains_key(root) {
                continue;
            }

            state.insert(root, Visit::InProgress);
            let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];

            loop {
                let (node, next) = match stack.last_mut() {
                    Some(top) => {
                        let current = (top.0, top.1);
                        top.1 += 1;
                        current
                    }
                    None => break,
                };

                let deps = self.dependencies(node);
                if next >= deps.len() {
                    state.insert(node, Visit::Done);
                    stack.pop();
                    continue;
                }

                let dep = &deps[next];
                match state.get(dep) {
                    Some(Visit::Done) => {}
                    Some(Visit::InProgress) => {
                        let start = stack.iter().position(|(id, _)| *id == dep).unwrap_or(0);
                        let mut path: Vec<TaskId> =
                            stack[start..].iter().map(|(id, _)| (*id).clone()).collect();
                        path.push(dep.clone());
                        return Err(Error::CircularDependency { path });
                    }
                    None => {
                        state.insert(dep, Visit::InProgress);
                        stack.push((dep, 0));
                    }
                }
            }
        }

        Ok(())
    }

    /// Declared dependencies of a task (empty for unknown ids).
    pub fn dependencies(&self, id: &TaskId) -> &[TaskId] {
        self.dependencies
            .get(id)
            .map(|deps| deps.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks that directly depend on the given task.
    pub fn dependents(&self, id: &TaskId) -> Vec<&TaskId> {
        match self.task_index.get(id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, petgraph::Direction::Outgoing)
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All transitive dependencies of a task with their distance.
    ///
    /// Direct dependencies have depth 1. Results are ordered nearest first,
    /// and each ancestor appears once at its shortest distance.
    pub fn ancestors(&self, id: &TaskId) -> Vec<(TaskId, usize)> {
        let mut seen: HashSet<&TaskId> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<(&TaskId, usize)> = VecDeque::new();

        for dep in self.dependencies(id) {
            if seen.insert(dep) {
                queue.push_back((dep, 1));
            }
        }

        while let Some((current, depth)) = queue.pop_front() {
            out.push((current.clone(), depth));
            for dep in self.dependencies(current) {
                if dep != id && seen.insert(dep) {
                    queue.push_back((dep, depth + 1));
                }
            }
        }

        out
    }

    /// Tasks in `remaining` whose dependencies have all settled.
    ///
    /// Returned in submission order.
    pub fn ready_tasks(
        &self,
        remaining: &HashSet<TaskId>,
        completed: &HashSet<TaskId>,
    ) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| remaining.contains(*id))
            .filter(|id| {
                self.dependencies(id)
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .cloned()
            .collect()
    }

    /// Get tasks in topological order (dependencies first).
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let id = self
                .graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_else(|| TaskId::from("unknown"));
            Error::CircularDependency {
                path: vec![id.clone(), id],
            }
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index).cloned())
            .collect())
    }

    /// Task ids in submission order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
