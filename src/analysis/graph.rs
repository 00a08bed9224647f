//! Task dependency graph with Kahn's algorithm for layering
//!
//! Provides cycle checks, dependency levels and critical path length for a batch of tasks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::models::TaskId;

/// Dependency graph between the tasks of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Maps task ID to the tasks it depends on
    pub depends_on: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// Maps task ID to the tasks blocked by it
    pub blocks: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task without any edges
    pub fn add_node(&mut self, id: TaskId) {
        self.depends_on.entry(id).or_default();
        self.blocks.entry(id).or_default();
    }

    /// Add a dependency: `task` depends on `depends_on_id`
    pub fn add_dependency(&mut self, task: TaskId, depends_on_id: TaskId) -> Result<(), String> {
        if task == depends_on_id {
            return Err(format!("Task '{}' cannot depend on itself", task));
        }

        if self.would_create_cycle(task, depends_on_id) {
            return Err(format!(
                "Dependency {} -> {} would create a cycle",
                task, depends_on_id
            ));
        }

        self.add_node(task);
        self.add_node(depends_on_id);
        self.depends_on.entry(task).or_default().insert(depends_on_id);
        self.blocks.entry(depends_on_id).or_default().insert(task);

        Ok(())
    }

    /// Get all tasks that `task` depends on
    pub fn get_dependencies(&self, task: TaskId) -> Vec<TaskId> {
        self.depends_on
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get all tasks blocked by `task`
    pub fn get_blocked_by(&self, task: TaskId) -> Vec<TaskId> {
        self.blocks
            .get(&task)
            .map(|blocked| blocked.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the task has neither dependencies nor dependents
    pub fn is_independent(&self, task: TaskId) -> bool {
        self.get_dependencies(task).is_empty() && self.get_blocked_by(task).is_empty()
    }

    /// Number of dependency edges
    pub fn edge_count(&self) -> usize {
        self.depends_on.values().map(|deps| deps.len()).sum()
    }

    /// Check if adding `from` depends-on `to` would create a cycle
    pub fn would_create_cycle(&self, from: TaskId, to: TaskId) -> bool {
        // A path from `to` back to `from` closes the loop
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        queue.push_back(to);

        while let Some(current) = queue.pop_front() {
            if current == from {
                return true;
            }

            if !visited.insert(current) {
                continue;
            }

            if let Some(deps) = self.depends_on.get(&current) {
                queue.extend(deps.iter().copied());
            }
        }

        false
    }

    /// Dependency layers using Kahn's algorithm: every task in a layer only
    /// depends on tasks in earlier layers. Tasks within a layer are in ID order.
    pub fn levels(&self) -> Vec<Vec<TaskId>> {
        let mut in_degree: HashMap<TaskId, usize> = self
            .depends_on
            .iter()
            .map(|(node, deps)| (*node, deps.len()))
            .collect();

        let mut current: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();
        current.sort();

        let mut levels = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for node in &current {
                if let Some(blocked) = self.blocks.get(node) {
                    for blocked_node in blocked {
                        if let Some(degree) = in_degree.get_mut(blocked_node) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                next.push(*blocked_node);
                            }
                        }
                    }
                }
            }
            next.sort();
            levels.push(std::mem::replace(&mut current, next));
        }

        levels
    }

    /// Longest dependency chain counted in tasks (0 for an empty graph)
    pub fn critical_path_length(&self) -> usize {
        let mut memo: HashMap<TaskId, usize> = HashMap::new();

        self.depends_on
            .keys()
            .map(|node| self.node_depth(*node, &mut memo) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Calculate the depth of a single node (memoized)
    fn node_depth(&self, node: TaskId, memo: &mut HashMap<TaskId, usize>) -> usize {
        if let Some(&depth) = memo.get(&node) {
            return depth;
        }

        let depth = match self.depends_on.get(&node) {
            Some(deps) if !deps.is_empty() => {
                1 + deps
                    .iter()
                    .map(|d| self.node_depth(*d, memo))
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        };

        memo.insert(node, depth);
        depth
    }
}
