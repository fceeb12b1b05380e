//! Dependency ordering for decomposed tasks.
//!
//! Only planner-decomposed tasks carry explicit ordering; label-driven
//! backlogs skip this module entirely.

use armada_core::OrchestrateError;
use std::collections::{HashMap, HashSet};

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Task id
    pub id: u64,
    /// Ids this task waits on
    pub depends_on: Vec<u64>,
    /// Ids waiting on this task (reverse edges)
    pub blocks: Vec<u64>,
}

/// Directed graph of depends-on edges between tasks.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<u64, DependencyNode>,
    // Insertion order, for deterministic iteration
    order: Vec<u64>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task and append reverse edges on each dependency.
    ///
    /// Dependencies referenced before their own `add_task` call get a
    /// placeholder node, completed when they are added.
    pub fn add_task(&mut self, id: u64, depends_on: Vec<u64>) {
        for &dep in &depends_on {
            self.node_mut(dep).blocks.push(id);
        }
        self.node_mut(id).depends_on = depends_on;
    }

    fn node_mut(&mut self, id: u64) -> &mut DependencyNode {
        if !self.nodes.contains_key(&id) {
            self.order.push(id);
        }
        self.nodes.entry(id).or_insert_with(|| DependencyNode {
            id,
            depends_on: Vec::new(),
            blocks: Vec::new(),
        })
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn get(&self, id: u64) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    /// Tasks not yet completed whose full dependency set is completed.
    pub fn ready_tasks(&self, completed: &HashSet<u64>) -> Vec<u64> {
        self.order
            .iter()
            .copied()
            .filter(|id| !completed.contains(id))
            .filter(|id| {
                self.nodes[id]
                    .depends_on
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .collect()
    }

    /// Tasks with a non-empty dependency list, for diagnostics.
    pub fn blocked_tasks(&self) -> Vec<&DependencyNode> {
        self.order
            .iter()
            .map(|id| &self.nodes[id])
            .filter(|n| !n.depends_on.is_empty())
            .collect()
    }

    /// Whether the graph contains at least one cycle.
    ///
    /// A task depending on itself counts.
    pub fn has_cycles(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Depth-first search with a recursion-stack color set.
    fn find_cycle(&self) -> Option<Vec<u64>> {
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        let mut stack = Vec::new();

        for &id in &self.order {
            if !visited.contains(&id) {
                if self.visit(id, &mut visited, &mut in_stack, &mut stack) {
                    return Some(stack);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        id: u64,
        visited: &mut HashSet<u64>,
        in_stack: &mut HashSet<u64>,
        stack: &mut Vec<u64>,
    ) -> bool {
        visited.insert(id);
        in_stack.insert(id);
        stack.push(id);

        if let Some(node) = self.nodes.get(&id) {
            for &dep in &node.depends_on {
                if in_stack.contains(&dep) {
                    return true;
                }
                if !visited.contains(&dep) && self.visit(dep, visited, in_stack, stack) {
                    return true;
                }
            }
        }

        in_stack.remove(&id);
        stack.pop();
        false
    }

    /// Topological execution order: every dependency strictly before its
    /// dependents.
    ///
    /// Fails with [`OrchestrateError::DependencyCycle`] on a cyclic graph;
    /// a cyclic graph is never serialized.
    pub fn execution_order(&self) -> Result<Vec<u64>, OrchestrateError> {
        if let Some(cycle) = self.find_cycle() {
            return Err(OrchestrateError::DependencyCycle(cycle));
        }

        let mut sorted = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        for &id in &self.order {
            self.post_order(id, &mut visited, &mut sorted);
        }
        Ok(sorted)
    }

    fn post_order(&self, id: u64, visited: &mut HashSet<u64>, sorted: &mut Vec<u64>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(node) = self.nodes.get(&id) {
            for &dep in &node.depends_on {
                self.post_order(dep, visited, sorted);
            }
        }
        sorted.push(id);
    }
}
