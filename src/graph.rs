//! The task dependency graph.
//!
//! Tasks are registered through an explicit [`GraphBuilder`] and validated
//! up front: duplicate names, references to unknown tasks and dependency
//! cycles are all rejected before anything runs. Edges point from a
//! dependency to its dependent, so a topological order of the graph is a
//! valid execution order.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use crate::error::GraphError;
use crate::task::TaskUnit;

#[derive(Debug, Default)]
pub struct GraphBuilder {
    tasks: Vec<TaskUnit>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, task: TaskUnit) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn add_all(mut self, tasks: impl IntoIterator<Item = TaskUnit>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Validate the declarations and assemble the graph.
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in self.tasks {
            let name = task.name;
            let node = graph.add_node(task);

            if index.insert(name, node).is_some() {
                return Err(GraphError::Duplicate(name.to_string()));
            }
        }

        for node in graph.node_indices().collect::<Vec<_>>() {
            for dep in graph[node].deps.clone() {
                let &dep_node = index.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                    task: graph[node].name.to_string(),
                    dep: dep.to_string(),
                })?;

                graph.add_edge(dep_node, node, ());
            }
        }

        // Toposort is run here purely as the cycle check; execution order is
        // recomputed per target with a stable tie-break.
        if let Err(cycle) = toposort(&graph, None) {
            let name = graph[cycle.node_id()].name;
            return Err(GraphError::Cycle(name.to_string()));
        }

        Ok(TaskGraph { graph, index })
    }
}

/// A validated DAG of [`TaskUnit`]s.
#[derive(Debug)]
pub struct TaskGraph {
    pub(crate) graph: DiGraph<TaskUnit, ()>,
    index: HashMap<&'static str, NodeIndex>,
}

impl TaskGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &TaskUnit {
        &self.graph[index]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn resolve(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTarget(name.to_string()))
    }

    /// The target together with all of its transitive dependencies.
    pub(crate) fn closure(
        &self,
        targets: &[&str],
    ) -> Result<HashSet<NodeIndex>, GraphError> {
        let mut nodes = HashSet::new();

        for target in targets {
            let start = self.resolve(target)?;
            let mut dfs = Dfs::new(Reversed(&self.graph), start);

            while let Some(node) = dfs.next(Reversed(&self.graph)) {
                nodes.insert(node);
            }
        }

        Ok(nodes)
    }

    /// Every node reachable from `start` following dependency edges forward,
    /// i.e. `start` and everything that depends on it.
    pub(crate) fn dependents(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        let mut nodes = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, start);

        while let Some(node) = dfs.next(&self.graph) {
            nodes.insert(node);
        }

        nodes
    }

    /// Linear execution order for `target`: a topological sort of its
    /// dependency closure, breaking ties by declaration order.
    pub fn execution_order(&self, target: &str) -> Result<Vec<&'static str>, GraphError> {
        let closure = self.closure(&[target])?;

        let mut pending: HashMap<NodeIndex, usize> = closure
            .iter()
            .map(|&node| {
                let count = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|dep| closure.contains(dep))
                    .count();
                (node, count)
            })
            .collect();

        let mut order = Vec::with_capacity(closure.len());

        while order.len() < closure.len() {
            // NodeIndex order is declaration order, so the smallest ready
            // index is the stable choice.
            let next = pending
                .iter()
                .filter(|&(_, &count)| count == 0)
                .map(|(&node, _)| node)
                .min()
                .expect("validated DAG always has a ready node");

            pending.remove(&next);
            order.push(self.graph[next].name);

            for dependent in self.graph.neighbors_directed(next, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                }
            }
        }

        Ok(order)
    }
}
