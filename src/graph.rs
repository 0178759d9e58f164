//! Precedence graph over tasks.
//!
//! A precedence relation with a directed cycle can never be satisfied, so it
//! is rejected here before any model is built.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::types::TaskId;

pub struct PrecedenceGraph {
    graph: DiGraphMap<TaskId, ()>,
}

impl PrecedenceGraph {
    pub fn new(tasks: impl IntoIterator<Item = TaskId>, edges: &[(TaskId, TaskId)]) -> Self {
        let mut graph = DiGraphMap::new();
        for task in tasks {
            graph.add_node(task);
        }
        for &(from, to) in edges {
            graph.add_edge(from, to, ());
        }
        Self { graph }
    }

    pub fn from_edges(edges: &[(TaskId, TaskId)]) -> Self {
        Self::new(std::iter::empty(), edges)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.graph.contains_node(task)
    }

    /// Every task reachable from any of `starts`, the starts included.
    pub fn descendants(&self, starts: &BTreeSet<TaskId>) -> BTreeSet<TaskId> {
        let mut reached = BTreeSet::new();
        let mut dfs = Dfs::empty(&self.graph);
        for &start in starts.iter().filter(|&&t| self.contains(t)) {
            dfs.move_to(start);
            while let Some(task) = dfs.next(&self.graph) {
                reached.insert(task);
            }
        }
        reached
    }

    /// Every task from which one of `targets` is reachable, the targets included.
    pub fn ancestors(&self, targets: &BTreeSet<TaskId>) -> BTreeSet<TaskId> {
        let reversed = Reversed(&self.graph);
        let mut reached = BTreeSet::new();
        let mut dfs = Dfs::empty(reversed);
        for &target in targets.iter().filter(|&&t| self.contains(t)) {
            dfs.move_to(target);
            while let Some(task) = dfs.next(reversed) {
                reached.insert(task);
            }
        }
        reached
    }

    /// Precedence edges with both endpoints in `tasks`, in sorted order.
    pub fn edges_within(&self, tasks: &BTreeSet<TaskId>) -> Vec<(TaskId, TaskId)> {
        let mut edges: Vec<_> = self
            .graph
            .all_edges()
            .filter(|(from, to, _)| tasks.contains(from) && tasks.contains(to))
            .map(|(from, to, _)| (from, to))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// All directed cycles' strongly connected components, one witness cycle each.
    pub fn cycles(&self) -> Vec<Vec<TaskId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| self.witness_cycle(&component))
            .collect()
    }

    /// Walks one concrete cycle inside a strongly connected component.
    fn witness_cycle(&self, component: &[TaskId]) -> Vec<TaskId> {
        let members: BTreeSet<TaskId> = component.iter().copied().collect();
        let Some(&start) = members.iter().next() else {
            return Vec::new();
        };
        if self.graph.contains_edge(start, start) {
            return vec![start];
        }

        // Shortest path from start back to start, staying inside the component.
        let mut parent: HashMap<TaskId, TaskId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(task) = queue.pop_front() {
            for next in self.graph.neighbors(task) {
                if !members.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut cycle = vec![task];
                    let mut current = task;
                    while current != start {
                        current = parent[&current];
                        cycle.push(current);
                    }
                    cycle.reverse();
                    return cycle;
                }
                if !parent.contains_key(&next) {
                    parent.insert(next, task);
                    queue.push_back(next);
                }
            }
        }
        component.to_vec()
    }
}

/// Rejects precedence relations that contain any directed cycle.
pub fn validate(edges: &[(TaskId, TaskId)]) -> Result<()> {
    let graph = PrecedenceGraph::from_edges(edges);
    let cycles = graph.cycles();
    for cycle in &cycles {
        error!(?cycle, "precedence cycle found");
    }
    match cycles.into_iter().next() {
        Some(cycle) => Err(Error::PrecedenceCycle { cycle }),
        None => {
            debug!(edges = edges.len(), "precedence relations are acyclic");
            Ok(())
        }
    }
}
