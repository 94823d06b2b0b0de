//! Deterministic resolution order over an [`IssueGraph`].

use std::collections::{BTreeSet, VecDeque};

use remedy_state::{Issue, IssueId};

use crate::graph::IssueGraph;

/// Total order over every issue of a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub order: Vec<Issue>,
    /// Issues left unordered by Kahn's algorithm and appended in input order.
    pub cycle_broken: BTreeSet<IssueId>,
}

impl Schedule {
    /// Whether `id` was placed by cycle breaking.
    pub fn is_cycle_broken(&self, id: &IssueId) -> bool {
        self.cycle_broken.contains(id)
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Order `graph` with Kahn's algorithm.
    ///
    /// Ties are broken by input position. Nodes still carrying in-degree once
    /// the queue drains sit on or behind a cycle; they are appended in input
    /// order and reported in [`Schedule::cycle_broken`]. Always returns every
    /// issue exactly once in O(V + E).
    pub fn order(graph: &IssueGraph) -> Schedule {
        let n = graph.len();
        let mut in_degree: Vec<usize> = (0..n).map(|pos| graph.in_degree(pos)).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&pos| in_degree[pos] == 0).collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(pos) = queue.pop_front() {
            placed[pos] = true;
            order.push(graph.issues()[pos].clone());
            for &next in graph.downstream_positions(pos) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        let mut cycle_broken = BTreeSet::new();
        for (pos, issue) in graph.issues().iter().enumerate() {
            if !placed[pos] {
                cycle_broken.insert(issue.id.clone());
                order.push(issue.clone());
            }
        }

        Schedule {
            order,
            cycle_broken,
        }
    }
}
