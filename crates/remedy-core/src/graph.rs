//! Issue dependency graph and edge inference.
//!
//! An edge `A → B` means "B should be attempted no earlier than A". Edges are
//! derived by [`GraphBuilder`], never authored, and only ever connect issues
//! of the caller-supplied set.

use std::collections::{BTreeSet, HashMap};

use remedy_state::{Issue, IssueId};
use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyIndex;
use crate::error::{RemedyError, Result};

/// Why an edge was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeReason {
    /// Both issues sit in the same artifact and share a category.
    SameArtifactSameKind,
    /// The dependent issue's artifact imports the other issue's artifact.
    ArtifactImport,
}

/// Inferred `from → to` edge with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: IssueId,
    pub to: IssueId,
    pub reason: EdgeReason,
}

/// Directed graph over the issues of one run or group.
///
/// Nodes keep their input position; adjacency is stored by position in both
/// directions so dependency and dependent lookups are O(1) per issue.
#[derive(Debug, Clone, Default)]
pub struct IssueGraph {
    issues: Vec<Issue>,
    positions: HashMap<IssueId, usize>,
    /// `position → positions that depend on it` (downstream adjacency)
    downstream: Vec<BTreeSet<usize>>,
    /// `position → positions it depends on` (upstream adjacency)
    upstream: Vec<BTreeSet<usize>>,
    edges: Vec<DependencyEdge>,
}

impl IssueGraph {
    /// Create an edgeless graph. Issue ids must be unique.
    pub fn new(issues: Vec<Issue>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(issues.len());
        for (pos, issue) in issues.iter().enumerate() {
            if positions.insert(issue.id.clone(), pos).is_some() {
                return Err(RemedyError::InvalidRequest(format!(
                    "duplicate issue id: {}",
                    issue.id
                )));
            }
        }
        let n = issues.len();
        Ok(Self {
            issues,
            positions,
            downstream: vec![BTreeSet::new(); n],
            upstream: vec![BTreeSet::new(); n],
            edges: Vec::new(),
        })
    }

    /// Add `from → to`. Returns `false` for self-edges and duplicates.
    ///
    /// Returns [`RemedyError::UnknownIssue`] if either end is not a node.
    pub fn add_edge(&mut self, from: &IssueId, to: &IssueId, reason: EdgeReason) -> Result<bool> {
        let from_pos = self.position_of(from)?;
        let to_pos = self.position_of(to)?;
        if from_pos == to_pos || !self.downstream[from_pos].insert(to_pos) {
            return Ok(false);
        }
        self.upstream[to_pos].insert(from_pos);
        self.edges.push(DependencyEdge {
            from: from.clone(),
            to: to.clone(),
            reason,
        });
        Ok(true)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// True for a graph without nodes.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues in input order.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Node with this id, if any.
    pub fn issue(&self, id: &IssueId) -> Option<&Issue> {
        self.positions.get(id).map(|&pos| &self.issues[pos])
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Issues `id` must wait for.
    pub fn dependencies_of(&self, id: &IssueId) -> Result<Vec<&Issue>> {
        let pos = self.position_of(id)?;
        Ok(self.upstream[pos].iter().map(|&p| &self.issues[p]).collect())
    }

    /// Issues waiting for `id`.
    pub fn dependents_of(&self, id: &IssueId) -> Result<Vec<&Issue>> {
        let pos = self.position_of(id)?;
        Ok(self.downstream[pos].iter().map(|&p| &self.issues[p]).collect())
    }

    pub(crate) fn downstream_positions(&self, pos: usize) -> &BTreeSet<usize> {
        &self.downstream[pos]
    }

    pub(crate) fn in_degree(&self, pos: usize) -> usize {
        self.upstream[pos].len()
    }

    fn position_of(&self, id: &IssueId) -> Result<usize> {
        self.positions
            .get(id)
            .copied()
            .ok_or_else(|| RemedyError::UnknownIssue(id.clone()))
    }
}

/// Infers dependency edges from shared location and artifact imports.
pub struct GraphBuilder<'a> {
    adjacency: &'a AdjacencyIndex,
}

impl<'a> GraphBuilder<'a> {
    /// Builder reading import relations from `adjacency`.
    pub fn new(adjacency: &'a AdjacencyIndex) -> Self {
        Self { adjacency }
    }

    /// Build the graph for `issues`.
    ///
    /// Same-artifact, same-category pairs are serialized in input order so a
    /// symmetric relation never yields a spurious two-node cycle. Import
    /// edges follow the import direction and may form genuine cycles, which
    /// the scheduler breaks.
    pub fn build(&self, issues: &[Issue]) -> Result<IssueGraph> {
        let mut graph = IssueGraph::new(issues.to_vec())?;

        for (i, a) in issues.iter().enumerate() {
            for (j, b) in issues.iter().enumerate() {
                if i == j {
                    continue;
                }
                let same_artifact = a.artifact() == b.artifact();
                if same_artifact && a.category() == b.category() && i < j {
                    graph.add_edge(&a.id, &b.id, EdgeReason::SameArtifactSameKind)?;
                } else if !same_artifact && self.adjacency.imports(b.artifact(), a.artifact()) {
                    graph.add_edge(&a.id, &b.id, EdgeReason::ArtifactImport)?;
                }
            }
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_state::{ArtifactId, Category};

    fn issue(id: &str, category: Category, artifact: &str) -> Issue {
        Issue::new(id, format!("{id} message"), category, artifact)
    }

    fn index_with(imports: &[(&str, &str)]) -> AdjacencyIndex {
        let mut index = AdjacencyIndex::new();
        for (importer, imported) in imports {
            index.record(
                ArtifactId::from(*importer),
                Vec::new(),
                vec![ArtifactId::from(*imported)],
            );
        }
        index
    }

    #[test]
    fn import_creates_edge_from_imported_to_importer() {
        let index = index_with(&[("file2.js", "file1.js")]);
        let issues = vec![
            issue("Y", Category::Type, "file2.js"),
            issue("X", Category::Syntax, "file1.js"),
        ];
        let graph = GraphBuilder::new(&index).build(&issues).unwrap();

        assert_eq!(graph.edges().len(), 1);
        let edge = &graph.edges()[0];
        assert_eq!(edge.from.as_str(), "X");
        assert_eq!(edge.to.as_str(), "Y");
        assert_eq!(edge.reason, EdgeReason::ArtifactImport);
    }

    #[test]
    fn same_artifact_same_kind_is_serialized_in_input_order() {
        let index = AdjacencyIndex::new();
        let issues = vec![
            issue("A", Category::Syntax, "a.js"),
            issue("B", Category::Syntax, "a.js"),
            issue("C", Category::Type, "a.js"),
        ];
        let graph = GraphBuilder::new(&index).build(&issues).unwrap();

        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].from.as_str(), "A");
        assert_eq!(graph.edges()[0].to.as_str(), "B");
        assert_eq!(graph.edges()[0].reason, EdgeReason::SameArtifactSameKind);
    }

    #[test]
    fn unrelated_issues_have_no_edges() {
        let index = AdjacencyIndex::new();
        let issues = vec![
            issue("A", Category::Syntax, "a.js"),
            issue("B", Category::Syntax, "b.js"),
        ];
        let graph = GraphBuilder::new(&index).build(&issues).unwrap();
        assert!(graph.edges().is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn lookups_work_in_both_directions() {
        let index = index_with(&[("b.js", "a.js"), ("c.js", "a.js")]);
        let issues = vec![
            issue("A", Category::Import, "a.js"),
            issue("B", Category::Import, "b.js"),
            issue("C", Category::Import, "c.js"),
        ];
        let graph = GraphBuilder::new(&index).build(&issues).unwrap();

        let dependents: Vec<&str> = graph
            .dependents_of(&IssueId::new("A"))
            .unwrap()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(dependents, vec!["B", "C"]);

        let deps = graph.dependencies_of(&IssueId::new("C")).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id.as_str(), "A");
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut graph = IssueGraph::new(vec![issue("A", Category::Syntax, "a.js")]).unwrap();
        let err = graph
            .add_edge(&IssueId::new("A"), &IssueId::new("ghost"), EdgeReason::ArtifactImport)
            .unwrap_err();
        assert!(matches!(err, RemedyError::UnknownIssue(ref id) if id.as_str() == "ghost"));
        assert!(graph.dependents_of(&IssueId::new("ghost")).is_err());
    }

    #[test]
    fn duplicate_and_self_edges_are_ignored() {
        let mut graph = IssueGraph::new(vec![
            issue("A", Category::Syntax, "a.js"),
            issue("B", Category::Syntax, "b.js"),
        ])
        .unwrap();
        let a = IssueId::new("A");
        let b = IssueId::new("B");
        assert!(graph.add_edge(&a, &b, EdgeReason::ArtifactImport).unwrap());
        assert!(!graph.add_edge(&a, &b, EdgeReason::ArtifactImport).unwrap());
        assert!(!graph.add_edge(&a, &a, EdgeReason::ArtifactImport).unwrap());
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn duplicate_issue_ids_are_rejected() {
        let err = IssueGraph::new(vec![
            issue("A", Category::Syntax, "a.js"),
            issue("A", Category::Type, "b.js"),
        ])
        .unwrap_err();
        assert!(matches!(err, RemedyError::InvalidRequest(_)));
    }
}
