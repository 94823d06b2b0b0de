//! In-memory collaborator fakes
//!
//! Provides `StaticAdjacency`, `PatternFixProvider`, `MemoryMutator` and
//! `ScriptedValidator`, which satisfy the collaborator contracts without any
//! external tooling. Patches produced here are `EditOp` payloads that only
//! `MemoryMutator` understands.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, ArtifactSet};
use crate::collaborators::*;
use crate::error::StateError;
use crate::model::{Category, FixId, FixPatch, FixProvenance, Issue, IssueId, ProposedFix, ValidationReport};
use crate::snapshot::{SnapshotHandle, SnapshotStore};

// ---------------------------------------------------------------------------
// Patch payload
// ---------------------------------------------------------------------------

/// Text edit carried inside a `FixPatch` produced by the fakes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    Append { artifact: ArtifactId, text: String },
    Replace { artifact: ArtifactId, content: String },
    Remove { artifact: ArtifactId },
}

impl EditOp {
    /// Encode as a patch payload through the serde tag.
    pub fn into_patch(self) -> FixPatch {
        // string-only fields; serializing to a Value cannot fail, and a null
        // payload would be rejected by the mutator anyway
        FixPatch::new(serde_json::to_value(&self).unwrap_or_default())
    }

    fn apply_to(self, artifacts: &mut ArtifactSet) -> crate::Result<()> {
        match self {
            EditOp::Append { artifact, text } => {
                let current = artifacts
                    .get(artifact.as_str())
                    .ok_or_else(|| StateError::ArtifactNotFound(artifact.to_string()))?;
                let next = format!("{current}{text}");
                artifacts.insert(artifact, next);
            }
            EditOp::Replace { artifact, content } => {
                artifacts.insert(artifact, content);
            }
            EditOp::Remove { artifact } => {
                artifacts
                    .remove(artifact.as_str())
                    .ok_or_else(|| StateError::ArtifactNotFound(artifact.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Edit shape a fix template produces for an issue's own artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTemplate {
    Append(String),
    Replace(String),
    Remove,
}

impl EditTemplate {
    fn for_artifact(&self, artifact: &ArtifactId) -> EditOp {
        let artifact = artifact.clone();
        match self {
            EditTemplate::Append(text) => EditOp::Append {
                artifact,
                text: text.clone(),
            },
            EditTemplate::Replace(content) => EditOp::Replace {
                artifact,
                content: content.clone(),
            },
            EditTemplate::Remove => EditOp::Remove { artifact },
        }
    }
}

// ---------------------------------------------------------------------------
// StaticAdjacency
// ---------------------------------------------------------------------------

/// Adjacency backed by a fixed `importer → [imported]` table.
#[derive(Debug, Clone, Default)]
pub struct StaticAdjacency {
    imports: HashMap<ArtifactId, Vec<ArtifactId>>,
    unavailable: HashSet<ArtifactId>,
}

impl StaticAdjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `importer` imports `imported`.
    pub fn with_import(mut self, importer: impl Into<ArtifactId>, imported: impl Into<ArtifactId>) -> Self {
        self.imports
            .entry(importer.into())
            .or_default()
            .push(imported.into());
        self
    }

    /// Make every lookup touching `artifact` fail.
    pub fn with_unavailable(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.unavailable.insert(artifact.into());
        self
    }

    fn check_available(&self, artifact: &ArtifactId) -> CollaboratorResult<()> {
        if self.unavailable.contains(artifact) {
            return Err(CollaboratorError::unavailable(anyhow::anyhow!(
                "import index has no entry for {artifact}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactAdjacency for StaticAdjacency {
    async fn dependents(&self, artifact: &ArtifactId) -> CollaboratorResult<Vec<ArtifactId>> {
        self.check_available(artifact)?;
        let mut dependents: Vec<ArtifactId> = self
            .imports
            .iter()
            .filter(|(_, imported)| imported.contains(artifact))
            .map(|(importer, _)| importer.clone())
            .collect();
        dependents.sort();
        Ok(dependents)
    }

    async fn depends_on(&self, artifact: &ArtifactId) -> CollaboratorResult<Vec<ArtifactId>> {
        self.check_available(artifact)?;
        Ok(self.imports.get(artifact).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// PatternFixProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FixTemplate {
    provenance: FixProvenance,
    edit: EditTemplate,
    safety_score: f32,
}

/// Fix provider driven by per-category and per-issue templates.
#[derive(Debug, Default)]
pub struct PatternFixProvider {
    by_category: HashMap<Category, FixTemplate>,
    by_issue: HashMap<IssueId, FixTemplate>,
    failing: HashSet<IssueId>,
    proposals: AtomicUsize,
}

impl PatternFixProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known-pattern fix for every issue of `category`.
    pub fn known(mut self, category: Category, edit: EditTemplate) -> Self {
        self.by_category.insert(
            category,
            FixTemplate {
                provenance: FixProvenance::KnownPattern,
                edit,
                safety_score: 0.9,
            },
        );
        self
    }

    /// Generated fix for every issue of `category`.
    pub fn generated(mut self, category: Category, edit: EditTemplate) -> Self {
        self.by_category.insert(
            category,
            FixTemplate {
                provenance: FixProvenance::Generated,
                edit,
                safety_score: 0.5,
            },
        );
        self
    }

    /// Override the fix for one issue. Takes precedence over category templates.
    pub fn for_issue(
        mut self,
        issue_id: impl Into<IssueId>,
        provenance: FixProvenance,
        edit: EditTemplate,
        safety_score: f32,
    ) -> Self {
        self.by_issue.insert(
            issue_id.into(),
            FixTemplate {
                provenance,
                edit,
                safety_score,
            },
        );
        self
    }

    /// Make proposals for `issue_id` fail as if the provider were down.
    pub fn failing_for(mut self, issue_id: impl Into<IssueId>) -> Self {
        self.failing.insert(issue_id.into());
        self
    }

    /// Number of `propose` calls received.
    pub fn proposals(&self) -> usize {
        self.proposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixProvider for PatternFixProvider {
    async fn propose(&self, issue: &Issue) -> CollaboratorResult<Option<ProposedFix>> {
        self.proposals.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&issue.id) {
            return Err(CollaboratorError::unavailable(anyhow::anyhow!(
                "fix provider crashed on {}",
                issue.id
            )));
        }

        let template = self
            .by_issue
            .get(&issue.id)
            .or_else(|| self.by_category.get(&issue.category()));

        Ok(template.map(|t| ProposedFix {
            id: FixId::new(format!("fix-{}", issue.id)),
            issue_id: issue.id.clone(),
            provenance: t.provenance,
            patch: t.edit.for_artifact(issue.artifact()).into_patch(),
            safety_score: t.safety_score,
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryMutator
// ---------------------------------------------------------------------------

/// Mutator interpreting `EditOp` patches against an in-memory set.
#[derive(Debug, Default)]
pub struct MemoryMutator {
    snapshots: SnapshotStore,
    applied: AtomicUsize,
}

impl MemoryMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `apply` calls.
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Number of snapshots still held.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

#[async_trait]
impl Mutator for MemoryMutator {
    async fn apply(
        &self,
        patch: &FixPatch,
        mut artifacts: ArtifactSet,
    ) -> CollaboratorResult<ArtifactSet> {
        let op: EditOp = serde_json::from_value(patch.payload().clone()).map_err(StateError::from)?;
        op.apply_to(&mut artifacts)
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(artifacts)
    }

    fn snapshot(&self, artifacts: &ArtifactSet) -> SnapshotHandle {
        self.snapshots.capture(artifacts)
    }

    fn restore(&self, handle: &SnapshotHandle) -> crate::Result<ArtifactSet> {
        self.snapshots.restore(handle)
    }

    fn release(&self, handle: &SnapshotHandle) {
        self.snapshots.release(handle);
    }
}

// ---------------------------------------------------------------------------
// ScriptedValidator
// ---------------------------------------------------------------------------

type CheckFn = dyn Fn(&ArtifactSet) -> ValidationReport + Send + Sync;

/// Validator whose verdict is computed by a closure over the artifact set.
pub struct ScriptedValidator {
    check: Box<CheckFn>,
    delay: Option<Duration>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    /// Validator computing its verdict with `check`.
    pub fn from_fn<F>(check: F) -> Self
    where
        F: Fn(&ArtifactSet) -> ValidationReport + Send + Sync + 'static,
    {
        Self {
            check: Box::new(check),
            delay: None,
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Validator that accepts every state.
    pub fn always_pass() -> Self {
        Self::from_fn(|_| ValidationReport::passed())
    }

    /// Fail whenever any artifact contains `needle`.
    pub fn reject_containing(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::from_fn(move |artifacts| {
            let errors: Vec<String> = artifacts
                .iter()
                .filter(|(_, content)| content.contains(needle.as_str()))
                .map(|(id, _)| format!("{id}: unexpected `{needle}`"))
                .collect();
            if errors.is_empty() {
                ValidationReport::passed()
            } else {
                ValidationReport::failed(errors)
            }
        })
    }

    /// Sleep before answering, to exercise caller deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call as if the validation backend were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Number of `check` calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn check(&self, artifacts: &ArtifactSet) -> CollaboratorResult<ValidationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(CollaboratorError::unavailable(anyhow::anyhow!(
                "validation backend offline"
            )));
        }
        Ok((self.check)(artifacts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_adjacency_answers_both_directions() {
        let adjacency = StaticAdjacency::new()
            .with_import("file2.js", "file1.js")
            .with_import("file3.js", "file1.js");

        let dependents = adjacency.dependents(&"file1.js".into()).await.unwrap();
        assert_eq!(dependents, vec![ArtifactId::from("file2.js"), ArtifactId::from("file3.js")]);

        let deps = adjacency.depends_on(&"file2.js".into()).await.unwrap();
        assert_eq!(deps, vec![ArtifactId::from("file1.js")]);
        assert!(adjacency.depends_on(&"file1.js".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_adjacency_can_be_unavailable() {
        let adjacency = StaticAdjacency::new().with_unavailable("x.js");
        assert!(adjacency.dependents(&"x.js".into()).await.is_err());
        assert!(adjacency.dependents(&"y.js".into()).await.is_ok());
    }

    #[tokio::test]
    async fn provider_prefers_issue_override_over_category() {
        let provider = PatternFixProvider::new()
            .known(Category::Syntax, EditTemplate::Append(";".to_string()))
            .for_issue("e2", FixProvenance::Generated, EditTemplate::Remove, 0.2);

        let e1 = Issue::new("e1", "missing ;", Category::Syntax, "a.js");
        let e2 = Issue::new("e2", "missing ;", Category::Syntax, "a.js");
        let e3 = Issue::new("e3", "bad type", Category::Type, "a.js");

        let f1 = provider.propose(&e1).await.unwrap().unwrap();
        assert_eq!(f1.provenance, FixProvenance::KnownPattern);
        assert_eq!(f1.issue_id, e1.id);

        let f2 = provider.propose(&e2).await.unwrap().unwrap();
        assert_eq!(f2.provenance, FixProvenance::Generated);
        assert!((f2.safety_score - 0.2).abs() < f32::EPSILON);

        assert!(provider.propose(&e3).await.unwrap().is_none());
        assert_eq!(provider.proposals(), 3);
    }

    #[test]
    fn edit_op_payload_uses_the_serde_tag() {
        let patch = EditOp::Replace {
            artifact: "a.js".into(),
            content: "a=2;".to_string(),
        }
        .into_patch();
        assert_eq!(
            patch.payload(),
            &serde_json::json!({ "op": "replace", "artifact": "a.js", "content": "a=2;" })
        );
        let back: EditOp = serde_json::from_value(patch.payload().clone()).unwrap();
        assert!(matches!(back, EditOp::Replace { .. }));
    }

    #[tokio::test]
    async fn mutator_applies_edit_ops() {
        let mutator = MemoryMutator::new();
        let set: ArtifactSet = [("a.js", "a=1;")].into_iter().collect();

        let patch = EditOp::Append {
            artifact: "a.js".into(),
            text: " b=2;".to_string(),
        }
        .into_patch();
        let next = mutator.apply(&patch, set.clone()).await.unwrap();
        assert_eq!(next.get("a.js"), Some("a=1; b=2;"));
        assert_eq!(set.get("a.js"), Some("a=1;"));
        assert_eq!(mutator.applied(), 1);
    }

    #[tokio::test]
    async fn mutator_rejects_unknown_payloads_and_missing_artifacts() {
        let mutator = MemoryMutator::new();
        let set = ArtifactSet::new();

        let garbage = FixPatch::new(serde_json::json!({ "op": "explode" }));
        assert!(matches!(
            mutator.apply(&garbage, set.clone()).await,
            Err(CollaboratorError::Rejected(_))
        ));

        let missing = EditOp::Remove {
            artifact: "ghost.js".into(),
        }
        .into_patch();
        assert!(matches!(
            mutator.apply(&missing, set).await,
            Err(CollaboratorError::Rejected(_))
        ));
        assert_eq!(mutator.applied(), 0);
    }

    #[tokio::test]
    async fn reject_containing_reports_each_offending_artifact() {
        let validator = ScriptedValidator::reject_containing("bad syntax");
        let set: ArtifactSet = [("a.js", "a=1; bad syntax"), ("b.js", "ok")].into_iter().collect();
        let report = validator.check(&set).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("a.js"));
        assert_eq!(validator.calls(), 1);
    }
}
