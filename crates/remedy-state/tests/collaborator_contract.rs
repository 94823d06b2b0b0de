//! Contract checks for the in-memory collaborators and snapshot semantics
//! that any real `Mutator` must also honour.

use remedy_state::fakes::{EditOp, EditTemplate, MemoryMutator, PatternFixProvider};
use remedy_state::{
    ArtifactId, ArtifactSet, Category, CollaboratorError, FixProvenance, FixProvider, Issue,
    Mutator, StateError,
};

fn base() -> ArtifactSet {
    [("a.js", "a=1;"), ("b.js", "import a")].into_iter().collect()
}

#[tokio::test]
async fn snapshot_is_independent_of_later_mutations() {
    let mutator = MemoryMutator::new();
    let original = base();
    let handle = mutator.snapshot(&original);

    let patch = EditOp::Append {
        artifact: ArtifactId::from("a.js"),
        text: " bad syntax".to_string(),
    }
    .into_patch();
    let mut mutated = mutator.apply(&patch, original.clone()).await.expect("apply");
    mutated.insert("c.js", "new file");

    let restored = mutator.restore(&handle).expect("restore");
    assert_eq!(restored, original);
    assert_eq!(restored.get("a.js"), Some("a=1;"));
    assert!(!restored.contains("c.js"));
    assert_eq!(handle.artifact_count, 2);
}

#[tokio::test]
async fn restore_of_foreign_handle_fails() {
    let producer = MemoryMutator::new();
    let handle = producer.snapshot(&base());

    let other = MemoryMutator::new();
    let err = other.restore(&handle).unwrap_err();
    assert!(matches!(err, StateError::SnapshotNotFound { .. }));
}

#[tokio::test]
async fn malformed_patch_is_rejected() {
    let mutator = MemoryMutator::new();
    let patch = remedy_state::FixPatch::new(serde_json::json!({ "op": "rewrite_everything" }));
    let err = mutator.apply(&patch, base()).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Rejected(_)));
    assert_eq!(mutator.applied(), 0);
}

#[tokio::test]
async fn provider_targets_the_issue_artifact() {
    let provider = PatternFixProvider::new()
        .known(Category::Syntax, EditTemplate::Replace("a=2;".into()))
        .generated(Category::Style, EditTemplate::Remove);

    let syntax = Issue::new("e1", "bad literal", Category::Syntax, "a.js");
    let fix = provider
        .propose(&syntax)
        .await
        .expect("propose")
        .expect("known fix");
    assert_eq!(fix.issue_id, syntax.id);
    assert_eq!(fix.provenance, FixProvenance::KnownPattern);
    assert_eq!(fix.patch.payload()["artifact"], "a.js");

    let mutator = MemoryMutator::new();
    let updated = mutator.apply(&fix.patch, base()).await.expect("apply");
    assert_eq!(updated.get("a.js"), Some("a=2;"));

    let style = Issue::new("e2", "unused file", Category::Style, "b.js");
    let fix = provider.propose(&style).await.expect("propose").expect("fix");
    assert_eq!(fix.provenance, FixProvenance::Generated);
    let updated = mutator.apply(&fix.patch, base()).await.expect("apply");
    assert!(!updated.contains("b.js"));

    let runtime = Issue::new("e3", "panic", Category::Runtime, "a.js");
    assert!(provider.propose(&runtime).await.expect("propose").is_none());
    assert_eq!(provider.proposals(), 3);
}

#[test]
fn digest_depends_on_content_and_ids() {
    let a = base();
    let mut b = base();
    assert_eq!(a.digest(), b.digest());

    b.insert("a.js", "a=1; ");
    assert_ne!(a.digest(), b.digest());
    assert_eq!(b.changed_since(&a), vec![ArtifactId::from("a.js")]);

    // moving bytes between id and content must not collide
    let x: ArtifactSet = [("ab", "c")].into_iter().collect();
    let y: ArtifactSet = [("a", "bc")].into_iter().collect();
    assert_ne!(x.digest(), y.digest());
}

#[test]
fn issue_json_shape() {
    let issue = Issue::new("e1", "missing semicolon", Category::Syntax, "src/a.js").at(3, Some(14));
    let json = serde_json::to_value(&issue).expect("serialize");
    assert_eq!(json["id"], "e1");
    assert_eq!(json["classification"]["category"], "syntax");
    assert_eq!(json["location"]["artifact"], "src/a.js");
    assert_eq!(json["location"]["line"], 3);

    let back: Issue = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, issue);
}
