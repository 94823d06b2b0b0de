//! Issue and fix value types exchanged with collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;

/// Identifier of a detected issue, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a proposed fix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixId(String);

impl FixId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of problem an issue describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Syntax,
    Type,
    Import,
    Reference,
    Runtime,
    Security,
    Style,
    Unknown,
}

impl Category {
    /// Whether two issues sharing this category are considered related.
    /// `Unknown` carries no information, so it never relates issues.
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Import => "import",
            Self::Reference => "reference",
            Self::Runtime => "runtime",
            Self::Security => "security",
            Self::Style => "style",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// How serious the detector judged an issue to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub severity: IssueSeverity,
}

impl Classification {
    pub fn new(category: Category, severity: IssueSeverity) -> Self {
        Self { category, severity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub artifact: ArtifactId,
    pub line: u32,
    pub column: Option<u32>,
}

impl Location {
    pub fn new(artifact: impl Into<ArtifactId>, line: u32) -> Self {
        Self {
            artifact: artifact.into(),
            line,
            column: None,
        }
    }
}

/// A detected, located problem. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub message: String,
    pub classification: Classification,
    pub location: Location,
    /// Reference to the detector pattern that produced the issue, if any.
    pub pattern: Option<String>,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        category: Category,
        artifact: impl Into<ArtifactId>,
    ) -> Self {
        Self {
            id: IssueId::new(id),
            message: message.into(),
            classification: Classification::new(category, IssueSeverity::Error),
            location: Location::new(artifact, 1),
            pattern: None,
        }
    }

    /// Override the default severity.
    pub fn with_severity(mut self, severity: IssueSeverity) -> Self {
        self.classification.severity = severity;
        self
    }

    /// Pin the issue to a line and optional column.
    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.location.line = line;
        self.location.column = column;
        self
    }

    /// Attach the matched diagnostic pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Category from the classification.
    pub fn category(&self) -> Category {
        self.classification.category
    }

    /// Artifact the issue is located in.
    pub fn artifact(&self) -> &ArtifactId {
        &self.location.artifact
    }
}

/// Where a proposed fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixProvenance {
    /// A known, previously validated transformation for this kind of issue.
    KnownPattern,
    /// Freshly generated for this issue; lower confidence.
    Generated,
}

/// Opaque patch payload. Only the `Mutator` interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixPatch(serde_json::Value);

impl FixPatch {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Raw payload for the mutator.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedFix {
    pub id: FixId,
    pub issue_id: IssueId,
    pub provenance: FixProvenance,
    pub patch: FixPatch,
    /// Provider confidence in `[0.0, 1.0]`.
    pub safety_score: f32,
}

/// Verdict returned by a `Validator`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Successful report without errors.
    pub fn passed() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Failed report carrying `errors`.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            warnings: Vec::new(),
        }
    }
}
