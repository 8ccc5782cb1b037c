use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Result alias for operations that only fail with a typed [`XForgeError`].
pub type CoreResult<T> = std::result::Result<T, XForgeError>;

/// Fatal error kinds. Anything that should not abort a pass is an [`Issue`] instead.
#[derive(Debug, Error)]
pub enum XForgeError {
    /// A path or pattern matches none of the addressing grammars.
    #[error("invalid path syntax '{path}': {reason}")]
    Syntax { path: String, reason: String },

    /// Every violation found while validating a configuration document.
    #[error("configuration is invalid ({} problem(s)):\n  - {}", .0.len(), .0.join("\n  - "))]
    Validation(Vec<String>),

    /// Template inheritance loops back on itself; members listed in visit order.
    #[error("circular template inheritance: {}", .0.join(" -> "))]
    CircularReference(Vec<String>),

    /// Malformed XML input or a mutation the document refused.
    #[error("xml: {0}")]
    Xml(String),

    /// The baseline generator collaborator failed.
    #[error("baseline generation failed: {0}")]
    Baseline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl XForgeError {
    pub fn syntax(path: impl Into<String>, reason: impl Into<String>) -> Self {
        XForgeError::Syntax {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Problems carried by the error, one line each.
    pub fn problems(&self) -> Vec<String> {
        match self {
            XForgeError::Validation(list) => list.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Non-fatal problem kinds recorded while a pass keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// An address matched nothing.
    ResolutionMiss,
    /// A computed template field could not be evaluated.
    ComputationFailure,
    /// A single override failed to apply.
    ApplicationFailure,
    /// A choice condition could not be parsed and was ignored.
    ConditionSkipped,
    /// A choice could not be applied to its container.
    ChoiceFailure,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::ResolutionMiss => "resolution-miss",
            IssueKind::ComputationFailure => "computation-failure",
            IssueKind::ApplicationFailure => "application-failure",
            IssueKind::ConditionSkipped => "condition-skipped",
            IssueKind::ChoiceFailure => "choice-failure",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Path, template or choice the issue is about.
    pub subject: String,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_problem() {
        let err = XForgeError::Validation(vec!["schema is required".into(), "mode is required".into()]);
        let text = err.to_string();
        assert!(text.contains("2 problem(s)"));
        assert!(text.contains("schema is required"));
        assert!(text.contains("mode is required"));
        assert_eq!(err.problems().len(), 2);
    }

    #[test]
    fn circular_reference_names_the_cycle() {
        let err = XForgeError::CircularReference(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "circular template inheritance: a -> b -> a");
    }

    #[test]
    fn issue_display_includes_kind_and_subject() {
        let issue = Issue::new(IssueKind::ApplicationFailure, "/Root/A", "bad char");
        assert_eq!(issue.to_string(), "[application-failure] /Root/A: bad char");
    }
}
