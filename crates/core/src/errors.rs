//! Error types for the gitflow core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. The
//! orchestrator speaks [`FlowError`], and every aborted transition is
//! reported as a [`TransitionError`] naming the step it stopped at.

use thiserror::Error;

use crate::models::{TransitionAction, TransitionState};
use crate::policy::BranchKind;

// ---------------------------------------------------------------------------
// Top-level flow error
// ---------------------------------------------------------------------------

/// Every fatal condition a branch transition can surface.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The naming policy or resolver settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A branch name does not match any configured trunk/integration/prefix,
    /// or a branch required by the transition does not exist.
    #[error("unrecognized branch '{0}'")]
    UnrecognizedBranch(String),

    /// The branch a start transition would create already exists.
    #[error("branch '{0}' already exists")]
    BranchExists(String),

    /// The working tree has modifications that the transition would overwrite.
    #[error("working tree has uncommitted changes on '{0}'")]
    UncommittedChanges(String),

    /// The underlying version-control command failed.
    #[error(transparent)]
    Repository(RepositoryError),

    /// A finish merge left conflicts the resolver could not (or may not) fix.
    #[error("merge into '{target}' has unresolved conflicts: {}", .paths.join(", "))]
    MergeConflict { target: String, paths: Vec<String> },

    /// The branch identifier cannot form a valid branch name.
    #[error("invalid {kind} identifier '{identifier}': {detail}")]
    InvalidIdentifier {
        kind: BranchKind,
        identifier: String,
        detail: String,
    },

    /// The tag a release/hotfix finish would create already exists.
    #[error("tag '{0}' already exists")]
    TagExists(String),

    /// The branch kind has no such transition (e.g. finishing a support branch).
    #[error("cannot {action} a {kind} branch")]
    UnsupportedTransition {
        action: TransitionAction,
        kind: BranchKind,
    },

    /// Cancellation was requested before any merge was committed.
    #[error("transition cancelled")]
    Cancelled,
}

impl From<RepositoryError> for FlowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::BranchExists(name) => Self::BranchExists(name),
            RepositoryError::UncommittedChanges(branch) => Self::UncommittedChanges(branch),
            other => Self::Repository(other),
        }
    }
}

/// A transition that was aborted, with the state it was in when it stopped.
#[derive(Debug, Error)]
#[error("{action} aborted during {step}")]
pub struct TransitionError {
    pub action: TransitionAction,
    pub step: TransitionState,
    #[source]
    pub source: FlowError,
}

impl TransitionError {
    pub fn new(action: TransitionAction, step: TransitionState, source: impl Into<FlowError>) -> Self {
        Self {
            action,
            step,
            source: source.into(),
        }
    }

    /// The underlying cause.
    pub fn flow_error(&self) -> &FlowError {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors from the git-backed repository port.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// `create_branch` was asked for a name that already exists.
    #[error("branch '{0}' already exists")]
    BranchExists(String),

    /// A checkout would overwrite local modifications.
    #[error("uncommitted changes in working tree (on '{0}')")]
    UncommittedChanges(String),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// An operation addressed to one branch found another checked out.
    #[error("expected '{expected}' to be checked out, found '{actual}'")]
    WrongBranch { expected: String, actual: String },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Resolver errors
// ---------------------------------------------------------------------------

/// Malformed conflict-marker input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// A conflict region was opened but never closed.
    #[error("conflict region starting at line {line} is not terminated")]
    UnterminatedRegion { line: usize },

    /// A separator or end marker appeared outside of a conflict region, or
    /// out of order inside one.
    #[error("unexpected conflict marker '{marker}' at line {line}")]
    UnexpectedMarker { line: usize, marker: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Two branch prefixes are equal or one is a prefix of the other.
    #[error("branch prefixes collide: '{first}' and '{second}'")]
    PrefixCollision { first: String, second: String },

    /// Reading `gitflow.*` keys from git config failed.
    #[error("git config error: {0}")]
    GitConfig(#[from] git2::Error),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RepositoryError::CommandFailed {
            exit_code: 128,
            stderr: "fatal: not a git repository".into(),
        };
        assert_eq!(
            err.to_string(),
            "git command failed (exit 128): fatal: not a git repository"
        );

        let err = FlowError::MergeConflict {
            target: "master".into(),
            paths: vec!["pom.xml".into(), "src/App.java".into()],
        };
        assert_eq!(
            err.to_string(),
            "merge into 'master' has unresolved conflicts: pom.xml, src/App.java"
        );

        let err = ConfigError::PrefixCollision {
            first: "rel/".into(),
            second: "rel/hot/".into(),
        };
        assert!(err.to_string().contains("rel/hot/"));
    }

    #[test]
    fn test_repository_error_lifts_into_flow_taxonomy() {
        let err: FlowError = RepositoryError::BranchExists("feature/x".into()).into();
        assert!(matches!(err, FlowError::BranchExists(ref b) if b == "feature/x"));

        let err: FlowError = RepositoryError::UncommittedChanges("develop".into()).into();
        assert!(matches!(err, FlowError::UncommittedChanges(_)));

        let err: FlowError = RepositoryError::CommandFailed {
            exit_code: 1,
            stderr: "boom".into(),
        }
        .into();
        assert!(matches!(
            err,
            FlowError::Repository(RepositoryError::CommandFailed { exit_code: 1, .. })
        ));
    }

    #[test]
    fn test_resolver_error_is_cloneable() {
        let err = ResolverError::UnterminatedRegion { line: 3 };
        let copy = err.clone();
        assert_eq!(copy, err);
        assert_eq!(copy.to_string(), "conflict region starting at line 3 is not terminated");
    }

    #[test]
    fn test_transition_error_names_step() {
        let err = TransitionError::new(
            TransitionAction::Finish,
            TransitionState::Merging,
            FlowError::UnrecognizedBranch("release/9.9".into()),
        );
        assert_eq!(err.to_string(), "finish aborted during merging");
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("unrecognized branch 'release/9.9'".to_string())
        );
        assert!(matches!(err.flow_error(), FlowError::UnrecognizedBranch(_)));
    }
}
