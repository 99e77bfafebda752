//! The version-control boundary of the orchestrator.
//!
//! [`RepositoryPort`] is the only way the orchestrator touches a
//! repository. Every operation that depends on which branch is checked out
//! names that branch explicitly, so implementations can verify it instead
//! of relying on implicit working-copy state.

pub mod git;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeSet;

use crate::errors::RepositoryError;

pub use git::GitRepository;

/// Result of merging one branch into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// The merge commit was created.
    Clean,
    /// The merge stopped with these repository-relative paths conflicted.
    /// The merge is still in progress.
    Conflicted(BTreeSet<String>),
}

/// Branch, merge, tag and working-tree operations needed to drive git-flow
/// transitions. Implementations serialise access to the underlying
/// repository; callers assume exclusive use for the duration of a
/// transition.
pub trait RepositoryPort {
    /// Name of the checked-out branch.
    fn current_branch(&self) -> Result<String, RepositoryError>;

    /// Names of all local branches.
    fn list_branches(&self) -> Result<Vec<String>, RepositoryError>;

    fn branch_exists(&self, name: &str) -> Result<bool, RepositoryError>;

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError>;

    /// Whether tracked files differ from `HEAD` (index or working tree).
    fn has_uncommitted_changes(&self) -> Result<bool, RepositoryError>;

    /// Create `name` at `start_point`. Fails with
    /// [`RepositoryError::BranchExists`] if `name` already exists.
    fn create_branch(&mut self, name: &str, start_point: &str) -> Result<(), RepositoryError>;

    /// Switch to `name`. Fails with [`RepositoryError::UncommittedChanges`]
    /// rather than discarding local modifications.
    fn checkout(&mut self, name: &str) -> Result<(), RepositoryError>;

    /// Merge `source` into `into`, which must be checked out.
    fn merge(
        &mut self,
        source: &str,
        into: &str,
        no_fast_forward: bool,
        message: &str,
    ) -> Result<MergeResult, RepositoryError>;

    /// Raw content of a conflicted file, markers included.
    fn conflicted_file_content(&self, path: &str) -> Result<String, RepositoryError>;

    fn write_resolved_content(&mut self, path: &str, text: &str) -> Result<(), RepositoryError>;

    fn stage(&mut self, path: &str) -> Result<(), RepositoryError>;

    /// Conclude an in-progress merge into `into` once every conflict has
    /// been staged.
    fn commit_merge(&mut self, into: &str, message: &str) -> Result<(), RepositoryError>;

    /// Create an annotated tag at the tip of `on_branch`.
    fn tag(&mut self, name: &str, on_branch: &str, message: &str) -> Result<(), RepositoryError>;

    fn delete_branch(&mut self, name: &str) -> Result<(), RepositoryError>;

    /// Publish fully-qualified `refs` (`refs/heads/..`, `refs/tags/..`) to `remote`.
    fn push(&mut self, remote: &str, refs: &BTreeSet<String>) -> Result<(), RepositoryError>;
}
