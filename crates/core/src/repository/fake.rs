//! In-memory [`RepositoryPort`] for orchestrator tests.
//!
//! Branches are modelled as commit counters, merges are scripted per
//! `(source, into)` pair, and every mutating call is appended to `calls`
//! so tests can assert that nothing was touched.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::{MergeResult, RepositoryPort};
use crate::errors::RepositoryError;
use crate::orchestrator::CancelHandle;

#[derive(Debug, Default)]
pub(crate) struct FakeRepository {
    /// Branch name -> number of commits on it.
    pub branches: BTreeMap<String, usize>,
    /// Tag name -> (branch, message) it was cut on.
    pub tags: BTreeMap<String, (String, String)>,
    pub current: String,
    pub dirty: bool,
    /// Scripted merge outcomes; unscripted merges are clean.
    pub merge_script: HashMap<(String, String), MergeResult>,
    /// Conflicted file contents, by path.
    pub files: BTreeMap<String, String>,
    /// Merge commits in order: (into, message).
    pub merge_commits: Vec<(String, String)>,
    pub staged: BTreeSet<String>,
    pub pushed: Vec<(String, BTreeSet<String>)>,
    /// Mutating operations performed, e.g. `merge release/2.0.0 -> master`.
    pub calls: Vec<String>,
    /// Operation names that fail with `CommandFailed`.
    pub fail_on: HashSet<&'static str>,
    /// Fired after every merge commit, to cancel mid-transition.
    pub cancel_after_merge: Option<CancelHandle>,
    in_progress: Option<(String, BTreeSet<String>)>,
}

impl FakeRepository {
    /// A repository with `master` and `develop`, on `develop`.
    pub fn with_flow_branches() -> Self {
        let mut repo = Self::default();
        repo.branches.insert("master".into(), 1);
        repo.branches.insert("develop".into(), 1);
        repo.current = "develop".into();
        repo
    }

    pub fn add_branch(&mut self, name: &str) {
        self.branches.insert(name.into(), 1);
    }

    pub fn script_merge(&mut self, source: &str, into: &str, result: MergeResult) {
        self.merge_script
            .insert((source.to_string(), into.to_string()), result);
    }

    pub fn commits_on(&self, branch: &str) -> usize {
        self.branches.get(branch).copied().unwrap_or(0)
    }

    pub fn merge_in_progress(&self) -> bool {
        self.in_progress.is_some()
    }

    fn fire_cancel(&self) {
        if let Some(handle) = &self.cancel_after_merge {
            handle.cancel();
        }
    }

    fn check(&self, op: &'static str) -> Result<(), RepositoryError> {
        if self.fail_on.contains(op) {
            return Err(RepositoryError::CommandFailed {
                exit_code: 1,
                stderr: format!("{} failed", op),
            });
        }
        Ok(())
    }

    fn require_current(&self, expected: &str) -> Result<(), RepositoryError> {
        if self.current != expected {
            return Err(RepositoryError::WrongBranch {
                expected: expected.into(),
                actual: self.current.clone(),
            });
        }
        Ok(())
    }
}

impl RepositoryPort for FakeRepository {
    fn current_branch(&self) -> Result<String, RepositoryError> {
        Ok(self.current.clone())
    }

    fn list_branches(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.branches.keys().cloned().collect())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self.branches.contains_key(name))
    }

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self.tags.contains_key(name))
    }

    fn has_uncommitted_changes(&self) -> Result<bool, RepositoryError> {
        Ok(self.dirty || self.in_progress.is_some())
    }

    fn create_branch(&mut self, name: &str, start_point: &str) -> Result<(), RepositoryError> {
        self.check("create_branch")?;
        if self.branches.contains_key(name) {
            return Err(RepositoryError::BranchExists(name.into()));
        }
        let commits = self
            .branches
            .get(start_point)
            .copied()
            .ok_or_else(|| RepositoryError::RefNotFound(start_point.into()))?;
        self.branches.insert(name.into(), commits);
        self.calls.push(format!("create_branch {} from {}", name, start_point));
        Ok(())
    }

    fn checkout(&mut self, name: &str) -> Result<(), RepositoryError> {
        self.check("checkout")?;
        if self.dirty || self.in_progress.is_some() {
            return Err(RepositoryError::UncommittedChanges(self.current.clone()));
        }
        if !self.branches.contains_key(name) {
            return Err(RepositoryError::RefNotFound(name.into()));
        }
        self.current = name.into();
        self.calls.push(format!("checkout {}", name));
        Ok(())
    }

    fn merge(
        &mut self,
        source: &str,
        into: &str,
        _no_fast_forward: bool,
        message: &str,
    ) -> Result<MergeResult, RepositoryError> {
        self.check("merge")?;
        self.require_current(into)?;
        self.calls.push(format!("merge {} -> {}", source, into));
        let result = self
            .merge_script
            .get(&(source.to_string(), into.to_string()))
            .cloned()
            .unwrap_or(MergeResult::Clean);
        match &result {
            MergeResult::Clean => {
                *self.branches.entry(into.to_string()).or_default() += 1;
                self.merge_commits.push((into.into(), message.into()));
                self.fire_cancel();
            }
            MergeResult::Conflicted(paths) => {
                self.in_progress = Some((into.into(), paths.clone()));
            }
        }
        Ok(result)
    }

    fn conflicted_file_content(&self, path: &str) -> Result<String, RepositoryError> {
        self.check("conflicted_file_content")?;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| RepositoryError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }

    fn write_resolved_content(&mut self, path: &str, text: &str) -> Result<(), RepositoryError> {
        self.check("write_resolved_content")?;
        self.files.insert(path.into(), text.into());
        self.calls.push(format!("write {}", path));
        Ok(())
    }

    fn stage(&mut self, path: &str) -> Result<(), RepositoryError> {
        self.check("stage")?;
        self.staged.insert(path.into());
        self.calls.push(format!("stage {}", path));
        Ok(())
    }

    fn commit_merge(&mut self, into: &str, message: &str) -> Result<(), RepositoryError> {
        self.check("commit_merge")?;
        self.require_current(into)?;
        let Some((target, paths)) = self.in_progress.take() else {
            return Err(RepositoryError::CommandFailed {
                exit_code: 128,
                stderr: "no merge in progress".into(),
            });
        };
        if let Some(unstaged) = paths.iter().find(|p| !self.staged.contains(*p)) {
            let stderr = format!("unmerged path {}", unstaged);
            self.in_progress = Some((target, paths));
            return Err(RepositoryError::CommandFailed { exit_code: 1, stderr });
        }
        *self.branches.entry(target.clone()).or_default() += 1;
        self.merge_commits.push((target, message.into()));
        self.staged.clear();
        self.calls.push(format!("commit_merge {}", into));
        self.fire_cancel();
        Ok(())
    }

    fn tag(&mut self, name: &str, on_branch: &str, message: &str) -> Result<(), RepositoryError> {
        self.check("tag")?;
        if !self.branches.contains_key(on_branch) {
            return Err(RepositoryError::RefNotFound(on_branch.into()));
        }
        self.tags
            .insert(name.into(), (on_branch.into(), message.into()));
        self.calls.push(format!("tag {} on {}", name, on_branch));
        Ok(())
    }

    fn delete_branch(&mut self, name: &str) -> Result<(), RepositoryError> {
        self.check("delete_branch")?;
        if self.branches.remove(name).is_none() {
            return Err(RepositoryError::RefNotFound(name.into()));
        }
        self.calls.push(format!("delete_branch {}", name));
        Ok(())
    }

    fn push(&mut self, remote: &str, refs: &BTreeSet<String>) -> Result<(), RepositoryError> {
        self.check("push")?;
        self.pushed.push((remote.into(), refs.clone()));
        self.calls.push(format!("push {}", remote));
        Ok(())
    }
}
