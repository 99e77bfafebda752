//! [`RepositoryPort`] over a local git working copy.
//!
//! Ref queries and ref mutations (branches, tags) go through `git2`.
//! Operations that touch the index or working tree (checkout, merge,
//! staging, committing, pushing) run the `git` binary so that hooks,
//! attributes and merge drivers behave exactly as they would for a user.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use git2::{BranchType, ErrorCode, Repository, Signature};
use tracing::{debug, info, instrument, warn};

use super::{MergeResult, RepositoryPort};
use crate::errors::RepositoryError;

const FALLBACK_NAME: &str = "gitflow";
const FALLBACK_EMAIL: &str = "gitflow@localhost";

/// A git working copy.
pub struct GitRepository {
    repo: Repository,
    workdir: PathBuf,
}

impl GitRepository {
    /// Open the repository containing `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::discover(path)
            .map_err(|_| RepositoryError::RepositoryNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| RepositoryError::RepositoryNotFound(format!("{} (bare)", path.display())))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// The repository's layered git config (local, global, system).
    pub fn config(&self) -> Result<git2::Config, RepositoryError> {
        Ok(self.repo.config()?)
    }

    /// Write `key = value` pairs into the repository-local git config.
    #[instrument(skip(self, entries))]
    pub fn write_config(&self, entries: &[(String, String)]) -> Result<(), RepositoryError> {
        let mut config = self.repo.config()?.open_level(git2::ConfigLevel::Local)?;
        for (key, value) in entries {
            config.set_str(key, value)?;
            debug!(key = key.as_str(), value = value.as_str(), "set git config");
        }
        Ok(())
    }

    /// Paths with unmerged index entries.
    pub fn conflicted_paths(&self) -> Result<BTreeSet<String>, RepositoryError> {
        let output = self.git(&["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(output
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn ensure_checked_out(&self, expected: &str) -> Result<(), RepositoryError> {
        let actual = self.current_branch()?;
        if actual != expected {
            return Err(RepositoryError::WrongBranch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn signature(&self) -> Result<Signature<'static>, RepositoryError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(e) => {
                debug!(error = %e, "no configured identity, using fallback signature");
                Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?)
            }
        }
    }

    /// Run `git` in the working copy; non-zero exit is an error.
    fn git(&self, args: &[&str]) -> Result<String, RepositoryError> {
        let output = self.run_git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "git command failed");
            return Err(RepositoryError::CommandFailed { exit_code, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_git(&self, args: &[&str]) -> Result<std::process::Output, RepositoryError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepositoryError::BinaryNotFound("git".into())
            } else {
                RepositoryError::IoError(e)
            }
        })
    }
}

impl RepositoryPort for GitRepository {
    fn current_branch(&self) -> Result<String, RepositoryError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => head
                .shorthand()
                .map(str::to_string)
                .ok_or_else(|| RepositoryError::RefNotFound("HEAD (non-UTF-8 branch name)".into())),
            Ok(_) => Err(RepositoryError::RefNotFound("HEAD (detached)".into())),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // No commits yet: HEAD still names the branch symbolically.
                let head = self.repo.find_reference("HEAD")?;
                head.symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .ok_or_else(|| RepositoryError::RefNotFound("HEAD".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_branches(&self) -> Result<Vec<String>, RepositoryError> {
        let branches = self.repo.branches(Some(BranchType::Local))?;
        let mut names = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn branch_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) if e.code() == ErrorCode::InvalidSpec => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        match self.repo.find_reference(&format!("refs/tags/{}", name)) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) if e.code() == ErrorCode::InvalidSpec => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn has_uncommitted_changes(&self) -> Result<bool, RepositoryError> {
        let status = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!status.trim().is_empty())
    }

    #[instrument(skip(self))]
    fn create_branch(&mut self, name: &str, start_point: &str) -> Result<(), RepositoryError> {
        if self.branch_exists(name)? {
            return Err(RepositoryError::BranchExists(name.to_string()));
        }
        let commit = self
            .repo
            .revparse_single(start_point)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| RepositoryError::RefNotFound(start_point.to_string()))?;
        self.repo.branch(name, &commit, false)?;
        info!(name, start_point, "created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    fn checkout(&mut self, name: &str) -> Result<(), RepositoryError> {
        if self.has_uncommitted_changes()? {
            let current = self.current_branch().unwrap_or_else(|_| "HEAD".into());
            return Err(RepositoryError::UncommittedChanges(current));
        }
        self.git(&["checkout", "--quiet", name, "--"])?;
        debug!(name, "checked out");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn merge(
        &mut self,
        source: &str,
        into: &str,
        no_fast_forward: bool,
        message: &str,
    ) -> Result<MergeResult, RepositoryError> {
        self.ensure_checked_out(into)?;

        let mut args = vec!["-c", "merge.conflictStyle=diff3", "merge", "--no-edit", "-m", message];
        if no_fast_forward {
            args.push("--no-ff");
        }
        args.push(source);

        let output = self.run_git(&args)?;
        if output.status.success() {
            info!(source, into, "merge completed cleanly");
            return Ok(MergeResult::Clean);
        }

        let conflicted = self.conflicted_paths()?;
        if conflicted.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "merge failed without conflicts");
            return Err(RepositoryError::CommandFailed { exit_code, stderr });
        }

        info!(source, into, count = conflicted.len(), "merge stopped with conflicts");
        Ok(MergeResult::Conflicted(conflicted))
    }

    fn conflicted_file_content(&self, path: &str) -> Result<String, RepositoryError> {
        Ok(std::fs::read_to_string(self.workdir.join(path))?)
    }

    fn write_resolved_content(&mut self, path: &str, text: &str) -> Result<(), RepositoryError> {
        std::fs::write(self.workdir.join(path), text)?;
        debug!(path, "wrote resolved content");
        Ok(())
    }

    fn stage(&mut self, path: &str) -> Result<(), RepositoryError> {
        self.git(&["add", "--", path])?;
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn commit_merge(&mut self, into: &str, message: &str) -> Result<(), RepositoryError> {
        self.ensure_checked_out(into)?;
        let remaining = self.conflicted_paths()?;
        if !remaining.is_empty() {
            return Err(RepositoryError::CommandFailed {
                exit_code: 1,
                stderr: format!(
                    "cannot commit merge, unmerged paths remain: {}",
                    remaining.into_iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }
        self.git(&["commit", "--quiet", "--no-edit", "-m", message])?;
        info!(into, "merge commit created");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn tag(&mut self, name: &str, on_branch: &str, message: &str) -> Result<(), RepositoryError> {
        let branch = self
            .repo
            .find_branch(on_branch, BranchType::Local)
            .map_err(|_| RepositoryError::RefNotFound(on_branch.to_string()))?;
        let commit = branch.get().peel_to_commit()?;
        let tagger = self.signature()?;
        let oid = self.repo.tag(name, commit.as_object(), &tagger, message, false)?;
        info!(name, on_branch, tag = %oid, "created tag");
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_branch(&mut self, name: &str) -> Result<(), RepositoryError> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| RepositoryError::RefNotFound(name.to_string()))?;
        branch.delete()?;
        info!(name, "deleted branch");
        Ok(())
    }

    #[instrument(skip(self, refs))]
    fn push(&mut self, remote: &str, refs: &BTreeSet<String>) -> Result<(), RepositoryError> {
        if refs.is_empty() {
            return Ok(());
        }
        let mut args = vec!["push", "--quiet", remote];
        args.extend(refs.iter().map(String::as_str));
        self.git(&args)?;
        info!(remote, count = refs.len(), "pushed refs");
        Ok(())
    }
}
