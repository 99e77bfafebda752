//! git-flow branch lifecycle orchestration.
//!
//! The [`Orchestrator`] drives start and finish transitions through a fixed
//! state machine:
//!
//! 1. **NotStarted** -- validate the request, the working tree and every
//!    branch/tag the transition depends on. Nothing is mutated yet.
//! 2. **Branching** -- (start) create the branch and check it out.
//! 3. **Merging** -- (finish) merge the source into each target in order:
//!    trunk then integration for releases and hotfixes, integration only for
//!    features.
//! 4. **ConflictResolution** -- repair version-only descriptor conflicts;
//!    anything else aborts with the repository left mid-merge.
//! 5. **Tagging** -- cut the version tag on trunk (releases and hotfixes).
//! 6. **Cleanup** -- best-effort branch deletion and push.
//!
//! Completed merges are never rolled back. An aborted transition reports
//! the state it stopped in via [`TransitionError::step`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::conflict::{DescriptorConflictResolver, DescriptorMatcher, ResolutionOutcome, ResolveContext};
use crate::errors::{ConfigError, FlowError, RepositoryError, TransitionError};
use crate::models::{
    FinishOptions, MergeOutcome, MergeRecord, TransitionAction, TransitionReport, TransitionRequest,
    TransitionState,
};
use crate::policy::{BranchKind, BranchNamingPolicy, BranchRef};
use crate::repository::{MergeResult, RepositoryPort};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub policy: BranchNamingPolicy,
    pub matcher: DescriptorMatcher,
    pub resolver: DescriptorConflictResolver,
    /// Start releases from integration instead of trunk.
    pub release_from_integration: bool,
    pub push: bool,
    pub remote: String,
    pub keep_branch: bool,
    pub message_prefix: String,
    pub message_suffix: String,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from_config(&FlowConfig::default())
    }
}

impl FlowOptions {
    pub fn from_config(config: &FlowConfig) -> Self {
        Self {
            policy: config.policy(),
            matcher: config.matcher(),
            resolver: config.resolver(),
            release_from_integration: config.start.release_from_integration,
            push: config.finish.push,
            remote: config.finish.remote.clone(),
            keep_branch: config.finish.keep_branch,
            message_prefix: config.finish.message_prefix.clone(),
            message_suffix: config.finish.message_suffix.clone(),
        }
    }

    fn decorate(&self, message: String) -> String {
        format!("{}{}{}", self.message_prefix, message, self.message_suffix)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Requests cancellation of the orchestrator's transitions from another
/// thread.
///
/// A request is honoured only until the first merge of a finish has been
/// committed; after that it is recorded as a warning and the transition
/// runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending request.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives git-flow transitions against one repository.
pub struct Orchestrator<R: RepositoryPort> {
    port: R,
    options: FlowOptions,
    cancel: CancelHandle,
}

impl<R: RepositoryPort> Orchestrator<R> {
    /// Create an orchestrator. Fails if the naming policy or resolver
    /// settings are invalid.
    pub fn new(port: R, options: FlowOptions) -> Result<Self, ConfigError> {
        options.policy.validate()?;
        options.resolver.validate()?;
        if options.matcher.patterns().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resolver.descriptor_patterns".into(),
                detail: "descriptor patterns must be non-empty".into(),
            });
        }
        info!(
            trunk = options.policy.trunk_branch(),
            integration = options.policy.integration_branch(),
            "initializing orchestrator"
        );
        Ok(Self {
            port,
            options,
            cancel: CancelHandle::default(),
        })
    }

    pub fn port(&self) -> &R {
        &self.port
    }

    pub fn into_port(self) -> R {
        self.port
    }

    pub fn policy(&self) -> &BranchNamingPolicy {
        &self.options.policy
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Classify the checked-out branch.
    pub fn current_branch(&self) -> Result<BranchRef, FlowError> {
        let name = self.port.current_branch()?;
        self.options.policy.classify(&name)
    }

    /// Local branches of `kind`, sorted by name.
    pub fn list(&self, kind: BranchKind) -> Result<Vec<BranchRef>, FlowError> {
        let mut branches: Vec<BranchRef> = self
            .port
            .list_branches()?
            .iter()
            .filter_map(|name| self.options.policy.classify(name).ok())
            .filter(|b| b.kind() == kind)
            .collect();
        branches.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(branches)
    }

    /// Prepare the repository for git-flow: trunk must exist, integration is
    /// created from trunk if missing. Returns whether integration was created.
    pub fn init(&mut self) -> Result<bool, FlowError> {
        let trunk = self.options.policy.trunk_branch().to_string();
        let integration = self.options.policy.integration_branch().to_string();

        if !self.port.branch_exists(&trunk)? {
            return Err(FlowError::UnrecognizedBranch(trunk));
        }
        if self.port.branch_exists(&integration)? {
            debug!(integration = integration.as_str(), "integration branch already present");
            return Ok(false);
        }
        self.port.create_branch(&integration, &trunk)?;
        info!(integration = integration.as_str(), trunk = trunk.as_str(), "created integration branch");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Create and check out a feature, release, hotfix or support branch.
    pub fn start(&mut self, request: TransitionRequest) -> Result<TransitionReport, TransitionError> {
        const ACTION: TransitionAction = TransitionAction::Start;
        let kind = request.kind;
        let abort = |step: TransitionState, err: FlowError| TransitionError::new(ACTION, step, err);

        if !BranchKind::PREFIXED.contains(&kind) {
            return Err(abort(
                TransitionState::NotStarted,
                FlowError::UnsupportedTransition { action: ACTION, kind },
            ));
        }
        let branch = self
            .options
            .policy
            .branch_name(kind, &request.identifier)
            .map_err(|e| abort(TransitionState::NotStarted, e))?;
        let mut report = TransitionReport::new(ACTION, kind, &request.identifier, &branch);

        let start_point = self
            .check_start_preconditions(&branch, kind, request.start_point.as_deref())
            .map_err(|e| abort(report.state, e))?;
        if self.cancel.take() {
            return Err(abort(report.state, FlowError::Cancelled));
        }

        enter(&mut report, TransitionState::Branching);
        self.port
            .create_branch(&branch, &start_point)
            .and_then(|()| self.port.checkout(&branch))
            .map_err(|e| abort(report.state, e.into()))?;

        info!(branch = branch.as_str(), start_point = start_point.as_str(), "branch started");
        report.start_point = Some(start_point);
        report.complete();
        Ok(report)
    }

    fn check_start_preconditions(
        &self,
        branch: &str,
        kind: BranchKind,
        start_point: Option<&str>,
    ) -> Result<String, FlowError> {
        if self.port.branch_exists(branch)? {
            return Err(FlowError::BranchExists(branch.to_string()));
        }

        let start_point = start_point
            .map(str::to_string)
            .unwrap_or_else(|| self.default_start_point(kind).to_string());
        if !self.port.branch_exists(&start_point)? {
            return Err(FlowError::UnrecognizedBranch(start_point));
        }

        self.ensure_clean()?;
        Ok(start_point)
    }

    fn default_start_point(&self, kind: BranchKind) -> &str {
        let policy = &self.options.policy;
        match kind {
            BranchKind::Feature => policy.integration_branch(),
            BranchKind::Release if self.options.release_from_integration => policy.integration_branch(),
            _ => policy.trunk_branch(),
        }
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    /// Merge a feature, release or hotfix branch back into its targets, tag
    /// releases and hotfixes on trunk, then retire the branch.
    pub fn finish(
        &mut self,
        kind: BranchKind,
        identifier: &str,
        opts: FinishOptions,
    ) -> Result<TransitionReport, TransitionError> {
        const ACTION: TransitionAction = TransitionAction::Finish;
        let abort = |step: TransitionState, err: FlowError| TransitionError::new(ACTION, step, err);

        let targets = self
            .finish_targets(kind)
            .ok_or_else(|| {
                abort(
                    TransitionState::NotStarted,
                    FlowError::UnsupportedTransition { action: ACTION, kind },
                )
            })?;
        let source = self
            .options
            .policy
            .branch_name(kind, identifier)
            .map_err(|e| abort(TransitionState::NotStarted, e))?;
        let tag = kind
            .is_tagged_on_finish()
            .then(|| self.options.policy.tag_name(identifier));

        let mut report = TransitionReport::new(ACTION, kind, identifier, &source);

        self.check_finish_preconditions(&source, &targets, tag.as_deref())
            .map_err(|e| abort(report.state, e))?;
        if self.cancel.take() {
            return Err(abort(report.state, FlowError::Cancelled));
        }

        // Merging (and ConflictResolution) per target, in order.
        for target in &targets {
            if self.cancel.take() {
                if report.merges.is_empty() {
                    return Err(abort(report.state, FlowError::Cancelled));
                }
                note_late_cancel(&mut report);
            }

            enter(&mut report, TransitionState::Merging);
            let record = self
                .merge_into(kind, &source, target)
                .map_err(|(step, e)| abort(step, e))?;
            report.merges.push(record);
        }

        // Tagging.
        if let Some(tag) = tag {
            if self.cancel.take() {
                note_late_cancel(&mut report);
            }
            enter(&mut report, TransitionState::Tagging);
            let trunk = self.options.policy.trunk_branch().to_string();
            let message = self
                .options
                .decorate(format!("Tagging {} {}", kind, identifier));
            self.port
                .tag(&tag, &trunk, &message)
                .map_err(|e| abort(report.state, e.into()))?;
            info!(tag = tag.as_str(), on = trunk.as_str(), "tag created");
            report.tag = Some(tag);
        }

        // Cleanup: nothing here aborts; the merges and tag are durable.
        if self.cancel.take() {
            note_late_cancel(&mut report);
        }
        enter(&mut report, TransitionState::Cleanup);
        let keep_branch = opts.keep_branch.unwrap_or(self.options.keep_branch);
        if keep_branch {
            debug!(branch = source.as_str(), "keeping source branch");
        } else {
            match self.port.delete_branch(&source) {
                Ok(()) => report.branch_deleted = true,
                Err(e) => {
                    warn!(branch = source.as_str(), error = %e, "failed to delete source branch");
                    report
                        .warnings
                        .push(format!("could not delete branch '{}': {}", source, e));
                }
            }
        }

        if opts.push.unwrap_or(self.options.push) {
            let refs = self.refs_to_push(&targets, report.tag.as_deref());
            match self.port.push(&self.options.remote, &refs) {
                Ok(()) => report.pushed = refs.into_iter().collect(),
                Err(e) => {
                    warn!(remote = self.options.remote.as_str(), error = %e, "push failed");
                    report
                        .warnings
                        .push(format!("could not push to '{}': {}", self.options.remote, e));
                }
            }
        }

        report.complete();
        info!(
            branch = source.as_str(),
            merges = report.merges.len(),
            warnings = report.warnings.len(),
            "finish complete"
        );
        Ok(report)
    }

    /// Merge targets in order, or `None` if `kind` cannot be finished.
    fn finish_targets(&self, kind: BranchKind) -> Option<Vec<String>> {
        let policy = &self.options.policy;
        match kind {
            BranchKind::Feature => Some(vec![policy.integration_branch().to_string()]),
            BranchKind::Release | BranchKind::Hotfix => Some(vec![
                policy.trunk_branch().to_string(),
                policy.integration_branch().to_string(),
            ]),
            BranchKind::Trunk | BranchKind::Integration | BranchKind::Support => None,
        }
    }

    fn check_finish_preconditions(
        &self,
        source: &str,
        targets: &[String],
        tag: Option<&str>,
    ) -> Result<(), FlowError> {
        for branch in std::iter::once(source).chain(targets.iter().map(String::as_str)) {
            if !self.port.branch_exists(branch)? {
                return Err(FlowError::UnrecognizedBranch(branch.to_string()));
            }
        }
        if let Some(tag) = tag {
            if self.port.tag_exists(tag)? {
                return Err(FlowError::TagExists(tag.to_string()));
            }
        }
        self.ensure_clean()
    }

    /// Merge `source` into `target`, repairing descriptor conflicts. Errors
    /// carry the state they occurred in.
    fn merge_into(
        &mut self,
        kind: BranchKind,
        source: &str,
        target: &str,
    ) -> Result<MergeRecord, (TransitionState, FlowError)> {
        let merging = |e: RepositoryError| (TransitionState::Merging, FlowError::from(e));
        let message = self
            .options
            .decorate(format!("Merge branch '{}' into {}", source, target));

        self.port.checkout(target).map_err(merging)?;
        let result = self
            .port
            .merge(source, target, true, &message)
            .map_err(merging)?;

        let paths = match result {
            MergeResult::Clean => {
                info!(source, into = target, "merged cleanly");
                return Ok(MergeRecord {
                    target: target.to_string(),
                    outcome: MergeOutcome::Clean,
                });
            }
            MergeResult::Conflicted(paths) => paths,
        };

        info!(
            source,
            into = target,
            count = paths.len(),
            step = %TransitionState::ConflictResolution,
            "entering conflict resolution"
        );
        let resolving = |e: FlowError| (TransitionState::ConflictResolution, e);
        let resolved = self
            .resolve_conflicts(kind, source, target, &paths)
            .map_err(resolving)?;
        self.port
            .commit_merge(target, &message)
            .map_err(|e| resolving(e.into()))?;

        info!(source, into = target, files = resolved.len(), "merge committed after automatic repair");
        Ok(MergeRecord {
            target: target.to_string(),
            outcome: MergeOutcome::AutoResolved { paths: resolved },
        })
    }

    /// Repair every conflicted path or fail without writing anything.
    fn resolve_conflicts(
        &mut self,
        kind: BranchKind,
        source: &str,
        target: &str,
        paths: &BTreeSet<String>,
    ) -> Result<Vec<String>, FlowError> {
        let escalate = || FlowError::MergeConflict {
            target: target.to_string(),
            paths: paths.iter().cloned().collect(),
        };

        let (descriptors, others) = self.options.matcher.partition(paths);
        if !others.is_empty() {
            warn!(into = target, paths = ?others, "conflicts outside descriptor files");
            return Err(escalate());
        }

        let mut files = Vec::with_capacity(descriptors.len());
        for path in descriptors {
            let text = self.port.conflicted_file_content(&path)?;
            files.push((path, text));
        }

        let ctx = ResolveContext {
            transition: kind,
            target: target.to_string(),
            source: source.to_string(),
        };
        match self.options.resolver.resolve_files(&ctx, files) {
            ResolutionOutcome::FullyResolved(resolved) => {
                let mut written = Vec::with_capacity(resolved.len());
                for file in resolved {
                    self.port.write_resolved_content(&file.path, &file.content)?;
                    self.port.stage(&file.path)?;
                    written.push(file.path);
                }
                Ok(written)
            }
            ResolutionOutcome::Escalated { unresolved_paths } => {
                warn!(into = target, paths = ?unresolved_paths, "descriptor conflicts need manual resolution");
                Err(escalate())
            }
        }
    }

    fn refs_to_push(&self, targets: &[String], tag: Option<&str>) -> BTreeSet<String> {
        targets
            .iter()
            .map(|t| format!("refs/heads/{}", t))
            .chain(tag.map(|t| format!("refs/tags/{}", t)))
            .collect()
    }

    fn ensure_clean(&self) -> Result<(), FlowError> {
        if self.port.has_uncommitted_changes()? {
            let current = self.port.current_branch()?;
            return Err(FlowError::UncommittedChanges(current));
        }
        Ok(())
    }
}

fn enter(report: &mut TransitionReport, state: TransitionState) {
    report.state = state;
    info!(
        action = %report.action,
        branch = report.branch.as_str(),
        step = %state,
        "transition step"
    );
}

fn note_late_cancel(report: &mut TransitionReport) {
    warn!(branch = report.branch.as_str(), step = %report.state, "cancellation ignored after merge commit");
    report.warnings.push(format!(
        "cancellation requested during {} was ignored: merges are already committed",
        report.state
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fake::FakeRepository;

    const VERSION_ONLY_POM: &str = "\
<project>
<<<<<<< HEAD
  <version>1.0.0</version>
||||||| merged common ancestors
  <version>0.9.0</version>
=======
  <version>2.0.0</version>
>>>>>>> release/2.0.0
</project>
";

    const DEPENDENCY_POM: &str = "\
<project>
  <dependencies>
<<<<<<< HEAD
    <dependency><artifactId>guava</artifactId></dependency>
=======
    <dependency><artifactId>commons-lang</artifactId></dependency>
>>>>>>> release/2.0.0
  </dependencies>
</project>
";

    fn orchestrator(repo: FakeRepository) -> Orchestrator<FakeRepository> {
        Orchestrator::new(repo, FlowOptions::default()).unwrap()
    }

    fn conflicted(paths: &[&str]) -> MergeResult {
        MergeResult::Conflicted(paths.iter().map(|p| p.to_string()).collect())
    }

    fn release_repo() -> FakeRepository {
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("release/2.0.0");
        repo
    }

    // -----------------------------------------------------------------------
    // Construction & queries
    // -----------------------------------------------------------------------

    #[test]
    fn test_new_rejects_invalid_policy() {
        let options = FlowOptions {
            policy: BranchNamingPolicy::default().with_prefixes("f/", "f/", "h/", "s/"),
            ..FlowOptions::default()
        };
        assert!(matches!(
            Orchestrator::new(FakeRepository::with_flow_branches(), options),
            Err(ConfigError::PrefixCollision { .. })
        ));
    }

    #[test]
    fn test_current_branch_and_list() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("feature/b");
        repo.add_branch("feature/a");
        repo.add_branch("release/1.0");
        repo.add_branch("scratch");
        repo.current = "feature/a".into();
        let orch = orchestrator(repo);

        let current = orch.current_branch().unwrap();
        assert_eq!(current.kind(), BranchKind::Feature);
        assert_eq!(current.short_name(), "a");

        let features: Vec<String> = orch
            .list(BranchKind::Feature)
            .unwrap()
            .iter()
            .map(|b| b.short_name().to_string())
            .collect();
        assert_eq!(features, vec!["a", "b"]);
        assert_eq!(orch.list(BranchKind::Hotfix).unwrap().len(), 0);
    }

    #[test]
    fn test_init_creates_integration_once() {
        let mut repo = FakeRepository::default();
        repo.add_branch("master");
        repo.current = "master".into();
        let mut orch = orchestrator(repo);

        assert!(orch.init().unwrap());
        assert!(orch.port().branches.contains_key("develop"));
        assert!(!orch.init().unwrap());

        let mut orch = orchestrator(FakeRepository::default());
        assert!(matches!(orch.init(), Err(FlowError::UnrecognizedBranch(ref b)) if b == "master"));
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    #[test]
    fn test_start_feature_branches_from_integration() {
        let mut orch = orchestrator(FakeRepository::with_flow_branches());
        let report = orch
            .start(TransitionRequest::new(BranchKind::Feature, "login"))
            .unwrap();

        assert_eq!(report.state, TransitionState::Done);
        assert_eq!(report.branch, "feature/login");
        assert_eq!(report.start_point.as_deref(), Some("develop"));
        let repo = orch.port();
        assert_eq!(repo.current, "feature/login");
        assert_eq!(
            repo.calls,
            vec!["create_branch feature/login from develop", "checkout feature/login"]
        );
    }

    #[test]
    fn test_start_points_per_kind() {
        for (kind, expected) in [
            (BranchKind::Release, "master"),
            (BranchKind::Hotfix, "master"),
            (BranchKind::Support, "master"),
        ] {
            let mut orch = orchestrator(FakeRepository::with_flow_branches());
            let report = orch.start(TransitionRequest::new(kind, "1.0")).unwrap();
            assert_eq!(report.start_point.as_deref(), Some(expected), "{}", kind);
        }

        let options = FlowOptions {
            release_from_integration: true,
            ..FlowOptions::default()
        };
        let mut orch = Orchestrator::new(FakeRepository::with_flow_branches(), options).unwrap();
        let report = orch
            .start(TransitionRequest::new(BranchKind::Release, "1.0"))
            .unwrap();
        assert_eq!(report.start_point.as_deref(), Some("develop"));
    }

    #[test]
    fn test_start_with_explicit_start_point() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("support/1.x");
        let mut orch = orchestrator(repo);
        let report = orch
            .start(TransitionRequest::new(BranchKind::Hotfix, "1.0.1").with_start_point("support/1.x"))
            .unwrap();
        assert_eq!(report.start_point.as_deref(), Some("support/1.x"));

        let err = orch
            .start(TransitionRequest::new(BranchKind::Hotfix, "1.0.2").with_start_point("nope"))
            .unwrap_err();
        assert!(matches!(err.source, FlowError::UnrecognizedBranch(ref b) if b == "nope"));
    }

    #[test]
    fn test_start_existing_branch_fails_without_mutation() {
        for kind in [BranchKind::Feature, BranchKind::Release, BranchKind::Hotfix] {
            let mut repo = FakeRepository::with_flow_branches();
            let existing = format!("{}/x", kind);
            repo.add_branch(&existing);
            let before = repo.branches.clone();
            let mut orch = orchestrator(repo);

            let err = orch.start(TransitionRequest::new(kind, "x")).unwrap_err();
            assert_eq!(err.step, TransitionState::NotStarted);
            assert!(matches!(err.source, FlowError::BranchExists(ref b) if *b == existing));

            let repo = orch.into_port();
            assert!(repo.calls.is_empty());
            assert_eq!(repo.branches, before);
            assert!(repo.merge_commits.is_empty());
        }
    }

    #[test]
    fn test_start_refuses_dirty_tree() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.dirty = true;
        let mut orch = orchestrator(repo);
        let err = orch
            .start(TransitionRequest::new(BranchKind::Feature, "x"))
            .unwrap_err();
        assert!(matches!(err.source, FlowError::UncommittedChanges(ref b) if b == "develop"));
        assert!(orch.port().calls.is_empty());
    }

    #[test]
    fn test_start_rejects_bad_identifier_and_kind() {
        let mut orch = orchestrator(FakeRepository::with_flow_branches());
        let err = orch
            .start(TransitionRequest::new(BranchKind::Feature, "has space"))
            .unwrap_err();
        assert!(matches!(err.source, FlowError::InvalidIdentifier { .. }));

        let err = orch
            .start(TransitionRequest::new(BranchKind::Trunk, "x"))
            .unwrap_err();
        assert!(matches!(err.source, FlowError::UnsupportedTransition { .. }));
        assert!(orch.port().calls.is_empty());
    }

    #[test]
    fn test_start_repository_failure_reports_branching_step() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.fail_on.insert("create_branch");
        let mut orch = orchestrator(repo);
        let err = orch
            .start(TransitionRequest::new(BranchKind::Feature, "x"))
            .unwrap_err();
        assert_eq!(err.step, TransitionState::Branching);
        assert!(matches!(
            err.source,
            FlowError::Repository(RepositoryError::CommandFailed { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    #[test]
    fn test_finish_release_end_to_end() {
        let mut orch = orchestrator(release_repo());
        let report = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap();

        assert_eq!(report.state, TransitionState::Done);
        assert_eq!(report.tag.as_deref(), Some("2.0.0"));
        assert!(report.branch_deleted);
        assert!(report.warnings.is_empty());
        assert!(report.completed_at.is_some());
        let targets: Vec<&str> = report.merges.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(targets, vec!["master", "develop"]);

        let repo = orch.port();
        assert_eq!(
            repo.merge_commits,
            vec![
                ("master".to_string(), "Merge branch 'release/2.0.0' into master".to_string()),
                ("develop".to_string(), "Merge branch 'release/2.0.0' into develop".to_string()),
            ]
        );
        assert_eq!(
            repo.tags.get("2.0.0"),
            Some(&("master".to_string(), "Tagging release 2.0.0".to_string()))
        );
        assert!(!repo.branches.contains_key("release/2.0.0"));
        assert!(repo.pushed.is_empty());
    }

    #[test]
    fn test_finish_feature_merges_integration_only() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("feature/login");
        let mut orch = orchestrator(repo);
        let report = orch
            .finish(BranchKind::Feature, "login", FinishOptions::default())
            .unwrap();

        assert_eq!(report.merges.len(), 1);
        assert_eq!(report.merges[0].target, "develop");
        assert!(report.tag.is_none());
        let repo = orch.port();
        assert_eq!(repo.commits_on("master"), 1);
        assert!(repo.tags.is_empty());
    }

    #[test]
    fn test_finish_uses_tag_prefix_and_message_decoration() {
        let options = FlowOptions {
            policy: BranchNamingPolicy::default().with_tag_prefix("v"),
            message_prefix: "[flow] ".into(),
            message_suffix: " (auto)".into(),
            ..FlowOptions::default()
        };
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("hotfix/1.0.1");
        let mut orch = Orchestrator::new(repo, options).unwrap();
        let report = orch
            .finish(BranchKind::Hotfix, "1.0.1", FinishOptions::default())
            .unwrap();

        assert_eq!(report.tag.as_deref(), Some("v1.0.1"));
        let repo = orch.port();
        assert_eq!(repo.tags["v1.0.1"].1, "[flow] Tagging hotfix 1.0.1 (auto)");
        assert_eq!(
            repo.merge_commits[0].1,
            "[flow] Merge branch 'hotfix/1.0.1' into master (auto)"
        );
    }

    #[test]
    fn test_finish_auto_resolves_version_conflict() {
        let mut repo = release_repo();
        repo.script_merge("release/2.0.0", "master", conflicted(&["pom.xml", "core/pom.xml"]));
        repo.files.insert("pom.xml".into(), VERSION_ONLY_POM.into());
        repo.files.insert("core/pom.xml".into(), VERSION_ONLY_POM.into());
        let mut orch = orchestrator(repo);

        let report = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap();

        assert_eq!(report.state, TransitionState::Done);
        assert_eq!(
            report.merges[0].outcome,
            MergeOutcome::AutoResolved {
                paths: vec!["core/pom.xml".into(), "pom.xml".into()]
            }
        );
        assert_eq!(report.merges[1].outcome, MergeOutcome::Clean);

        let repo = orch.port();
        let pom = &repo.files["pom.xml"];
        assert_eq!(pom, "<project>\n  <version>1.0.0</version>\n</project>\n");
        assert_eq!(repo.merge_commits.len(), 2);
        assert!(repo.calls.contains(&"stage pom.xml".to_string()));
        assert!(!repo.merge_in_progress());
    }

    #[test]
    fn test_finish_non_version_conflict_aborts_at_trunk() {
        let mut repo = release_repo();
        repo.script_merge("release/2.0.0", "master", conflicted(&["pom.xml"]));
        repo.files.insert("pom.xml".into(), DEPENDENCY_POM.into());
        let mut orch = orchestrator(repo);

        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert_eq!(err.step, TransitionState::ConflictResolution);
        match &err.source {
            FlowError::MergeConflict { target, paths } => {
                assert_eq!(target, "master");
                assert_eq!(paths, &vec!["pom.xml".to_string()]);
            }
            other => panic!("expected MergeConflict, got {:?}", other),
        }

        let repo = orch.port();
        assert_eq!(repo.commits_on("develop"), 1);
        assert!(!repo.calls.iter().any(|c| c.contains("-> develop")));
        assert!(repo.branches.contains_key("release/2.0.0"));
        assert!(repo.tags.is_empty());
        assert_eq!(repo.files["pom.xml"], DEPENDENCY_POM);
        assert!(repo.merge_in_progress());
    }

    #[test]
    fn test_finish_escalates_non_descriptor_paths_untouched() {
        let mut repo = release_repo();
        repo.script_merge(
            "release/2.0.0",
            "master",
            conflicted(&["pom.xml", "src/App.java"]),
        );
        repo.files.insert("pom.xml".into(), VERSION_ONLY_POM.into());
        let mut orch = orchestrator(repo);

        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.source,
            FlowError::MergeConflict { ref paths, .. } if paths == &vec!["pom.xml".to_string(), "src/App.java".to_string()]
        ));
        let repo = orch.port();
        assert_eq!(repo.files["pom.xml"], VERSION_ONLY_POM);
        assert!(repo.staged.is_empty());
    }

    #[test]
    fn test_finish_partial_escalation_writes_nothing() {
        let mut repo = release_repo();
        repo.script_merge("release/2.0.0", "develop", conflicted(&["a/pom.xml", "b/pom.xml"]));
        repo.files.insert("a/pom.xml".into(), VERSION_ONLY_POM.into());
        repo.files.insert("b/pom.xml".into(), DEPENDENCY_POM.into());
        let mut orch = orchestrator(repo);

        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(err.source, FlowError::MergeConflict { ref target, .. } if target == "develop"));

        // Trunk merge stays committed; nothing is rolled back.
        let repo = orch.port();
        assert_eq!(repo.commits_on("master"), 2);
        assert_eq!(repo.files["a/pom.xml"], VERSION_ONLY_POM);
        assert!(!repo.calls.iter().any(|c| c.starts_with("write")));
    }

    #[test]
    fn test_refinish_after_completion_is_unrecognized() {
        let mut orch = orchestrator(release_repo());
        orch.finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap();
        let branches = orch.port().branches.clone();
        let tags = orch.port().tags.clone();

        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert_eq!(err.step, TransitionState::NotStarted);
        assert!(matches!(err.source, FlowError::UnrecognizedBranch(ref b) if b == "release/2.0.0"));
        assert_eq!(orch.port().branches, branches);
        assert_eq!(orch.port().tags, tags);
    }

    #[test]
    fn test_finish_existing_tag_fails_fast() {
        let mut repo = release_repo();
        repo.tags
            .insert("2.0.0".into(), ("master".into(), "old".into()));
        let mut orch = orchestrator(repo);

        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(err.source, FlowError::TagExists(ref t) if t == "2.0.0"));
        assert!(orch.port().calls.is_empty());
    }

    #[test]
    fn test_finish_support_is_unsupported() {
        let mut repo = FakeRepository::with_flow_branches();
        repo.add_branch("support/1.x");
        let mut orch = orchestrator(repo);
        let err = orch
            .finish(BranchKind::Support, "1.x", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.source,
            FlowError::UnsupportedTransition {
                action: TransitionAction::Finish,
                kind: BranchKind::Support
            }
        ));
    }

    #[test]
    fn test_finish_refuses_dirty_tree() {
        let mut repo = release_repo();
        repo.dirty = true;
        let mut orch = orchestrator(repo);
        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(err.source, FlowError::UncommittedChanges(_)));
        assert!(orch.port().calls.is_empty());
    }

    #[test]
    fn test_finish_merge_failure_reports_merging_step() {
        let mut repo = release_repo();
        repo.fail_on.insert("merge");
        let mut orch = orchestrator(repo);
        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert_eq!(err.step, TransitionState::Merging);
        assert!(matches!(err.source, FlowError::Repository(_)));
    }

    #[test]
    fn test_finish_tag_failure_is_fatal() {
        let mut repo = release_repo();
        repo.fail_on.insert("tag");
        let mut orch = orchestrator(repo);
        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert_eq!(err.step, TransitionState::Tagging);
        assert!(orch.port().branches.contains_key("release/2.0.0"));
    }

    #[test]
    fn test_finish_delete_and_push_failures_are_warnings() {
        let mut repo = release_repo();
        repo.fail_on.insert("delete_branch");
        repo.fail_on.insert("push");
        let mut orch = orchestrator(repo);
        let report = orch
            .finish(
                BranchKind::Release,
                "2.0.0",
                FinishOptions {
                    push: Some(true),
                    keep_branch: None,
                },
            )
            .unwrap();

        assert_eq!(report.state, TransitionState::Done);
        assert!(!report.branch_deleted);
        assert!(report.pushed.is_empty());
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("release/2.0.0"));
        assert!(report.warnings[1].contains("origin"));
    }

    #[test]
    fn test_finish_push_and_keep_branch() {
        let mut orch = orchestrator(release_repo());
        let report = orch
            .finish(
                BranchKind::Release,
                "2.0.0",
                FinishOptions {
                    push: Some(true),
                    keep_branch: Some(true),
                },
            )
            .unwrap();

        assert!(!report.branch_deleted);
        assert_eq!(
            report.pushed,
            vec!["refs/heads/develop", "refs/heads/master", "refs/tags/2.0.0"]
        );
        let repo = orch.port();
        assert!(repo.branches.contains_key("release/2.0.0"));
        assert_eq!(repo.pushed[0].0, "origin");
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn test_cancel_before_first_merge_aborts() {
        let mut orch = orchestrator(release_repo());
        orch.cancel_handle().cancel();
        let err = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap_err();
        assert!(matches!(err.source, FlowError::Cancelled));
        assert!(orch.port().calls.is_empty());

        // The request is consumed; the next transition runs normally.
        assert!(!orch.cancel_handle().is_cancelled());
        orch.finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap();
    }

    #[test]
    fn test_cancel_after_first_merge_is_a_warning() {
        let mut orch = orchestrator(release_repo());
        orch.port.cancel_after_merge = Some(orch.cancel_handle());

        let report = orch
            .finish(BranchKind::Release, "2.0.0", FinishOptions::default())
            .unwrap();
        assert_eq!(report.state, TransitionState::Done);
        assert_eq!(report.merges.len(), 2);
        assert_eq!(report.tag.as_deref(), Some("2.0.0"));
        assert!(report.branch_deleted);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("cancellation requested during merging")));
    }
}
