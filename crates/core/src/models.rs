//! Domain model types shared by the orchestrator, the CLI and reports.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::policy::BranchKind;

// ---------------------------------------------------------------------------
// Transition actions and states
// ---------------------------------------------------------------------------

/// Which half of a branch lifecycle is being driven.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Start,
    Finish,
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

/// States of an in-flight transition.
///
/// `NotStarted → Branching → Merging → ConflictResolution → Tagging →
/// Cleanup → Done`. An aborted transition reports the state it was in via
/// [`crate::errors::TransitionError::step`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    NotStarted,
    Branching,
    Merging,
    ConflictResolution,
    Tagging,
    Cleanup,
    Done,
}

impl std::fmt::Display for TransitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Branching => write!(f, "branching"),
            Self::Merging => write!(f, "merging"),
            Self::ConflictResolution => write!(f, "conflict_resolution"),
            Self::Tagging => write!(f, "tagging"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One start operation: which kind of branch, its identifier, and an
/// optional explicit start point (defaulted per kind when `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub kind: BranchKind,
    pub identifier: String,
    pub start_point: Option<String>,
}

impl TransitionRequest {
    pub fn new(kind: BranchKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            start_point: None,
        }
    }

    pub fn with_start_point(mut self, start_point: impl Into<String>) -> Self {
        self.start_point = Some(start_point.into());
        self
    }
}

/// Per-invocation overrides for a finish transition. `None` falls back to
/// the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishOptions {
    pub push: Option<bool>,
    pub keep_branch: Option<bool>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How one finish merge concluded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum MergeOutcome {
    /// The merge produced no conflicts.
    Clean,
    /// Conflicts were confined to descriptor version elements and were
    /// repaired automatically before committing the merge.
    AutoResolved { paths: Vec<String> },
}

/// A merge of the source branch into one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRecord {
    pub target: String,
    #[serde(flatten)]
    pub outcome: MergeOutcome,
}

/// Summary of a completed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionReport {
    pub action: TransitionAction,
    pub kind: BranchKind,
    pub identifier: String,
    pub branch: String,
    pub state: TransitionState,
    /// Branch a start transition created from.
    pub start_point: Option<String>,
    pub merges: Vec<MergeRecord>,
    pub tag: Option<String>,
    pub branch_deleted: bool,
    pub pushed: Vec<String>,
    /// Best-effort steps that failed without aborting the transition.
    pub warnings: Vec<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl TransitionReport {
    pub fn new(action: TransitionAction, kind: BranchKind, identifier: &str, branch: &str) -> Self {
        Self {
            action,
            kind,
            identifier: identifier.to_string(),
            branch: branch.to_string(),
            state: TransitionState::NotStarted,
            start_point: None,
            merges: Vec::new(),
            tag: None,
            branch_deleted: false,
            pushed: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Mark the report as finished.
    pub fn complete(&mut self) {
        self.state = TransitionState::Done;
        self.completed_at = Some(Utc::now().to_rfc3339());
    }

    /// Whether any merge needed automatic conflict repair.
    pub fn auto_resolved_paths(&self) -> Vec<&str> {
        self.merges
            .iter()
            .filter_map(|m| match &m.outcome {
                MergeOutcome::AutoResolved { paths } => Some(paths),
                MergeOutcome::Clean => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }
}
