//! gitflow core library.
//!
//! This crate provides the components for driving git-flow branch
//! lifecycles: the branch naming policy, layered configuration, the
//! repository port and its git implementation, the transition orchestrator,
//! and deterministic repair of version conflicts in Maven POM files.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod repository;

// Re-exports for convenience.
pub use config::FlowConfig;
pub use conflict::{DescriptorConflictResolver, DescriptorMatcher, VersionPrecedence};
pub use errors::{ConfigError, FlowError, RepositoryError, ResolverError, TransitionError};
pub use models::{FinishOptions, TransitionReport, TransitionRequest, TransitionState};
pub use orchestrator::{CancelHandle, FlowOptions, Orchestrator};
pub use policy::{BranchKind, BranchNamingPolicy, BranchRef};
pub use repository::{GitRepository, MergeResult, RepositoryPort};
