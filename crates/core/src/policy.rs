//! Branch naming conventions.
//!
//! A [`BranchNamingPolicy`] maps between branch names and their git-flow
//! role. It is built once from configuration, validated, and then shared
//! read-only by the orchestrator and the resolver.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, FlowError};

pub const DEFAULT_TRUNK_BRANCH: &str = "master";
pub const DEFAULT_INTEGRATION_BRANCH: &str = "develop";
pub const DEFAULT_FEATURE_PREFIX: &str = "feature/";
pub const DEFAULT_RELEASE_PREFIX: &str = "release/";
pub const DEFAULT_HOTFIX_PREFIX: &str = "hotfix/";
pub const DEFAULT_SUPPORT_PREFIX: &str = "support/";
pub const DEFAULT_TAG_PREFIX: &str = "";

// ---------------------------------------------------------------------------
// Branch kinds
// ---------------------------------------------------------------------------

/// The role a branch plays in the git-flow model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    Trunk,
    Integration,
    Feature,
    Release,
    Hotfix,
    Support,
}

impl BranchKind {
    /// Kinds identified by a prefix rather than a fixed name.
    pub const PREFIXED: [BranchKind; 4] = [
        BranchKind::Feature,
        BranchKind::Release,
        BranchKind::Hotfix,
        BranchKind::Support,
    ];

    /// Whether finishing this kind cuts a version tag on trunk.
    pub fn is_tagged_on_finish(self) -> bool {
        matches!(self, Self::Release | Self::Hotfix)
    }

    /// Parse a user-supplied kind name (`feature`, `release`, ...).
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trunk" | "master" => Some(Self::Trunk),
            "integration" | "develop" => Some(Self::Integration),
            "feature" => Some(Self::Feature),
            "release" => Some(Self::Release),
            "hotfix" => Some(Self::Hotfix),
            "support" => Some(Self::Support),
            _ => None,
        }
    }
}

impl std::fmt::Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trunk => write!(f, "trunk"),
            Self::Integration => write!(f, "integration"),
            Self::Feature => write!(f, "feature"),
            Self::Release => write!(f, "release"),
            Self::Hotfix => write!(f, "hotfix"),
            Self::Support => write!(f, "support"),
        }
    }
}

// ---------------------------------------------------------------------------
// Branch references
// ---------------------------------------------------------------------------

/// A branch name together with its classified role.
///
/// Only [`BranchNamingPolicy::classify`] constructs these, so `name` always
/// carries the configured prefix for `kind` (or equals the trunk/integration
/// name for those two kinds).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BranchRef {
    kind: BranchKind,
    name: String,
    short_name: String,
}

impl BranchRef {
    pub fn kind(&self) -> BranchKind {
        self.kind
    }

    /// Full branch name, e.g. `release/1.2.0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with the kind prefix stripped, e.g. `1.2.0`. For trunk and
    /// integration this is the full name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }
}

impl std::fmt::Display for BranchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Naming conventions for long-lived branches, branch-kind prefixes and
/// version tags.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BranchNamingPolicy {
    trunk_branch: String,
    integration_branch: String,
    feature_prefix: String,
    release_prefix: String,
    hotfix_prefix: String,
    support_prefix: String,
    tag_prefix: String,
}

impl Default for BranchNamingPolicy {
    fn default() -> Self {
        Self {
            trunk_branch: DEFAULT_TRUNK_BRANCH.into(),
            integration_branch: DEFAULT_INTEGRATION_BRANCH.into(),
            feature_prefix: DEFAULT_FEATURE_PREFIX.into(),
            release_prefix: DEFAULT_RELEASE_PREFIX.into(),
            hotfix_prefix: DEFAULT_HOTFIX_PREFIX.into(),
            support_prefix: DEFAULT_SUPPORT_PREFIX.into(),
            tag_prefix: DEFAULT_TAG_PREFIX.into(),
        }
    }
}

impl BranchNamingPolicy {
    pub fn new(trunk_branch: impl Into<String>, integration_branch: impl Into<String>) -> Self {
        Self {
            trunk_branch: trunk_branch.into(),
            integration_branch: integration_branch.into(),
            ..Self::default()
        }
    }

    pub fn with_prefixes(
        mut self,
        feature: impl Into<String>,
        release: impl Into<String>,
        hotfix: impl Into<String>,
        support: impl Into<String>,
    ) -> Self {
        self.feature_prefix = feature.into();
        self.release_prefix = release.into();
        self.hotfix_prefix = hotfix.into();
        self.support_prefix = support.into();
        self
    }

    pub fn with_tag_prefix(mut self, tag_prefix: impl Into<String>) -> Self {
        self.tag_prefix = tag_prefix.into();
        self
    }

    pub fn trunk_branch(&self) -> &str {
        &self.trunk_branch
    }

    pub fn integration_branch(&self) -> &str {
        &self.integration_branch
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag_prefix
    }

    /// The configured prefix for a prefixed kind; `None` for trunk/integration.
    pub fn prefix(&self, kind: BranchKind) -> Option<&str> {
        match kind {
            BranchKind::Feature => Some(&self.feature_prefix),
            BranchKind::Release => Some(&self.release_prefix),
            BranchKind::Hotfix => Some(&self.hotfix_prefix),
            BranchKind::Support => Some(&self.support_prefix),
            BranchKind::Trunk | BranchKind::Integration => None,
        }
    }

    /// Check the policy for empty names and ambiguous prefixes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trunk_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "branches.trunk".into(),
                detail: "trunk branch name must not be empty".into(),
            });
        }
        if self.integration_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "branches.integration".into(),
                detail: "integration branch name must not be empty".into(),
            });
        }
        if self.trunk_branch == self.integration_branch {
            return Err(ConfigError::InvalidValue {
                field: "branches.integration".into(),
                detail: format!(
                    "integration branch must differ from trunk branch '{}'",
                    self.trunk_branch
                ),
            });
        }

        let prefixes: Vec<(BranchKind, &str)> = BranchKind::PREFIXED
            .iter()
            .filter_map(|kind| self.prefix(*kind).map(|p| (*kind, p)))
            .collect();

        for (kind, prefix) in &prefixes {
            if prefix.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("prefixes.{}", kind),
                    detail: "branch prefix must not be empty".into(),
                });
            }
        }

        for (i, (_, a)) in prefixes.iter().enumerate() {
            for (_, b) in prefixes.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(ConfigError::PrefixCollision {
                        first: (*a).to_string(),
                        second: (*b).to_string(),
                    });
                }
            }
        }

        for (field, name) in [
            ("branches.trunk", &self.trunk_branch),
            ("branches.integration", &self.integration_branch),
        ] {
            if let Some((kind, prefix)) = prefixes.iter().find(|(_, p)| name.starts_with(*p)) {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: format!("'{}' would be classified as a {} branch ('{}')", name, kind, prefix),
                });
            }
        }

        debug!("branch naming policy is valid");
        Ok(())
    }

    /// Determine the role of `branch_name`.
    pub fn classify(&self, branch_name: &str) -> Result<BranchRef, FlowError> {
        if branch_name == self.trunk_branch {
            return Ok(BranchRef {
                kind: BranchKind::Trunk,
                name: branch_name.to_string(),
                short_name: branch_name.to_string(),
            });
        }
        if branch_name == self.integration_branch {
            return Ok(BranchRef {
                kind: BranchKind::Integration,
                name: branch_name.to_string(),
                short_name: branch_name.to_string(),
            });
        }

        for kind in BranchKind::PREFIXED {
            let Some(prefix) = self.prefix(kind) else {
                continue;
            };
            if let Some(short) = branch_name.strip_prefix(prefix) {
                if short.is_empty() {
                    break;
                }
                return Ok(BranchRef {
                    kind,
                    name: branch_name.to_string(),
                    short_name: short.to_string(),
                });
            }
        }

        Err(FlowError::UnrecognizedBranch(branch_name.to_string()))
    }

    /// Build the full branch name for `identifier` of a prefixed kind.
    pub fn branch_name(&self, kind: BranchKind, identifier: &str) -> Result<String, FlowError> {
        let prefix = self.prefix(kind).ok_or_else(|| FlowError::InvalidIdentifier {
            kind,
            identifier: identifier.to_string(),
            detail: "only feature, release, hotfix and support branches take an identifier".into(),
        })?;
        validate_identifier(kind, identifier)?;
        Ok(format!("{}{}", prefix, identifier))
    }

    /// The version tag cut when finishing a release or hotfix.
    pub fn tag_name(&self, identifier: &str) -> String {
        format!("{}{}", self.tag_prefix, identifier)
    }
}

/// Reject identifiers that cannot form a valid git ref component.
pub fn validate_identifier(kind: BranchKind, identifier: &str) -> Result<(), FlowError> {
    let invalid = |detail: &str| FlowError::InvalidIdentifier {
        kind,
        identifier: identifier.to_string(),
        detail: detail.to_string(),
    };

    if identifier.trim().is_empty() {
        return Err(invalid("identifier must not be empty"));
    }
    if identifier.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("identifier must not contain whitespace"));
    }
    if identifier.contains("..") {
        return Err(invalid("identifier must not contain '..'"));
    }
    if let Some(c) = identifier.chars().find(|c| "~^:?*[\\".contains(*c)) {
        return Err(invalid(&format!("identifier must not contain '{}'", c)));
    }
    if identifier.starts_with('/') || identifier.ends_with('/') || identifier.ends_with(".lock") {
        return Err(invalid("identifier must not start or end with '/' or end with '.lock'"));
    }
    Ok(())
}
