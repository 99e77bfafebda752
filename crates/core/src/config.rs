//! Layered configuration for git-flow transitions.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults (`master`/`develop`, `feature/`, `release/`, ...).
//! 2. `gitflow.*` keys in the repository's git config, as written by
//!    `git flow init` or `gitflow init`.
//! 3. A TOML file: `--config <path>`, or `.gitflow.toml` in the working copy.

use std::path::{Path, PathBuf};

use git2::ErrorCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conflict::descriptor::DEFAULT_DESCRIPTOR_PATTERNS;
use crate::conflict::resolver::{DEFAULT_VERSION_ELEMENTS, VersionPrecedence};
use crate::conflict::{DescriptorConflictResolver, DescriptorMatcher};
use crate::errors::ConfigError;
use crate::policy::{
    BranchNamingPolicy, DEFAULT_FEATURE_PREFIX, DEFAULT_HOTFIX_PREFIX, DEFAULT_INTEGRATION_BRANCH,
    DEFAULT_RELEASE_PREFIX, DEFAULT_SUPPORT_PREFIX, DEFAULT_TAG_PREFIX, DEFAULT_TRUNK_BRANCH,
};

/// Name of the per-repository config file looked up in the working copy.
pub const CONFIG_FILE_NAME: &str = ".gitflow.toml";

// git config keys shared with the git-flow shell extension.
const GIT_KEY_TRUNK: &str = "gitflow.branch.master";
const GIT_KEY_INTEGRATION: &str = "gitflow.branch.develop";
const GIT_KEY_FEATURE: &str = "gitflow.prefix.feature";
const GIT_KEY_RELEASE: &str = "gitflow.prefix.release";
const GIT_KEY_HOTFIX: &str = "gitflow.prefix.hotfix";
const GIT_KEY_SUPPORT: &str = "gitflow.prefix.support";
const GIT_KEY_VERSION_TAG: &str = "gitflow.prefix.versiontag";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub branches: BranchesSection,

    #[serde(default)]
    pub prefixes: PrefixesSection,

    #[serde(default)]
    pub start: StartSection,

    #[serde(default)]
    pub finish: FinishSection,

    #[serde(default)]
    pub resolver: ResolverSection,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            branches: BranchesSection::default(),
            prefixes: PrefixesSection::default(),
            start: StartSection::default(),
            finish: FinishSection::default(),
            resolver: ResolverSection::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// Long-lived branch names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchesSection {
    /// Latest released state.
    #[serde(default = "default_trunk")]
    pub trunk: String,

    /// Latest integrated development state.
    #[serde(default = "default_integration")]
    pub integration: String,
}

fn default_trunk() -> String {
    DEFAULT_TRUNK_BRANCH.into()
}
fn default_integration() -> String {
    DEFAULT_INTEGRATION_BRANCH.into()
}

impl Default for BranchesSection {
    fn default() -> Self {
        Self {
            trunk: default_trunk(),
            integration: default_integration(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prefixes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixesSection {
    #[serde(default = "default_feature_prefix")]
    pub feature: String,

    #[serde(default = "default_release_prefix")]
    pub release: String,

    #[serde(default = "default_hotfix_prefix")]
    pub hotfix: String,

    #[serde(default = "default_support_prefix")]
    pub support: String,

    /// Prepended to the identifier when tagging a release or hotfix. May be
    /// empty.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,
}

fn default_feature_prefix() -> String {
    DEFAULT_FEATURE_PREFIX.into()
}
fn default_release_prefix() -> String {
    DEFAULT_RELEASE_PREFIX.into()
}
fn default_hotfix_prefix() -> String {
    DEFAULT_HOTFIX_PREFIX.into()
}
fn default_support_prefix() -> String {
    DEFAULT_SUPPORT_PREFIX.into()
}
fn default_version_tag() -> String {
    DEFAULT_TAG_PREFIX.into()
}

impl Default for PrefixesSection {
    fn default() -> Self {
        Self {
            feature: default_feature_prefix(),
            release: default_release_prefix(),
            hotfix: default_hotfix_prefix(),
            support: default_support_prefix(),
            version_tag: default_version_tag(),
        }
    }
}

// ---------------------------------------------------------------------------
// Start / finish behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartSection {
    /// Branch releases from the integration branch instead of trunk.
    #[serde(default)]
    pub release_from_integration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishSection {
    /// Push trunk, integration and the new tag after a finish.
    #[serde(default)]
    pub push: bool,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Keep the source branch instead of deleting it.
    #[serde(default)]
    pub keep_branch: bool,

    /// Text prepended to merge and tag messages.
    #[serde(default)]
    pub message_prefix: String,

    /// Text appended to merge and tag messages.
    #[serde(default)]
    pub message_suffix: String,
}

fn default_remote() -> String {
    "origin".into()
}

impl Default for FinishSection {
    fn default() -> Self {
        Self {
            push: false,
            remote: default_remote(),
            keep_branch: false,
            message_prefix: String::new(),
            message_suffix: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolverSection {
    /// Glob patterns (full path or file name) of descriptor files eligible
    /// for automatic repair.
    #[serde(default = "default_descriptor_patterns")]
    pub descriptor_patterns: Vec<String>,

    /// Glob patterns of element names treated as version elements.
    #[serde(default = "default_version_elements")]
    pub version_elements: Vec<String>,

    #[serde(default)]
    pub precedence: VersionPrecedence,
}

fn default_descriptor_patterns() -> Vec<String> {
    DEFAULT_DESCRIPTOR_PATTERNS.iter().map(|p| p.to_string()).collect()
}
fn default_version_elements() -> Vec<String> {
    DEFAULT_VERSION_ELEMENTS.iter().map(|e| e.to_string()).collect()
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            descriptor_patterns: default_descriptor_patterns(),
            version_elements: default_version_elements(),
            precedence: VersionPrecedence::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & layering
// ---------------------------------------------------------------------------

impl FlowConfig {
    /// Load a [`FlowConfig`] from a TOML file. Missing keys take their
    /// built-in defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::default().overlay_file(path.as_ref())
    }

    /// Resolve the full layered configuration for the repository containing
    /// `repo_path`. An `explicit` file must exist; otherwise `.gitflow.toml`
    /// in the working copy is used when present.
    pub fn load_layered(repo_path: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut workdir: Option<PathBuf> = None;

        match git2::Repository::discover(repo_path) {
            Ok(repo) => {
                config.apply_git_config(&repo.config()?)?;
                workdir = repo.workdir().map(Path::to_path_buf);
            }
            Err(e) => debug!(path = %repo_path.display(), error = %e, "no repository, skipping git config layer"),
        }

        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => workdir
                .map(|dir| dir.join(CONFIG_FILE_NAME))
                .filter(|p| p.is_file()),
        };
        if let Some(path) = file {
            config = config.overlay_file(&path)?;
        }

        Ok(config)
    }

    /// Override branch names and prefixes from `gitflow.*` git config keys.
    pub fn apply_git_config(&mut self, git_config: &git2::Config) -> Result<(), ConfigError> {
        let targets: [(&str, &mut String); 7] = [
            (GIT_KEY_TRUNK, &mut self.branches.trunk),
            (GIT_KEY_INTEGRATION, &mut self.branches.integration),
            (GIT_KEY_FEATURE, &mut self.prefixes.feature),
            (GIT_KEY_RELEASE, &mut self.prefixes.release),
            (GIT_KEY_HOTFIX, &mut self.prefixes.hotfix),
            (GIT_KEY_SUPPORT, &mut self.prefixes.support),
            (GIT_KEY_VERSION_TAG, &mut self.prefixes.version_tag),
        ];
        for (key, slot) in targets {
            if let Some(value) = git_config_string(git_config, key)? {
                debug!(key, value = value.as_str(), "git config override");
                *slot = value;
            }
        }
        Ok(())
    }

    fn overlay_file(self, path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let overlay: toml::Table = contents
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        let mut merged =
            toml::Value::try_from(&self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        merge_toml(&mut merged, toml::Value::Table(overlay));
        let config: FlowConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    // -----------------------------------------------------------------------
    // Validation & derived values
    // -----------------------------------------------------------------------

    /// Validate the naming policy and resolver settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy().validate()?;

        if self.resolver.descriptor_patterns.is_empty()
            || self.resolver.descriptor_patterns.iter().any(|p| p.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "resolver.descriptor_patterns".into(),
                detail: "descriptor patterns must be non-empty".into(),
            });
        }
        self.resolver().validate()?;

        if self.finish.push && self.finish.remote.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "finish.remote".into(),
                detail: "a remote is required when push is enabled".into(),
            });
        }
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".into(),
                detail: format!("unknown level '{}'", self.log_level),
            });
        }

        Ok(())
    }

    /// The immutable naming policy described by this configuration.
    pub fn policy(&self) -> BranchNamingPolicy {
        BranchNamingPolicy::new(&self.branches.trunk, &self.branches.integration)
            .with_prefixes(
                &self.prefixes.feature,
                &self.prefixes.release,
                &self.prefixes.hotfix,
                &self.prefixes.support,
            )
            .with_tag_prefix(&self.prefixes.version_tag)
    }

    pub fn matcher(&self) -> DescriptorMatcher {
        DescriptorMatcher::new(self.resolver.descriptor_patterns.clone())
    }

    pub fn resolver(&self) -> DescriptorConflictResolver {
        DescriptorConflictResolver::new(self.resolver.version_elements.clone(), self.resolver.precedence)
    }

    /// `gitflow.*` git config entries describing the naming policy.
    pub fn to_git_config_entries(&self) -> Vec<(String, String)> {
        [
            (GIT_KEY_TRUNK, &self.branches.trunk),
            (GIT_KEY_INTEGRATION, &self.branches.integration),
            (GIT_KEY_FEATURE, &self.prefixes.feature),
            (GIT_KEY_RELEASE, &self.prefixes.release),
            (GIT_KEY_HOTFIX, &self.prefixes.hotfix),
            (GIT_KEY_SUPPORT, &self.prefixes.support),
            (GIT_KEY_VERSION_TAG, &self.prefixes.version_tag),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

fn git_config_string(config: &git2::Config, key: &str) -> Result<Option<String>, ConfigError> {
    match config.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Recursively merge `overlay` into `base`; tables merge, everything else
/// is replaced.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
