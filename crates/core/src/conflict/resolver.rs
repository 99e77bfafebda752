//! Deterministic repair of version-only conflicts in descriptor files.
//!
//! A region is repaired only when both sides (and the diff3 base, if
//! present) are a single version element of the same name, e.g.
//! `<version>1.2.0</version>`. Resolution is all-or-nothing per file: one
//! region the resolver does not understand leaves the whole file untouched
//! and escalates it.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::scanner::{Classification, ConflictDocument, ConflictRegion, VersionConflict};
use crate::errors::{ConfigError, ResolverError};
use crate::policy::BranchKind;

pub const DEFAULT_VERSION_ELEMENTS: [&str; 1] = ["version"];

const VERSION_ELEMENT_PATTERN: &str =
    r"^<([A-Za-z_][A-Za-z0-9_.\-]*)>\s*([A-Za-z0-9$][A-Za-z0-9_.+\-${}]*)\s*</([A-Za-z_][A-Za-z0-9_.\-]*)>$";

// ---------------------------------------------------------------------------
// Precedence policy
// ---------------------------------------------------------------------------

/// Which side of a merge a chosen version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The branch being merged into (the checked-out target).
    Ours,
    /// The branch being merged in (the finishing source).
    Theirs,
}

/// Named rule for picking a version in a `VersionOnly` region.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionPrecedence {
    /// Release/hotfix finishes keep the target's version. Feature finishes
    /// take the incoming version only when the target's version is still
    /// the merge-base version; otherwise the target's version stays.
    #[default]
    Auto,
    /// Always keep the target branch's version.
    #[serde(rename = "target", alias = "prefer_target")]
    PreferTarget,
    /// Always take the incoming branch's version.
    #[serde(rename = "incoming", alias = "prefer_incoming")]
    PreferIncoming,
}

impl VersionPrecedence {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "target" | "prefer_target" | "ours" => Some(Self::PreferTarget),
            "incoming" | "prefer_incoming" | "theirs" => Some(Self::PreferIncoming),
            _ => None,
        }
    }

    /// Decide which side wins for a finish of a `transition` branch.
    pub fn choose(self, transition: BranchKind, conflict: &VersionConflict) -> Side {
        match self {
            Self::PreferTarget => Side::Ours,
            Self::PreferIncoming => Side::Theirs,
            Self::Auto => match transition {
                BranchKind::Release | BranchKind::Hotfix => Side::Ours,
                _ => match conflict.base.as_deref() {
                    Some(base) if base == conflict.ours => Side::Theirs,
                    _ => Side::Ours,
                },
            },
        }
    }
}

impl std::fmt::Display for VersionPrecedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::PreferTarget => write!(f, "target"),
            Self::PreferIncoming => write!(f, "incoming"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// The merge a conflicted file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveContext {
    /// Kind of the branch being finished.
    pub transition: BranchKind,
    /// Branch merged into ("ours").
    pub target: String,
    /// Branch merged in ("theirs").
    pub source: String,
}

/// Why a file was not repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
    /// The file contains no conflict markers at all.
    NoMarkers,
    /// The markers could not be parsed.
    Malformed(ResolverError),
    /// These regions (start lines) are not version-only.
    OtherRegions(Vec<usize>),
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMarkers => write!(f, "no conflict markers found"),
            Self::Malformed(err) => write!(f, "{}", err),
            Self::OtherRegions(lines) => {
                let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
                write!(f, "non-version conflicts at line(s) {}", lines.join(", "))
            }
        }
    }
}

/// Result of resolving one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorResolution {
    /// Every region was version-only; `content` is marker-free.
    Resolved { content: String, regions: usize },
    /// The file must be fixed by hand and was left untouched.
    Escalated(EscalationReason),
}

/// A repaired file ready to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub content: String,
}

/// Aggregate result over every conflicted descriptor of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    FullyResolved(Vec<ResolvedFile>),
    Escalated { unresolved_paths: BTreeSet<String> },
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Classifies and repairs conflict regions in descriptor files.
#[derive(Debug, Clone)]
pub struct DescriptorConflictResolver {
    version_elements: Vec<String>,
    precedence: VersionPrecedence,
    element_re: Regex,
}

impl Default for DescriptorConflictResolver {
    fn default() -> Self {
        Self::new(
            DEFAULT_VERSION_ELEMENTS.iter().map(|e| e.to_string()).collect(),
            VersionPrecedence::Auto,
        )
    }
}

impl DescriptorConflictResolver {
    pub fn new(version_elements: Vec<String>, precedence: VersionPrecedence) -> Self {
        Self {
            version_elements,
            precedence,
            element_re: version_element_regex(),
        }
    }

    pub fn precedence(&self) -> VersionPrecedence {
        self.precedence
    }

    pub fn with_precedence(mut self, precedence: VersionPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Check the configured element-name globs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_elements.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resolver.version_elements".into(),
                detail: "at least one version element name is required".into(),
            });
        }
        if let Some(bad) = self
            .version_elements
            .iter()
            .find(|e| e.trim().is_empty() || e.contains(['<', '>', '/', ' ']))
        {
            return Err(ConfigError::InvalidValue {
                field: "resolver.version_elements".into(),
                detail: format!("'{}' is not a valid element name pattern", bad),
            });
        }
        Ok(())
    }

    /// Classify every region of `doc` in place.
    pub fn classify(&self, doc: &mut ConflictDocument) {
        for region in doc.regions_mut() {
            region.classification = self.classify_region(region);
        }
    }

    fn classify_region(&self, region: &ConflictRegion) -> Classification {
        if region.nested {
            return Classification::Other;
        }
        let Some((element, ours)) = self.version_element(&region.ours_text) else {
            return Classification::Other;
        };
        let Some((theirs_element, theirs)) = self.version_element(&region.theirs_text) else {
            return Classification::Other;
        };
        if element != theirs_element {
            return Classification::Other;
        }

        let base = match region.base_text.as_deref() {
            None => None,
            Some(text) => match self.version_element(text) {
                Some((base_element, value)) if base_element == element => Some(value),
                _ => return Classification::Other,
            },
        };

        Classification::VersionOnly(VersionConflict {
            element,
            ours,
            theirs,
            base,
        })
    }

    /// Parse `text` as exactly one configured version element, returning
    /// `(element, value)`.
    fn version_element(&self, text: &str) -> Option<(String, String)> {
        let caps = self.element_re.captures(text.trim())?;
        let open = caps.get(1)?.as_str();
        let value = caps.get(2)?.as_str();
        let close = caps.get(3)?.as_str();
        if open != close {
            return None;
        }
        let known = self
            .version_elements
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, open));
        known.then(|| (open.to_string(), value.to_string()))
    }

    /// Resolve one conflicted file.
    pub fn resolve(&self, ctx: &ResolveContext, text: &str) -> DescriptorResolution {
        let mut doc = match ConflictDocument::parse(text) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(error = %err, "malformed conflict markers");
                return DescriptorResolution::Escalated(EscalationReason::Malformed(err));
            }
        };
        if !doc.has_conflicts() {
            return DescriptorResolution::Escalated(EscalationReason::NoMarkers);
        }

        self.classify(&mut doc);

        let other: Vec<usize> = doc
            .regions()
            .filter(|r| !r.is_version_only())
            .map(|r| r.start_line)
            .collect();
        if !other.is_empty() {
            debug!(lines = ?other, "regions outside resolver competence");
            return DescriptorResolution::Escalated(EscalationReason::OtherRegions(other));
        }

        let mut regions = 0;
        let content = doc.render(|region| {
            let Classification::VersionOnly(conflict) = &region.classification else {
                return None;
            };
            regions += 1;
            let side = self.precedence.choose(ctx.transition, conflict);
            debug!(
                line = region.start_line,
                element = conflict.element.as_str(),
                ours = conflict.ours.as_str(),
                theirs = conflict.theirs.as_str(),
                chosen = ?side,
                "resolving version conflict"
            );
            Some(match side {
                Side::Ours => region.ours_text.as_str(),
                Side::Theirs => region.theirs_text.as_str(),
            })
        });

        DescriptorResolution::Resolved { content, regions }
    }

    /// Resolve every conflicted descriptor of one merge. Returns
    /// `FullyResolved` only if every file resolved.
    pub fn resolve_files(&self, ctx: &ResolveContext, files: Vec<(String, String)>) -> ResolutionOutcome {
        let mut resolved = Vec::new();
        let mut unresolved = BTreeSet::new();

        for (path, text) in files {
            match self.resolve(ctx, &text) {
                DescriptorResolution::Resolved { content, regions } => {
                    info!(path = path.as_str(), regions, target = ctx.target.as_str(), "descriptor conflicts resolved");
                    resolved.push(ResolvedFile { path, content });
                }
                DescriptorResolution::Escalated(reason) => {
                    warn!(path = path.as_str(), %reason, "descriptor conflict escalated");
                    unresolved.insert(path);
                }
            }
        }

        if unresolved.is_empty() {
            ResolutionOutcome::FullyResolved(resolved)
        } else {
            ResolutionOutcome::Escalated {
                unresolved_paths: unresolved,
            }
        }
    }
}

static VERSION_ELEMENT_RE: OnceLock<Regex> = OnceLock::new();

fn version_element_regex() -> Regex {
    VERSION_ELEMENT_RE
        .get_or_init(|| Regex::new(VERSION_ELEMENT_PATTERN).expect("VERSION_ELEMENT_PATTERN should be valid"))
        .clone()
}
