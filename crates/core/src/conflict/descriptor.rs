//! Recognition of structured descriptor files.
//!
//! Only conflicted paths matching one of the configured glob patterns are
//! handed to the resolver. A pattern matches either the full repository
//! path or the bare file name, so `pom.xml` covers every module's POM.

use std::path::Path;

use tracing::debug;

pub const DEFAULT_DESCRIPTOR_PATTERNS: [&str; 1] = ["pom.xml"];

/// Decides which conflicted paths are eligible for automatic repair.
#[derive(Debug, Clone)]
pub struct DescriptorMatcher {
    patterns: Vec<String>,
}

impl Default for DescriptorMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTOR_PATTERNS.iter().map(|p| p.to_string()).collect())
    }
}

impl DescriptorMatcher {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `rel_path` (repository-relative) is a descriptor file.
    pub fn is_descriptor(&self, rel_path: &str) -> bool {
        let path = rel_path.replace('\\', "/");
        let file_name = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&path);

        let matched = self.patterns.iter().find(|pattern| {
            let pat = pattern.replace('\\', "/");
            glob_match::glob_match(&pat, &path) || glob_match::glob_match(&pat, file_name)
        });
        if let Some(pattern) = matched {
            debug!(path = rel_path, pattern = pattern.as_str(), "descriptor file");
        }
        matched.is_some()
    }

    /// Split `paths` into `(descriptors, others)`, keeping input order.
    pub fn partition<'a, I>(&self, paths: I) -> (Vec<String>, Vec<String>)
    where
        I: IntoIterator<Item = &'a String>,
    {
        paths
            .into_iter()
            .cloned()
            .partition(|p| self.is_descriptor(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_pom_anywhere() {
        let matcher = DescriptorMatcher::default();
        assert!(matcher.is_descriptor("pom.xml"));
        assert!(matcher.is_descriptor("modules/core/pom.xml"));
        assert!(!matcher.is_descriptor("src/main/resources/pom.xml.bak"));
        assert!(!matcher.is_descriptor("README.md"));
    }

    #[test]
    fn test_custom_patterns() {
        let matcher = DescriptorMatcher::new(vec!["*.pom".into(), "build/**/descriptor.xml".into()]);
        assert!(matcher.is_descriptor("lib/app-1.0.pom"));
        assert!(matcher.is_descriptor("build/a/b/descriptor.xml"));
        assert!(!matcher.is_descriptor("pom.xml"));
    }

    #[test]
    fn test_partition() {
        let matcher = DescriptorMatcher::default();
        let paths = vec![
            "pom.xml".to_string(),
            "src/App.java".to_string(),
            "web/pom.xml".to_string(),
        ];
        let (descriptors, others) = matcher.partition(&paths);
        assert_eq!(descriptors, vec!["pom.xml", "web/pom.xml"]);
        assert_eq!(others, vec!["src/App.java"]);
    }
}
