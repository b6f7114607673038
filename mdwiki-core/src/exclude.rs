//! Exclude rules for scanning and watching.
//!
//! A rule is one of:
//! - an absolute path: excludes that path and everything below it. Paths
//!   that exist are resolved through symlinks, like include roots are;
//! - a relative path such as `drafts` or `notes/old`: excludes any path that
//!   contains those components back to back;
//! - a glob (any of `*`, `?`, `[`, `{`): without a `/` it is tested against
//!   each path component, otherwise against the whole absolute path.
//!
//! Matching works on path components, so `/a` excludes `/a/b` but not `/ab`.

use globset::{Glob, GlobMatcher};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExcludeError {
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug, Clone)]
enum Rule {
    Prefix(PathBuf),
    Segments(Vec<String>),
    ComponentGlob(GlobMatcher),
    PathGlob(GlobMatcher),
}

impl Rule {
    fn parse(pattern: &str) -> Result<Self, ExcludeError> {
        if pattern.contains(['*', '?', '[', '{']) {
            let matcher = Glob::new(pattern)
                .map_err(|source| ExcludeError::InvalidGlob {
                    pattern: pattern.to_string(),
                    source,
                })?
                .compile_matcher();
            return Ok(if pattern.contains('/') {
                Rule::PathGlob(matcher)
            } else {
                Rule::ComponentGlob(matcher)
            });
        }

        let path = Path::new(pattern);
        if path.is_absolute() {
            let prefix = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            Ok(Rule::Prefix(prefix))
        } else {
            let segments = path
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            Ok(Rule::Segments(segments))
        }
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            Rule::Prefix(prefix) => path.starts_with(prefix),
            Rule::Segments(segments) => {
                if segments.is_empty() {
                    return false;
                }
                let components: Vec<&OsStr> = normal_components(path).collect();
                components
                    .windows(segments.len())
                    .any(|window| window.iter().zip(segments).all(|(c, s)| *c == s.as_str()))
            }
            Rule::ComponentGlob(matcher) => normal_components(path).any(|c| matcher.is_match(c)),
            Rule::PathGlob(matcher) => matcher.is_match(path),
        }
    }
}

fn normal_components(path: &Path) -> impl Iterator<Item = &OsStr> {
    path.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s),
        _ => None,
    })
}

/// Compiled set of exclude rules
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    patterns: Vec<String>,
    rules: Vec<Rule>,
}

impl ExcludeRules {
    /// Compile rules from raw patterns; blank patterns are ignored.
    pub fn new<I, S>(patterns: I) -> Result<Self, ExcludeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                tracing::warn!("Ignoring empty exclude pattern");
                continue;
            }
            compiled.rules.push(Rule::parse(pattern)?);
            compiled.patterns.push(pattern.to_string());
        }
        Ok(compiled)
    }

    /// The pattern that excludes `path`, if any
    pub fn matching(&self, path: &Path) -> Option<&str> {
        self.rules
            .iter()
            .zip(&self.patterns)
            .find(|(rule, _)| rule.matches(path))
            .map(|(_, pattern)| pattern.as_str())
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.matching(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(patterns: &[&str]) -> ExcludeRules {
        ExcludeRules::new(patterns).unwrap()
    }

    #[test]
    fn test_absolute_prefix_is_segment_aware() {
        let rules = rules(&["/wiki/a"]);
        assert!(rules.is_excluded(Path::new("/wiki/a")));
        assert!(rules.is_excluded(Path::new("/wiki/a/b.md")));
        assert!(!rules.is_excluded(Path::new("/wiki/ab")));
        assert!(!rules.is_excluded(Path::new("/wiki/ab/c.md")));
    }

    #[test]
    fn test_relative_segments_match_anywhere() {
        let rules = rules(&["drafts", "notes/old"]);
        assert!(rules.is_excluded(Path::new("/wiki/drafts/x.md")));
        assert!(rules.is_excluded(Path::new("/wiki/deep/notes/old/y.md")));
        assert!(!rules.is_excluded(Path::new("/wiki/drafts-2/x.md")));
        assert!(!rules.is_excluded(Path::new("/wiki/notes/older/y.md")));
        assert_eq!(rules.matching(Path::new("/w/notes/old")), Some("notes/old"));
    }

    #[test]
    fn test_component_glob() {
        let rules = rules(&[".*"]);
        assert!(rules.is_excluded(Path::new("/wiki/.git/HEAD")));
        assert!(!rules.is_excluded(Path::new("/wiki/docs/page.md")));
    }

    #[test]
    fn test_path_glob() {
        let rules = rules(&["/wiki/**/tmp/*.md"]);
        assert!(rules.is_excluded(Path::new("/wiki/a/b/tmp/x.md")));
        assert!(!rules.is_excluded(Path::new("/wiki/a/b/tmp/x.css")));
    }

    #[test]
    fn test_blank_patterns_ignored() {
        let rules = rules(&["", "   "]);
        assert!(rules.is_empty());
        assert!(!rules.is_excluded(Path::new("/anything")));
    }

    #[test]
    fn test_invalid_glob() {
        let err = ExcludeRules::new(["[unclosed"]).unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_prefix_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().canonicalize().unwrap().join("real");
        std::fs::create_dir_all(real.join("drafts")).unwrap();
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let pattern = alias.join("drafts");
        let rules = rules(&[pattern.to_str().unwrap()]);
        assert!(rules.is_excluded(&real.join("drafts/x.md")));
        assert!(!rules.is_excluded(&real.join("public.md")));
        assert_eq!(rules.matching(&real.join("drafts")), pattern.to_str());
    }
}
