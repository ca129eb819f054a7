//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse url-patterns used by route and filter tables
//! - Match request paths against them
//!
//! # Design Decisions
//! - Pattern shapes:
//!   `/` default, `/*` everything, `/prefix/*` subtree, `*.ext` suffix,
//!   anything else starting with `/` is an exact path
//! - Path matching is case-sensitive
//! - No regex, O(len) per match

use std::fmt;

use thiserror::Error;

/// Error type for route/filter table validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// Pattern is neither `/...` nor `*.ext`.
    #[error("invalid path pattern {0:?}: must start with '/' or '*.'")]
    InvalidPattern(String),
}

/// A parsed url-pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSpec {
    /// `/`: the default mapping, catches everything.
    Default,
    /// `/base/*` (`base` stored without the trailing `/*`; empty for `/*`).
    Prefix(String),
    /// `*.ext` (stored as `.ext`).
    Suffix(String),
    /// Exact path.
    Exact(String),
}

impl PathSpec {
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        if pattern.is_empty() || pattern == "/" {
            return Ok(PathSpec::Default);
        }
        if let Some(base) = pattern.strip_suffix("/*") {
            if base.is_empty() || base.starts_with('/') {
                return Ok(PathSpec::Prefix(base.to_string()));
            }
        } else if let Some(ext) = pattern.strip_prefix("*.") {
            if !ext.is_empty() && !ext.contains('/') {
                return Ok(PathSpec::Suffix(format!(".{ext}")));
            }
        } else if pattern.starts_with('/') && !pattern.contains('*') {
            return Ok(PathSpec::Exact(pattern.to_string()));
        }
        Err(RoutingError::InvalidPattern(pattern.to_string()))
    }

    /// Returns true if `path` falls under this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathSpec::Default => true,
            PathSpec::Prefix(base) => {
                base.is_empty()
                    || path == base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            PathSpec::Suffix(ext) => {
                let last_segment = path.rsplit('/').next().unwrap_or(path);
                last_segment.len() > ext.len() && last_segment.ends_with(ext.as_str())
            }
            PathSpec::Exact(exact) => path == exact,
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Default => f.write_str("/"),
            PathSpec::Prefix(base) => write!(f, "{base}/*"),
            PathSpec::Suffix(ext) => write!(f, "*{ext}"),
            PathSpec::Exact(exact) => f.write_str(exact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(PathSpec::parse("/").unwrap(), PathSpec::Default);
        assert_eq!(PathSpec::parse("/*").unwrap(), PathSpec::Prefix(String::new()));
        assert_eq!(PathSpec::parse("/api/*").unwrap(), PathSpec::Prefix("/api".into()));
        assert_eq!(PathSpec::parse("*.json").unwrap(), PathSpec::Suffix(".json".into()));
        assert_eq!(PathSpec::parse("/status").unwrap(), PathSpec::Exact("/status".into()));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for pattern in ["api/*", "/api/*/x", "*.", "**", "/a*b"] {
            assert!(PathSpec::parse(pattern).is_err(), "{pattern} should be rejected");
        }
    }

    #[test]
    fn test_prefix_matching() {
        let spec = PathSpec::parse("/api/*").unwrap();
        assert!(spec.matches("/api"));
        assert!(spec.matches("/api/"));
        assert!(spec.matches("/api/v1/users"));
        assert!(!spec.matches("/apix"));
        assert!(!spec.matches("/other/api"));

        let all = PathSpec::parse("/*").unwrap();
        assert!(all.matches("/"));
        assert!(all.matches("/anything/at/all"));
    }

    #[test]
    fn test_suffix_matching() {
        let spec = PathSpec::parse("*.json").unwrap();
        assert!(spec.matches("/data/report.json"));
        assert!(!spec.matches("/data.json/report"));
        assert!(!spec.matches("/.json"));
    }

    #[test]
    fn test_exact_matching_is_case_sensitive() {
        let spec = PathSpec::parse("/Status").unwrap();
        assert!(spec.matches("/Status"));
        assert!(!spec.matches("/status"));
        assert!(!spec.matches("/Status/x"));
    }

    #[test]
    fn test_display_round_trips_pattern() {
        for pattern in ["/", "/*", "/api/*", "*.json", "/status"] {
            assert_eq!(PathSpec::parse(pattern).unwrap().to_string(), pattern);
        }
    }
}
