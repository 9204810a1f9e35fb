//! Delegation path patterns.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

const WILDCARD: char = '*';

/// A path pattern declared by a delegated role.
///
/// Either an exact path, or a literal prefix followed by a single trailing
/// `*` that matches any path sharing the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    /// Matches one path exactly.
    Exact(String),
    /// Matches every path starting with the literal prefix.
    Prefix(String),
}

impl PathPattern {
    /// Parse a pattern string.
    ///
    /// # Errors
    ///
    /// Fails on an empty pattern, or on a `*` anywhere but the final position.
    pub fn parse(pattern: &str) -> Result<Self, ParseError> {
        if pattern.is_empty() {
            return Err(ParseError::InvalidPathPattern(pattern.to_owned()));
        }
        match pattern.strip_suffix(WILDCARD) {
            Some(prefix) if !prefix.contains(WILDCARD) => Ok(Self::Prefix(prefix.to_owned())),
            None if !pattern.contains(WILDCARD) => Ok(Self::Exact(pattern.to_owned())),
            _ => Err(ParseError::InvalidPathPattern(pattern.to_owned())),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.write_str(path),
            Self::Prefix(prefix) => write!(f, "{prefix}{WILDCARD}"),
        }
    }
}

impl Serialize for PathPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::parse(&pattern).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_exact_and_prefix_patterns() {
        assert_eq!(
            PathPattern::parse("/v2/library/alpine").unwrap(),
            PathPattern::Exact("/v2/library/alpine".into())
        );
        assert_eq!(
            PathPattern::parse("/v2/library/*").unwrap(),
            PathPattern::Prefix("/v2/library/".into())
        );
        assert_eq!(PathPattern::parse("*").unwrap(), PathPattern::Prefix(String::new()));
    }

    #[test]
    fn it_rejects_inner_and_repeated_wildcards() {
        for pattern in ["", "/v2/*/manifests", "/v2/**", "*/latest"] {
            assert!(
                PathPattern::parse(pattern).is_err(),
                "{pattern:?} should be rejected"
            );
        }
    }

    #[test]
    fn it_displays_the_original_pattern() {
        for pattern in ["/v2/library/*", "/exact/path"] {
            assert_eq!(PathPattern::parse(pattern).unwrap().to_string(), pattern);
        }
    }
}
