//! Path pattern matching.

use tuf_gate_metadata::PathPattern;

/// Whether `path` is covered by `pattern`.
///
/// Matching is case sensitive and applies to the normalized path as given.
pub fn matches(path: &str, pattern: &PathPattern) -> bool {
    match pattern {
        PathPattern::Exact(exact) => path == exact,
        PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
    }
}

/// Whether any of `patterns` covers `path`.
pub fn matches_any(path: &str, patterns: &[PathPattern]) -> bool {
    patterns.iter().any(|pattern| matches(path, pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_matches_exact_patterns_by_equality() -> TestResult {
        let pattern = PathPattern::parse("/v2/_catalog")?;

        assert!(matches("/v2/_catalog", &pattern));
        assert!(!matches("/v2/_catalog/", &pattern));
        assert!(!matches("/V2/_catalog", &pattern));
        Ok(())
    }

    #[test]
    fn it_matches_prefix_patterns() -> TestResult {
        let pattern = PathPattern::parse("/v2/library/*")?;

        assert!(matches("/v2/library/", &pattern));
        assert!(matches("/v2/library/nginx/manifests/latest", &pattern));
        assert!(!matches("/v2/library", &pattern));
        assert!(!matches("/v2/other/nginx", &pattern));
        Ok(())
    }

    #[test]
    fn it_matches_everything_with_a_bare_wildcard() -> TestResult {
        let pattern = PathPattern::parse("*")?;

        assert!(matches("/", &pattern));
        assert!(matches("/anything/at/all", &pattern));
        Ok(())
    }

    #[test]
    fn it_matches_when_any_pattern_does() -> TestResult {
        let patterns = [
            PathPattern::parse("/a/*")?,
            PathPattern::parse("/b/exact")?,
        ];

        assert!(matches_any("/b/exact", &patterns));
        assert!(matches_any("/a/deep/path", &patterns));
        assert!(!matches_any("/c", &patterns));
        assert!(!matches_any("/c", &[]));
        Ok(())
    }
}
