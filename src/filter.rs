//! The resource filter DSL (§6): a comma-separated list of glob patterns,
//! each prefixed `+`/none (include) or `-`/`!` (exclude), evaluated
//! sequentially and statefully against a candidate path.

use crate::error::{BuildEngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct FilterEntry {
    sign: Sign,
    pattern: glob::Pattern,
}

/// A compiled filter list. Evaluation starts from a default match state
/// (include with no filters; exclude once any include exists, unless no
/// filters are present at all) and flips state whenever a pattern matches,
/// in filter order.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    entries: Vec<FilterEntry>,
    default_include: bool,
    /// True whenever an include filter appears after an exclude filter:
    /// glob semantics alone cannot express "exclude everything under X, then
    /// re-include this one file under X", so callers must re-check each
    /// candidate against the full filter list rather than relying on a
    /// single compiled glob.
    requires_post_filtering: bool,
}

impl ResourceFilter {
    /// Parses a comma-separated filter string (§6). An empty string compiles
    /// to the permit-everything filter.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut seen_exclude = false;
        let mut requires_post_filtering = false;

        for raw in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (sign, rest) = match raw.strip_prefix('-').or_else(|| raw.strip_prefix('!')) {
                Some(rest) => (Sign::Exclude, rest),
                None => (Sign::Include, raw.strip_prefix('+').unwrap_or(raw)),
            };

            match sign {
                Sign::Exclude => seen_exclude = true,
                Sign::Include if seen_exclude => requires_post_filtering = true,
                Sign::Include => {}
            }

            let mut pattern_str = rest.to_string();
            if pattern_str.ends_with('/') {
                pattern_str.push_str("**/*");
            }
            let pattern = glob::Pattern::new(&pattern_str)
                .map_err(|e| BuildEngineError::invalid_argument(format!("`{rest}`: {e}")))?;
            entries.push(FilterEntry { sign, pattern });
        }

        let has_include = entries.iter().any(|e| e.sign == Sign::Include);
        let default_include = entries.is_empty() || !has_include;

        Ok(Self { entries, default_include, requires_post_filtering })
    }

    /// Whether any include filter follows an exclude filter in this
    /// compiled list (§6).
    pub fn requires_post_filtering(&self) -> bool {
        self.requires_post_filtering
    }

    /// Evaluates the filter list against `path`, sequentially, each matching
    /// entry flipping the running decision.
    pub fn matches(&self, path: &str) -> bool {
        let mut decision = self.default_include;
        for entry in &self.entries {
            if entry.pattern.matches(path) {
                decision = matches!(entry.sign, Sign::Include);
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filters_includes_everything() {
        let filter = ResourceFilter::parse("").unwrap();
        assert!(filter.matches("/anything.js"));
    }

    #[test]
    fn plain_exclude_excludes_matching_paths_only() {
        let filter = ResourceFilter::parse("-**/*.test.js").unwrap();
        assert!(!filter.matches("/a.test.js"));
        assert!(filter.matches("/a.js"));
    }

    #[test]
    fn include_after_exclude_requires_post_filtering_and_re_includes() {
        let filter = ResourceFilter::parse("-webapp/**,+webapp/manifest.json").unwrap();
        assert!(filter.requires_post_filtering());
        assert!(!filter.matches("webapp/app.js"));
        assert!(filter.matches("webapp/manifest.json"));
    }

    #[test]
    fn trailing_slash_implies_recursive_wildcard() {
        let filter = ResourceFilter::parse("-webapp/test/").unwrap();
        assert!(!filter.matches("webapp/test/deep/file.js"));
        assert!(filter.matches("webapp/src/file.js"));
    }

    #[test]
    fn idempotent_for_repeated_evaluation() {
        let filter = ResourceFilter::parse("-**/*.map,+public/**").unwrap();
        assert_eq!(filter.matches("dist/a.map"), filter.matches("dist/a.map"));
        assert_eq!(filter.matches("public/a.map"), filter.matches("public/a.map"));
    }
}
