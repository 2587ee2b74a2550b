//! Per-object upload parameter rules
//!
//! Rules are glob patterns over the `/`-separated path of a file relative
//! to the synced directory. Every matching rule is applied in declaration
//! order, so later rules override earlier ones on the keys they set.
//!
//! Wildcards do not match hidden entries: a path with a segment starting
//! with `.` only matches patterns that spell out a dot segment themselves
//! (`.well-known/*`, `**/.htaccess`).

use crate::config::{CannedAcl, ObjectParams, ParamRule};
use crate::error::{Result, SyncError};
use globset::{GlobBuilder, GlobMatcher};

#[derive(Debug, Clone)]
struct PathMatcher {
    glob: GlobMatcher,
    matches_hidden: bool,
}

impl PathMatcher {
    fn is_match(&self, path: &str) -> bool {
        if !self.matches_hidden && path.split('/').any(|segment| segment.starts_with('.')) {
            return false;
        }
        self.glob.is_match(path)
    }
}

fn compile(pattern: &str) -> Result<PathMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| SyncError::config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;

    Ok(PathMatcher {
        glob,
        matches_hidden: pattern.starts_with('.') || pattern.contains("/."),
    })
}

/// Match a relative path against a glob
///
/// `*` and `?` stay within one path segment; only `**` spans directories.
pub fn glob_matches(pattern: &str, path: &str) -> Result<bool> {
    Ok(compile(pattern)?.is_match(path))
}

/// Resolves the upload parameters for each file from ordered glob rules
#[derive(Debug, Clone, Default)]
pub struct ParamResolver {
    rules: Vec<(PathMatcher, ObjectParams)>,
}

impl ParamResolver {
    /// Compile a rule list, failing on the first invalid pattern
    pub fn new(rules: &[ParamRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| Ok((compile(&rule.glob)?, rule.params.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Merge every rule matching `relative_path`, in order
    pub fn resolve(&self, relative_path: &str) -> ObjectParams {
        let mut merged = ObjectParams::default();
        for (matcher, params) in &self.rules {
            if matcher.is_match(relative_path) {
                merged.merge(params);
            }
        }
        merged
    }

    /// Effective parameters for an upload: target defaults, then rule overrides
    pub fn upload_params(&self, acl: CannedAcl, relative_path: &str) -> ObjectParams {
        let mut params = ObjectParams {
            acl: Some(acl),
            content_type: mime_guess::from_path(relative_path)
                .first()
                .map(|mime| mime.essence_str().to_string()),
            ..Default::default()
        };
        params.merge(&self.resolve(relative_path));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(value: &str) -> ObjectParams {
        ObjectParams {
            cache_control: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_glob_does_not_cross_directories() {
        assert!(glob_matches("*.html", "index.html").unwrap());
        assert!(!glob_matches("*.html", "docs/index.html").unwrap());
        assert!(glob_matches("**/*.html", "docs/index.html").unwrap());
        assert!(glob_matches("**/*.html", "index.html").unwrap());
        assert!(glob_matches("docs/*", "docs/a.txt").unwrap());
        assert!(!glob_matches("docs/*", "docs/sub/a.txt").unwrap());
        assert!(!glob_matches("?.txt", "a/b.txt").unwrap());
    }

    #[test]
    fn test_wildcards_skip_hidden_paths() {
        assert!(!glob_matches("**/*", ".well-known/security.txt").unwrap());
        assert!(!glob_matches("*", ".env").unwrap());
        assert!(!glob_matches("**/*.txt", "docs/.draft/notes.txt").unwrap());
        assert!(glob_matches("**/*", "docs/notes.txt").unwrap());

        assert!(glob_matches(".well-known/*", ".well-known/security.txt").unwrap());
        assert!(glob_matches("**/.htaccess", "blog/.htaccess").unwrap());
        assert!(glob_matches(".env", ".env").unwrap());

        let resolver = ParamResolver::new(&[ParamRule::new("**/*", cache("max-age=60"))]).unwrap();
        assert!(resolver.resolve(".well-known/security.txt").is_empty());
        assert!(!resolver.resolve("index.html").is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ParamResolver::new(&[ParamRule::new("[unclosed", ObjectParams::default())])
            .unwrap_err();
        assert!(matches!(err, SyncError::ConfigInvalid(_)));
    }

    #[test]
    fn test_no_match_is_empty() {
        let resolver = ParamResolver::new(&[ParamRule::new("*.css", cache("x"))]).unwrap();
        assert!(resolver.resolve("app.js").is_empty());
    }

    #[test]
    fn test_later_rules_override_conflicting_keys_only() {
        let mut first = cache("max-age=60");
        first.content_encoding = Some("gzip".into());
        first.metadata.insert("tier".into(), "static".into());

        let mut second = cache("no-cache");
        second.metadata.insert("owner".into(), "web".into());

        let resolver = ParamResolver::new(&[
            ParamRule::new("**/*", first),
            ParamRule::new("*.html", second),
            ParamRule::new("*.css", cache("immutable")),
        ])
        .unwrap();

        let html = resolver.resolve("index.html");
        assert_eq!(html.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(html.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(html.metadata.get("tier").map(String::as_str), Some("static"));
        assert_eq!(html.metadata.get("owner").map(String::as_str), Some("web"));

        let nested = resolver.resolve("pages/about.html");
        assert_eq!(nested.cache_control.as_deref(), Some("max-age=60"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = ParamResolver::new(&[
            ParamRule::new("*", cache("a")),
            ParamRule::new("*.txt", cache("b")),
        ])
        .unwrap();
        let first = resolver.resolve("notes.txt");
        for _ in 0..10 {
            assert_eq!(resolver.resolve("notes.txt"), first);
        }
        assert_eq!(first.cache_control.as_deref(), Some("b"));
    }

    #[test]
    fn test_upload_params_layering() {
        let resolver = ParamResolver::new(&[ParamRule::new(
            "*.json",
            ObjectParams {
                content_type: Some("application/vnd.custom+json".into()),
                acl: Some(CannedAcl::PublicRead),
                ..Default::default()
            },
        )])
        .unwrap();

        let html = resolver.upload_params(CannedAcl::Private, "index.html");
        assert_eq!(html.acl, Some(CannedAcl::Private));
        assert_eq!(html.content_type.as_deref(), Some("text/html"));

        let json = resolver.upload_params(CannedAcl::Private, "data.json");
        assert_eq!(json.acl, Some(CannedAcl::PublicRead));
        assert_eq!(json.content_type.as_deref(), Some("application/vnd.custom+json"));

        let unknown = resolver.upload_params(CannedAcl::Private, "LICENSE");
        assert_eq!(unknown.content_type, None);
    }
}
