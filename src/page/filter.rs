//! Origin match patterns.
//!
//! Patterns follow the WebExtension match-pattern shape
//! `<scheme>://<host><path>`:
//!
//! | Part | Wildcard |
//! |------|----------|
//! | scheme | `*` matches `http` and `https` |
//! | host | `*` matches any host, `*.example.com` matches the domain and its subdomains |
//! | path | `*` matches any run of characters |
//!
//! `<all_urls>` matches every `http(s)` URL.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default execution-context pattern.
pub const DEFAULT_ORIGIN_FILTER: &str = "*://grok.com/*";

/// Pattern matching every web URL.
const ALL_URLS: &str = "<all_urls>";

// ============================================================================
// OriginFilter
// ============================================================================

/// A compiled match pattern.
#[derive(Debug, Clone)]
pub struct OriginFilter {
    pattern: String,
    regex: Regex,
}

impl OriginFilter {
    /// Compiles a match pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern is malformed.
    pub fn parse(pattern: &str) -> Result<Self> {
        let source = if pattern == ALL_URLS {
            r"^https?://[^/]+/.*$".to_string()
        } else {
            Self::compile(pattern)?
        };

        let regex = Regex::new(&source)
            .map_err(|e| Error::config(format!("invalid origin filter '{pattern}': {e}")))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Returns the source pattern.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if `url` matches.
    ///
    /// URLs are normalized first, so `https://grok.com` matches `*://grok.com/*`.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.regex.is_match(parsed.as_str()),
            Err(_) => self.regex.is_match(url),
        }
    }

    fn compile(pattern: &str) -> Result<String> {
        let invalid = |reason: &str| Error::config(format!("invalid origin filter '{pattern}': {reason}"));

        let (scheme, rest) = pattern
            .split_once("://")
            .ok_or_else(|| invalid("missing '://'"))?;

        let (host, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => return Err(invalid("missing path")),
        };

        let scheme = match scheme {
            "*" => "https?".to_string(),
            "" => return Err(invalid("empty scheme")),
            other => regex::escape(other),
        };

        let host = match host {
            "*" => "[^/:]+".to_string(),
            "" => return Err(invalid("empty host")),
            other => match other.strip_prefix("*.") {
                Some(domain) if !domain.contains('*') => {
                    format!(r"(?:[^/:]+\.)?{}", regex::escape(domain))
                }
                Some(_) => return Err(invalid("wildcard only allowed as leading label")),
                None if other.contains('*') => {
                    return Err(invalid("wildcard only allowed as leading label"));
                }
                None => regex::escape(other),
            },
        };

        let path = path
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        Ok(format!("^{scheme}://{host}(?::\\d+)?{path}$"))
    }
}

impl fmt::Display for OriginFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_grok_pages() {
        let filter = OriginFilter::parse(DEFAULT_ORIGIN_FILTER).expect("parse");
        assert!(filter.matches("https://grok.com/"));
        assert!(filter.matches("https://grok.com"));
        assert!(filter.matches("http://grok.com/chat/abc?x=1"));
        assert!(!filter.matches("https://x.com/i/grok"));
        assert!(!filter.matches("https://notgrok.com/"));
        assert!(!filter.matches("ftp://grok.com/"));
    }

    #[test]
    fn test_subdomain_wildcard() {
        let filter = OriginFilter::parse("https://*.example.com/*").expect("parse");
        assert!(filter.matches("https://example.com/"));
        assert!(filter.matches("https://a.b.example.com/page"));
        assert!(!filter.matches("https://badexample.com/"));
        assert!(!filter.matches("http://example.com/"));
    }

    #[test]
    fn test_path_is_anchored() {
        let filter = OriginFilter::parse("*://grok.com/chat/*").expect("parse");
        assert!(filter.matches("https://grok.com/chat/1"));
        assert!(!filter.matches("https://grok.com/settings"));
    }

    #[test]
    fn test_all_urls() {
        let filter = OriginFilter::parse("<all_urls>").expect("parse");
        assert!(filter.matches("https://anything.org/x"));
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        for pattern in ["grok.com", "*://grok.com", "*://gr*k.com/*", "://grok.com/*"] {
            let err = OriginFilter::parse(pattern).unwrap_err();
            assert!(matches!(err, Error::Config { .. }), "{pattern}");
        }
    }
}
