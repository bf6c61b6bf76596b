//! URL-pattern cache policies and first-match rule lookup.

use std::fmt;

use regex::Regex;

use super::config::ConfigError;

// Delimiters accepted for PCRE-style patterns such as `!^/news!i`.
const DELIMITERS: [char; 6] = ['/', '!', '#', '~', '%', '@'];

// Modifiers understood after the closing delimiter.
const MODIFIERS: [char; 6] = ['i', 'm', 's', 'x', 'U', 'u'];

/// A compiled caching rule for the URLs matching `pattern`.
///
/// TTLs are seconds. A negative private TTL marks matching responses as
/// uncacheable for visitors with cookies; zero is a valid TTL. An unset
/// private TTL leaves the private lifetime to the browser.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    source: String,
    pattern: Regex,
    public_ttl: i64,
    private_ttl: Option<i64>,
    client_cacheable: bool,
}

impl CachePolicy {
    /// Compiles a policy.
    ///
    /// # Arguments
    ///
    /// - `pattern` — a bare regex, or a delimited one such as `/^\/news/i`.
    /// - `public_ttl` — shared-cache lifetime for anonymous traffic.
    /// - `private_ttl` — browser lifetime for visitors with cookies; pass
    ///   `None` to emit a bare `private`.
    /// - `client_cacheable` — whether anonymous clients may keep a copy.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPattern`] or [`ConfigError::UnsupportedFlag`] when
    /// `pattern` does not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachet::cache::CachePolicy;
    ///
    /// let policy = CachePolicy::new("!^/news!i", 600, Some(60), true).unwrap();
    /// assert!(policy.matches("/NEWS/today"));
    /// assert!(!policy.matches("/archive/news"));
    /// ```
    pub fn new(
        pattern: &str,
        public_ttl: i64,
        private_ttl: Option<i64>,
        client_cacheable: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            source: pattern.to_owned(),
            pattern: compile_pattern(pattern)?,
            public_ttl,
            private_ttl,
            client_cacheable,
        })
    }

    /// The pattern as configured.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern is found anywhere in `path`. Anchoring is
    /// up to the pattern itself.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Seconds a shared cache may serve the response to anonymous visitors.
    pub fn public_ttl(&self) -> i64 {
        self.public_ttl
    }

    /// Seconds a visitor with cookies may keep their private copy, if set.
    pub fn private_ttl(&self) -> Option<i64> {
        self.private_ttl
    }

    /// Whether anonymous clients may keep their own copy for `public_ttl`
    /// instead of revalidating with the shared cache on every request.
    pub fn client_cacheable(&self) -> bool {
        self.client_cacheable
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (public={}, private=", self.source, self.public_ttl)?;
        match self.private_ttl {
            Some(ttl) => write!(f, "{ttl}")?,
            None => f.write_str("unset")?,
        }
        write!(f, ", client_cache={})", self.client_cacheable)
    }
}

/// Compiles a bare or delimited pattern.
///
/// Delimited patterns (`!body!flags`) are unwrapped and their `i`, `m`, `s`,
/// `x` and `U` modifiers become inline flags. `u` is accepted and ignored
/// since matching is always Unicode-aware.
///
/// A leading `/` only counts as a delimiter when everything after the last
/// `/` is a known modifier, so `/news/archive` stays a bare pattern while
/// `/^\/news/i` is unwrapped.
pub(crate) fn compile_pattern(raw: &str) -> Result<Regex, ConfigError> {
    let (body, modifiers) = split_delimited(raw).unwrap_or((raw, ""));

    let mut inline = String::new();
    for flag in modifiers.chars() {
        match flag {
            'u' => {}
            known if MODIFIERS.contains(&known) => inline.push(known),
            other => {
                return Err(ConfigError::UnsupportedFlag {
                    pattern: raw.to_owned(),
                    flag: other,
                });
            }
        }
    }

    let expr = if inline.is_empty() {
        body.to_owned()
    } else {
        format!("(?{inline}){body}")
    };

    Regex::new(&expr).map_err(|source| ConfigError::InvalidPattern {
        pattern: raw.to_owned(),
        source,
    })
}

fn split_delimited(raw: &str) -> Option<(&str, &str)> {
    let open = raw.chars().next()?;
    if !DELIMITERS.contains(&open) {
        return None;
    }
    let close = raw.rfind(open)?;
    if close == 0 {
        return None;
    }
    let modifiers = &raw[close + 1..];
    let known = |c: char| {
        if open == '/' {
            MODIFIERS.contains(&c)
        } else {
            c.is_ascii_alphabetic()
        }
    };
    if !modifiers.chars().all(known) {
        return None;
    }
    Some((&raw[open.len_utf8()..close], modifiers))
}

/// Ordered cache policies. The first rule whose pattern matches wins.
///
/// Immutable once built; share it behind an `Arc` between requests.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    rules: Vec<CachePolicy>,
}

impl PolicySet {
    /// Wraps rules in priority order.
    pub fn new(rules: Vec<CachePolicy>) -> Self {
        Self { rules }
    }

    /// Returns the first policy matching `path`, or `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachet::cache::{CachePolicy, PolicySet};
    ///
    /// let set = PolicySet::new(vec![
    ///     CachePolicy::new("^/news/archive", 86400, Some(0), true).unwrap(),
    ///     CachePolicy::new("^/news", 300, Some(0), false).unwrap(),
    /// ]);
    /// assert_eq!(set.find("/news/archive/2020").unwrap().public_ttl(), 86400);
    /// assert_eq!(set.find("/news/today").unwrap().public_ttl(), 300);
    /// assert!(set.find("/contact").is_none());
    /// ```
    pub fn find(&self, path: &str) -> Option<&CachePolicy> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` when no rule is configured, so nothing ever matches.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &CachePolicy> {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(pattern: &str, public_ttl: i64) -> CachePolicy {
        CachePolicy::new(pattern, public_ttl, Some(0), false).unwrap()
    }

    #[test]
    fn empty_set_never_matches() {
        let set = PolicySet::default();
        assert!(set.is_empty());
        assert!(set.find("/").is_none());
        assert!(set.find("").is_none());
    }

    #[test]
    fn first_overlapping_rule_wins() {
        let set = PolicySet::new(vec![policy("^/", 1), policy("^/foo", 2)]);
        assert_eq!(set.find("/foo").unwrap().public_ttl(), 1);

        let set = PolicySet::new(vec![policy("^/foo", 2), policy("^/", 1)]);
        assert_eq!(set.find("/foo").unwrap().public_ttl(), 2);
        assert_eq!(set.find("/bar").unwrap().public_ttl(), 1);
    }

    #[test]
    fn unanchored_patterns_search_anywhere() {
        let set = PolicySet::new(vec![policy(r"\.css", 3600)]);
        assert!(set.find("/assets/site.css?v=3").is_some());
        assert!(set.find("/assets/site.js").is_none());
    }

    #[test]
    fn delimited_patterns_are_unwrapped() {
        assert!(policy("!^/foo!", 0).matches("/foo/bar"));
        assert!(!policy("!^/foo!", 0).matches("/bar/foo"));
        assert!(policy("#^/a#i", 0).matches("/A"));
        assert!(policy("~^/x$~m", 0).matches("/y\n/x"));
    }

    #[test]
    fn slash_delimited_patterns_are_unwrapped() {
        let escaped = policy(r"/^\/foo/", 0);
        assert!(escaped.matches("/foo/bar"));
        assert!(!escaped.matches("/bar/foo"));

        let insensitive = policy(r"/^\/news\//i", 0);
        assert!(insensitive.matches("/NEWS/today"));
        assert!(!insensitive.matches("/newsletter"));

        assert!(policy("/foo/", 0).matches("/x/foo/y"));
    }

    #[test]
    fn bare_patterns_with_delimiter_like_chars_stay_literal() {
        // `^` is not a delimiter, and a lone `!` has no closing partner.
        assert!(policy("^/foo", 0).matches("/foo"));
        assert!(policy("!important", 0).matches("/css/!important"));
        // Trailing text after the last `/` is not a modifier list.
        let path = policy("/news/archive", 0);
        assert!(path.matches("/news/archive/2020"));
        assert!(!path.matches("/news/today"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = CachePolicy::new("^/(unclosed", 0, None, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "^/(unclosed"));
    }

    #[test]
    fn unknown_modifier_is_rejected() {
        let err = CachePolicy::new("!^/foo!e", 0, None, false).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFlag { flag: 'e', .. }));
    }
}
