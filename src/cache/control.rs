//! `Cache-Control` directive sets and the engine's additive output.

use std::fmt;
use std::time::SystemTime;

use crate::{Response, http::Headers};

/// Directives that mean a response already declares its own caching policy.
///
/// The engine never overrides a response carrying any of these.
pub const POLICY_DIRECTIVES: [&str; 4] = ["private", "public", "max-age", "s-maxage"];

/// An ordered `Cache-Control` directive set (RFC 9111 §5.2).
///
/// Directive names are compared case-insensitively and stored lowercase.
/// Values keep their original text, including surrounding quotes.
///
/// # Examples
///
/// ```
/// use cachet::cache::CacheControl;
///
/// let mut cc = CacheControl::parse("no-transform, Max-Age=60");
/// assert_eq!(cc.get("max-age"), Some("60"));
/// cc.insert("max-age", Some("0"));
/// cc.insert("must-revalidate", None::<String>);
/// assert_eq!(cc.to_string(), "no-transform, max-age=0, must-revalidate");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<(String, Option<String>)>,
}

impl CacheControl {
    /// Creates an empty directive set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `Cache-Control` header value.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::new();
        cc.extend_from(value);
        cc
    }

    /// Collects the directives of every `Cache-Control` header in `headers`.
    pub fn from_headers(headers: &Headers) -> Self {
        let mut cc = Self::new();
        for value in headers.get_all("cache-control") {
            cc.extend_from(value);
        }
        cc
    }

    fn extend_from(&mut self, value: &str) {
        for item in split_unquoted(value) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (name, arg) = match item.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim())),
                None => (item, None),
            };
            // A bare `=5` names nothing.
            if name.is_empty() {
                continue;
            }
            self.insert(name, arg);
        }
    }

    /// Returns `true` if the directive is present, with or without a value.
    pub fn contains(&self, name: &str) -> bool {
        self.directives
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the value of a directive, or `None` if it is absent or valueless.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Sets a directive. An existing directive of the same name keeps its
    /// position and takes the new value.
    ///
    /// # Arguments
    ///
    /// - `name` — directive name; stored lowercase.
    /// - `value` — the argument, or `None` for a valueless directive.
    pub fn insert<V: Into<String>>(&mut self, name: &str, value: Option<V>) {
        let name = name.to_ascii_lowercase();
        let value = value.map(Into::into);
        match self.directives.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.directives.push((name, value)),
        }
    }

    /// Returns `true` if any of [`POLICY_DIRECTIVES`] is present.
    pub fn declares_policy(&self) -> bool {
        POLICY_DIRECTIVES.iter().any(|name| self.contains(name))
    }

    /// Returns `true` if no directive is present.
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Number of distinct directives.
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    /// Iterates `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.directives
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.directives.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(value) => write!(f, "{name}={value}")?,
                None => f.write_str(name)?,
            }
        }
        Ok(())
    }
}

// Splits on commas that are not inside a quoted string, e.g.
// `no-cache="Set-Cookie, X-Foo", private`.
fn split_unquoted(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// Caching headers produced by the directive engine.
///
/// Applied additively: directives the response already carries are kept, and
/// only those the engine emits are set or replaced. `Expires` is written only
/// when the engine asks for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControlDirectives {
    cache_control: CacheControl,
    expires: Option<SystemTime>,
}

impl CacheControlDirectives {
    /// Creates an empty set; applying it changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valueless directive such as `public`.
    #[must_use]
    pub fn flag(mut self, name: &str) -> Self {
        self.cache_control.insert(name, None::<String>);
        self
    }

    /// Adds a directive with an argument such as `max-age=60`.
    #[must_use]
    pub fn value(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.cache_control.insert(name, Some(value.to_string()));
        self
    }

    /// Asks for an `Expires` header at `at`.
    #[must_use]
    pub fn expires(mut self, at: SystemTime) -> Self {
        self.expires = Some(at);
        self
    }

    /// The `Cache-Control` directives to merge.
    pub fn cache_control(&self) -> &CacheControl {
        &self.cache_control
    }

    /// The `Expires` date to set, if any.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires
    }

    /// Returns `true` if the directive will be emitted.
    pub fn contains(&self, name: &str) -> bool {
        self.cache_control.contains(name)
    }

    /// Returns the argument the directive will be emitted with.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cache_control.get(name)
    }

    /// Returns `true` when there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.cache_control.is_empty() && self.expires.is_none()
    }

    /// Merges the directives into the response's `Cache-Control` header and
    /// sets `Expires` when present.
    ///
    /// Every `Cache-Control` field already on the response is folded into one
    /// header; directives emitted here replace same-named ones in place and
    /// the rest are appended.
    pub fn apply_to(&self, response: &mut Response) {
        if self.is_empty() {
            return;
        }

        if !self.cache_control.is_empty() {
            let mut merged = CacheControl::from_headers(response.headers());
            for (name, value) in self.cache_control.iter() {
                merged.insert(name, value);
            }
            response
                .headers_mut()
                .set("Cache-Control", merged.to_string());
        }

        if let Some(at) = self.expires {
            response
                .headers_mut()
                .set("Expires", httpdate::fmt_http_date(at));
        }
    }
}
