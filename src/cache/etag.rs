//! Time-bucketed weak ETags and the `If-None-Match` shortcut.
//!
//! The tag identifies a URL within a time window, not a representation: it
//! is `W/"<sha1(host + path + query), 20 hex chars><base64(bucket)>"` where
//! `bucket = floor(unix_seconds / window)`. Any two requests for the same URL
//! inside one window get the same tag, so a client revalidating within the
//! window is answered `304 Not Modified` without running the application.
//! Content changes are not detected; the window bounds how stale a client can
//! get.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use tracing::debug;

use super::RequestSignals;
use crate::{Method, Response, StatusCode};

/// Default width of an ETag time bucket.
pub const DEFAULT_ETAG_WINDOW: Duration = Duration::from_secs(120);

/// Number of hex characters of the URL digest kept in the tag.
const DIGEST_PREFIX: usize = 20;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> SystemTime;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl FixedClock {
    /// A clock stuck `secs` seconds after the Unix epoch.
    pub fn from_unix(secs: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Builds the weak ETag for a URL in a given bucket.
///
/// # Examples
///
/// ```
/// use cachet::cache::weak_etag;
///
/// let tag = weak_etag("example.com", "/foo", "", 14_166_666);
/// assert!(tag.starts_with("W/\""));
/// assert!(tag.ends_with("MTQxNjY2NjY=\""));
/// assert_eq!(tag.len(), 3 + 20 + 12 + 1);
/// ```
pub fn weak_etag(host: &str, path: &str, query: &str, bucket: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(host.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(query.as_bytes());
    let digest = hex::encode(hasher.finalize());

    // The bucket is encoded as its decimal text.
    let bucket = STANDARD.encode(bucket.to_string());

    format!("W/\"{}{}\"", &digest[..DIGEST_PREFIX], bucket)
}

/// Computes ETags, answers matching `If-None-Match` with `304`, and stamps
/// ETags on outgoing responses.
#[derive(Debug, Clone)]
pub struct ConditionalRequestHandler {
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for ConditionalRequestHandler {
    fn default() -> Self {
        Self::new(DEFAULT_ETAG_WINDOW, Arc::new(SystemClock))
    }
}

impl ConditionalRequestHandler {
    /// `window` must be at least one second; shorter windows are rounded up.
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: window.max(Duration::from_secs(1)),
            clock,
        }
    }

    /// Width of one time bucket.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The current time bucket.
    pub fn bucket(&self) -> u64 {
        let elapsed = self
            .clock
            .now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        elapsed.as_secs() / self.window.as_secs()
    }

    /// The ETag for `request` in the current bucket.
    pub fn etag(&self, request: &RequestSignals) -> String {
        weak_etag(
            &request.host,
            &request.path,
            &request.query_string,
            self.bucket(),
        )
    }

    /// Answers a `GET` whose `If-None-Match` lists the current ETag with a
    /// bodyless `304 Not Modified`.
    ///
    /// Tags are compared as exact strings. Callers only consult this for
    /// requests without an established session.
    pub fn short_circuit(&self, request: &RequestSignals) -> Option<Response> {
        if request.method != Method::Get || request.if_none_match.is_empty() {
            return None;
        }

        let etag = self.etag(request);
        let matched = request.if_none_match.iter().find(|tag| **tag == etag)?;
        debug!(path = %request.path, etag = %matched, "If-None-Match hit, answering 304");

        Some(Response::new(StatusCode::NotModified).header("ETag", matched.as_str()))
    }

    /// Sets the `ETag` header, replacing any existing one.
    pub fn stamp(&self, request: &RequestSignals, response: &mut Response) {
        let etag = self.etag(request);
        debug!(path = %request.path, etag = %etag, "stamping ETag");
        response.headers_mut().set("ETag", etag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_040; // 14_166_667 * 120

    fn handler_at(secs: u64) -> ConditionalRequestHandler {
        ConditionalRequestHandler::new(DEFAULT_ETAG_WINDOW, Arc::new(FixedClock::from_unix(secs)))
    }

    fn request(if_none_match: Vec<String>) -> RequestSignals {
        RequestSignals {
            method: Method::Get,
            path: "/foo".into(),
            query_string: "page=2".into(),
            host: "example.com".into(),
            has_cookies: false,
            if_none_match,
        }
    }

    #[test]
    fn etag_layout() {
        let tag = handler_at(T0).etag(&request(vec![]));
        let inner = tag.strip_prefix("W/\"").and_then(|t| t.strip_suffix('"')).unwrap();
        let (digest, bucket) = inner.split_at(DIGEST_PREFIX);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(STANDARD.decode(bucket).unwrap(), b"14166667");
    }

    #[test]
    fn digest_covers_host_path_and_query() {
        let expected = {
            let mut hasher = Sha1::new();
            hasher.update(b"example.com/foopage=2");
            hex::encode(hasher.finalize())
        };
        let tag = handler_at(T0).etag(&request(vec![]));
        assert_eq!(&tag[3..3 + DIGEST_PREFIX], &expected[..DIGEST_PREFIX]);
    }

    #[test]
    fn same_bucket_same_tag() {
        let first = handler_at(T0).etag(&request(vec![]));
        let last = handler_at(T0 + 119).etag(&request(vec![]));
        assert_eq!(first, last);
    }

    #[test]
    fn bucket_boundary_changes_tag() {
        let before = handler_at(T0 - 1).etag(&request(vec![]));
        let after = handler_at(T0).etag(&request(vec![]));
        assert_ne!(before, after);
    }

    #[test]
    fn different_urls_differ() {
        let handler = handler_at(T0);
        let mut other = request(vec![]);
        other.query_string = "page=3".into();
        assert_ne!(handler.etag(&request(vec![])), handler.etag(&other));
    }

    #[test]
    fn short_circuit_on_any_matching_value() {
        let handler = handler_at(T0);
        let current = handler.etag(&request(vec![]));
        let req = request(vec!["\"stale\"".into(), current.clone()]);

        let response = handler.short_circuit(&req).unwrap();
        assert_eq!(response.status(), StatusCode::NotModified);
        assert_eq!(response.headers().get("etag"), Some(current.as_str()));
        assert!(response.content().is_empty());
    }

    #[test]
    fn no_short_circuit_without_match() {
        let handler = handler_at(T0);
        let stale = handler_at(T0 - 120).etag(&request(vec![]));
        assert!(handler.short_circuit(&request(vec![stale])).is_none());
        assert!(handler.short_circuit(&request(vec![])).is_none());
    }

    #[test]
    fn no_short_circuit_for_post() {
        let handler = handler_at(T0);
        let mut req = request(vec![handler.etag(&request(vec![]))]);
        req.method = Method::Post;
        assert!(handler.short_circuit(&req).is_none());
    }

    #[test]
    fn stamp_overwrites_existing_etag() {
        let handler = handler_at(T0);
        let mut response = Response::new(StatusCode::Ok).header("ETag", "\"app\"");
        handler.stamp(&request(vec![]), &mut response);
        let tags: Vec<_> = response.headers().get_all("etag").collect();
        assert_eq!(tags, vec![handler.etag(&request(vec![])).as_str()]);
    }

    #[test]
    fn sub_second_window_is_rounded_up() {
        let handler = ConditionalRequestHandler::new(Duration::ZERO, Arc::new(FixedClock::from_unix(5)));
        assert_eq!(handler.window(), Duration::from_secs(1));
        assert_eq!(handler.bucket(), 5);
    }
}
