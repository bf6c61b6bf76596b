//! Cache-Control derivation: public, private or uncacheable.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::{CacheControl, CacheControlDirectives, CachePolicy};
use crate::{Method, Request, Response};

/// How far in the past `Expires` is set for uncacheable responses.
const EXPIRED_BY: Duration = Duration::from_secs(24 * 60 * 60);

/// What the engine needs to know about the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignals {
    pub method: Method,
    pub path: String,
    /// Raw query string without the `?`; empty when absent.
    pub query_string: String,
    pub host: String,
    pub has_cookies: bool,
    /// Entity tags from every `If-None-Match` header, in order.
    pub if_none_match: Vec<String>,
}

impl RequestSignals {
    /// Extracts the signals from a parsed request. `If-None-Match` headers
    /// are split on commas and flattened.
    pub fn from_request(request: &Request) -> Self {
        let if_none_match = request
            .headers()
            .get_all("if-none-match")
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            method: request.method().clone(),
            path: request.path().to_owned(),
            query_string: request.query_string().unwrap_or_default().to_owned(),
            host: request.host().to_owned(),
            has_cookies: !request.cookies().is_empty(),
            if_none_match,
        }
    }
}

/// What the engine needs to know about the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSignals {
    /// The response already carries `private`, `public`, `max-age` or `s-maxage`.
    pub has_explicit_cache_control: bool,
    pub sets_cookies: bool,
}

impl ResponseSignals {
    /// Extracts the signals from the response as it currently stands.
    pub fn from_response(response: &Response) -> Self {
        Self {
            has_explicit_cache_control: CacheControl::from_headers(response.headers())
                .declares_policy(),
            sets_cookies: response.sets_cookies(),
        }
    }
}

/// Returns `true` if caching headers may be derived for this exchange: a
/// `GET` whose response does not already declare a caching policy.
///
/// Both the directive engine and ETag stamping use this guard.
pub fn is_eligible(request: &RequestSignals, response: &ResponseSignals) -> bool {
    request.method == Method::Get && !response.has_explicit_cache_control
}

/// Directive derivation mode.
///
/// Both modes share the private branch. They differ for anonymous traffic:
/// `Policy` honours [`CachePolicy::client_cacheable`], `Fallback` always lets
/// the client keep a copy for the public TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Rule-driven: anonymous clients cache only when the rule allows it.
    #[default]
    Policy,
    /// Legacy behaviour: anonymous clients always cache for the public TTL.
    Fallback,
}

impl Strategy {
    /// Derives the caching headers for one response.
    ///
    /// # Arguments
    ///
    /// - `request` / `response` — signals extracted from the exchange.
    /// - `policy` — the rule that matched the request target.
    /// - `now` — anchors the `Expires` date of uncacheable responses.
    ///
    /// # Returns
    ///
    /// The directives to merge into the response. They are empty when the
    /// exchange is not [eligible](is_eligible), which makes repeated
    /// invocation a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::SystemTime;
    /// use cachet::Method;
    /// use cachet::cache::{CachePolicy, RequestSignals, ResponseSignals, Strategy};
    ///
    /// let request = RequestSignals {
    ///     method: Method::Get,
    ///     path: "/foo".into(),
    ///     query_string: String::new(),
    ///     host: "example.com".into(),
    ///     has_cookies: false,
    ///     if_none_match: vec![],
    /// };
    /// let policy = CachePolicy::new("^/foo", 600, Some(60), true).unwrap();
    /// let out = Strategy::Policy.optimize(&request, &ResponseSignals::default(), &policy, SystemTime::now());
    /// assert_eq!(out.cache_control().to_string(), "public, max-age=600, s-maxage=600");
    /// ```
    pub fn optimize(
        self,
        request: &RequestSignals,
        response: &ResponseSignals,
        policy: &CachePolicy,
        now: SystemTime,
    ) -> CacheControlDirectives {
        if !is_eligible(request, response) {
            return CacheControlDirectives::new();
        }

        if request.has_cookies || response.sets_cookies {
            return private(response, policy, now);
        }

        let client_cacheable = match self {
            Self::Policy => policy.client_cacheable(),
            Self::Fallback => true,
        };
        public(policy, client_cacheable)
    }
}

fn private(
    response: &ResponseSignals,
    policy: &CachePolicy,
    now: SystemTime,
) -> CacheControlDirectives {
    let directives = CacheControlDirectives::new().flag("private");
    let ttl = policy.private_ttl();

    if response.sets_cookies || ttl.is_some_and(|ttl| ttl < 0) {
        // Expires backs up max-age=0 for caches that ignore Cache-Control.
        let expires = now.checked_sub(EXPIRED_BY).unwrap_or(SystemTime::UNIX_EPOCH);
        return directives
            .flag("no-cache")
            .flag("must-revalidate")
            .value("max-age", 0)
            .expires(expires);
    }

    match ttl {
        Some(ttl) => directives.value("max-age", ttl),
        // No private lifetime configured: browsers apply their own heuristics.
        None => directives,
    }
}

fn public(policy: &CachePolicy, client_cacheable: bool) -> CacheControlDirectives {
    let directives = CacheControlDirectives::new().flag("public");

    let directives = if client_cacheable {
        directives.value("max-age", policy.public_ttl())
    } else {
        // Clients revalidate with the shared cache, which keeps it fresh via s-maxage.
        directives.value("max-age", 0).flag("must-revalidate")
    };

    directives.value("s-maxage", policy.public_ttl())
}
