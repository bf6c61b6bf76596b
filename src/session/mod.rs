//! Request-scoped session state and the empty-session sanitizer.
//!
//! Session storage itself lives elsewhere; an upstream middleware loads the
//! session and attaches a [`SessionHandle`] to the request's extensions. The
//! cache layer only needs to know whether a session was started and whether
//! anything meaningful is in it. A started session holding nothing but empty
//! values would otherwise keep the session cookie alive and force every
//! response for that visitor down the private branch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::debug;

use crate::{Response, context::Context};

/// Session cookie name used when none is configured.
pub const DEFAULT_SESSION_COOKIE: &str = "SESSID";

/// Session variables for one visitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    started: bool,
    data: Map<String, Value>,
}

impl Session {
    /// A session that exists but has not been started for this request.
    pub fn new() -> Self {
        Self::default()
    }

    /// A started session holding `data`.
    pub fn started(data: Map<String, Value>) -> Self {
        Self {
            started: true,
            data,
        }
    }

    /// Marks the session started without storing anything.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Returns `true` once the session has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns the variable stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Stores a variable, starting the session if needed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.started = true;
        self.data.insert(key.into(), value.into());
    }

    /// Removes and returns a variable.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// All session variables.
    pub fn all(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Drops every variable. The session stays started.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Shared handle to the session of the request being processed.
///
/// Cloned into the request extensions so that both the application handler
/// and the cache layer, which runs after it, see the same state.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    /// Wraps a session for sharing across the request lifecycle.
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Locks the session. A poisoned lock still yields the data.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `true` if a session value carries no information.
///
/// Null, `false`, zero, `""` and `"0"` are empty scalars. An array or object
/// is empty when every element is empty, so `{"cart": {"items": []}}` is
/// empty too.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use cachet::session::is_empty;
///
/// assert!(is_empty(&json!({})));
/// assert!(is_empty(&json!({"a": {"b": 0}})));
/// assert!(!is_empty(&json!({"a": "x"})));
/// ```
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.iter().fold(true, |acc, item| acc & is_empty(item)),
        Value::Object(map) => map.values().fold(true, |acc, item| acc & is_empty(item)),
    }
}

/// Clears sessions that hold only empty values and expires their cookie.
#[derive(Debug, Clone)]
pub struct SessionSanitizer {
    cookie_name: String,
}

impl Default for SessionSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_COOKIE)
    }
}

impl SessionSanitizer {
    /// A sanitizer for the session cookie called `cookie_name`.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    /// The session cookie this sanitizer strips.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns `true` if the request carries no established session: no
    /// session cookie, and no started session attached to the context.
    pub fn is_sessionless(&self, ctx: &Context) -> bool {
        if ctx.request().cookies().contains(&self.cookie_name) {
            return false;
        }
        ctx.extensions()
            .get::<SessionHandle>()
            .is_none_or(|handle| !handle.lock().is_started())
    }

    /// Clears an empty started session and expires its cookie.
    ///
    /// The cookie is removed from the request jar so the decision that follows
    /// treats the request as cookieless. When the client sent the cookie, or
    /// the response was about to set it, any pending `Set-Cookie` for it is
    /// replaced by an expired one so the browser stops sending it. That
    /// response itself then sets a cookie and is kept private; the client's
    /// next request arrives without the cookie.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the request context; must carry a [`SessionHandle`] for
    ///   anything to happen.
    /// - `response` — the downstream response to adjust.
    ///
    /// # Returns
    ///
    /// `true` if the session was cleared.
    pub fn sanitize(&self, ctx: &mut Context, response: &mut Response) -> bool {
        let Some(handle) = ctx.extensions().get::<SessionHandle>().cloned() else {
            return false;
        };

        {
            let mut session = handle.lock();
            if !session.is_started() || !session.all().values().all(is_empty) {
                return false;
            }
            session.clear();
        }

        let from_request = ctx.request_mut().remove_cookie(&self.cookie_name);
        let from_response = response.remove_cookie(&self.cookie_name);
        if from_request || from_response {
            response.clear_cookie(&self.cookie_name);
        }
        debug!(
            cookie = %self.cookie_name,
            from_request,
            from_response,
            "cleared empty session"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Request, StatusCode};

    fn ctx_with(raw: &[u8], session: Option<Session>) -> Context {
        let ctx = Context::new(Request::parse(raw).unwrap().0);
        match session {
            Some(session) => ctx.with_extension(SessionHandle::new(session)),
            None => ctx,
        }
    }

    fn started(value: Value) -> Session {
        match value {
            Value::Object(map) => Session::started(map),
            other => panic!("expected an object, got {other}"),
        }
    }

    const WITH_COOKIE: &[u8] = b"GET / HTTP/1.1\r\nHost: a\r\nCookie: SESSID=abc; theme=dark\r\n\r\n";

    #[test]
    fn emptiness_of_scalars_and_containers() {
        assert!(is_empty(&json!({})));
        assert!(is_empty(&json!({"a": ""})));
        assert!(is_empty(&json!({"a": {"b": 0}})));
        assert!(is_empty(&json!({"a": [null, false, "0", 0.0, []]})));
        assert!(!is_empty(&json!({"a": "x"})));
        assert!(!is_empty(&json!({"a": {"b": 0}, "c": [1]})));
        assert!(!is_empty(&json!(true)));
    }

    #[test]
    fn empty_started_session_is_cleared_with_cookies() {
        let mut ctx = ctx_with(WITH_COOKIE, Some(started(json!({"flash": {"notice": ""}}))));
        let mut response = Response::new(StatusCode::Ok).header("Set-Cookie", "SESSID=abc; Path=/");

        assert!(SessionSanitizer::default().sanitize(&mut ctx, &mut response));

        assert!(!ctx.request().cookies().contains("SESSID"));
        assert!(ctx.request().cookies().contains("theme"));
        let cookies: Vec<_> = response.headers().get_all("set-cookie").collect();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("SESSID=;"));
        assert!(cookies[0].contains("Max-Age=0"));
        let handle = ctx.extensions().get::<SessionHandle>().unwrap();
        assert!(handle.lock().all().is_empty());
    }

    #[test]
    fn populated_session_is_left_alone() {
        let mut ctx = ctx_with(WITH_COOKIE, Some(started(json!({"user_id": 42}))));
        let mut response = Response::new(StatusCode::Ok);

        assert!(!SessionSanitizer::default().sanitize(&mut ctx, &mut response));
        assert!(ctx.request().cookies().contains("SESSID"));
    }

    #[test]
    fn unstarted_or_missing_session_is_left_alone() {
        let sanitizer = SessionSanitizer::default();
        let mut response = Response::new(StatusCode::Ok);

        let mut ctx = ctx_with(WITH_COOKIE, Some(Session::new()));
        assert!(!sanitizer.sanitize(&mut ctx, &mut response));

        let mut ctx = ctx_with(WITH_COOKIE, None);
        assert!(!sanitizer.sanitize(&mut ctx, &mut response));
        assert!(ctx.request().cookies().contains("SESSID"));
    }

    #[test]
    fn custom_cookie_name() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nCookie: sid=1\r\n\r\n";
        let mut ctx = ctx_with(raw, Some(started(json!({}))));
        let mut response = Response::new(StatusCode::Ok);

        assert!(SessionSanitizer::new("sid").sanitize(&mut ctx, &mut response));
        assert!(ctx.request().cookies().is_empty());
        assert_eq!(
            response.headers().get("set-cookie"),
            Some("sid=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Path=/")
        );
    }

    #[test]
    fn browser_is_told_to_drop_the_cookie_it_sent() {
        let mut ctx = ctx_with(WITH_COOKIE, Some(started(json!({"cart": []}))));
        let mut response = Response::new(StatusCode::Ok);

        assert!(SessionSanitizer::default().sanitize(&mut ctx, &mut response));

        let expiring = response.headers().get("set-cookie").unwrap();
        assert!(expiring.starts_with("SESSID=;"));
        assert!(expiring.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn no_expiry_when_the_cookie_never_travelled() {
        let bare = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
        let mut ctx = ctx_with(bare, Some(started(json!({}))));
        let mut response = Response::new(StatusCode::Ok);

        assert!(SessionSanitizer::default().sanitize(&mut ctx, &mut response));
        assert!(!response.sets_cookies());
    }

    #[test]
    fn sessionless_detection() {
        let sanitizer = SessionSanitizer::default();
        let bare = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";

        assert!(sanitizer.is_sessionless(&ctx_with(bare, None)));
        assert!(sanitizer.is_sessionless(&ctx_with(bare, Some(Session::new()))));
        assert!(!sanitizer.is_sessionless(&ctx_with(bare, Some(started(json!({}))))));
        assert!(!sanitizer.is_sessionless(&ctx_with(WITH_COOKIE, None)));
    }
}
