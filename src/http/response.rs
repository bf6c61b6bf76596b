//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing HTTP responses, in-place
//! accessors for middleware that decorates a downstream response, and
//! serialization to a byte buffer.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode, cookie::set_cookie_name};

/// `Expires` value for cookies the server wants the client to drop.
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use cachet::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Cache-Control", "no-transform")
///     .body("hello");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Cache-Control: no-transform\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response headers for in-place decoration.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the body bytes set so far.
    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` if the response sets at least one cookie.
    pub fn sets_cookies(&self) -> bool {
        self.headers.contains("set-cookie")
    }

    /// Drops every `Set-Cookie` header that sets the cookie called `name`.
    ///
    /// Returns `true` if one was removed.
    pub fn remove_cookie(&mut self, name: &str) -> bool {
        self.headers.retain(|k, v| {
            !(k.eq_ignore_ascii_case("set-cookie") && set_cookie_name(v) == Some(name))
        })
    }

    /// Tells the client to delete the cookie called `name`.
    ///
    /// Any `Set-Cookie` already setting `name` is dropped first, then a single
    /// expired, empty `Set-Cookie` scoped to `/` is appended.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachet::http::{Response, StatusCode};
    ///
    /// let mut response = Response::new(StatusCode::Ok).header("Set-Cookie", "SESSID=abc; Path=/");
    /// response.clear_cookie("SESSID");
    ///
    /// let cookies: Vec<_> = response.headers().get_all("set-cookie").collect();
    /// assert_eq!(cookies, vec!["SESSID=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Path=/"]);
    /// ```
    pub fn clear_cookie(&mut self, name: &str) {
        self.remove_cookie(name);
        self.headers.insert(
            "Set-Cookie",
            format!("{name}=; Expires={EXPIRED}; Max-Age=0; Path=/"),
        );
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>`, except for statuses that never carry a body.
    pub fn into_bytes(mut self) -> BytesMut {
        if self.status.is_bodyless() {
            self.body.clear();
        }
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        if !self.status.is_bodyless() {
            buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        }

        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn not_modified_drops_body_and_length() {
        let r = Response::new(StatusCode::NotModified)
            .header("ETag", "W/\"abc\"")
            .body("stale");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(s.contains("ETag: W/\"abc\"\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn sets_cookies_and_remove_cookie() {
        let mut r = Response::new(StatusCode::Ok)
            .header("Set-Cookie", "SESSID=abc; Path=/")
            .header("Set-Cookie", "theme=dark");
        assert!(r.sets_cookies());
        assert!(r.remove_cookie("SESSID"));
        assert!(r.sets_cookies());
        assert!(r.remove_cookie("theme"));
        assert!(!r.sets_cookies());
    }

    #[test]
    fn clear_cookie_replaces_pending_value_with_expiry() {
        let mut r = Response::new(StatusCode::Ok)
            .header("Set-Cookie", "SESSID=abc; Path=/")
            .header("Set-Cookie", "theme=dark");
        r.clear_cookie("SESSID");

        let vals: Vec<_> = r.headers().get_all("set-cookie").collect();
        assert_eq!(vals.len(), 2);
        assert_eq!(vals[0], "theme=dark");
        assert!(vals[1].starts_with("SESSID=;"));
        assert!(vals[1].contains("Max-Age=0"));
        assert!(vals[1].contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }
}
