//! HTTP/1.1 request parsing using the [`httparse`] crate.

use thiserror::Error;

use super::{Cookies, Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. Cookies are parsed
/// eagerly so the caching layer can inspect and strip them.
///
/// # Examples
///
/// ```
/// use cachet::http::request::Request;
///
/// let raw = b"GET /news?page=2 HTTP/1.1\r\nHost: example.com\r\nCookie: SESSID=abc\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/news");
/// assert_eq!(request.query_string(), Some("page=2"));
/// assert_eq!(request.uri(), "/news?page=2");
/// assert_eq!(request.host(), "example.com");
/// assert!(request.cookies().contains("SESSID"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    query: Option<String>,
    cookies: Cookies,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request head from a byte slice.
    ///
    /// Headers whose values are not valid UTF-8 are skipped. The `Cookie`
    /// headers are parsed into the request's cookie jar.
    ///
    /// # Arguments
    ///
    /// - `buf` — the raw bytes received so far; anything past the header
    ///   terminator is left untouched.
    ///
    /// # Returns
    ///
    /// The parsed `Request` and the byte offset at which the body begins in
    /// `buf` (immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let cookies = Cookies::parse(header_map.get_all("cookie"));

        Ok((
            Self {
                method,
                path,
                headers: header_map,
                query,
                cookies,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request target as sent: path plus `?query` when present.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the `Host` header, or an empty string when absent.
    pub fn host(&self) -> &str {
        self.headers.get("host").unwrap_or("")
    }

    /// Returns the cookies the client sent.
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// Drops a cookie from the request and rewrites the `Cookie` header to match.
    ///
    /// The header is removed entirely once the jar is empty, so downstream
    /// handlers see the request as cookieless.
    ///
    /// # Returns
    ///
    /// `true` if the cookie was present.
    pub fn remove_cookie(&mut self, name: &str) -> bool {
        if !self.cookies.remove(name) {
            return false;
        }
        self.headers.remove("cookie");
        if !self.cookies.is_empty() {
            self.headers.insert("Cookie", self.cookies.to_header_value());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.host(), "localhost");
        assert!(req.cookies().is_empty());
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_query_string() {
        let raw = b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
        assert_eq!(req.uri(), "/search?q=rust&page=2");
    }

    #[test]
    fn missing_host_is_empty() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.host(), "");
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn remove_cookie_rewrites_header() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nCookie: SESSID=1; theme=dark\r\n\r\n";
        let (mut req, _) = Request::parse(raw).unwrap();
        assert!(req.remove_cookie("SESSID"));
        assert_eq!(req.headers().get("cookie"), Some("theme=dark"));

        assert!(req.remove_cookie("theme"));
        assert!(!req.headers().contains("cookie"));
        assert!(req.cookies().is_empty());
        assert!(!req.remove_cookie("theme"));
    }
}
