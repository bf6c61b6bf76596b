//! Request cookie jar parsed from the `Cookie` header.

/// The cookies a client sent, in header order.
///
/// Parsed from every `Cookie` header on the request (RFC 6265 §5.4 allows
/// only one, but proxies are known to split it). Malformed pairs without an
/// `=` are skipped.
///
/// # Examples
///
/// ```
/// use cachet::http::Cookies;
///
/// let cookies = Cookies::parse(["SESSID=abc; theme=dark"]);
/// assert_eq!(cookies.get("theme"), Some("dark"));
/// assert_eq!(cookies.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    pairs: Vec<(String, String)>,
}

impl Cookies {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name=value; name2=value2` header values into a jar.
    pub fn parse<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let pairs = headers
            .into_iter()
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_owned(), value.trim().to_owned()))
            })
            .collect();
        Self { pairs }
    }

    /// Returns the value of the first cookie called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the client sent a cookie called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }

    /// Removes every cookie called `name`. Returns `true` if one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.pairs.len();
        self.pairs.retain(|(k, _)| k != name);
        self.pairs.len() < before
    }

    /// Number of cookies, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if the request carries no cookies at all.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Renders the jar back into a single `Cookie` header value.
    pub fn to_header_value(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Returns the cookie name a `Set-Cookie` header value sets.
pub fn set_cookie_name(value: &str) -> Option<&str> {
    let (name, _) = value.split(';').next()?.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}
