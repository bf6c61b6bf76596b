//! Configuration loading and eager validation.
//!
//! The document shape is:
//!
//! ```json
//! {
//!   "urls": [
//!     { "pattern": "!^/news!", "public": 600, "private": 60, "client_cache": true },
//!     { "pattern": "^/account", "public": 0, "private": -1 }
//!   ],
//!   "strategy": "policy",
//!   "session_cookie": "SESSID",
//!   "etag": { "enabled": true, "window_secs": 120 }
//! }
//! ```
//!
//! `urls` may also use the legacy map form, `{"<pattern>": [private, public]}`,
//! which is normalized into rules in document order with `client_cache` set.
//! TTLs may be written as integers or integer strings (`"600"`); a `null`
//! private TTL leaves the private lifetime unset.
//! Every pattern is compiled at load time; a bad rule rejects the whole
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use super::{
    CachePipeline, CachePolicy, Clock, ConditionalRequestHandler, PolicySet, Strategy,
    SystemClock,
};
use crate::session::{DEFAULT_SESSION_COOKIE, SessionSanitizer};

/// Errors raised while loading a caching configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("pattern `{pattern}` uses unsupported modifier `{flag}`")]
    UnsupportedFlag { pattern: String, flag: char },

    #[error("rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("etag window must be at least one second")]
    ZeroEtagWindow,
}

/// One URL rule as written in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub pattern: String,
    /// Public (shared cache) TTL in seconds.
    #[serde(deserialize_with = "deserialize_ttl")]
    pub public: i64,
    /// Private TTL in seconds; negative means uncacheable, `null` emits a
    /// bare `private`. The key itself is required.
    #[serde(deserialize_with = "deserialize_optional_ttl")]
    pub private: Option<i64>,
    #[serde(default)]
    pub client_cache: bool,
}

/// Weak ETag settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtagConfig {
    /// Stamp ETags and answer `304` for matching anonymous `GET`s.
    pub enabled: bool,
    /// Width of the time bucket folded into every ETag.
    pub window_secs: u64,
}

impl Default for EtagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: super::DEFAULT_ETAG_WINDOW.as_secs(),
        }
    }
}

/// The caching configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CachingConfig {
    #[serde(deserialize_with = "deserialize_urls")]
    pub urls: Vec<RuleConfig>,
    pub strategy: Strategy,
    pub session_cookie: String,
    pub etag: EtagConfig,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            strategy: Strategy::default(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_owned(),
            etag: EtagConfig::default(),
        }
    }
}

impl CachingConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed documents, missing rule fields or
    /// malformed legacy entries.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] when the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Compiles every rule, in order.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Rule`] naming the first rule that fails to compile.
    pub fn policies(&self) -> Result<PolicySet, ConfigError> {
        self.urls
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                CachePolicy::new(&rule.pattern, rule.public, rule.private, rule.client_cache)
                    .map_err(|source| ConfigError::Rule {
                        index,
                        source: Box::new(source),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PolicySet::new)
    }

    /// Validates the configuration and builds a pipeline on the wall clock.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Rule`] for a pattern that does not compile, and
    /// [`ConfigError::ZeroEtagWindow`] when ETags are enabled with a zero
    /// window.
    pub fn build(&self) -> Result<CachePipeline, ConfigError> {
        self.build_with_clock(Arc::new(SystemClock))
    }

    /// Like [`build`](Self::build), with an injected clock.
    ///
    /// # Arguments
    ///
    /// - `clock` — shared by the `Expires` computation and the ETag buckets.
    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<CachePipeline, ConfigError> {
        let policies = self.policies()?;

        let conditional = if self.etag.enabled {
            if self.etag.window_secs == 0 {
                return Err(ConfigError::ZeroEtagWindow);
            }
            let window = Duration::from_secs(self.etag.window_secs);
            Some(ConditionalRequestHandler::new(window, Arc::clone(&clock)))
        } else {
            None
        };

        info!(
            rules = policies.len(),
            strategy = ?self.strategy,
            etag = self.etag.enabled,
            "cache policy loaded"
        );

        Ok(CachePipeline::new(policies, self.strategy)
            .with_sanitizer(SessionSanitizer::new(self.session_cookie.clone()))
            .with_conditional(conditional)
            .with_clock(clock))
    }
}

fn deserialize_urls<'de, D>(deserializer: D) -> Result<Vec<RuleConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(rules) => rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                RuleConfig::deserialize(rule)
                    .map_err(|e| de::Error::custom(format!("urls[{index}]: {e}")))
            })
            .collect(),
        Value::Object(legacy) => legacy
            .into_iter()
            .map(|(pattern, ages)| legacy_rule(pattern, &ages).map_err(de::Error::custom))
            .collect(),
        other => Err(de::Error::custom(format!(
            "urls must be a list of rules or a pattern map, got {other}"
        ))),
    }
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    ttl(&value).ok_or_else(|| de::Error::custom(format!("expected seconds, got {value}")))
}

fn deserialize_optional_ttl<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    optional_ttl(&value)
        .ok_or_else(|| de::Error::custom(format!("expected seconds or null, got {value}")))
}

// Seconds as an integer or an integer string.
fn ttl(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn optional_ttl(value: &Value) -> Option<Option<i64>> {
    match value {
        Value::Null => Some(None),
        other => ttl(other).map(Some),
    }
}

// `"<pattern>": [private, public]`
fn legacy_rule(pattern: String, ages: &Value) -> Result<RuleConfig, String> {
    let pair = ages
        .as_array()
        .filter(|pair| pair.len() == 2)
        .and_then(|pair| Some((optional_ttl(&pair[0])?, ttl(&pair[1])?)));

    match pair {
        Some((private, public)) => Ok(RuleConfig {
            pattern,
            public,
            private,
            client_cache: true,
        }),
        None => Err(format!(
            "legacy rule `{pattern}` must be [private, public] seconds, got {ages}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_rules() {
        let config = CachingConfig::from_json_str(
            r#"{"urls": [
                {"pattern": "!^/foo!", "public": 600, "private": 60, "client_cache": true},
                {"pattern": "^/bar", "public": 30, "private": -1}
            ]}"#,
        )
        .unwrap();

        assert_eq!(config.urls.len(), 2);
        assert!(config.urls[0].client_cache);
        assert!(!config.urls[1].client_cache);
        assert_eq!(config.strategy, Strategy::Policy);
        assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
        assert_eq!(config.etag, EtagConfig::default());
    }

    #[test]
    fn legacy_map_keeps_document_order() {
        let config = CachingConfig::from_json_str(
            r#"{"urls": {"!^/z!": [10, 20], "!^/a!": [-1, 40]}, "strategy": "fallback"}"#,
        )
        .unwrap();

        assert_eq!(
            config.urls,
            vec![
                RuleConfig { pattern: "!^/z!".into(), public: 20, private: Some(10), client_cache: true },
                RuleConfig { pattern: "!^/a!".into(), public: 40, private: Some(-1), client_cache: true },
            ]
        );
        assert_eq!(config.strategy, Strategy::Fallback);
    }

    #[test]
    fn legacy_null_private_and_string_ttls() {
        let config = CachingConfig::from_json_str(
            r#"{"urls": {"!^/home!": [null, 300], "!^/feed!": ["30", "600"]}}"#,
        )
        .unwrap();

        assert_eq!(config.urls[0].private, None);
        assert_eq!(config.urls[0].public, 300);
        assert_eq!(config.urls[1].private, Some(30));
        assert_eq!(config.urls[1].public, 600);

        let policies = config.policies().unwrap();
        assert_eq!(policies.find("/home").unwrap().private_ttl(), None);
    }

    #[test]
    fn structured_null_private_and_string_ttls() {
        let config = CachingConfig::from_json_str(
            r#"{"urls": [{"pattern": "^/a", "public": " 120 ", "private": null}]}"#,
        )
        .unwrap();
        assert_eq!(config.urls[0].public, 120);
        assert_eq!(config.urls[0].private, None);

        let err = CachingConfig::from_json_str(
            r#"{"urls": [{"pattern": "^/a", "public": "soon", "private": 1}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("urls[0]"), "{err}");
    }

    #[test]
    fn legacy_entry_with_wrong_shape_is_rejected() {
        let err = CachingConfig::from_json_str(r#"{"urls": {"^/a": [10]}}"#).unwrap_err();
        assert!(err.to_string().contains("legacy rule `^/a`"), "{err}");
    }

    #[test]
    fn missing_rule_field_is_rejected() {
        let err = CachingConfig::from_json_str(r#"{"urls": [{"pattern": "^/", "public": 1}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().contains("urls[0]"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CachingConfig::from_json_str(r#"{"url": []}"#).is_err());
    }

    #[test]
    fn empty_document_is_valid() {
        let pipeline = CachingConfig::from_json_str("{}").unwrap().build().unwrap();
        assert!(pipeline.policies().is_empty());
    }

    #[test]
    fn bad_pattern_names_the_rule() {
        let config = CachingConfig::from_json_str(
            r#"{"urls": [
                {"pattern": "^/ok", "public": 1, "private": 1},
                {"pattern": "^/(broken", "public": 1, "private": 1}
            ]}"#,
        )
        .unwrap();

        let err = config.build().unwrap_err();
        assert!(matches!(err, ConfigError::Rule { index: 1, .. }), "{err}");
        assert!(err.to_string().starts_with("rule #1"));
    }

    #[test]
    fn zero_etag_window_is_rejected() {
        let config =
            CachingConfig::from_json_str(r#"{"etag": {"window_secs": 0}}"#).unwrap();
        assert!(matches!(config.build(), Err(ConfigError::ZeroEtagWindow)));

        let disabled =
            CachingConfig::from_json_str(r#"{"etag": {"enabled": false, "window_secs": 0}}"#)
                .unwrap();
        assert!(disabled.build().is_ok());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CachingConfig::from_json_file("/nonexistent/cachet.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
