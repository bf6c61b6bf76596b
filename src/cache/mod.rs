//! Cache-Control policy engine.
//!
//! Assigns caching headers to outgoing responses from URL-pattern rules and
//! the visitor's cookie state, and answers repeat `GET`s from anonymous
//! visitors with `304 Not Modified` using time-bucketed weak ETags. Nothing is
//! stored here: the headers tell a reverse proxy and the client what to cache.
//!
//! - [`policy`] — [`CachePolicy`] rules and first-match lookup in a [`PolicySet`].
//! - [`optimizer`] — the public / private / no-cache decision ([`Strategy`]).
//! - [`etag`] — weak ETags and the `If-None-Match` shortcut.
//! - [`control`] — `Cache-Control` parsing and additive application.
//! - [`config`] — JSON configuration, legacy normalization, validation.
//! - [`pipeline`] — lifecycle hooks and the [`CacheMiddleware`] adapter.

pub mod config;
pub mod control;
pub mod etag;
pub mod optimizer;
pub mod pipeline;
pub mod policy;

pub use config::{CachingConfig, ConfigError, EtagConfig, RuleConfig};
pub use control::{CacheControl, CacheControlDirectives, POLICY_DIRECTIVES};
pub use etag::{
    Clock, ConditionalRequestHandler, DEFAULT_ETAG_WINDOW, FixedClock, SystemClock, weak_etag,
};
pub use optimizer::{RequestSignals, ResponseSignals, Strategy, is_eligible};
pub use pipeline::{CacheMiddleware, CachePipeline};
pub use policy::{CachePolicy, PolicySet};
