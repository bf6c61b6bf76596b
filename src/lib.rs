//! # cachet
//!
//! Cache-Control policy middleware. Outgoing responses get `public`,
//! `private` or uncacheable directives from ordered URL rules and the
//! visitor's cookies; anonymous repeat requests are answered `304 Not
//! Modified` from time-bucketed weak ETags.
//!
//! ## Quick Start
//!
//! ```rust
//! use cachet::cache::CachingConfig;
//! use cachet::context::Context;
//! use cachet::{Request, Response, StatusCode};
//!
//! let pipeline = CachingConfig::from_json_str(
//!     r#"{"urls": [{"pattern": "!^/foo!", "public": 600, "private": 60, "client_cache": true}]}"#,
//! )?
//! .build()?;
//!
//! let (request, _) = Request::parse(b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n")?;
//! let mut ctx = Context::new(request);
//! assert!(pipeline.on_request_start(&ctx).is_none());
//!
//! let mut response = Response::new(StatusCode::Ok).body("hello");
//! pipeline.on_response_ready(&mut ctx, &mut response);
//! assert_eq!(
//!     response.headers().get("Cache-Control"),
//!     Some("public, max-age=600, s-maxage=600"),
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod session;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheMiddleware, CachePipeline, CachingConfig, ConfigError};
pub use http::{Headers, Method, Request, Response, StatusCode};
