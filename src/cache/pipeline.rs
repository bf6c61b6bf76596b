//! Request/response lifecycle glue for the cache policy engine.
//!
//! [`CachePipeline`] exposes the two hooks a host calls per request:
//!
//! 1. [`on_request_start`](CachePipeline::on_request_start) — may answer
//!    `304 Not Modified` straight away for sessionless conditional `GET`s.
//! 2. [`on_response_ready`](CachePipeline::on_response_ready) — clears empty
//!    sessions, derives `Cache-Control`, then stamps the ETag. An emptied
//!    session's cookie is expired on the response, which keeps that response
//!    private; the client's following cookieless requests go public. ETag
//!    eligibility is judged on the response as the application produced it.
//!
//! [`CacheMiddleware`] runs the same hooks inside a [`Middleware`] chain. A
//! session middleware placed before it must attach the request's
//! [`SessionHandle`] to the context so the sanitizer sees the state the
//! application left behind.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{
    Clock, ConditionalRequestHandler, PolicySet, RequestSignals, ResponseSignals, Strategy,
    SystemClock, is_eligible,
};
use crate::{
    Response,
    context::{Context, SubRequest},
    middleware::{Middleware, Next},
    session::{SessionHandle, SessionSanitizer},
};

/// The cache policy engine wired for one application.
#[derive(Debug, Clone)]
pub struct CachePipeline {
    policies: PolicySet,
    strategy: Strategy,
    sanitizer: SessionSanitizer,
    conditional: Option<ConditionalRequestHandler>,
    clock: Arc<dyn Clock>,
}

impl CachePipeline {
    /// A pipeline with the default session cookie, ETags on a 120 second
    /// window, and the wall clock.
    pub fn new(policies: PolicySet, strategy: Strategy) -> Self {
        Self {
            policies,
            strategy,
            sanitizer: SessionSanitizer::default(),
            conditional: Some(ConditionalRequestHandler::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the session sanitizer, e.g. to use another cookie name.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: SessionSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Replaces the ETag handler; `None` turns ETags and the 304 shortcut off.
    #[must_use]
    pub fn with_conditional(mut self, conditional: Option<ConditionalRequestHandler>) -> Self {
        self.conditional = conditional;
        self
    }

    /// Clock used for `Expires` dates. The ETag handler carries its own.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The ordered rule table consulted for each response.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// The directive strategy in use.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Intake hook, run before the application sees the request.
    ///
    /// Sub-requests and requests carrying a session (cookie or started
    /// session) are never short-circuited.
    ///
    /// # Returns
    ///
    /// A `304 Not Modified` response when the request's `If-None-Match` lists
    /// the current ETag. The caller must send it and skip everything else for
    /// this request. `None` means proceed normally.
    pub fn on_request_start(&self, ctx: &Context) -> Option<Response> {
        if ctx.is_sub_request() {
            return None;
        }
        let conditional = self.conditional.as_ref()?;
        if !self.sanitizer.is_sessionless(ctx) {
            return None;
        }
        conditional.short_circuit(&RequestSignals::from_request(ctx.request()))
    }

    /// Completion hook, run once the application has produced `response`.
    ///
    /// Sanitizes an empty session, derives and merges caching directives
    /// from the first matching rule, then stamps the weak ETag when the
    /// exchange is eligible. Sub-requests are left untouched.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the request context, including any [`SessionHandle`].
    /// - `response` — decorated in place.
    pub fn on_response_ready(&self, ctx: &mut Context, response: &mut Response) {
        if ctx.is_sub_request() {
            trace!(path = %ctx.request().path(), "sub-request, leaving caching headers alone");
            return;
        }

        self.sanitizer.sanitize(ctx, response);

        let request = RequestSignals::from_request(ctx.request());
        let signals = ResponseSignals::from_response(response);
        let eligible = is_eligible(&request, &signals);

        let uri = ctx.request().uri();
        match self.policies.find(&uri) {
            Some(policy) => {
                let directives = self
                    .strategy
                    .optimize(&request, &signals, policy, self.clock.now());
                debug!(
                    path = %uri,
                    policy = %policy.pattern(),
                    cache_control = %directives.cache_control(),
                    "cache policy applied"
                );
                directives.apply_to(response);
            }
            None => trace!(path = %uri, "no cache policy matched"),
        }

        if let Some(conditional) = self.conditional.as_ref().filter(|_| eligible) {
            conditional.stamp(&request, response);
        }
    }
}

/// Runs a [`CachePipeline`] as middleware.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cachet::cache::{CacheMiddleware, CachingConfig};
/// use cachet::middleware::{Next, endpoint, from_middleware};
/// use cachet::{Response, StatusCode};
///
/// let config = CachingConfig::from_json_str(
///     r#"{"urls": [{"pattern": "^/", "public": 600, "private": 60}]}"#,
/// ).unwrap();
/// let cache = CacheMiddleware::new(Arc::new(config.build().unwrap()));
///
/// let chain = vec![
///     from_middleware(Arc::new(cache)),
///     endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("hello") }),
/// ];
/// let next = Next::new(chain);
/// ```
#[derive(Debug, Clone)]
pub struct CacheMiddleware {
    pipeline: Arc<CachePipeline>,
}

impl CacheMiddleware {
    /// Wraps a shared pipeline.
    pub fn new(pipeline: Arc<CachePipeline>) -> Self {
        Self { pipeline }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            if let Some(not_modified) = pipeline.on_request_start(&ctx) {
                return not_modified;
            }

            // `next` consumes the context; keep what the completion hook reads.
            let request = ctx.request().clone();
            let session = ctx.extensions().get::<SessionHandle>().cloned();
            let sub_request = ctx.is_sub_request();

            let mut response = next.run(ctx).await;

            let mut after = Context::new(request);
            if let Some(session) = session {
                after.extensions_mut().insert(session);
            }
            if sub_request {
                after.extensions_mut().insert(SubRequest);
            }

            pipeline.on_response_ready(&mut after, &mut response);
            response
        })
    }
}
