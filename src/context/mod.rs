//! Per-request context — the request plus type-erased, request-scoped state.
//!
//! Upstream middleware (session loaders, sub-request dispatchers) attach state
//! through [`Extensions`]; the cache pipeline reads it back by type.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map — used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the extensions map, replacing any value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns `true` if a value of type `T` is present
    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Marker extension for internal sub-requests (fragments, forwards).
///
/// The cache pipeline only acts on the top-level request of a lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubRequest;

/// Per-request context.
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    /// The request, as the caching layer currently sees it.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access, used to strip cookies before the policy decision.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Builder-style [`Extensions::insert`].
    #[must_use]
    pub fn with_extension<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.extensions.insert(value);
        self
    }

    /// Returns `true` if this context belongs to an internal sub-request.
    pub fn is_sub_request(&self) -> bool {
        self.extensions.contains::<SubRequest>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap().0
    }

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        ext.insert(7_u32);
        ext.insert("label");
        assert_eq!(ext.get::<u32>(), Some(&7));
        assert_eq!(ext.get::<&str>(), Some(&"label"));
        assert_eq!(ext.remove::<u32>(), Some(7));
        assert!(!ext.contains::<u32>());
    }

    #[test]
    fn sub_request_marker() {
        let ctx = Context::new(request());
        assert!(!ctx.is_sub_request());
        let ctx = ctx.with_extension(SubRequest);
        assert!(ctx.is_sub_request());
    }
}
