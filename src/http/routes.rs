//! Route registration.
//!
//! Handlers are registered on a [`RouteRegistry`] before the listener starts.
//! The registry carries the feature provider so registration code can wire it
//! into handler state; it is also available to every handler as an
//! `Extension<Arc<dyn FeatureProvider>>`.

use std::sync::Arc;

use axum::routing::MethodRouter;
use axum::{Extension, Router};

use crate::config::Config;
use crate::error::BoxError;
use crate::features::FeatureProvider;

/// Mutable router handle passed to route registration.
pub struct RouteRegistry {
    router: Router,
    features: Arc<dyn FeatureProvider>,
    paths: Vec<String>,
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("paths", &self.paths)
            .field("features", &self.features)
            .finish()
    }
}

impl RouteRegistry {
    pub fn new(features: Arc<dyn FeatureProvider>) -> Self {
        Self {
            router: Router::new(),
            features,
            paths: Vec::new(),
        }
    }

    /// Add a route. Registering the same path twice is an error.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> Result<&mut Self, BoxError> {
        if !path.starts_with('/') {
            return Err(format!("route path {:?} must start with '/'", path).into());
        }
        if self.paths.iter().any(|p| p == path) {
            return Err(format!("route {:?} registered twice", path).into());
        }

        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
        self.paths.push(path.to_string());
        Ok(self)
    }

    /// Mount a prepared router under `prefix`.
    pub fn nest(&mut self, prefix: &str, router: Router) -> Result<&mut Self, BoxError> {
        if !prefix.starts_with('/') || prefix == "/" {
            return Err(format!("nest prefix {:?} must be a non-root path", prefix).into());
        }
        if self.paths.iter().any(|p| p.starts_with(prefix)) {
            return Err(format!("prefix {:?} overlaps an existing route", prefix).into());
        }

        let current = std::mem::take(&mut self.router);
        self.router = current.nest(prefix, router);
        self.paths.push(prefix.to_string());
        Ok(self)
    }

    pub fn features(&self) -> Arc<dyn FeatureProvider> {
        self.features.clone()
    }

    /// Registered paths and prefixes, in registration order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn into_router(self) -> Router {
        self.router.layer(Extension(self.features))
    }
}

/// A reusable group of routes.
pub trait RouteBundle {
    fn register(&self, config: &Config, routes: &mut RouteRegistry) -> Result<(), BoxError>;
}

impl<F> RouteBundle for F
where
    F: Fn(&Config, &mut RouteRegistry) -> Result<(), BoxError>,
{
    fn register(&self, config: &Config, routes: &mut RouteRegistry) -> Result<(), BoxError> {
        self(config, routes)
    }
}

/// Register `bundles` in order, stopping at the first error.
pub fn register_bundles(
    config: &Config,
    routes: &mut RouteRegistry,
    bundles: &[&dyn RouteBundle],
) -> Result<(), BoxError> {
    for bundle in bundles {
        bundle.register(config, routes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::NoopProvider;
    use axum::routing::get;

    fn registry() -> RouteRegistry {
        RouteRegistry::new(Arc::new(NoopProvider))
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut routes = registry();
        routes.route("/hello", get(|| async { "hi" })).unwrap();
        assert!(routes.route("/hello", get(|| async { "again" })).is_err());
        assert!(routes.route("relative", get(|| async { "x" })).is_err());
        assert_eq!(routes.paths(), ["/hello".to_string()]);
    }

    #[test]
    fn test_bundles_stop_at_first_error() {
        let first = |_: &Config, routes: &mut RouteRegistry| -> Result<(), BoxError> {
            routes.route("/a", get(|| async { "a" }))?;
            Ok(())
        };
        let failing = |_: &Config, _: &mut RouteRegistry| -> Result<(), BoxError> { Err("bundle broke".into()) };
        let never = |_: &Config, routes: &mut RouteRegistry| -> Result<(), BoxError> {
            routes.route("/c", get(|| async { "c" }))?;
            Ok(())
        };

        let mut routes = registry();
        let err = register_bundles(&Config::new(), &mut routes, &[&first, &failing, &never]).unwrap_err();
        assert_eq!(err.to_string(), "bundle broke");
        assert_eq!(routes.paths(), ["/a".to_string()]);
    }
}
