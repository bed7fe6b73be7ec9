//! Source loaders and the [`SourceSet`].
//!
//! A loader is the bridge between "files on disk" (or anything else) and
//! the routing table: an async factory that produces a fresh map of routes
//! on every rebuild. The framework never scans directories itself; it calls
//! the loaders you attach and validates their output at the boundary.
//!
//! Closures work directly:
//!
//! ```rust
//! use krume::{LoadError, Response, Request, RouteMap, SourceSet};
//!
//! async fn load_pages() -> Result<RouteMap, LoadError> {
//!     Ok(RouteMap::new().route("/", |_req: Request| async {
//!         Response::html("<h1>home</h1>")
//!     }))
//! }
//!
//! let sources = SourceSet::new().pages(load_pages);
//! ```
//!
//! Unlike [`Handler`](crate::Handler), the loader traits are open: implement
//! them on your own struct when a loader needs state (a content directory,
//! a template cache).

use std::future::Future;
use std::sync::Arc;

use crate::error::{LoadError, RebuildError};
use crate::handler::BoxFuture;
use crate::middleware::MiddlewareDescriptor;
use crate::registry::{ApiMap, RouteMap};

/// Produces the routes of one plain-namespace source (pages, assets or
/// scripts). Called on every rebuild.
pub trait RouteLoader: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<Result<RouteMap, LoadError>>;
}

impl<F, Fut> RouteLoader for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RouteMap, LoadError>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<Result<RouteMap, LoadError>> {
        Box::pin(self())
    }
}

/// Produces the API namespace routes. Called on every rebuild.
pub trait ApiLoader: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<Result<ApiMap, LoadError>>;
}

impl<F, Fut> ApiLoader for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiMap, LoadError>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<Result<ApiMap, LoadError>> {
        Box::pin(self())
    }
}

/// Produces the middleware descriptor list. Called on every rebuild.
pub trait MiddlewareLoader: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<Result<Vec<MiddlewareDescriptor>, LoadError>>;
}

impl<F, Fut> MiddlewareLoader for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<MiddlewareDescriptor>, LoadError>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<Result<Vec<MiddlewareDescriptor>, LoadError>> {
        Box::pin(self())
    }
}

/// The loaders an [`App`](crate::App) is booted with. Every slot is
/// optional; an unset slot contributes an empty map.
///
/// Slots are re-invoked concurrently on every rebuild, so loaders should be
/// self-contained: read your sources fresh each call rather than caching
/// across calls.
#[derive(Clone, Default)]
pub struct SourceSet {
    pages: Option<Arc<dyn RouteLoader>>,
    scripts: Option<Arc<dyn RouteLoader>>,
    assets: Option<Arc<dyn RouteLoader>>,
    api: Option<Arc<dyn ApiLoader>>,
    middleware: Option<Arc<dyn MiddlewareLoader>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the pages loader.
    pub fn pages(mut self, loader: impl RouteLoader) -> Self {
        self.pages = Some(Arc::new(loader));
        self
    }

    /// Attaches the scripts loader.
    pub fn scripts(mut self, loader: impl RouteLoader) -> Self {
        self.scripts = Some(Arc::new(loader));
        self
    }

    /// Attaches the assets loader.
    pub fn assets(mut self, loader: impl RouteLoader) -> Self {
        self.assets = Some(Arc::new(loader));
        self
    }

    /// Attaches the API loader.
    pub fn api(mut self, loader: impl ApiLoader) -> Self {
        self.api = Some(Arc::new(loader));
        self
    }

    /// Attaches the middleware loader.
    pub fn middleware(mut self, loader: impl MiddlewareLoader) -> Self {
        self.middleware = Some(Arc::new(loader));
        self
    }

    pub(crate) async fn load_pages(&self) -> Result<RouteMap, RebuildError> {
        load_routes(&self.pages, "pages").await
    }

    pub(crate) async fn load_scripts(&self) -> Result<RouteMap, RebuildError> {
        load_routes(&self.scripts, "scripts").await
    }

    pub(crate) async fn load_assets(&self) -> Result<RouteMap, RebuildError> {
        load_routes(&self.assets, "assets").await
    }

    pub(crate) async fn load_api(&self) -> Result<ApiMap, RebuildError> {
        match &self.api {
            Some(loader) => loader
                .load()
                .await
                .map_err(|source| RebuildError::Load { slot: "api", source }),
            None => Ok(ApiMap::new()),
        }
    }

    pub(crate) async fn load_middleware(&self) -> Result<Vec<MiddlewareDescriptor>, RebuildError> {
        match &self.middleware {
            Some(loader) => loader
                .load()
                .await
                .map_err(|source| RebuildError::Load { slot: "middleware", source }),
            None => Ok(Vec::new()),
        }
    }
}

async fn load_routes(
    loader: &Option<Arc<dyn RouteLoader>>,
    slot: &'static str,
) -> Result<RouteMap, RebuildError> {
    match loader {
        Some(loader) => loader
            .load()
            .await
            .map_err(|source| RebuildError::Load { slot, source }),
        None => Ok(RouteMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    struct FixedPages;

    impl RouteLoader for FixedPages {
        fn load(&self) -> BoxFuture<Result<RouteMap, LoadError>> {
            Box::pin(async {
                Ok(RouteMap::new().route("/", |_req: Request| async {
                    Response::text("home")
                }))
            })
        }
    }

    #[tokio::test]
    async fn struct_and_closure_loaders_both_work() {
        let sources = SourceSet::new()
            .pages(FixedPages)
            .scripts(|| async { Ok(RouteMap::new()) });

        let pages = sources.load_pages().await.expect("pages should load");
        assert_eq!(pages.len(), 1);
        assert!(sources.load_scripts().await.expect("scripts should load").is_empty());
    }

    #[tokio::test]
    async fn unset_slots_contribute_empty_maps() {
        let sources = SourceSet::new();
        assert!(sources.load_pages().await.expect("empty").is_empty());
        assert!(sources.load_api().await.expect("empty").is_empty());
        assert!(sources.load_middleware().await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn loader_failure_names_its_slot() {
        let sources = SourceSet::new()
            .assets(|| async { Err(LoadError::new("assets dir unreadable")) });
        let err = sources.load_assets().await.unwrap_err();
        assert_eq!(err.to_string(), "assets loader failed: assets dir unreadable");
    }
}
