//! Route registry: source maps, the merge step, and the compiled table.
//!
//! Loaders produce [`RouteMap`]s (pages, assets, scripts) and one
//! [`ApiMap`]. A rebuild merges them into a [`RoutingTable`], which is the
//! immutable lookup structure a snapshot serves from: one radix tree for the
//! plain-route namespace and one for the API namespace, both compiled with
//! matchit for O(path-length) lookup.
//!
//! Merge policy in one line: inside a namespace the later registration wins
//! with a warning; a path claimed by both namespaces rejects the whole
//! build.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use tracing::warn;

use crate::error::MergeError;
use crate::handler::{BoxedHandler, Handler};
use crate::matcher;
use crate::method::Method;
use crate::middleware::DirKind;

// ── Source maps ───────────────────────────────────────────────────────────────

/// Routes produced by one plain-namespace loader (pages, assets or
/// scripts): path pattern to handler.
///
/// Each [`route`](RouteMap::route) call returns `self` so registrations
/// chain naturally:
///
/// ```rust
/// # use krume::{Request, Response, RouteMap};
/// # async fn home(_: Request) -> Response { Response::text("") }
/// # async fn post(_: Request) -> Response { Response::text("") }
/// RouteMap::new()
///     .route("/", home)
///     .route("/blog/:slug", post);
/// ```
#[derive(Default)]
pub struct RouteMap {
    entries: Vec<(String, BoxedHandler)>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a path pattern. Patterns may contain
    /// `:name` parameter segments and a final `*` wildcard.
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.entries.push((path.into(), handler.into_boxed_handler()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RouteMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMap")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Routes produced by the API loader: path pattern plus method to handler.
#[derive(Default)]
pub struct ApiMap {
    entries: Vec<(String, Method, BoxedHandler)>,
}

impl ApiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a path pattern for one method.
    pub fn route(
        mut self,
        path: impl Into<String>,
        method: Method,
        handler: impl Handler,
    ) -> Self {
        self.entries.push((path.into(), method, handler.into_boxed_handler()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Route kinds ───────────────────────────────────────────────────────────────

/// Which plain-namespace source a route came from. Decides which dir
/// middleware covers it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RouteKind {
    Page,
    Asset,
    Script,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Page   => "page",
            Self::Asset  => "asset",
            Self::Script => "script",
        })
    }
}

/// The namespace-plus-kind of a resolved route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MatchKind {
    Page,
    Asset,
    Script,
    Api,
}

impl MatchKind {
    /// The dir-middleware kind covering this route. API routes are loaded
    /// from the routes directory, hence `Routes`. Nothing maps to `Dev`;
    /// that kind is reserved for framework-injected dev routes.
    pub(crate) fn dir_kind(self) -> DirKind {
        match self {
            Self::Page   => DirKind::Pages,
            Self::Asset  => DirKind::Assets,
            Self::Script => DirKind::Scripts,
            Self::Api    => DirKind::Routes,
        }
    }
}

impl From<RouteKind> for MatchKind {
    fn from(kind: RouteKind) -> Self {
        match kind {
            RouteKind::Page   => Self::Page,
            RouteKind::Asset  => Self::Asset,
            RouteKind::Script => Self::Script,
        }
    }
}

// ── Compiled table ────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Route {
    handler: BoxedHandler,
    kind: RouteKind,
}

#[derive(Clone)]
struct ApiRoute {
    methods: HashMap<Method, BoxedHandler>,
}

/// One resolved route: the handler to run, the parameters its pattern
/// extracted, and where the route came from.
pub(crate) struct RouteMatch {
    pub(crate) handler: BoxedHandler,
    pub(crate) params: HashMap<String, String>,
    pub(crate) kind: MatchKind,
}

/// The immutable lookup structure built by [`merge`]. Never mutated after
/// construction; rebuilds produce a fresh table.
#[derive(Default)]
pub(crate) struct RoutingTable {
    routes: MatchitRouter<Route>,
    api: MatchitRouter<ApiRoute>,
    route_count: usize,
    api_count: usize,
}

impl RoutingTable {
    /// Resolves a request path. The API namespace is consulted first; an
    /// API pattern that matches the path claims it outright, so a missing
    /// method there resolves to nothing (a 404) rather than falling through
    /// to the plain namespace.
    pub(crate) fn lookup(&self, method: Option<Method>, path: &str) -> Option<RouteMatch> {
        if let Ok(matched) = self.api.at(path) {
            let handler = matched.value.methods.get(&method?)?;
            return Some(RouteMatch {
                handler: Arc::clone(handler),
                params: collect_params(&matched.params),
                kind: MatchKind::Api,
            });
        }

        let matched = self.routes.at(path).ok()?;
        Some(RouteMatch {
            handler: Arc::clone(&matched.value.handler),
            params: collect_params(&matched.params),
            kind: matched.value.kind.into(),
        })
    }

    /// Number of paths in the plain namespace.
    pub(crate) fn route_count(&self) -> usize {
        self.route_count
    }

    /// Number of paths in the API namespace.
    pub(crate) fn api_count(&self) -> usize {
        self.api_count
    }
}

impl fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("route_count", &self.route_count)
            .field("api_count", &self.api_count)
            .finish_non_exhaustive()
    }
}

fn collect_params(params: &matchit::Params<'_, '_>) -> HashMap<String, String> {
    params
        .iter()
        .filter(|(k, _)| *k != matcher::WILDCARD_PARAM)
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Merges loader outputs into a routing table.
///
/// `sources` carries the plain-namespace maps in registration order (page
/// routes first, then scripts, then assets); later entries overwrite
/// earlier ones on the same normalized path, each overwrite logged exactly
/// once. After both namespaces are assembled, any path present in both
/// fails the merge with every offending path listed.
pub(crate) fn merge(
    sources: Vec<(RouteKind, RouteMap)>,
    api: ApiMap,
) -> Result<RoutingTable, MergeError> {
    let mut routes: HashMap<String, Route> = HashMap::new();
    for (kind, map) in sources {
        for (raw, handler) in map.entries {
            let path = matcher::normalize(&raw);
            if let Some(previous) = routes.get(&path) {
                warn!(
                    path = %path,
                    previous = %previous.kind,
                    replacement = %kind,
                    "route re-registered, later source wins"
                );
            }
            routes.insert(path, Route { handler, kind });
        }
    }

    let mut api_routes: HashMap<String, ApiRoute> = HashMap::new();
    for (raw, method, handler) in api.entries {
        let path = matcher::normalize(&raw);
        let entry = api_routes.entry(path.clone()).or_insert_with(|| ApiRoute {
            methods: HashMap::new(),
        });
        if entry.methods.insert(method, handler).is_some() {
            warn!(
                path = %path,
                method = %method,
                "api route re-registered, later registration wins"
            );
        }
    }

    let mut conflicts: Vec<String> = routes
        .keys()
        .filter(|path| api_routes.contains_key(*path))
        .cloned()
        .collect();
    if !conflicts.is_empty() {
        conflicts.sort();
        return Err(MergeError::Conflict { paths: conflicts });
    }

    let mut table = RoutingTable {
        route_count: routes.len(),
        api_count: api_routes.len(),
        ..RoutingTable::default()
    };
    for (path, route) in routes {
        insert(&mut table.routes, &path, route)?;
    }
    for (path, route) in api_routes {
        insert(&mut table.api, &path, route)?;
    }
    Ok(table)
}

fn insert<V>(tree: &mut MatchitRouter<V>, path: &str, value: V) -> Result<(), MergeError> {
    let compiled = matcher::to_matchit(path).map_err(|reason| MergeError::InvalidPattern {
        pattern: path.to_string(),
        reason,
    })?;
    tree.insert(compiled, value).map_err(|e| MergeError::InvalidPattern {
        pattern: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    fn says(text: &'static str) -> impl Handler {
        move |_req: Request| async move { Response::text(text) }
    }

    async fn body_of(table: &RoutingTable, method: Option<Method>, path: &str) -> Option<Vec<u8>> {
        let matched = table.lookup(method, path)?;
        let res = matched.handler.call(Request::builder().build()).await;
        Some(res.body().to_vec())
    }

    #[tokio::test]
    async fn later_source_wins_on_duplicate_path() {
        let pages = RouteMap::new().route("/blog", says("from pages"));
        let scripts = RouteMap::new().route("/blog", says("from scripts"));
        let table = merge(
            vec![(RouteKind::Page, pages), (RouteKind::Script, scripts)],
            ApiMap::new(),
        )
        .expect("merge should succeed");

        assert_eq!(table.route_count(), 1);
        assert_eq!(
            body_of(&table, None, "/blog").await,
            Some(b"from scripts".to_vec())
        );
    }

    #[test]
    fn cross_namespace_conflict_lists_every_path() {
        let pages = RouteMap::new()
            .route("/a", says("a"))
            .route("/b", says("b"))
            .route("/only-pages", says("p"));
        let api = ApiMap::new()
            .route("/b", Method::Get, says("api b"))
            .route("/a", Method::Post, says("api a"));

        let err = merge(vec![(RouteKind::Page, pages)], api).unwrap_err();
        match err {
            MergeError::Conflict { paths } => {
                assert_eq!(paths, vec!["/a".to_string(), "/b".to_string()]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_match_claims_the_path_regardless_of_method() {
        let api = ApiMap::new().route("/api/users", Method::Post, says("created"));
        let table = merge(Vec::new(), api).expect("merge should succeed");

        assert_eq!(
            body_of(&table, Some(Method::Post), "/api/users").await,
            Some(b"created".to_vec())
        );
        // Same path, unregistered method: resolves to nothing.
        assert!(table.lookup(Some(Method::Get), "/api/users").is_none());
        assert!(table.lookup(None, "/api/users").is_none());
    }

    #[test]
    fn parameters_are_extracted_and_wildcard_remainder_is_not() {
        let pages = RouteMap::new()
            .route("/users/:id", says("user"))
            .route("/files/*", says("file"));
        let table =
            merge(vec![(RouteKind::Page, pages)], ApiMap::new()).expect("merge should succeed");

        let matched = table.lookup(None, "/users/42").expect("should match");
        assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));

        let matched = table.lookup(None, "/files/css/site.css").expect("should match");
        assert!(matched.params.is_empty());
    }

    #[test]
    fn registration_paths_are_normalized() {
        let pages = RouteMap::new().route("/about/", says("about"));
        let table =
            merge(vec![(RouteKind::Page, pages)], ApiMap::new()).expect("merge should succeed");
        assert!(table.lookup(None, "/about").is_some());
    }

    #[test]
    fn infix_wildcard_is_rejected() {
        let pages = RouteMap::new().route("/a/*/b", says("x"));
        let err = merge(vec![(RouteKind::Page, pages)], ApiMap::new()).unwrap_err();
        assert!(matches!(err, MergeError::InvalidPattern { .. }));
    }

    #[test]
    fn kinds_map_to_their_dir_middleware() {
        assert_eq!(MatchKind::Page.dir_kind(), DirKind::Pages);
        assert_eq!(MatchKind::Api.dir_kind(), DirKind::Routes);
        assert_eq!(MatchKind::Script.dir_kind(), DirKind::Scripts);
    }
}
