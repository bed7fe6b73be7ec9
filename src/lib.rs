//! # krume
//!
//! Route composition and middleware dispatch for convention-driven sites.
//! Your loaders say what exists; krume merges it into one conflict-checked
//! routing table, walks every request through the middleware chain to its
//! handler, and rebuilds the table live when sources change.
//!
//! ## The contract
//!
//! krume deliberately does not read your content. Markdown, templates,
//! bundling, frontmatter — that is loader territory, and loaders are plain
//! async functions you own. What krume owns is the part that is the same in
//! every such site:
//!
//! - **Composition** — pages, assets, scripts and API routes merged into
//!   two namespaces with one duplicate policy: within a namespace the later
//!   registration wins (warned), across namespaces a collision is fatal.
//! - **Dispatch** — root, path-scoped and dir-scoped middlewares run in
//!   order under one contract: return the [`Control`] token with
//!   [`next`](Control::next) or [`deny`](Control::deny) recorded. Deny is a
//!   403, forgetting to decide is a 500, and a panicking handler never
//!   takes the process down.
//! - **Reloads** — file changes trigger a debounced, serialized rebuild;
//!   the new table is swapped in atomically and a failed rebuild keeps the
//!   old one serving.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use krume::{middleware, ApiMap, App, Control, LoadError, Method, Request,
//!             Response, RouteMap, Server, SourceSet};
//!
//! async fn load_pages() -> Result<RouteMap, LoadError> {
//!     Ok(RouteMap::new()
//!         .route("/", |_req: Request| async { Response::html("<h1>home</h1>") })
//!         .route("/blog/:slug", blog_post))
//! }
//!
//! async fn blog_post(req: Request) -> Response {
//!     Response::html(format!("<h1>{}</h1>", req.param("slug").unwrap_or("?")))
//! }
//!
//! async fn load_api() -> Result<ApiMap, LoadError> {
//!     Ok(ApiMap::new().route("/api/echo", Method::Post, |req: Request| async move {
//!         Response::json(req.body().to_vec())
//!     }))
//! }
//!
//! async fn admin_guard(req: Request, ctl: Control) -> Control {
//!     if req.header("x-admin-token") == Some("secret") {
//!         ctl.next()
//!     } else {
//!         ctl.deny_with("admin area")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), krume::Error> {
//!     let sources = SourceSet::new()
//!         .pages(load_pages)
//!         .api(load_api)
//!         .middleware(|| async {
//!             Ok(vec![middleware::path(admin_guard, "/admin/*")])
//!         });
//!
//!     let app = App::boot(sources).await?;
//!     app.watch(["content"])?;
//!     Server::bind("127.0.0.1:3000").serve(app).await
//! }
//! ```

mod app;
mod config;
mod dispatch;
mod error;
mod handler;
mod loader;
mod matcher;
mod method;
mod registry;
mod request;
mod response;
mod server;
mod watch;

pub mod health;
pub mod middleware;

pub use app::{App, AppBuilder, ReloadHandle};
pub use config::Config;
pub use error::{ConfigError, Error, LoadError, MergeError, RebuildError};
pub use handler::Handler;
pub use loader::{ApiLoader, MiddlewareLoader, RouteLoader, SourceSet};
pub use method::Method;
pub use middleware::{Control, Middleware, MiddlewareDescriptor};
pub use registry::{ApiMap, RouteMap};
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use server::Server;

/// Re-exported so handlers can name status codes without depending on
/// `http` directly.
pub use http::StatusCode;
