//! Minimal krume example — convention-style pages, an API route, and
//! middlewares, with live reload of the watched content directory.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/blog/first-post
//!   curl -X POST http://localhost:3000/api/echo -d 'hello'
//!   curl http://localhost:3000/admin/settings            # 403
//!   curl -H 'x-admin-token: letmein' http://localhost:3000/admin/settings
//!   curl http://localhost:3000/healthz
//!
//! Edit anything under ./content while the server runs and watch the
//! rebuild log line; new pages appear without a restart.

use std::path::Path;

use krume::{
    health, middleware, ApiMap, App, Control, LoadError, Method, MiddlewareDescriptor,
    Request, Response, RouteMap, Server, SourceSet, StatusCode,
};

#[tokio::main]
async fn main() -> Result<(), krume::Error> {
    tracing_subscriber::fmt::init();

    let sources = SourceSet::new()
        .pages(load_pages)
        .api(load_api)
        .middleware(load_middleware);

    let app = App::builder()
        .security_headers(true)
        .not_found(|_req: Request| async {
            Response::builder()
                .status(StatusCode::NOT_FOUND)
                .html("<h1>There is nothing here.</h1>")
        })
        .boot(sources)
        .await?;

    if Path::new("content").is_dir() {
        app.watch(["content"])?;
    }

    Server::bind("0.0.0.0:3000").serve(app).await
}

// ── Loaders ───────────────────────────────────────────────────────────────────

/// Markdown files under ./content become pages; this demo fakes the
/// rendering and just maps file stems to routes, but the shape is the real
/// one: read sources fresh on every call, return a new map.
async fn load_pages() -> Result<RouteMap, LoadError> {
    let mut pages = RouteMap::new()
        .route("/", |_req: Request| async {
            Response::html("<h1>home</h1><p>edit ./content and save</p>")
        })
        .route("/blog/:slug", blog_post)
        .route("/admin/settings", |_req: Request| async {
            Response::html("<h1>settings</h1>")
        })
        .route("/healthz", health::liveness)
        .route("/readyz", health::readiness);

    let content = Path::new("content");
    if content.is_dir() {
        let mut entries = tokio::fs::read_dir(content)
            .await
            .map_err(|e| LoadError::with_source("content dir unreadable", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LoadError::with_source("content dir unreadable", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let route = format!("/{stem}");
            let body = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| LoadError::with_source("page unreadable", e))?;
            pages = pages.route(route, move |_req: Request| {
                let body = body.clone();
                async move { Response::html(format!("<pre>{body}</pre>")) }
            });
        }
    }

    Ok(pages)
}

async fn blog_post(req: Request) -> Response {
    let slug = req.param("slug").unwrap_or("unknown");
    Response::html(format!("<h1>{slug}</h1><p>imagine rendered markdown</p>"))
}

async fn load_api() -> Result<ApiMap, LoadError> {
    Ok(ApiMap::new()
        .route("/api/echo", Method::Post, |req: Request| async move {
            Response::text(String::from_utf8_lossy(req.body()).into_owned())
        })
        .route("/api/time", Method::Get, |_req: Request| async {
            Response::json(format!(
                r#"{{"unix":{}}}"#,
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            ))
        }))
}

// ── Middlewares ───────────────────────────────────────────────────────────────

async fn load_middleware() -> Result<Vec<MiddlewareDescriptor>, LoadError> {
    Ok(vec![
        middleware::root(request_log),
        middleware::path(admin_guard, "/admin/*"),
    ])
}

/// Runs for every request; always continues.
async fn request_log(req: Request, ctl: Control) -> Control {
    tracing::info!(method = %req.method(), path = req.path(), "request");
    ctl.next()
}

/// Gates the admin area on a header token.
async fn admin_guard(req: Request, ctl: Control) -> Control {
    if req.header("x-admin-token") == Some("letmein") {
        ctl.next()
    } else {
        ctl.deny_with("admin token required")
    }
}
