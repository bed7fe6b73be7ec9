//! Per-request dispatch through the middleware chain to a terminal handler.
//!
//! Control flow for one request:
//!
//! ```text
//! lookup(method, path) ── no match ──→ not-found handler or 404
//!        │
//! root middlewares, in order ── deny ──→ 403
//!        │                   ── no verdict ──→ 500
//! path middlewares whose pattern matches, in order (same contract)
//!        │
//! dir middleware of the resolved route's source kind (same contract)
//!        │
//! terminal handler ── panic ──→ error hook or 500
//! ```
//!
//! Every outcome is a [`Response`]; nothing escapes to the connection task.
//! Panics in middlewares and handlers are caught here so one bad request
//! cannot take its connection down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::handler::BoxedHandler;
use crate::matcher;
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, ClassifiedMiddleware, Control, Signal};
use crate::registry::RoutingTable;
use crate::request::Request;
use crate::response::Response;

/// Body of the 500 produced when a middleware returns its token without a
/// verdict.
const CONTRACT_VIOLATION_BODY: &str = "Middleware did not call next()";

/// Callback invoked with the panic message when a middleware or handler
/// panics. Its response replaces the default 500.
pub(crate) type ErrorHook = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Dispatch behavior configured once at boot, outside the rebuild cycle.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    /// Replaces the bare 404 for unresolved paths.
    pub(crate) not_found: Option<BoxedHandler>,
    /// Replaces the bare 500 for panics.
    pub(crate) on_error: Option<ErrorHook>,
    /// Stamp the standard security headers onto every response.
    pub(crate) security_headers: bool,
}

/// Routes one request through middlewares to its handler and always
/// produces a response.
pub(crate) async fn dispatch(
    req: Request,
    table: &RoutingTable,
    middleware: &ClassifiedMiddleware,
    hooks: &Hooks,
) -> Response {
    let mut response = dispatch_inner(req, table, middleware, hooks).await;
    if hooks.security_headers {
        apply_security_headers(&mut response);
    }
    response
}

async fn dispatch_inner(
    req: Request,
    table: &RoutingTable,
    middleware: &ClassifiedMiddleware,
    hooks: &Hooks,
) -> Response {
    let path = matcher::normalize(req.path());
    let method = Method::try_from(req.method()).ok();

    let Some(matched) = table.lookup(method, &path) else {
        return match &hooks.not_found {
            Some(handler) => run_handler(handler, req, hooks).await,
            None          => Response::status(StatusCode::NOT_FOUND),
        };
    };

    for mw in middleware.root() {
        if let Some(response) = run_middleware(mw, req.clone(), hooks).await {
            return response;
        }
    }

    for (pattern, mw) in middleware.path() {
        let Some(params) = matcher::matches(pattern, &path) else {
            continue;
        };
        let view = req.clone().with_params(params);
        if let Some(response) = run_middleware(mw, view, hooks).await {
            return response;
        }
    }

    if let Some(mw) = middleware.dir(matched.kind.dir_kind()) {
        let view = req.clone().with_params(matched.params.clone());
        if let Some(response) = run_middleware(mw, view, hooks).await {
            return response;
        }
    }

    run_handler(&matched.handler, req.with_params(matched.params), hooks).await
}

/// Runs one middleware. `None` means the chain continues; `Some` is a
/// short-circuit response.
async fn run_middleware(
    mw: &BoxedMiddleware,
    view: Request,
    hooks: &Hooks,
) -> Option<Response> {
    let outcome = AssertUnwindSafe(mw.call(view, Control::new()))
        .catch_unwind()
        .await;
    match outcome {
        Err(payload) => Some(panic_response(hooks, "middleware", payload)),
        Ok(ctl) => match ctl.signal {
            Signal::Next => None,
            Signal::Deny(message) => Some(
                Response::builder().status(StatusCode::FORBIDDEN).text(message),
            ),
            Signal::Pending => {
                error!("middleware returned without calling next or deny");
                Some(
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .text(CONTRACT_VIOLATION_BODY),
                )
            }
        },
    }
}

async fn run_handler(handler: &BoxedHandler, req: Request, hooks: &Hooks) -> Response {
    match AssertUnwindSafe(handler.call(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => panic_response(hooks, "handler", payload),
    }
}

fn panic_response(hooks: &Hooks, origin: &str, payload: Box<dyn Any + Send>) -> Response {
    let message = panic_text(payload.as_ref());
    error!(origin, message = %message, "request processing panicked");
    match &hooks.on_error {
        Some(hook) => hook(&message),
        None => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .text("Internal Server Error"),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn apply_security_headers(response: &mut Response) {
    response.set_header("Content-Security-Policy", "default-src 'self'");
    response.set_header("X-Frame-Options", "DENY");
    response.set_header("X-Content-Type-Options", "nosniff");
    response.set_header("Referrer-Policy", "no-referrer");
    response.set_header(
        "Strict-Transport-Security",
        "max-age=63072000; includeSubDomains; preload",
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{self, classify};
    use crate::registry::{merge, ApiMap, RouteKind, RouteMap};

    fn table_with(pages: RouteMap) -> RoutingTable {
        merge(vec![(RouteKind::Page, pages)], ApiMap::new()).expect("merge should succeed")
    }

    fn get(path: &str) -> Request {
        Request::builder().path(path).build()
    }

    #[tokio::test]
    async fn no_match_yields_404_without_running_middlewares() {
        let table = table_with(RouteMap::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let mw = classify(vec![middleware::root(move |_req: Request, ctl: Control| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ctl.next()
            }
        })]);

        let res = dispatch(get("/missing"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn custom_not_found_handler_is_used() {
        let table = table_with(RouteMap::new());
        let hooks = Hooks {
            not_found: Some(
                (|_req: Request| async { Response::html("<h1>lost?</h1>") }).into_boxed_handler(),
            ),
            ..Hooks::default()
        };
        let res = dispatch(get("/missing"), &table, &classify(Vec::new()), &hooks).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"<h1>lost?</h1>");
    }

    #[tokio::test]
    async fn deny_short_circuits_with_403_and_message() {
        let table = table_with(RouteMap::new().route("/admin", |_req: Request| async {
            Response::text("admin page")
        }));
        let mw = classify(vec![
            middleware::root(|_req: Request, ctl: Control| async move {
                ctl.deny_with("members only")
            }),
            middleware::root(|_req: Request, ctl: Control| async move {
                panic!("must not run after a deny");
                #[allow(unreachable_code)]
                ctl.next()
            }),
        ]);

        let res = dispatch(get("/admin"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"members only");
    }

    #[tokio::test]
    async fn root_middleware_can_gate_on_the_method() {
        let table = table_with(RouteMap::new().route("/", |_req: Request| async {
            Response::text("home")
        }));
        let mw = classify(vec![middleware::root(
            |req: Request, ctl: Control| async move {
                if req.method() == http::Method::GET {
                    ctl.next()
                } else {
                    ctl.deny_with("Method not allowed")
                }
            },
        )]);

        let res = dispatch(get("/"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.body(), b"home");

        let res = dispatch(
            Request::builder().method(http::Method::POST).path("/").build(),
            &table,
            &mw,
            &Hooks::default(),
        )
        .await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"Method not allowed");
    }

    #[tokio::test]
    async fn deny_without_message_uses_the_default() {
        let table = table_with(RouteMap::new().route("/x", |_req: Request| async {
            Response::text("x")
        }));
        let mw = classify(vec![middleware::root(
            |_req: Request, ctl: Control| async move { ctl.deny() },
        )]);

        let res = dispatch(get("/x"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"Access denied");
    }

    #[tokio::test]
    async fn returning_the_token_unused_is_a_500() {
        let table = table_with(RouteMap::new().route("/x", |_req: Request| async {
            Response::text("x")
        }));
        let mw = classify(vec![middleware::root(
            |_req: Request, ctl: Control| async move { ctl },
        )]);

        let res = dispatch(get("/x"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), CONTRACT_VIOLATION_BODY.as_bytes());
    }

    #[tokio::test]
    async fn path_middlewares_run_in_order_and_see_their_own_params() {
        let table = table_with(RouteMap::new().route("/users/:id", |req: Request| async move {
            Response::text(format!("user {}", req.param("id").unwrap_or("?")))
        }));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = order.clone();
        let second = order.clone();
        let mw = classify(vec![
            middleware::path(
                move |req: Request, ctl: Control| {
                    let log = first.clone();
                    async move {
                        log.lock().unwrap().push(format!(
                            "pattern-one saw {}",
                            req.param("id").unwrap_or("?")
                        ));
                        ctl.next()
                    }
                },
                "/users/:id",
            ),
            middleware::path(
                move |req: Request, ctl: Control| {
                    let log = second.clone();
                    async move {
                        log.lock().unwrap().push(format!(
                            "pattern-two saw params: {}",
                            req.params().len()
                        ));
                        ctl.next()
                    }
                },
                "/users/*",
            ),
            middleware::path(
                |_req: Request, ctl: Control| async move {
                    panic!("pattern must not match");
                    #[allow(unreachable_code)]
                    ctl.next()
                },
                "/admin/*",
            ),
        ]);

        let res = dispatch(get("/users/42"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.body(), b"user 42");
        let log = order.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "pattern-one saw 42");
        assert_eq!(log[1], "pattern-two saw params: 0");
    }

    #[tokio::test]
    async fn dir_middleware_runs_only_for_its_kind() {
        let pages = RouteMap::new().route("/page", |_req: Request| async {
            Response::text("page")
        });
        let api = ApiMap::new().route("/api/thing", Method::Get, |_req: Request| async {
            Response::text("api")
        });
        let table = merge(vec![(RouteKind::Page, pages)], api).expect("merge should succeed");

        let api_hits = Arc::new(AtomicUsize::new(0));
        let seen = api_hits.clone();
        let mw = classify(vec![middleware::dir(
            move |_req: Request, ctl: Control| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    ctl.next()
                }
            },
            "routes",
        )]);

        let res = dispatch(get("/page"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.body(), b"page");
        assert_eq!(api_hits.load(Ordering::SeqCst), 0);

        let res = dispatch(
            Request::builder().method(http::Method::GET).path("/api/thing").build(),
            &table,
            &mw,
            &Hooks::default(),
        )
        .await;
        assert_eq!(res.body(), b"api");
        assert_eq!(api_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let table = table_with(RouteMap::new().route("/boom", |_req: Request| async {
            panic!("kaput");
            #[allow(unreachable_code)]
            Response::text("")
        }));

        let res = dispatch(get("/boom"), &table, &classify(Vec::new()), &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Internal Server Error");
    }

    #[tokio::test]
    async fn error_hook_replaces_the_panic_response() {
        let table = table_with(RouteMap::new().route("/boom", |_req: Request| async {
            panic!("kaput");
            #[allow(unreachable_code)]
            Response::text("")
        }));
        let hooks = Hooks {
            on_error: Some(Arc::new(|message: &str| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(format!(r#"{{"error":"{message}"}}"#))
            })),
            ..Hooks::default()
        };

        let res = dispatch(get("/boom"), &table, &classify(Vec::new()), &hooks).await;
        assert_eq!(res.body(), br#"{"error":"kaput"}"#);
    }

    #[tokio::test]
    async fn middleware_panic_is_contained() {
        let table = table_with(RouteMap::new().route("/x", |_req: Request| async {
            Response::text("x")
        }));
        let mw = classify(vec![middleware::root(
            |_req: Request, ctl: Control| async move {
                panic!("middleware bug");
                #[allow(unreachable_code)]
                ctl.next()
            },
        )]);

        let res = dispatch(get("/x"), &table, &mw, &Hooks::default()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_method_on_api_path_is_404() {
        let api = ApiMap::new().route("/api/users", Method::Post, |_req: Request| async {
            Response::text("created")
        });
        let table = merge(Vec::new(), api).expect("merge should succeed");

        let res = dispatch(
            Request::builder().method(http::Method::PATCH).path("/api/users").build(),
            &table,
            &classify(Vec::new()),
            &Hooks::default(),
        )
        .await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trailing_slash_resolves_to_the_same_route() {
        let table = table_with(RouteMap::new().route("/blog", |_req: Request| async {
            Response::text("blog index")
        }));
        let res = dispatch(get("/blog/"), &table, &classify(Vec::new()), &Hooks::default()).await;
        assert_eq!(res.body(), b"blog index");
    }

    #[tokio::test]
    async fn security_headers_are_stamped_when_enabled() {
        let table = table_with(RouteMap::new().route("/x", |_req: Request| async {
            Response::text("x")
        }));
        let hooks = Hooks { security_headers: true, ..Hooks::default() };

        let res = dispatch(get("/x"), &table, &classify(Vec::new()), &hooks).await;
        assert_eq!(res.header("x-frame-options"), Some("DENY"));
        assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(res.header("content-security-policy"), Some("default-src 'self'"));

        // 404s get them too.
        let res = dispatch(get("/missing"), &table, &classify(Vec::new()), &hooks).await;
        assert_eq!(res.header("referrer-policy"), Some("no-referrer"));
    }
}
