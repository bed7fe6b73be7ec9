//! Middleware: registration, classification, and the control contract.
//!
//! A middleware is an async function that receives its own view of the
//! request plus a [`Control`] token and returns the token with a verdict
//! recorded:
//!
//! ```text
//! async fn guard(req: Request, ctl: Control) -> Control {
//!     if req.header("x-token") == Some("secret") {
//!         ctl.next()
//!     } else {
//!         ctl.deny()
//!     }
//! }
//! ```
//!
//! Three registration scopes exist:
//!
//! - [`root`] — runs for every dispatched request.
//! - [`path`] — runs when its pattern matches the request path. Patterns
//!   use the route syntax: literal segments, `:name` parameters, and a
//!   final `*` matching any remainder. All matching path middlewares run,
//!   in registration order.
//! - [`dir`] — bound to one source directory kind (`pages`, `assets`,
//!   `scripts`, `routes`, `dev`); runs when the resolved route came from
//!   that kind of source.
//!
//! The dispatcher consumes descriptors already grouped by
//! [`classify`], which also applies the duplicate rules: repeated root
//! registrations of the same function are dropped, while a re-registered
//! path pattern or dir kind replaces the earlier middleware.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::handler::BoxFuture;
use crate::request::Request;

// ── Control ───────────────────────────────────────────────────────────────────

/// Default body of a denial response when [`Control::deny`] is used without
/// a message.
pub(crate) const DEFAULT_DENY_MESSAGE: &str = "Access denied";

/// The verdict a middleware recorded, read back by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    /// No verdict yet. A middleware returning its token in this state broke
    /// the contract; the dispatcher answers 500.
    Pending,
    /// Continue to the next middleware (or the terminal handler).
    Next,
    /// Stop and answer 403 with the carried message.
    Deny(String),
}

/// Control token handed to each middleware invocation.
///
/// The token starts pending; exactly one verdict can be recorded on it, and
/// the first one wins. There is no public constructor, so a middleware can
/// only return the token it was given. Returning it without a verdict is a
/// contract violation the dispatcher turns into a 500.
#[derive(Debug)]
pub struct Control {
    pub(crate) signal: Signal,
}

impl Control {
    pub(crate) fn new() -> Self {
        Self { signal: Signal::Pending }
    }

    /// Records "continue". A no-op if a verdict was already recorded.
    #[must_use]
    pub fn next(mut self) -> Control {
        if self.signal == Signal::Pending {
            self.signal = Signal::Next;
        }
        self
    }

    /// Records "deny" with the default message. A no-op if a verdict was
    /// already recorded.
    #[must_use]
    pub fn deny(self) -> Control {
        self.deny_with(DEFAULT_DENY_MESSAGE)
    }

    /// Records "deny" with a custom response body. A no-op if a verdict was
    /// already recorded.
    #[must_use]
    pub fn deny_with(mut self, message: impl Into<String>) -> Control {
        if self.signal == Signal::Pending {
            self.signal = Signal::Deny(message.into());
        }
        self
    }
}

// ── Middleware trait and erasure ──────────────────────────────────────────────

/// Internal dispatch interface; the middleware analog of
/// [`ErasedHandler`](crate::handler::ErasedHandler).
#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, ctl: Control) -> BoxFuture<Control>;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every valid middleware function.
///
/// Like [`Handler`](crate::Handler), this is sealed and satisfied
/// automatically for any `async fn name(req: Request, ctl: Control) ->
/// Control`.
pub trait Middleware: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Request, Control) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Control> + Send + 'static,
{
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Control) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Control> + Send + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Control) -> Fut + Send + Sync,
    Fut: Future<Output = Control> + Send + 'static,
{
    fn call(&self, req: Request, ctl: Control) -> BoxFuture<Control> {
        Box::pin((self.0)(req, ctl))
    }
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// A registered middleware plus its scope, as produced by a middleware
/// loader. Classification into execution order happens at rebuild time.
pub enum MiddlewareDescriptor {
    /// Runs for every dispatched request.
    Root(BoxedMiddleware),
    /// Runs when `pattern` matches the request path.
    Path {
        middleware: BoxedMiddleware,
        pattern: String,
    },
    /// Runs when the resolved route came from the named source directory
    /// kind.
    Dir {
        middleware: BoxedMiddleware,
        kind: String,
    },
}

/// Registers a middleware for every dispatched request.
pub fn root(middleware: impl Middleware) -> MiddlewareDescriptor {
    MiddlewareDescriptor::Root(middleware.into_boxed_middleware())
}

/// Registers a middleware for request paths matching `pattern`.
pub fn path(middleware: impl Middleware, pattern: impl Into<String>) -> MiddlewareDescriptor {
    MiddlewareDescriptor::Path {
        middleware: middleware.into_boxed_middleware(),
        pattern: pattern.into(),
    }
}

/// Registers a middleware for one source directory kind: `"pages"`,
/// `"assets"`, `"scripts"`, `"routes"` or `"dev"`. An unknown kind is
/// dropped with a warning at classification time.
pub fn dir(middleware: impl Middleware, kind: impl Into<String>) -> MiddlewareDescriptor {
    MiddlewareDescriptor::Dir {
        middleware: middleware.into_boxed_middleware(),
        kind: kind.into(),
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// The source directory kinds a dir middleware can bind to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum DirKind {
    Pages,
    Assets,
    Routes,
    Dev,
    Scripts,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pages"   => Ok(Self::Pages),
            "assets"  => Ok(Self::Assets),
            "routes"  => Ok(Self::Routes),
            "dev"     => Ok(Self::Dev),
            "scripts" => Ok(Self::Scripts),
            _         => Err(()),
        }
    }
}

/// Middlewares grouped into execution buckets. One of these lives in every
/// routing snapshot; it is rebuilt from scratch on every rebuild, never
/// mutated in place.
#[derive(Default)]
pub(crate) struct ClassifiedMiddleware {
    root: Vec<BoxedMiddleware>,
    path: Vec<(String, BoxedMiddleware)>,
    dir: HashMap<DirKind, BoxedMiddleware>,
}

impl ClassifiedMiddleware {
    pub(crate) fn root(&self) -> &[BoxedMiddleware] {
        &self.root
    }

    /// Path middlewares in registration order, with their patterns.
    pub(crate) fn path(&self) -> &[(String, BoxedMiddleware)] {
        &self.path
    }

    pub(crate) fn dir(&self, kind: DirKind) -> Option<&BoxedMiddleware> {
        self.dir.get(&kind)
    }

    pub(crate) fn len(&self) -> usize {
        self.root.len() + self.path.len() + self.dir.len()
    }
}

/// Groups descriptors into execution buckets, applying the duplicate rules.
///
/// - A root middleware registered twice (same function object) is kept
///   once; the repeat is dropped with a warning.
/// - A path pattern registered twice keeps the later middleware in the
///   earlier registration's position, with a warning.
/// - A dir kind registered twice keeps the later middleware, with a
///   warning. An unknown dir kind drops the descriptor, with a warning.
/// - A path middleware with an empty pattern is dropped with a warning.
pub(crate) fn classify(descriptors: Vec<MiddlewareDescriptor>) -> ClassifiedMiddleware {
    let mut out = ClassifiedMiddleware::default();

    for descriptor in descriptors {
        match descriptor {
            MiddlewareDescriptor::Root(mw) => {
                if out.root.iter().any(|seen| Arc::ptr_eq(seen, &mw)) {
                    warn!("duplicate root middleware registration ignored");
                } else {
                    out.root.push(mw);
                }
            }
            MiddlewareDescriptor::Path { middleware, pattern } => {
                if pattern.is_empty() {
                    warn!("path middleware with empty pattern dropped");
                    continue;
                }
                let pattern = crate::matcher::normalize(&pattern);
                match out.path.iter_mut().find(|(seen, _)| *seen == pattern) {
                    Some((_, slot)) => {
                        warn!(pattern = %pattern, "path middleware pattern re-registered, replacing previous");
                        *slot = middleware;
                    }
                    None => out.path.push((pattern, middleware)),
                }
            }
            MiddlewareDescriptor::Dir { middleware, kind } => {
                let Ok(parsed) = kind.parse::<DirKind>() else {
                    warn!(kind = %kind, "unknown dir middleware kind, descriptor dropped");
                    continue;
                };
                if out.dir.insert(parsed, middleware).is_some() {
                    warn!(kind = %kind, "dir middleware re-registered, replacing previous");
                }
            }
        }
    }

    out
}
