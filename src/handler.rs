//! Handler trait and type erasure.
//!
//! Route maps hold handlers of *different* concrete types in one collection,
//! so each handler is hidden behind a trait object. The chain from user code
//! to vtable call:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← what the user writes
//!        ↓ pages.route("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← wrapped once, at registration
//!        ↓  kept as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)                                ← per request: one virtual call
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })
//! ```
//!
//! Per request that costs one `Arc` clone and one virtual call, which is
//! noise next to network I/O. Middlewares use the same erasure shape; see
//! [`crate::middleware`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls the future in place; `Send +
/// 'static` so tokio may move it across worker threads. Also the return
/// shape of middleware calls and source loaders.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Object-safe dispatch interface.
///
/// Has to be `#[doc(hidden)] pub` instead of `pub(crate)`: it leaks through
/// the return type of `Handler::into_boxed_handler`, which is public. There
/// is nothing useful an external crate can do with it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

/// A heap-allocated, type-erased handler shared across concurrent requests
/// and across routing-table snapshots (rebuilds clone the `Arc`, never the
/// handler).
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Anything that can serve a route.
///
/// Not meant to be implemented by hand: a blanket impl covers every
/// `async fn` of the shape
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and the trait is sealed, so that blanket impl is the only way in. The
/// accepted handler shape therefore cannot drift between versions.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Other crates cannot name `Sealed`, so they cannot implement `Handler`
/// on their own types.
mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

/// Covers named `async fn` items, closures returning async blocks, and any
/// struct implementing `Fn`.
impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Holds a concrete handler `F` and bridges it to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
