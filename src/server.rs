//! HTTP server and shutdown.
//!
//! A thin connection loop around [`App::handle`]: accept, spawn a task per
//! connection, convert wire requests to [`Request`] values and responses
//! back. Routing, middleware, and reloads all live in the app; the server
//! knows nothing about them.
//!
//! # Shutdown
//!
//! On SIGTERM or Ctrl-C the listener stops accepting and every in-flight
//! connection task is aborted. There is no graceful drain: the expected
//! deployment is behind a proxy or in development, where cutting a
//! connection on shutdown is preferable to waiting out a slow client.

use std::net::SocketAddr;

use http_body_util::BodyExt;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// The listening half of an application: owns the socket, nothing else.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Records the address to bind when [`serve`](Server::serve) runs.
    ///
    /// # Panics
    ///
    /// Panics when `addr` does not parse as a `host:port` socket address.
    /// Addresses coming from a [`Config`](crate::Config) have already been
    /// validated.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use krume::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `app`.
    /// Returns after a shutdown signal (SIGTERM or Ctrl-C).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "krume listening");

        // JoinSet tracks every spawned connection task so shutdown can
        // abort them all.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top-to-bottom, so a signal stops the
                // accept loop even when connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, aborting open connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = app.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // One closure call per request, not per connection.
                        let svc = service_fn(move |req| {
                            let app = app.clone();
                            async move { serve_request(app, req).await }
                        });

                        // `auto::Builder` speaks HTTP/1.1 and HTTP/2,
                        // whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not
                // grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        info!("krume stopped");
        Ok(())
    }
}

// ── Request plumbing ──────────────────────────────────────────────────────────

/// Converts one wire request, runs it through the app, and converts the
/// response back. The error type is
/// [`Infallible`](std::convert::Infallible): every failure becomes an HTTP
/// response, so hyper never sees an error from us.
async fn serve_request(
    app: App,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read request body: {e}");
            return Ok(Response::status(http::StatusCode::BAD_REQUEST).into_http());
        }
    };

    let request = Request::new(
        parts.method,
        parts.uri.path().to_owned(),
        parts.uri.query().map(str::to_owned),
        parts.headers,
        body,
    );

    Ok(app.handle(request).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Completes once the process receives its first shutdown signal.
///
/// On Unix that is either **SIGTERM** (service managers, the Kubernetes
/// control plane) or **SIGINT** (Ctrl-C during development). On Windows
/// only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
