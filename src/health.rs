//! Built-in health-check handlers.
//!
//! | Probe | Path | Failing it means |
//! |---|---|---|
//! | **Liveness** | `/healthz` | the process is wedged and should be restarted |
//! | **Readiness** | `/readyz` | the process is up but should not receive traffic yet |
//!
//! Mount them from any route loader:
//!
//! ```rust
//! use krume::{health, RouteMap};
//!
//! let pages = RouteMap::new()
//!     .route("/healthz", health::liveness)
//!     .route("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependency
//! availability (a database, a downstream service).

use crate::{Request, Response};

/// Liveness probe handler.
///
/// Answers `200 OK` with body `"ok"` unconditionally. Responding at all is
/// the signal, so this handler consults nothing.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Readiness probe handler (default implementation).
///
/// Returns `200 OK` with body `"ready"`. Replace it if your application
/// needs a warm-up period or must verify dependencies before taking
/// traffic.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probes_answer_200() {
        let res = liveness(Request::builder().build()).await;
        assert_eq!(res.status_code(), http::StatusCode::OK);
        assert_eq!(res.body(), b"ok");

        let res = readiness(Request::builder().build()).await;
        assert_eq!(res.body(), b"ready");
    }
}
