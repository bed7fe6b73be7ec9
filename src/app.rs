//! The application: boot, live snapshot, rebuilds, reload triggers.
//!
//! An [`App`] owns the loaders and the single piece of shared mutable
//! state: an atomically swappable snapshot of the routing table plus
//! classified middlewares. Requests read the snapshot once at dispatch and
//! keep it for their whole lifetime, so a rebuild completing mid-request
//! never changes behavior for that request.
//!
//! Rebuild triggers flow through one channel into one consumer task:
//! file-change triggers open a debounce window that further file changes
//! extend, manual triggers fire immediately, and anything arriving while a
//! rebuild is in flight queues up behind it. Rebuilds are serialized by a
//! mutex; a failed rebuild logs and leaves the previous snapshot live.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tracing::{error, info};

use crate::dispatch::{self, Hooks};
use crate::error::{ConfigError, Error, RebuildError};
use crate::handler::Handler;
use crate::loader::SourceSet;
use crate::middleware::{classify, ClassifiedMiddleware};
use crate::registry::{merge, RouteKind, RoutingTable};
use crate::request::Request;
use crate::response::Response;
use crate::watch;

/// Default debounce window for file-change triggers.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Why a rebuild ran. Carried into the rebuild log line.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RebuildReason {
    Boot,
    FileChange,
    Manual,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boot       => "boot",
            Self::FileChange => "file-change",
            Self::Manual     => "manual",
        })
    }
}

/// What arrives on the trigger channel. Boot never flows through the
/// channel, hence a separate type from [`RebuildReason`].
#[derive(Clone, Copy, Debug)]
pub(crate) enum Trigger {
    FileChange,
    Manual,
}

/// One immutable generation of routing state. Replaced wholesale, never
/// mutated.
struct Snapshot {
    table: RoutingTable,
    middleware: ClassifiedMiddleware,
}

impl Snapshot {
    /// Placeholder installed before the boot build runs. Never observable:
    /// [`AppBuilder::boot`] returns only after the first successful rebuild
    /// has replaced it.
    fn empty() -> Self {
        Self {
            table: RoutingTable::default(),
            middleware: ClassifiedMiddleware::default(),
        }
    }
}

struct Shared {
    sources: SourceSet,
    live: ArcSwap<Snapshot>,
    hooks: Hooks,
    rebuild_gate: tokio::sync::Mutex<()>,
    trigger_tx: UnboundedSender<Trigger>,
    debounce: Duration,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
}

impl Shared {
    /// Loads all sources, merges and classifies them, and publishes the new
    /// snapshot. Serialized by the gate: a rebuild triggered while another
    /// runs waits its turn rather than interleaving.
    ///
    /// On failure nothing is published and nothing is logged here; each
    /// caller decides whether to log or propagate, so a failure surfaces
    /// exactly once.
    async fn rebuild(&self, reason: RebuildReason) -> Result<(), RebuildError> {
        let _gate = self.rebuild_gate.lock().await;
        let started = std::time::Instant::now();

        let (pages, scripts, assets, api, middleware) = tokio::try_join!(
            self.sources.load_pages(),
            self.sources.load_scripts(),
            self.sources.load_assets(),
            self.sources.load_api(),
            self.sources.load_middleware(),
        )?;

        let table = merge(
            vec![
                (RouteKind::Page, pages),
                (RouteKind::Script, scripts),
                (RouteKind::Asset, assets),
            ],
            api,
        )?;
        let middleware = classify(middleware);

        info!(
            reason = %reason,
            routes = table.route_count(),
            api_routes = table.api_count(),
            middlewares = middleware.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "routing table rebuilt"
        );
        self.live.store(Arc::new(Snapshot { table, middleware }));
        Ok(())
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A booted application: dispatches requests against the live snapshot and
/// rebuilds it when sources change.
///
/// Cheap to clone; clones share the same live state.
///
/// ```rust,no_run
/// use krume::{App, Response, Request, RouteMap, Server, SourceSet};
///
/// # async fn run() -> Result<(), krume::Error> {
/// let sources = SourceSet::new().pages(|| async {
///     Ok(RouteMap::new().route("/", |_req: Request| async {
///         Response::html("<h1>hello</h1>")
///     }))
/// });
///
/// let app = App::boot(sources).await?;
/// Server::bind("127.0.0.1:3000").serve(app).await
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    shared: Arc<Shared>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

impl App {
    /// Boots with default options. See [`AppBuilder`] for the knobs.
    pub async fn boot(sources: SourceSet) -> Result<App, Error> {
        Self::builder().boot(sources).await
    }

    pub fn builder() -> AppBuilder {
        AppBuilder {
            hooks: Hooks::default(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Dispatches one request against the current snapshot and always
    /// produces a response. This is the whole request path; the server is
    /// just a connection loop around it, which also makes it the natural
    /// entry point for tests.
    pub async fn handle(&self, req: Request) -> Response {
        let snapshot = self.shared.live.load_full();
        dispatch::dispatch(req, &snapshot.table, &snapshot.middleware, &self.shared.hooks).await
    }

    /// Rebuilds now, skipping the debounce window, and reports the outcome.
    /// A failed rebuild leaves the previous snapshot live.
    pub async fn rebuild(&self) -> Result<(), RebuildError> {
        self.shared.rebuild(RebuildReason::Manual).await
    }

    /// A cloneable fire-and-forget trigger for manual rebuilds, usable from
    /// anywhere (a dev-tools route, a signal handler). Outcomes are logged
    /// by the trigger task rather than returned.
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.shared.trigger_tx.clone(),
        }
    }

    /// Watches the given paths recursively and schedules a debounced
    /// rebuild on every file change under them. Paths must exist. Calling
    /// again replaces the previous watcher.
    pub fn watch(
        &self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<(), Error> {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        for path in &paths {
            if !path.exists() {
                return Err(ConfigError::WatchPath { path: path.clone() }.into());
            }
        }

        let watcher = watch::spawn(&paths, self.shared.trigger_tx.clone())?;
        *self
            .shared
            .watcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(watcher);
        Ok(())
    }
}

/// Configures an [`App`] before boot. Obtain via [`App::builder`].
pub struct AppBuilder {
    hooks: Hooks,
    debounce: Duration,
}

impl AppBuilder {
    /// Replaces the bare 404 for unresolved paths with your own handler.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.hooks.not_found = Some(handler.into_boxed_handler());
        self
    }

    /// Called with the panic message when a middleware or handler panics;
    /// its response replaces the default 500.
    pub fn on_error(
        mut self,
        hook: impl Fn(&str) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Stamps the standard security headers (CSP, frame and content-type
    /// options, referrer policy, HSTS) onto every response.
    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.hooks.security_headers = enabled;
        self
    }

    /// Debounce window for file-change triggers. Defaults to 500ms.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Runs the boot build and starts the trigger task. Fails if any loader
    /// fails or the merge rejects the sources, since there is no previous
    /// snapshot to keep serving from.
    pub async fn boot(self, sources: SourceSet) -> Result<App, Error> {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            sources,
            live: ArcSwap::from_pointee(Snapshot::empty()),
            hooks: self.hooks,
            rebuild_gate: tokio::sync::Mutex::new(()),
            trigger_tx,
            debounce: self.debounce,
            watcher: std::sync::Mutex::new(None),
        });

        shared.rebuild(RebuildReason::Boot).await.map_err(Error::Boot)?;

        // The task holds only a weak reference; dropping every App and
        // ReloadHandle closes the channel and ends the task.
        tokio::spawn(trigger_loop(Arc::downgrade(&shared), trigger_rx));

        Ok(App { shared })
    }
}

/// Fire-and-forget manual rebuild trigger. See [`App::reload_handle`].
#[derive(Clone)]
pub struct ReloadHandle {
    tx: UnboundedSender<Trigger>,
}

impl ReloadHandle {
    /// Schedules a rebuild. Returns immediately; a no-op once the app is
    /// gone.
    pub fn trigger(&self) {
        let _ = self.tx.send(Trigger::Manual);
    }
}

// ── Trigger task ──────────────────────────────────────────────────────────────

/// Single consumer of the trigger channel.
///
/// A file-change trigger opens a debounce window; every further file change
/// restarts the wait, a manual trigger cuts it short, and only when the
/// window finally elapses does one rebuild run. Triggers sent during a
/// rebuild sit in the channel and start the next cycle, which is what
/// coalesces a burst into exactly one follow-up rebuild.
async fn trigger_loop(shared: Weak<Shared>, mut rx: UnboundedReceiver<Trigger>) {
    let debounce = match shared.upgrade() {
        Some(shared) => shared.debounce,
        None => return,
    };

    while let Some(mut trigger) = rx.recv().await {
        if matches!(trigger, Trigger::FileChange) {
            loop {
                match timeout(debounce, rx.recv()).await {
                    Ok(Some(Trigger::FileChange)) => continue,
                    Ok(Some(Trigger::Manual)) => {
                        trigger = Trigger::Manual;
                        break;
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }

        let Some(shared) = shared.upgrade() else { break };
        let reason = match trigger {
            Trigger::FileChange => RebuildReason::FileChange,
            Trigger::Manual     => RebuildReason::Manual,
        };
        if let Err(error) = shared.rebuild(reason).await {
            error!(
                reason = %reason,
                error = %error,
                "rebuild failed, previous routing table stays live"
            );
        }
    }
}
