//! Filesystem watcher feeding the rebuild trigger channel.
//!
//! Deliberately thin: every relevant event becomes one file-change trigger
//! on the app's channel, and all debouncing and coalescing happens in the
//! trigger task, not here. The watcher callback runs on notify's own
//! thread, which is why it only does a channel send.

use std::path::PathBuf;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::app::Trigger;

/// Starts watching `paths` recursively. The returned watcher stops when
/// dropped, so the caller keeps it alive for as long as reloads are wanted.
pub(crate) fn spawn(
    paths: &[PathBuf],
    tx: UnboundedSender<Trigger>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                    debug!(kind = ?event.kind, "source change detected");
                    let _ = tx.send(Trigger::FileChange);
                }
            }
            Err(e) => error!("watch error: {e}"),
        },
        Config::default(),
    )?;

    for path in paths {
        watcher.watch(path, RecursiveMode::Recursive)?;
    }
    info!(paths = ?paths, "source watcher started");
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn file_writes_produce_triggers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = spawn(&[dir.path().to_path_buf()], tx).expect("watcher");

        std::fs::write(dir.path().join("page.md"), "# hello").expect("write");

        let trigger = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("a trigger should arrive")
            .expect("channel open");
        assert!(matches!(trigger, Trigger::FileChange));
    }
}
