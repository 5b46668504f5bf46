//! Hot-reload: watches the config file with `notify`, debounces bursts of
//! editor-save events, and atomically swaps the shared `ConfigSnapshot`
//! once a reload resolves cleanly. A bad edit never displaces a good
//! snapshot — workers keep running on the last-known-good config.

use crate::config::legacy::load_raw_config;
use crate::config::model::ConfigSnapshot;
use crate::config::resolve::resolve_snapshot;
use anyhow::{Context, Result};
use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(600);

pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let raw = load_raw_config(&text, &path.display().to_string())
        .with_context(|| "parsing config file")?;
    let snapshot = resolve_snapshot(&raw).with_context(|| "resolving config snapshot")?;
    Ok(snapshot)
}

/// Spawns a background task that watches `path` and keeps `shared` in
/// sync. The returned `Watcher` must be kept alive for the duration of
/// the process — dropping it stops the filesystem subscription.
pub fn watch(path: PathBuf, shared: Arc<RwLock<ConfigSnapshot>>) -> Result<notify::RecommendedWatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        loop {
            let Some(first) = rx.recv().await else {
                info!("config watcher channel closed");
                return;
            };
            if let Err(e) = first {
                warn!(error = %e, "config watcher event error");
                continue;
            }

            // coalesce a burst of events (e.g. editors that write-then-rename)
            // into one reload.
            tokio::select! {
                _ = tokio::time::sleep(DEBOUNCE) => {}
            }
            while let Ok(next) = rx.try_recv() {
                if let Err(e) = next {
                    warn!(error = %e, "config watcher event error");
                }
            }

            match load_snapshot(&path) {
                Ok(snapshot) => {
                    let mut guard = shared.write().await;
                    *guard = snapshot;
                    info!(path = %path.display(), "config hot-reloaded");
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "config reload failed, keeping previous snapshot");
                }
            }
        }
    });

    Ok(watcher)
}
