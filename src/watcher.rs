//! Hot reload of the config file.
//!
//! The parent directory is watched rather than the file so that editors
//! which save by renaming a temp file over the original are still seen.

use std::ffi::OsString;
use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Keeps the underlying notify watcher alive. Dropping it stops watching.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Calls `on_change` from notify's thread whenever the file at `path` is
    /// created, modified or removed.
    ///
    /// Returns `None` if watching is unavailable; the daemon then runs with
    /// the config it loaded at startup.
    pub fn new(path: &Path, on_change: impl Fn() + Send + 'static) -> Option<Self> {
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            tracing::warn!(event = "config.watcher.bad_path", path = %path.display());
            return None;
        };
        let file_name = file_name.to_os_string();

        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if Self::is_relevant_event(&event, &file_name) {
                    tracing::debug!(
                        event = "config.watcher.event_detected",
                        kind = ?event.kind,
                        paths = ?event.paths
                    );
                    on_change();
                }
            }
            Err(e) => tracing::warn!(event = "config.watcher.event_error", error = %e),
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(
                    event = "config.watcher.create_failed",
                    error = %e,
                    "Config hot reload unavailable"
                );
                return None;
            }
        };

        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            tracing::warn!(
                event = "config.watcher.watch_failed",
                path = %dir.display(),
                error = %e,
                "Config hot reload unavailable"
            );
            return None;
        }

        tracing::info!(event = "config.watcher.started", path = %path.display());
        Some(Self { _watcher: watcher })
    }

    fn is_relevant_event(event: &Event, file_name: &OsString) -> bool {
        let is_relevant_kind = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        is_relevant_kind
            && event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|name| name == file_name.as_os_str()))
    }
}
