//! Reloads the registry when another process edits its backing file.
//!
//! The OS watcher is torn down while the store writes the file itself and rebuilt afterwards,
//! so a store never reloads in response to its own save.

use super::error::{RegistryError, Result};
use super::store::StoreInner;
use crate::config::{WATCH_CHANNEL_CAPACITY, WATCH_DEBOUNCE};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[derive(Default)]
struct WatchState {
    enabled: bool,
    /// Outstanding [`WatchSuspension`] guards
    suspended: usize,
    watcher: Option<RecommendedWatcher>,
    runtime: Option<Handle>,
}

pub(super) struct WatchController {
    store: Weak<StoreInner>,
    path: PathBuf,
    state: Mutex<WatchState>,
}

impl WatchController {
    pub(super) fn new(store: Weak<StoreInner>, path: PathBuf) -> Self {
        Self {
            store,
            path,
            state: Mutex::new(WatchState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Must be called from within a tokio runtime when enabling
    pub(super) fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        if state.enabled == enabled {
            return Ok(());
        }

        if enabled {
            let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
            if state.suspended == 0 {
                state.watcher = Some(self.start(&runtime)?);
            }
            state.runtime = Some(runtime);
            state.enabled = true;
            log::info!("[RegistryWatcher] Watching {:?}", self.path);
        } else {
            state.watcher = None;
            state.runtime = None;
            state.enabled = false;
            log::info!("[RegistryWatcher] Stopped watching {:?}", self.path);
        }

        Ok(())
    }

    /// Stop reacting to file changes until the returned guard is dropped
    pub(super) fn suspend(&self) -> WatchSuspension<'_> {
        let mut state = self.lock();
        state.suspended += 1;
        if state.watcher.take().is_some() {
            log::debug!("[RegistryWatcher] Suspended for {:?}", self.path);
        }
        WatchSuspension { controller: self }
    }

    fn resume(&self) {
        let mut state = self.lock();
        state.suspended = state.suspended.saturating_sub(1);
        if state.suspended > 0 || !state.enabled || state.watcher.is_some() {
            return;
        }

        let Some(runtime) = state.runtime.clone() else {
            return;
        };
        match self.start(&runtime) {
            Ok(watcher) => {
                state.watcher = Some(watcher);
                log::debug!("[RegistryWatcher] Resumed for {:?}", self.path);
            }
            Err(e) => {
                log::error!("[RegistryWatcher] Failed to resume watching {:?}: {}", self.path, e);
            }
        }
    }

    fn start(&self, runtime: &Handle) -> Result<RecommendedWatcher> {
        let dir = watch_dir(&self.path);
        std::fs::create_dir_all(&dir).map_err(|source| RegistryError::Io {
            path: dir.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                // A full channel already has a reload pending
                Ok(event) => {
                    let _ = tx.try_send(event);
                }
                Err(e) => log::warn!("[RegistryWatcher] Notification error: {}", e),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        // The file itself may be replaced by rename, so the directory is watched and events are
        // filtered by name.
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        runtime.spawn(handle_events(rx, self.store.clone(), file_name));

        Ok(watcher)
    }
}

/// Restores watching when dropped, including when the guarded write failed
pub(super) struct WatchSuspension<'a> {
    controller: &'a WatchController,
}

impl Drop for WatchSuspension<'_> {
    fn drop(&mut self) {
        self.controller.resume();
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant(event: &Event, file_name: Option<&OsString>) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()).as_ref() == file_name)
}

async fn handle_events(
    mut rx: mpsc::Receiver<Event>,
    store: Weak<StoreInner>,
    file_name: Option<OsString>,
) {
    while let Some(event) = rx.recv().await {
        if !is_relevant(&event, file_name.as_ref()) {
            continue;
        }

        // Let the writer finish, then fold the burst into a single reload
        tokio::time::sleep(WATCH_DEBOUNCE).await;
        while rx.try_recv().is_ok() {}

        let Some(store) = store.upgrade() else {
            break;
        };
        log::debug!("[RegistryWatcher] Change detected in {:?}, reloading", store.path());
        if let Err(e) = store.reload_settled().await {
            log::error!("[RegistryWatcher] Reload of {:?} failed: {}", store.path(), e);
        }
    }

    log::debug!("[RegistryWatcher] Event loop finished");
}
