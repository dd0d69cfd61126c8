//! Change-watch bridge for external-editor round-tripping.
//!
//! Tracks which resource files are monitored for outside modification,
//! supports suspend/resume around bulk operations, and reconciles notify
//! events against the registry's tables. Editors that save by writing a
//! temporary file and atomically renaming it over the watched one silently
//! drop the underlying watch, so event handling re-arms it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Keeper, KeeperError};
use crate::domain::Resource;

/// How long an external-change handler waits for a deleted-then-recreated
/// file to reappear.
const CHANGE_GRACE: Duration = Duration::from_secs(1);
/// Polling slice inside the grace window; yields between checks.
const CHANGE_POLL: Duration = Duration::from_millis(100);

/// Watch-set state behind the notify watcher.
pub(crate) struct WatchBridge {
    watcher: Mutex<RecommendedWatcher>,
    /// Receiver for raw notify events; taken once by the watch loop.
    events: Mutex<Option<mpsc::Receiver<notify::Result<Event>>>>,
    /// Paths currently monitored.
    watched: Mutex<HashSet<PathBuf>>,
    /// Holding set for paths moved aside by a suspension.
    suspended: Mutex<HashSet<PathBuf>>,
    /// Handles whose "updated externally" notification is wired.
    /// At most one wiring per handle.
    wired: Mutex<HashSet<Uuid>>,
}

impl WatchBridge {
    pub(crate) fn new() -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let watcher = recommended_watcher(move |event: notify::Result<Event>| {
            let _ = tx.send(event);
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            events: Mutex::new(Some(rx)),
            watched: Mutex::new(HashSet::new()),
            suspended: Mutex::new(HashSet::new()),
            wired: Mutex::new(HashSet::new()),
        })
    }

    /// Start monitoring `path`. Idempotent.
    pub(crate) fn watch_path(&self, path: &Path) -> Result<(), notify::Error> {
        let mut watched = self.watched.lock();
        if watched.contains(path) {
            return Ok(());
        }
        self.watcher
            .lock()
            .watch(path, RecursiveMode::NonRecursive)?;
        watched.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop monitoring `path` and clear it from the holding set.
    pub(crate) fn unwatch_path(&self, path: &Path) {
        let was_watched = self.watched.lock().remove(path);
        if was_watched {
            let _ = self.watcher.lock().unwatch(path);
        }
        self.suspended.lock().remove(path);
    }

    /// Move watch membership from `old` to `new` after a rename.
    pub(crate) fn rename_watched(&self, old: &Path, new: &Path) {
        let mut watched = self.watched.lock();
        if watched.remove(old) {
            let mut watcher = self.watcher.lock();
            let _ = watcher.unwatch(old);
            if watcher.watch(new, RecursiveMode::NonRecursive).is_ok() {
                watched.insert(new.to_path_buf());
            }
        }
        let mut suspended = self.suspended.lock();
        if suspended.remove(old) {
            suspended.insert(new.to_path_buf());
        }
    }

    /// Record the "updated externally" wiring for a handle. Returns false
    /// when the handle is already wired; duplicates are no-ops.
    pub(crate) fn wire(&self, id: Uuid) -> bool {
        self.wired.lock().insert(id)
    }

    pub(crate) fn is_wired(&self, id: Uuid) -> bool {
        self.wired.lock().contains(&id)
    }

    pub(crate) fn unwire(&self, id: Uuid) {
        self.wired.lock().remove(&id);
    }

    /// Move the entire active watch set into the holding set. A no-op
    /// when a holding set already exists, so a nested suspension cannot
    /// lose track of the previous one.
    pub(crate) fn suspend(&self) {
        let mut watched = self.watched.lock();
        let mut suspended = self.suspended.lock();
        if !suspended.is_empty() || watched.is_empty() {
            return;
        }
        let mut watcher = self.watcher.lock();
        for path in watched.drain() {
            let _ = watcher.unwatch(&path);
            suspended.insert(path);
        }
    }

    /// Restore monitoring for every held path that still exists on disk,
    /// then clear the holding set. Paths deleted during the suspension
    /// are dropped, not re-added.
    pub(crate) fn resume(&self) {
        let mut watched = self.watched.lock();
        let mut suspended = self.suspended.lock();
        if suspended.is_empty() {
            return;
        }
        let mut watcher = self.watcher.lock();
        for path in suspended.drain() {
            if !path.exists() {
                debug!(path = %path.display(), "dropped from watch set during suspension");
                continue;
            }
            if watcher.watch(&path, RecursiveMode::NonRecursive).is_ok() {
                watched.insert(path);
            }
        }
    }

    /// Re-register the notify watch for a path that should be monitored.
    /// Atomic-replace saves silently drop the kernel watch, and notify
    /// offers no way to ask, so the watch is always re-added.
    pub(crate) fn rearm(&self, path: &Path) {
        if !self.watched.lock().contains(path) {
            return;
        }
        let mut watcher = self.watcher.lock();
        let _ = watcher.unwatch(path);
        if let Err(error) = watcher.watch(path, RecursiveMode::NonRecursive) {
            warn!(path = %path.display(), %error, "failed to re-arm watch");
        }
    }

    pub(crate) fn is_watched(&self, path: &Path) -> bool {
        self.watched.lock().contains(path)
    }

    pub(crate) fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    pub(crate) fn suspended_paths(&self) -> Vec<PathBuf> {
        self.suspended.lock().iter().cloned().collect()
    }

    pub(crate) fn take_event_receiver(&self) -> Option<mpsc::Receiver<notify::Result<Event>>> {
        self.events.lock().take()
    }
}

/// Handle to a running watch loop.
pub struct WatchHandle {
    stop_tx: tokio::sync::mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watch loop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.task.await;
    }
}

impl Keeper {
    /// Begin monitoring a resource's file for external modification.
    ///
    /// Only kinds eligible for external-editor round-tripping are watched;
    /// anything else is a no-op. Wires the handle's "updated externally"
    /// notification to the owning package at most once.
    pub fn watch_resource(&self, resource: &Resource) -> Result<(), KeeperError> {
        if !resource.kind().editable_externally() {
            return Ok(());
        }
        self.bridge().watch_path(&resource.full_path())?;
        self.bridge().wire(resource.id());
        Ok(())
    }

    /// Pause all watching without losing track of what was watched.
    pub fn suspend_watching(&self) {
        self.bridge().suspend();
    }

    /// Restore watching for paths suspended earlier that still exist.
    pub fn resume_watching(&self) {
        self.bridge().resume();
    }

    /// Whether a resource's file is currently monitored.
    pub fn is_watching(&self, resource: &Resource) -> bool {
        self.bridge().is_watched(&resource.full_path())
    }

    /// Paths currently monitored. Mainly for diagnostics and tests.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.bridge().watched_paths()
    }

    /// Paths held aside by a suspension.
    pub fn suspended_paths(&self) -> Vec<PathBuf> {
        self.bridge().suspended_paths()
    }

    /// Reconcile one filesystem event against the tables.
    ///
    /// Editors may delete the file before writing the new version, so a
    /// missing file gets a bounded grace period to reappear. A file that
    /// never does is a spurious event. Otherwise the watch is re-armed
    /// (atomic-replace saves drop it) and the matching resource's
    /// changed-on-disk handling runs exactly once.
    pub async fn on_external_change(&self, path: &Path) {
        let deadline = tokio::time::Instant::now() + CHANGE_GRACE;
        while !path.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(CHANGE_POLL).await;
        }

        // Also fires after removals and renames; the kernel watch is
        // already gone by then, so a still-missing file is ignorable.
        if !path.exists() {
            debug!(path = %path.display(), "spurious change event");
            return;
        }

        self.bridge().rearm(path);

        if let Some(resource) = self.resource_by_full_path(path) {
            resource.mark_changed_on_disk();
            info!(book_path = %resource.book_path(), "resource updated from disk");
            if self.bridge().is_wired(resource.id()) {
                if let Some(listener) = self.package_listener() {
                    listener.resource_updated_from_disk(&resource);
                }
            }
        }
    }

    /// Spawn the loop that drains notify events and feeds
    /// [`Keeper::on_external_change`]. Call at most once per keeper; the
    /// event receiver is taken by the first caller.
    pub fn spawn_watch_loop(self: &Arc<Self>) -> Option<WatchHandle> {
        let events = self.bridge().take_event_receiver()?;
        let (stop_tx, mut stop_rx) = tokio::sync::mpsc::channel::<()>(1);
        let keeper = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                if stop_rx.try_recv().is_ok() {
                    info!("watch loop stopping");
                    break;
                }

                match events.recv_timeout(Duration::from_millis(500)) {
                    Ok(Ok(event)) => {
                        if matches!(event.kind, EventKind::Access(_)) {
                            continue;
                        }
                        for path in &event.paths {
                            keeper.on_external_change(path).await;
                        }
                    }
                    Ok(Err(error)) => {
                        warn!(%error, "watch error");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        // Expected; loop back to the stop check.
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        warn!("watch channel disconnected");
                        break;
                    }
                }
            }
        });

        Some(WatchHandle { stop_tx, task })
    }
}
