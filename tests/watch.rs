//! Watch-bridge integration tests.
//!
//! Exercises watch eligibility, suspend/resume semantics, and the
//! external-change reconciliation path against a real temporary package.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use bookpack::{Keeper, MediaTypes, PackageListener, Resource};

fn new_keeper(root: &Path) -> Arc<Keeper> {
    Keeper::create(root, Arc::new(MediaTypes::new()), "3.0").unwrap()
}

fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[derive(Default)]
struct CountingPackage {
    updated: AtomicUsize,
}

impl PackageListener for CountingPackage {
    fn resource_updated_from_disk(&self, _resource: &Resource) {
        self.updated.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_only_editable_kinds_are_watched() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());

    let markup = keeper
        .add_file(&write_source(sources.path(), "a.xhtml", "<html/>"), false, None)
        .unwrap();
    let image = keeper
        .add_file(&write_source(sources.path(), "a.png", "png"), false, None)
        .unwrap();

    keeper.watch_resource(&markup).unwrap();
    keeper.watch_resource(&image).unwrap();

    assert!(!keeper.is_watching(&markup), "markup is not editor-eligible");
    assert!(keeper.is_watching(&image));
    assert_eq!(keeper.watched_paths().len(), 1);
}

#[test]
fn test_watching_is_idempotent() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());

    let image = keeper
        .add_file(&write_source(sources.path(), "a.png", "png"), false, None)
        .unwrap();

    keeper.watch_resource(&image).unwrap();
    keeper.watch_resource(&image).unwrap();

    assert_eq!(keeper.watched_paths().len(), 1);
}

#[test]
fn test_suspend_resume_restores_surviving_paths() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());

    let keep = keeper
        .add_file(&write_source(sources.path(), "keep.png", "k"), false, None)
        .unwrap();
    let lose = keeper
        .add_file(&write_source(sources.path(), "lose.png", "l"), false, None)
        .unwrap();
    keeper.watch_resource(&keep).unwrap();
    keeper.watch_resource(&lose).unwrap();

    keeper.suspend_watching();
    assert!(keeper.watched_paths().is_empty());
    assert_eq!(keeper.suspended_paths().len(), 2);

    // Delete one file while watching is paused.
    fs::remove_file(lose.full_path()).unwrap();

    keeper.resume_watching();
    assert_eq!(keeper.watched_paths(), vec![keep.full_path()]);
    assert!(keeper.suspended_paths().is_empty());
}

#[test]
fn test_suspend_while_suspended_is_a_noop() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());

    let first = keeper
        .add_file(&write_source(sources.path(), "first.png", "1"), false, None)
        .unwrap();
    keeper.watch_resource(&first).unwrap();
    keeper.suspend_watching();
    assert_eq!(keeper.suspended_paths().len(), 1);

    // A watch added mid-suspension must survive a second suspend call,
    // which would otherwise overwrite the holding set.
    let second = keeper
        .add_file(&write_source(sources.path(), "second.png", "2"), false, None)
        .unwrap();
    keeper.watch_resource(&second).unwrap();
    keeper.suspend_watching();

    assert_eq!(keeper.suspended_paths().len(), 1);
    assert_eq!(keeper.watched_paths(), vec![second.full_path()]);
}

#[tokio::test]
async fn test_spurious_change_event_is_ignored() {
    let package = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());
    let listener = Arc::new(CountingPackage::default());
    keeper.set_package_listener(listener.clone());

    keeper
        .on_external_change(Path::new("/nonexistent/ghost.png"))
        .await;

    assert_eq!(listener.updated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_external_change_dispatches_exactly_once() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());
    let listener = Arc::new(CountingPackage::default());
    keeper.set_package_listener(listener.clone());

    let image = keeper
        .add_file(&write_source(sources.path(), "cover.png", "v1"), false, None)
        .unwrap();
    keeper.watch_resource(&image).unwrap();

    // Simulate an atomic-replace save: new file moved over the watched one.
    let replacement = write_source(sources.path(), "cover.png.tmp", "v2");
    fs::rename(&replacement, image.full_path()).unwrap();

    keeper.on_external_change(&image.full_path()).await;

    assert!(image.changed_on_disk());
    assert_eq!(listener.updated.load(Ordering::SeqCst), 1);
    // The watch survives the replace.
    assert!(keeper.is_watching(&image));
}

#[tokio::test]
async fn test_delete_then_recreate_within_grace_dispatches_once() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());
    let listener = Arc::new(CountingPackage::default());
    keeper.set_package_listener(listener.clone());

    let image = keeper
        .add_file(&write_source(sources.path(), "cover.png", "v1"), false, None)
        .unwrap();
    keeper.watch_resource(&image).unwrap();

    // Some editors save by deleting the file and writing it fresh. The
    // change handler must wait out the gap instead of dropping the event.
    let full_path = image.full_path();
    fs::remove_file(&full_path).unwrap();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        fs::write(&full_path, "v2").unwrap();
    });

    keeper.on_external_change(&image.full_path()).await;
    writer.await.unwrap();

    assert!(image.changed_on_disk());
    assert_eq!(listener.updated.load(Ordering::SeqCst), 1);
    assert!(keeper.is_watching(&image));
}

#[tokio::test]
async fn test_external_change_without_wiring_skips_package_callback() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());
    let listener = Arc::new(CountingPackage::default());
    keeper.set_package_listener(listener.clone());

    let notes = keeper
        .add_file(&write_source(sources.path(), "notes.txt", "n"), false, None)
        .unwrap();
    // Never watched, so no modified-flag wiring exists.

    keeper.on_external_change(&notes.full_path()).await;

    assert!(notes.changed_on_disk());
    assert_eq!(listener.updated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_change_for_unknown_path_is_a_noop() {
    let package = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());
    let listener = Arc::new(CountingPackage::default());
    keeper.set_package_listener(listener.clone());

    // A real file nobody registered.
    let stray = write_source(sources.path(), "stray.png", "s");
    keeper.on_external_change(&stray).await;

    assert_eq!(listener.updated.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_loop_start_and_stop() {
    let package = TempDir::new().unwrap();
    let keeper = new_keeper(package.path());

    let handle = keeper.spawn_watch_loop().expect("first spawn gets the receiver");
    assert!(
        keeper.spawn_watch_loop().is_none(),
        "event receiver can only be taken once"
    );
    handle.stop().await;
}
