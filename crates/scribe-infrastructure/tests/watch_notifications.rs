#![cfg(target_os = "linux")]

use std::sync::mpsc;
use std::time::Duration;

use scribe_core::content::{FileChangeEvent, FileChangeKind};
use scribe_infrastructure::ContentWatcher;
use tempfile::TempDir;

const SETTLE: Duration = Duration::from_millis(800);

fn collect(rx: &mpsc::Receiver<FileChangeEvent>) -> Vec<FileChangeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(SETTLE) {
        events.push(event);
    }
    events
}

#[test]
fn test_create_inside_watched_dir_emits_single_add() {
    let watched = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let watched_root = watched.path().canonicalize().unwrap();

    let watcher = ContentWatcher::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let _sub = watcher.on_change(move |event| {
        let _ = tx.send(event.clone());
    });
    watcher.watch(&[watched.path()]).unwrap();

    std::fs::File::create(watched_root.join("chapter-1.md")).unwrap();
    std::fs::File::create(outside.path().join("elsewhere.md")).unwrap();

    let events = collect(&rx);
    assert_eq!(events.len(), 1, "unexpected events: {events:?}");
    assert_eq!(events[0].kind, FileChangeKind::Add);
    assert_eq!(events[0].path, watched_root.join("chapter-1.md"));
}

#[test]
fn test_watch_is_idempotent_and_unwatch_silences() {
    let watched = TempDir::new().unwrap();
    let watcher = ContentWatcher::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let _sub = watcher.on_change(move |event| {
        let _ = tx.send(event.clone());
    });

    watcher.watch(&[watched.path()]).unwrap();
    watcher.watch(&[watched.path()]).unwrap();
    assert_eq!(watcher.watched_paths().len(), 1);

    std::fs::create_dir(watched.path().join("drafts")).unwrap();
    let events = collect(&rx);
    assert_eq!(events.len(), 1, "unexpected events: {events:?}");
    assert_eq!(events[0].kind, FileChangeKind::AddDir);

    watcher.unwatch(&[watched.path()]);
    assert!(!watcher.is_watching(watched.path()));
    std::fs::File::create(watched.path().join("late.md")).unwrap();
    assert!(collect(&rx).is_empty());
}

#[test]
fn test_hidden_files_are_ignored() {
    let watched = TempDir::new().unwrap();
    let watcher = ContentWatcher::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let _sub = watcher.on_change(move |event| {
        let _ = tx.send(event.clone());
    });
    watcher.watch(&[watched.path()]).unwrap();

    std::fs::File::create(watched.path().join(".swap")).unwrap();
    assert!(collect(&rx).is_empty());
}
