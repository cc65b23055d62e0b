//! File change notifications for content directories.
//!
//! Wraps a recursive `notify` watcher. Every relevant filesystem event is
//! pushed to subscribers as it happens; there is no batching or debouncing,
//! and no events are synthesized for files that existed before `watch`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use scribe_core::content::{FileChangeEvent, FileChangeKind};
use scribe_core::{EventBus, Result, ScribeError, Subscription};

use crate::content_store::is_hidden;

type WatchSet = Arc<Mutex<HashSet<PathBuf>>>;

pub struct ContentWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: WatchSet,
    events: EventBus<FileChangeEvent>,
}

impl ContentWatcher {
    pub fn new() -> Result<Self> {
        let events = EventBus::new();
        let watched: WatchSet = Arc::new(Mutex::new(HashSet::new()));

        let bus = events.clone();
        let roots = Arc::clone(&watched);
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let roots = match roots.lock() {
                        Ok(roots) => roots.clone(),
                        Err(_) => return,
                    };
                    for change in map_event(&event, &roots) {
                        tracing::trace!(kind = change.kind.as_str(), path = %change.path.display(), "[Watcher] change");
                        bus.emit(&change);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "[Watcher] notify error"),
            },
            Config::default(),
        )
        .map_err(|e| ScribeError::watch(format!("failed to create watcher: {e}")))?;

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            watched,
            events,
        })
    }

    /// Starts watching `paths` recursively. Already-watched paths are skipped.
    pub fn watch<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let mut guard = self
            .watcher
            .lock()
            .map_err(|_| ScribeError::internal("watcher lock poisoned"))?;
        let watcher = guard
            .as_mut()
            .ok_or_else(|| ScribeError::invalid_state("watcher has been stopped"))?;

        for path in paths {
            let path = canonical(path.as_ref());
            if self.is_watching(&path) {
                continue;
            }
            watcher
                .watch(&path, RecursiveMode::Recursive)
                .map_err(|e| ScribeError::watch(format!("failed to watch {}: {e}", path.display())))?;
            if let Ok(mut watched) = self.watched.lock() {
                watched.insert(path.clone());
            }
            tracing::info!(path = %path.display(), "[Watcher] watching");
        }
        Ok(())
    }

    /// Stops watching `paths`. Unknown paths are ignored.
    pub fn unwatch<P: AsRef<Path>>(&self, paths: &[P]) {
        let Ok(mut guard) = self.watcher.lock() else {
            return;
        };
        for path in paths {
            let path = canonical(path.as_ref());
            let removed = self
                .watched
                .lock()
                .map(|mut watched| watched.remove(&path))
                .unwrap_or(false);
            if !removed {
                continue;
            }
            if let Some(watcher) = guard.as_mut() {
                if let Err(e) = watcher.unwatch(&path) {
                    tracing::debug!(path = %path.display(), error = %e, "[Watcher] unwatch failed");
                }
            }
        }
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched
            .lock()
            .map(|w| w.contains(&canonical(path)))
            .unwrap_or(false)
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .watched
            .lock()
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FileChangeEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Tears the watcher down for good. Later `watch` calls fail.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.watcher.lock() {
            guard.take();
        }
        if let Ok(mut watched) = self.watched.lock() {
            watched.clear();
        }
        tracing::info!("[Watcher] stopped");
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// True when `path` lies under a watched root without passing through a hidden entry.
fn visible_under(path: &Path, roots: &HashSet<PathBuf>) -> bool {
    roots.iter().any(|root| match path.strip_prefix(root) {
        Ok(rel) => !rel
            .components()
            .any(|c| is_hidden(&c.as_os_str().to_string_lossy())),
        Err(_) => false,
    })
}

fn added(path: &Path) -> FileChangeKind {
    if path.is_dir() {
        FileChangeKind::AddDir
    } else {
        FileChangeKind::Add
    }
}

fn each_path<F>(event: &notify::Event, roots: &HashSet<PathBuf>, kind_of: F) -> Vec<FileChangeEvent>
where
    F: Fn(&Path) -> Option<FileChangeKind>,
{
    event
        .paths
        .iter()
        .filter(|p| visible_under(p, roots))
        .filter_map(|p| {
            kind_of(p).map(|kind| FileChangeEvent {
                kind,
                path: p.clone(),
            })
        })
        .collect()
}

fn map_event(event: &notify::Event, roots: &HashSet<PathBuf>) -> Vec<FileChangeEvent> {
    let per_path = |kind_of: fn(&Path) -> Option<FileChangeKind>| each_path(event, roots, kind_of);

    match &event.kind {
        EventKind::Create(CreateKind::Folder) => per_path(|_| Some(FileChangeKind::AddDir)),
        EventKind::Create(CreateKind::File) => per_path(|_| Some(FileChangeKind::Add)),
        EventKind::Create(_) => per_path(|p| Some(added(p))),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => per_path(|_| Some(FileChangeKind::Unlink)),
            RenameMode::To => per_path(|p| Some(added(p))),
            RenameMode::Both if event.paths.len() >= 2 => {
                let mut changes = Vec::with_capacity(2);
                if visible_under(&event.paths[0], roots) {
                    changes.push(FileChangeEvent {
                        kind: FileChangeKind::Unlink,
                        path: event.paths[0].clone(),
                    });
                }
                if visible_under(&event.paths[1], roots) {
                    changes.push(FileChangeEvent {
                        kind: added(&event.paths[1]),
                        path: event.paths[1].clone(),
                    });
                }
                changes
            }
            _ => per_path(|p| {
                Some(if p.exists() {
                    added(p)
                } else {
                    FileChangeKind::Unlink
                })
            }),
        },
        // Permission and timestamp updates are not content changes.
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => per_path(|p| (!p.is_dir()).then_some(FileChangeKind::Change)),
        EventKind::Remove(RemoveKind::Folder) => per_path(|_| Some(FileChangeKind::UnlinkDir)),
        EventKind::Remove(_) => per_path(|_| Some(FileChangeKind::Unlink)),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, Event};

    fn roots(dir: &str) -> HashSet<PathBuf> {
        [PathBuf::from(dir)].into_iter().collect()
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_create_file_maps_to_add() {
        let changes = map_event(
            &event(EventKind::Create(CreateKind::File), &["/w/a.md"]),
            &roots("/w"),
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, FileChangeKind::Add);
    }

    #[test]
    fn test_paths_outside_roots_are_dropped() {
        let changes = map_event(
            &event(EventKind::Create(CreateKind::File), &["/elsewhere/a.md"]),
            &roots("/w"),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn test_hidden_paths_below_root_are_dropped() {
        let rs = roots("/tmp/.tmpABC");
        let visible = map_event(
            &event(EventKind::Create(CreateKind::File), &["/tmp/.tmpABC/a.md"]),
            &rs,
        );
        assert_eq!(visible.len(), 1);

        let hidden = map_event(
            &event(EventKind::Create(CreateKind::File), &["/tmp/.tmpABC/.git/index"]),
            &rs,
        );
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_modify_and_remove_kinds() {
        let rs = roots("/w");
        let modified = map_event(
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/w/a.md"]),
            &rs,
        );
        assert_eq!(modified[0].kind, FileChangeKind::Change);

        let removed_dir = map_event(&event(EventKind::Remove(RemoveKind::Folder), &["/w/d"]), &rs);
        assert_eq!(removed_dir[0].kind, FileChangeKind::UnlinkDir);

        let access = map_event(
            &event(EventKind::Access(notify::event::AccessKind::Any), &["/w/a.md"]),
            &rs,
        );
        assert!(access.is_empty());
    }

    #[test]
    fn test_rename_both_is_unlink_then_add() {
        let changes = map_event(
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/old.md", "/w/new.md"],
            ),
            &roots("/w"),
        );
        let kinds: Vec<_> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![FileChangeKind::Unlink, FileChangeKind::Add]);
    }

    #[test]
    fn test_watch_after_stop_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let watcher = ContentWatcher::new().unwrap();
        watcher.stop();
        let err = watcher.watch(&[dir.path()]).unwrap_err();
        assert!(matches!(err, ScribeError::InvalidState(_)));
    }
}
