//! Key directory watcher
//!
//! Polls the key directory and turns changes into [`KeyEvent`]s. A modified
//! file is reported as `Removed` followed by `Added`, so consumers only ever
//! replace an entry by dropping it and loading it fresh.
//!
//! A new watcher starts with an empty snapshot: its first scan reports every
//! existing file as `Added`, which makes restarting the sync task enough to
//! rebuild the store.

use futures::stream::{self, Stream, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::files::has_key_extension;

/// A change in the key directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

/// What we remember about a file between scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    extension: String,
    interval: Duration,
    snapshot: BTreeMap<PathBuf, FileStamp>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            interval,
            snapshot: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rescan the directory and report what changed since the last scan
    ///
    /// An unreadable directory yields no events and keeps the previous
    /// snapshot, so a transient error never wipes the key store.
    pub async fn scan(&mut self) -> Vec<KeyEvent> {
        let current = match self.read_stamps().await {
            Ok(current) => current,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to scan key directory");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for (path, previous) in &self.snapshot {
            match current.get(path) {
                None => events.push(KeyEvent::Removed(path.clone())),
                Some(stamp) if stamp != previous => {
                    events.push(KeyEvent::Removed(path.clone()));
                    events.push(KeyEvent::Added(path.clone()));
                }
                Some(_) => {}
            }
        }
        for path in current.keys() {
            if !self.snapshot.contains_key(path) {
                events.push(KeyEvent::Added(path.clone()));
            }
        }

        if !events.is_empty() {
            debug!(dir = %self.dir.display(), changes = events.len(), "Key directory changed");
        }
        self.snapshot = current;
        events
    }

    async fn read_stamps(&self) -> std::io::Result<BTreeMap<PathBuf, FileStamp>> {
        let mut stamps = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_key_extension(&path, &self.extension) {
                continue;
            }
            // A file deleted between listing and stat simply drops out of this scan.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            stamps.insert(
                path,
                FileStamp {
                    modified: meta.modified().ok(),
                    len: meta.len(),
                },
            );
        }
        Ok(stamps)
    }

    /// Endless stream of events: scans immediately, then once per interval
    pub fn into_stream(self) -> impl Stream<Item = KeyEvent> + Send {
        stream::unfold((self, true), |(mut watcher, first)| async move {
            if !first {
                tokio::time::sleep(watcher.interval).await;
            }
            let events = watcher.scan().await;
            Some((stream::iter(events), (watcher, false)))
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_scan_reports_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pub"), "x").unwrap();
        std::fs::write(dir.path().join("b.pub"), "y").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "z").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path(), ".pub", Duration::from_secs(1));
        let events = watcher.scan().await;
        assert_eq!(
            events,
            vec![
                KeyEvent::Added(dir.path().join("a.pub")),
                KeyEvent::Added(dir.path().join("b.pub")),
            ]
        );
        assert!(watcher.scan().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_modify() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pub");
        let b = dir.path().join("b.pub");
        std::fs::write(&a, "x").unwrap();
        std::fs::write(&b, "y").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path(), ".pub", Duration::from_secs(1));
        watcher.scan().await;

        std::fs::remove_file(&a).unwrap();
        std::fs::write(&b, "longer contents").unwrap();

        let events = watcher.scan().await;
        assert_eq!(
            events,
            vec![
                KeyEvent::Removed(a.clone()),
                KeyEvent::Removed(b.clone()),
                KeyEvent::Added(b.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_yields_nothing() {
        let mut watcher =
            DirectoryWatcher::new("/nonexistent/taskgate-keys", ".pub", Duration::from_secs(1));
        assert!(watcher.scan().await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pub"), "x").unwrap();

        let watcher = DirectoryWatcher::new(dir.path(), ".pub", Duration::from_millis(10));
        let mut events = Box::pin(watcher.into_stream());
        assert_eq!(
            events.next().await,
            Some(KeyEvent::Added(dir.path().join("a.pub")))
        );
    }
}
