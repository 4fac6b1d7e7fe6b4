//! Keeps the [`KeyStore`] in step with the key directory
//!
//! The sync task owns the store's mutation path: it consumes watcher events
//! and is the only code that inserts or removes partner keys.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::files::{fingerprint_for, load_public_key};
use super::store::KeyStore;
use super::watcher::{DirectoryWatcher, KeyEvent};

/// Apply one watcher event to the store
///
/// Unparsable files are logged and skipped; they never stop the watcher.
pub async fn apply_event(store: &KeyStore, event: KeyEvent) {
    match event {
        KeyEvent::Added(path) => match load_public_key(&path).await {
            Ok((fingerprint, key)) => {
                store.insert(fingerprint.clone(), key);
                info!(fingerprint = %fingerprint, "Loaded partner key");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading key, skipping");
            }
        },
        KeyEvent::Removed(path) => {
            if let Some(fingerprint) = fingerprint_for(&path) {
                if store.remove(&fingerprint).is_some() {
                    info!(fingerprint = %fingerprint, "Removed partner key");
                }
            }
        }
    }
}

/// Run the first scan synchronously so keys are present before serving
pub async fn load_initial(store: &KeyStore, watcher: &mut DirectoryWatcher) {
    for event in watcher.scan().await {
        apply_event(store, event).await;
    }
    info!(
        dir = %watcher.dir().display(),
        keys = ?store.fingerprints(),
        "Partner keys loaded"
    );
}

/// Consume an event stream until it ends
pub async fn run_key_sync<S>(store: Arc<KeyStore>, events: S)
where
    S: Stream<Item = KeyEvent>,
{
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        apply_event(&store, event).await;
        debug!(keys = ?store.fingerprints(), "Key store updated");
    }
}

/// Spawn the long-lived sync task for the process
pub fn spawn_key_sync(store: Arc<KeyStore>, watcher: DirectoryWatcher) -> JoinHandle<()> {
    info!(dir = %watcher.dir().display(), "Key directory watcher started");
    tokio::spawn(run_key_sync(store, watcher.into_stream()))
}
