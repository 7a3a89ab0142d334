//! File-change watching for the specs directory.
//!
//! A `notify` watcher subscribes recursively to the specs root on a
//! dedicated OS thread. Raw notifications are batched through a short
//! debounce window, folded per path, and delivered to the gatherer as
//! [`FileEvent`]s. Watcher errors are logged and never terminate the loop;
//! dropping the [`SpecWatcher`] stops it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Write,
    Remove,
    /// The path stopped existing under this name. The new name arrives as
    /// its own `Create`.
    Rename,
}

/// One debounced change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Handle to the watcher thread. Dropping it stops the thread after the
/// next debounce tick.
pub struct SpecWatcher {
    stop: Arc<AtomicBool>,
}

impl SpecWatcher {
    /// Subscribe to `root` and all of its descendants, then start the
    /// dispatch thread. The subscription is in place when this returns, so
    /// no event between "watcher started" and "initial parse" is lost.
    pub fn start<F>(root: &Path, on_event: F) -> Result<SpecWatcher>
    where
        F: Fn(FileEvent) + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())
            .wrap_err("failed to create file watcher")?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .wrap_err_with(|| format!("failed to watch {}", root.display()))?;
        info!(root = %root.display(), "watching specs directory");

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        std::thread::spawn(move || {
            // The watcher must live on this thread; dropping it unsubscribes.
            let _watcher = watcher;
            let mut pending: HashMap<PathBuf, FileEventKind> = HashMap::new();
            loop {
                if stop_for_thread.load(Ordering::Relaxed) {
                    break;
                }
                match rx.recv_timeout(DEBOUNCE_WINDOW) {
                    Ok(Ok(event)) => collect(&mut pending, event),
                    Ok(Err(error)) => {
                        warn!(%error, "file watcher error");
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                        for (path, kind) in pending.drain() {
                            on_event(FileEvent { path, kind });
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                        debug!("watcher channel closed, stopping");
                        break;
                    }
                }
            }
        });

        Ok(SpecWatcher { stop })
    }
}

impl Drop for SpecWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Fold a raw notification into the pending batch.
fn collect(pending: &mut HashMap<PathBuf, FileEventKind>, event: Event) {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Create,
        EventKind::Remove(_) => FileEventKind::Remove,
        // Renames surface as name-modifications; whether a given path is
        // the old or the new name is resolved at flush time below.
        EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
        EventKind::Modify(_) | EventKind::Any => FileEventKind::Write,
        _ => return,
    };
    for path in event.paths {
        let kind = match kind {
            // A rename notification names both sides; the side that still
            // exists is a creation, the other a removal.
            FileEventKind::Rename if path.exists() => FileEventKind::Create,
            other => other,
        };
        let entry = pending.entry(path).or_insert(kind);
        *entry = merge(*entry, kind);
    }
}

/// Later notifications refine earlier ones within a window: removal wins,
/// creation survives subsequent writes.
fn merge(earlier: FileEventKind, later: FileEventKind) -> FileEventKind {
    use FileEventKind::*;
    match (earlier, later) {
        (_, Remove | Rename) => later,
        (earlier, Write) => earlier,
        (_, Create) => Create,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_removal_and_keeps_creates() {
        use FileEventKind::*;
        assert_eq!(merge(Create, Write), Create);
        assert_eq!(merge(Write, Remove), Remove);
        assert_eq!(merge(Remove, Create), Create);
        assert_eq!(merge(Write, Write), Write);
    }

    #[test]
    fn events_reach_the_handler() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let _watcher = SpecWatcher::start(temp.path(), move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

        std::fs::write(temp.path().join("new.spec"), "# Spec\n## s\n* step\n").unwrap();

        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("no event within 5s");
        assert!(event.path.ends_with("new.spec"));
        assert!(matches!(
            event.kind,
            FileEventKind::Create | FileEventKind::Write
        ));
    }
}
