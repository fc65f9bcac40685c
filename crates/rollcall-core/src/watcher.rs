//! Snapshot file watcher.
//!
//! Turns writes to the snapshot file into [`ScanTrigger::Mutation`]
//! triggers. The parent directory is watched rather than the file itself so
//! that atomic replace-by-rename saves are still seen.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{
    event::{AccessKind, AccessMode, CreateKind, ModifyKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use rollcall_types::ScanTrigger;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{Result, ScanScheduler};

/// Watches one snapshot file.
pub struct SnapshotWatcher {
    path: PathBuf,
    scheduler: ScanScheduler,
}

/// Keeps the watcher alive; dropping or stopping it ends the watch.
pub struct SnapshotWatcherHandle {
    stop_tx: mpsc::UnboundedSender<()>,
    _file_watcher: RecommendedWatcher,
}

impl SnapshotWatcherHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl SnapshotWatcher {
    pub fn new(path: impl Into<PathBuf>, scheduler: ScanScheduler) -> Self {
        Self {
            path: path.into(),
            scheduler,
        }
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn start(self) -> Result<SnapshotWatcherHandle> {
        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();

        let dir = watch_dir(&self.path);
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut file_watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        let _ = notify_tx.send(event);
                    }
                    Err(e) => warn!(target: "rollcall::watcher", "Watch error: {}", e),
                }
            })?;
        file_watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        debug!(
            target: "rollcall::watcher",
            path = %self.path.display(),
            "Watching snapshot file"
        );

        let scheduler = self.scheduler;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = notify_rx.recv() => {
                        if is_snapshot_write(&event, file_name.as_ref()) {
                            trace!(target: "rollcall::watcher", kind = ?event.kind, "Snapshot changed");
                            scheduler.trigger(ScanTrigger::Mutation);
                        }
                    }
                    Some(()) = stop_rx.recv() => {
                        debug!(target: "rollcall::watcher", "Stopping snapshot watcher");
                        break;
                    }
                    else => break,
                }
            }
        });

        Ok(SnapshotWatcherHandle {
            stop_tx,
            _file_watcher: file_watcher,
        })
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_snapshot_write(event: &Event, file_name: Option<&OsString>) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    );
    if !kind_matches {
        return false;
    }

    let Some(file_name) = file_name else {
        return true;
    };
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
