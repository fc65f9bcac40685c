//! CSV export to disk, manual and periodic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{generate_csv, EventStore, Result};

/// `checkins-2024-01-31T08-15-00.csv`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("checkins-{}.csv", now.format("%Y-%m-%dT%H-%M-%S"))
}

/// Write the full event log into `dir`, creating it if needed.
pub fn export_to_dir(store: &EventStore, dir: &Path) -> Result<PathBuf> {
    let events = store.events()?;
    std::fs::create_dir_all(dir)?;

    let path = dir.join(export_file_name(Utc::now()));
    std::fs::write(&path, generate_csv(&events))?;

    tracing::info!(
        target: "rollcall::export",
        path = %path.display(),
        events = events.len(),
        "Exported event log"
    );
    Ok(path)
}

/// Export every `period` while the auto-download flag is on. The first
/// export happens one full period after start.
pub fn spawn_periodic_export(store: Arc<EventStore>, dir: PathBuf, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match store.auto_export() {
                Ok(true) => {
                    if let Err(e) = export_to_dir(&store, &dir) {
                        tracing::error!(target: "rollcall::export", "Periodic export failed: {}", e);
                    }
                }
                Ok(false) => {
                    tracing::trace!(target: "rollcall::export", "Auto export disabled, skipping");
                }
                Err(e) => {
                    tracing::warn!(target: "rollcall::export", "Failed to read auto export flag: {}", e);
                }
            }
        }
    })
}
