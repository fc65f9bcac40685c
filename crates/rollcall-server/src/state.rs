//! Shared application state.

use crate::config::Config;
use rollcall_core::{
    DocumentSource, EventProcessor, EventStore, FileSource, KeyValueStore, MemorySource,
    ScanScheduler, SqliteStore,
};
use rollcall_types::ScanTrigger;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Shared application state.
pub struct AppState {
    pub store: Arc<EventStore>,
    pub processor: Arc<EventProcessor>,
    pub source: Arc<dyn DocumentSource>,
    pub scheduler: ScanScheduler,
    /// Taken once by whoever runs the scan loop.
    trigger_rx: Mutex<Option<mpsc::Receiver<ScanTrigger>>>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> rollcall_core::Result<Self> {
        let kv = Arc::new(SqliteStore::open(&config.db_path)?);
        Self::with_store(config, kv)
    }

    pub fn with_store(config: Config, kv: Arc<dyn KeyValueStore>) -> rollcall_core::Result<Self> {
        let store = Arc::new(EventStore::with_capacity(kv, config.event_capacity));
        store.initialize_defaults()?;

        let processor = Arc::new(EventProcessor::new(store.clone(), Arc::new(config.profile.clone())));

        let source: Arc<dyn DocumentSource> = match &config.snapshot_path {
            Some(path) => Arc::new(FileSource::new(path)),
            None => Arc::new(MemorySource::new()),
        };

        let (scheduler, trigger_rx) = ScanScheduler::channel();

        Ok(Self {
            store,
            processor,
            source,
            scheduler,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            config,
        })
    }

    pub fn take_trigger_receiver(&self) -> Option<mpsc::Receiver<ScanTrigger>> {
        self.trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::MemoryStore;

    #[test]
    fn test_memory_source_without_snapshot_path() {
        let state = AppState::with_store(Config::default(), Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(state.source.describe(), "memory");
        assert!(state.store.logging_enabled().unwrap());
        assert!(state.take_trigger_receiver().is_some());
        assert!(state.take_trigger_receiver().is_none());
    }

    #[test]
    fn test_file_source_and_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("data/rollcall.db"),
            snapshot_path: Some(dir.path().join("chat.html")),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        assert!(state.source.describe().starts_with("file:"));
        assert_eq!(state.store.count().unwrap(), 0);
    }
}
