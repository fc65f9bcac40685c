//! Persisted event log and settings on top of a [`KeyValueStore`].
//!
//! Every operation is a plain read-modify-write with no isolation between
//! writers; a concurrent clear and append resolve as last writer wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rollcall_types::{AttendanceEvent, KeywordSet};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{KeyValueStore, Record, Result, RollcallError};

/// Retention cap; the oldest events are evicted beyond it.
pub const DEFAULT_CAPACITY: usize = 1000;

const KEY_EVENTS: &str = "events";
const KEY_KEYWORDS: &str = "keywords";
const KEY_LOGGING: &str = "loggingEnabled";
const KEY_AUTO_DOWNLOAD: &str = "autoDownload";
const KEY_LAST_EVENT_TIME: &str = "lastEventTime";

/// Typed access to the event log, keyword set and flags.
pub struct EventStore {
    kv: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl EventStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(kv, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(kv: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            kv,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write defaults for keys that have never been set. Existing values,
    /// including a deliberately disabled logging flag, are left alone.
    pub fn initialize_defaults(&self) -> Result<()> {
        let existing = self.kv.get(&[KEY_EVENTS, KEY_KEYWORDS, KEY_LOGGING, KEY_AUTO_DOWNLOAD])?;

        let mut defaults = Record::new();
        if !existing.contains_key(KEY_EVENTS) {
            defaults.insert(KEY_EVENTS.into(), Value::Array(Vec::new()));
        }
        if !existing.contains_key(KEY_KEYWORDS) {
            defaults.insert(KEY_KEYWORDS.into(), serde_json::to_value(KeywordSet::default())?);
        }
        if !existing.contains_key(KEY_LOGGING) {
            defaults.insert(KEY_LOGGING.into(), Value::Bool(true));
        }
        if !existing.contains_key(KEY_AUTO_DOWNLOAD) {
            defaults.insert(KEY_AUTO_DOWNLOAD.into(), Value::Bool(false));
        }

        if defaults.is_empty() {
            return Ok(());
        }

        tracing::info!(
            target: "rollcall::store",
            keys = ?defaults.keys().collect::<Vec<_>>(),
            "Writing first-start defaults"
        );
        self.kv.set(defaults)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut record = self.kv.get(&[key])?;
        match record.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                RollcallError::MalformedRecord {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }

    /// All events, oldest first.
    pub fn events(&self) -> Result<Vec<AttendanceEvent>> {
        Ok(self.read(KEY_EVENTS)?.unwrap_or_default())
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AttendanceEvent>> {
        let events = self.events()?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.events()?.len())
    }

    /// Append one event, evicting the oldest beyond the capacity, and stamp
    /// `lastEventTime`. Returns the log length after the append.
    pub fn append(&self, event: &AttendanceEvent) -> Result<usize> {
        let mut events = self.events()?;
        events.push(event.clone());

        if events.len() > self.capacity {
            let excess = events.len() - self.capacity;
            events.drain(..excess);
            tracing::debug!(target: "rollcall::store", evicted = excess, "Trimmed event log");
        }

        let len = events.len();
        let mut record = Record::new();
        record.insert(KEY_EVENTS.into(), serde_json::to_value(&events)?);
        record.insert(KEY_LAST_EVENT_TIME.into(), Value::String(event.iso_string()));
        self.kv.set(record)?;

        Ok(len)
    }

    /// Remove every event. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.count()?;
        let mut record = Record::new();
        record.insert(KEY_EVENTS.into(), Value::Array(Vec::new()));
        self.kv.set(record)?;
        tracing::info!(target: "rollcall::store", removed, "Cleared event log");
        Ok(removed)
    }

    /// Stored keywords, or the defaults when none were ever saved.
    pub fn keywords(&self) -> Result<KeywordSet> {
        Ok(self.read(KEY_KEYWORDS)?.unwrap_or_default())
    }

    /// Validate and persist a keyword set; returns the normalized set.
    pub fn set_keywords(&self, keywords: KeywordSet) -> Result<KeywordSet> {
        let keywords = keywords.validated()?;
        let mut record = Record::new();
        record.insert(KEY_KEYWORDS.into(), serde_json::to_value(&keywords)?);
        self.kv.set(record)?;
        Ok(keywords)
    }

    /// Defaults to enabled when never set.
    pub fn logging_enabled(&self) -> Result<bool> {
        Ok(self.read(KEY_LOGGING)?.unwrap_or(true))
    }

    pub fn set_logging_enabled(&self, enabled: bool) -> Result<()> {
        self.set_flag(KEY_LOGGING, enabled)
    }

    /// Periodic export flag; defaults to disabled.
    pub fn auto_export(&self) -> Result<bool> {
        Ok(self.read(KEY_AUTO_DOWNLOAD)?.unwrap_or(false))
    }

    pub fn set_auto_export(&self, enabled: bool) -> Result<()> {
        self.set_flag(KEY_AUTO_DOWNLOAD, enabled)
    }

    pub fn last_event_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.read(KEY_LAST_EVENT_TIME)
    }

    fn set_flag(&self, key: &str, enabled: bool) -> Result<()> {
        let mut record = Record::new();
        record.insert(key.into(), Value::Bool(enabled));
        self.kv.set(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, SqliteStore};
    use rollcall_types::EventType;
    use serde_json::json;

    fn store() -> EventStore {
        EventStore::new(Arc::new(MemoryStore::new()))
    }

    fn event(n: u32) -> AttendanceEvent {
        AttendanceEvent::new(n, "Crew", "Ana", format!("here #{}", n), EventType::CheckIn)
    }

    #[test]
    fn test_defaults_before_initialization() {
        let store = store();
        assert!(store.events().unwrap().is_empty());
        assert!(store.logging_enabled().unwrap());
        assert!(!store.auto_export().unwrap());
        assert_eq!(store.keywords().unwrap(), KeywordSet::default());
        assert!(store.last_event_time().unwrap().is_none());
    }

    #[test]
    fn test_initialize_defaults_keeps_existing_values() {
        let kv = Arc::new(MemoryStore::new());
        let store = EventStore::new(kv.clone());
        store.set_logging_enabled(false).unwrap();

        store.initialize_defaults().unwrap();

        assert!(!store.logging_enabled().unwrap());
        let raw = kv.get(&["events", "autoDownload", "keywords"]).unwrap();
        assert_eq!(raw["events"], json!([]));
        assert_eq!(raw["autoDownload"], json!(false));
        assert_eq!(raw["keywords"]["checkin"][0], "check-in");
    }

    #[test]
    fn test_append_is_ordered_and_stamps_last_event_time() {
        let store = store();
        let first = event(1);
        let second = event(2);
        assert_eq!(store.append(&first).unwrap(), 1);
        assert_eq!(store.append(&second).unwrap(), 2);

        let events = store.events().unwrap();
        assert_eq!(events, vec![first, second.clone()]);
        assert_eq!(store.last_event_time().unwrap(), Some(second.iso_timestamp));
    }

    #[test]
    fn test_recent_is_newest_first() {
        let store = store();
        for n in 0..5 {
            store.append(&event(n)).unwrap();
        }
        let recent: Vec<_> = store.recent(2).unwrap().into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["here #4", "here #3"]);
    }

    #[test]
    fn test_trim_keeps_newest() {
        let store = EventStore::with_capacity(Arc::new(MemoryStore::new()), 3);
        let mut counts = Vec::new();
        for n in 0..5 {
            counts.push(store.append(&event(n)).unwrap());
        }
        assert_eq!(counts, vec![1, 2, 3, 3, 3]);
        let messages: Vec<_> = store.events().unwrap().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["here #2", "here #3", "here #4"]);
    }

    #[test]
    fn test_default_capacity_is_one_thousand() {
        assert_eq!(store().capacity(), 1000);
    }

    #[test]
    fn test_clear() {
        let store = store();
        store.append(&event(1)).unwrap();
        store.append(&event(2)).unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_keywords_validated_on_save() {
        let store = store();
        let saved = store
            .set_keywords(KeywordSet {
                checkin: vec![" Arrived ".into(), "".into()],
                checkout: vec!["GONE".into()],
            })
            .unwrap();
        assert_eq!(saved.checkin, vec!["arrived"]);
        assert_eq!(store.keywords().unwrap(), saved);

        let err = store
            .set_keywords(KeywordSet {
                checkin: vec![],
                checkout: vec!["out".into()],
            })
            .unwrap_err();
        assert!(matches!(err, RollcallError::InvalidKeywords(_)));
    }

    #[test]
    fn test_malformed_record() {
        let kv = Arc::new(MemoryStore::new());
        let mut record = Record::new();
        record.insert("events".into(), json!("not a list"));
        kv.set(record).unwrap();

        let err = EventStore::new(kv).events().unwrap_err();
        assert!(matches!(err, RollcallError::MalformedRecord { ref key, .. } if key == "events"));
    }

    #[test]
    fn test_flags_on_sqlite() {
        let store = EventStore::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        store.set_auto_export(true).unwrap();
        store.set_logging_enabled(false).unwrap();
        assert!(store.auto_export().unwrap());
        assert!(!store.logging_enabled().unwrap());
    }
}
