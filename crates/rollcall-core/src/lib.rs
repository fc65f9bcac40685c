//! Message detection and deduplication pipeline for Rollcall.
//!
//! A document snapshot flows through the [`CandidateLocator`], the
//! [`MessageExtractor`] and the keyword matcher; the [`EventProcessor`]
//! deduplicates candidates and appends new attendance events to the
//! [`EventStore`].

mod csv;
mod dom;
mod error;
mod event_store;
mod export;
mod extractor;
mod fingerprint;
mod html;
mod locator;
mod matcher;
mod processor;
mod profile;
mod scheduler;
mod selector;
mod source;
mod store;
mod watcher;

pub use csv::{escape_field, generate_csv, parse_csv, parse_rows, CsvRecord, CSV_HEADER};
pub use dom::{Document, NodeId, NodeRef, SnapshotNode};
pub use error::RollcallError;
pub use event_store::{EventStore, DEFAULT_CAPACITY};
pub use export::{export_file_name, export_to_dir, spawn_periodic_export};
pub use extractor::MessageExtractor;
pub use fingerprint::{fingerprint, random_fingerprint};
pub use html::parse_html;
pub use locator::{CandidateLocator, Located, Strategy};
pub use matcher::{classify, classify_detailed, KeywordMatch};
pub use processor::EventProcessor;
pub use profile::{HostProfile, Pattern, SenderRule};
pub use scheduler::{run_scan, spawn_scan_loop, ScanScheduler};
pub use selector::{Selector, SelectorError};
pub use source::{parse_snapshot, DocumentSource, FileSource, MemorySource};
pub use store::{KeyValueStore, MemoryStore, Record, SqliteStore};
pub use watcher::{SnapshotWatcher, SnapshotWatcherHandle};

/// Result type for Rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;
