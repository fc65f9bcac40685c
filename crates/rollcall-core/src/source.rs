//! Document sources: where the chat page snapshot comes from.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{parse_html, Document, Result, RollcallError};

/// Supplies the current document tree to scan.
pub trait DocumentSource: Send + Sync {
    /// Latest snapshot, `None` when nothing is available yet.
    fn snapshot(&self) -> Result<Option<Arc<Document>>>;

    /// Replace the snapshot. Sources fed from elsewhere refuse.
    fn push(&self, _document: Document) -> Result<()> {
        Err(RollcallError::ReadOnlySource)
    }

    /// Human-readable origin for logs and status.
    fn describe(&self) -> String;
}

/// Parse a snapshot, sniffing JSON (`{"tag": ...}`) versus HTML.
pub fn parse_snapshot(input: &str) -> Result<Document> {
    if input.trim_start().starts_with('{') {
        Ok(Document::from_json(input)?)
    } else {
        Ok(parse_html(input))
    }
}

/// Reads a snapshot file (saved HTML page or JSON tree) on every request.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn snapshot(&self) -> Result<Option<Arc<Document>>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(target: "rollcall::source", path = %self.path.display(), "Snapshot file not present yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let document = parse_snapshot(&text)?;
        tracing::trace!(target: "rollcall::source", nodes = document.len(), "Parsed snapshot file");
        Ok(Some(Arc::new(document)))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Holds the most recently pushed snapshot.
#[derive(Debug, Default)]
pub struct MemorySource {
    slot: RwLock<Option<Arc<Document>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            slot: RwLock::new(Some(Arc::new(document))),
        }
    }
}

impl DocumentSource for MemorySource {
    fn snapshot(&self) -> Result<Option<Arc<Document>>> {
        Ok(self.slot.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn push(&self, document: Document) -> Result<()> {
        tracing::debug!(target: "rollcall::source", nodes = document.len(), "Snapshot pushed");
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(document));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_snapshot_sniffs_format() {
        let html = parse_snapshot("<div>here</div>").unwrap();
        assert_eq!(html.root().text_content(), "here");

        let json = parse_snapshot(r#" {"tag": "div", "children": ["here"]}"#).unwrap();
        assert_eq!(json.root().text_content(), "here");

        assert!(matches!(parse_snapshot("{ nope"), Err(RollcallError::JsonError(_))));
    }

    #[test]
    fn test_file_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.html");
        let source = FileSource::new(&path);

        assert!(source.snapshot().unwrap().is_none());

        std::fs::write(&path, "<p>present</p>").unwrap();
        let doc = source.snapshot().unwrap().unwrap();
        assert_eq!(doc.root().text_content(), "present");

        std::fs::write(&path, "<p>gone</p>").unwrap();
        let doc = source.snapshot().unwrap().unwrap();
        assert_eq!(doc.root().text_content(), "gone");

        assert!(matches!(
            source.push(Document::new()),
            Err(RollcallError::ReadOnlySource)
        ));
        assert!(source.describe().starts_with("file:"));
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        assert!(source.snapshot().unwrap().is_none());
        source.push(parse_html("<p>in</p>")).unwrap();
        assert_eq!(source.snapshot().unwrap().unwrap().root().text_content(), "in");
    }
}
