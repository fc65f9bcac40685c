//! Scan triggers and scan reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    /// The document changed (watched snapshot rewritten or pushed).
    Mutation,
    /// Fixed-interval polling backstop.
    Timer,
    /// Explicit request from the command surface.
    Manual,
}

/// Which locator strategy produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorTier {
    StructuralQuery,
    TextClusterScan,
    DensityScan,
}

/// Per-scan counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub trigger: ScanTrigger,
    /// `None` when every locator strategy came up empty
    pub tier: Option<LocatorTier>,
    pub group: String,
    pub candidates: usize,
    pub already_seen: usize,
    /// Empty text or no keyword match
    pub unmatched: usize,
    pub emitted: usize,
    pub failed: usize,
    /// Store failures and candidate panics, one line each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn new(trigger: ScanTrigger, group: impl Into<String>) -> Self {
        Self {
            trigger,
            tier: None,
            group: group.into(),
            candidates: 0,
            already_seen: 0,
            unmatched: 0,
            emitted: 0,
            failed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}

/// Result of asking the processor to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed { report: ScanReport },
    /// Another scan was running; this trigger was dropped.
    Busy,
    /// Logging is switched off.
    Disabled,
    /// The document source had nothing to scan yet.
    NoDocument,
}

impl ScanOutcome {
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed { report } => Some(report),
            _ => None,
        }
    }
}
