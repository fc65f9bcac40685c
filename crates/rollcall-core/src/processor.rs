//! Deduplicating event processor.
//!
//! Owns the per-process scanning state: the seen-fingerprint set, the
//! logging flag and the single-scan guard. One scan walks every candidate
//! the locator finds, classifies it, and appends new events to the store.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rollcall_types::{
    AttendanceEvent, KeywordSet, ScanOutcome, ScanReport, ScanTrigger, WsServerMessage,
};
use tokio::sync::broadcast;

use crate::{
    classify_detailed, fingerprint, random_fingerprint, CandidateLocator, Document, EventStore,
    HostProfile, MessageExtractor, NodeRef, Result,
};

/// Marks the processor as scanning for as long as it lives.
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ScanGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What one candidate turned out to be.
enum Evaluation {
    /// Empty text or no keyword hit.
    Unmatched,
    Matched(AttendanceEvent, String),
}

/// Locate, extract, classify, deduplicate, persist.
pub struct EventProcessor {
    store: Arc<EventStore>,
    locator: CandidateLocator,
    extractor: MessageExtractor,
    seen: Mutex<HashSet<u32>>,
    /// Size of `seen`, readable while a scan holds the lock.
    seen_len: AtomicUsize,
    scanning: AtomicBool,
    logging_enabled: AtomicBool,
    event_tx: broadcast::Sender<WsServerMessage>,
}

impl EventProcessor {
    /// Create a processor. The logging flag starts from the stored value.
    pub fn new(store: Arc<EventStore>, profile: Arc<HostProfile>) -> Self {
        let logging_enabled = store.logging_enabled().unwrap_or_else(|e| {
            tracing::warn!(target: "rollcall::scan", "Failed to read logging flag, assuming enabled: {}", e);
            true
        });
        let (event_tx, _) = broadcast::channel(256);

        Self {
            store,
            locator: CandidateLocator::from_profile(&profile),
            extractor: MessageExtractor::new(profile),
            seen: Mutex::new(HashSet::new()),
            seen_len: AtomicUsize::new(0),
            scanning: AtomicBool::new(false),
            logging_enabled: AtomicBool::new(logging_enabled),
            event_tx,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Subscribe to new events and state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<WsServerMessage> {
        self.event_tx.subscribe()
    }

    /// Best-effort broadcast; nobody listening is not an error.
    pub fn notify(&self, message: WsServerMessage) {
        let _ = self.event_tx.send(message);
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::Acquire)
    }

    /// Persist the flag first; the in-memory flag only flips once it is stored.
    pub fn set_logging_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set_logging_enabled(enabled)?;
        self.logging_enabled.store(enabled, Ordering::Release);
        tracing::info!(target: "rollcall::scan", enabled, "Logging toggled");
        self.notify(WsServerMessage::LoggingChanged { enabled });
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_len.load(Ordering::Acquire)
    }

    /// Clear the stored log. The seen set is kept, so messages still on
    /// screen are not logged again.
    pub fn clear_events(&self) -> Result<usize> {
        let removed = self.store.clear()?;
        self.notify(WsServerMessage::EventsCleared);
        Ok(removed)
    }

    /// Run one scan over `document`.
    ///
    /// Returns [`ScanOutcome::Busy`] without doing anything when another scan
    /// holds the guard, and [`ScanOutcome::Disabled`] while logging is off.
    pub fn scan(&self, document: &Document, trigger: ScanTrigger) -> ScanOutcome {
        if !self.logging_enabled() {
            tracing::debug!(target: "rollcall::scan", ?trigger, "Logging disabled, skipping scan");
            return ScanOutcome::Disabled;
        }

        let Some(_guard) = ScanGuard::try_acquire(&self.scanning) else {
            tracing::debug!(target: "rollcall::scan", ?trigger, "Scan already running, trigger dropped");
            return ScanOutcome::Busy;
        };

        let started = Instant::now();
        let group = self.extractor.resolve_group(document);
        let mut report = ScanReport::new(trigger, group);

        let keywords = self.store.keywords().unwrap_or_else(|e| {
            tracing::warn!(target: "rollcall::scan", "Failed to read keywords, using defaults: {}", e);
            report.errors.push(format!("keywords: {}", e));
            KeywordSet::default()
        });

        if let Some(located) = self.locator.locate(document) {
            report.tier = Some(located.tier);
            report.candidates = located.nodes.len();

            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            for node in located.nodes {
                self.process_candidate(node, &keywords, &mut seen, &mut report);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            target: "rollcall::scan",
            ?trigger,
            tier = ?report.tier,
            candidates = report.candidates,
            emitted = report.emitted,
            already_seen = report.already_seen,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Scan completed"
        );

        self.notify(WsServerMessage::ScanCompleted {
            report: report.clone(),
        });
        ScanOutcome::Completed { report }
    }

    fn mark_seen(&self, seen: &mut HashSet<u32>, id: u32) {
        seen.insert(id);
        self.seen_len.store(seen.len(), Ordering::Release);
    }

    fn process_candidate(
        &self,
        node: NodeRef<'_>,
        keywords: &KeywordSet,
        seen: &mut HashSet<u32>,
        report: &mut ScanReport,
    ) {
        let identity = catch_unwind(AssertUnwindSafe(|| {
            let text = self.extractor.extract_text(node);
            let meta = self.extractor.extract_timestamp_meta(node);
            fail_point(Stage::Identity, &text);
            (fingerprint(&text, &meta), text)
        }));

        let (id, text) = match identity {
            Ok((id, text)) => (id, Some(text)),
            Err(payload) => {
                let id = random_fingerprint();
                tracing::warn!(
                    target: "rollcall::scan",
                    candidate = ?node,
                    fallback = id,
                    "Fingerprinting panicked: {}",
                    panic_message(payload.as_ref())
                );
                (id, None)
            }
        };

        if seen.contains(&id) {
            report.already_seen += 1;
            return;
        }

        let evaluation = catch_unwind(AssertUnwindSafe(|| {
            let text = text.unwrap_or_else(|| self.extractor.extract_text(node));
            fail_point(Stage::Evaluation, &text);
            if text.trim().is_empty() {
                return Evaluation::Unmatched;
            }
            match classify_detailed(&text, keywords) {
                None => Evaluation::Unmatched,
                Some(hit) => {
                    let sender = self.extractor.extract_sender(node);
                    let event =
                        AttendanceEvent::new(id, report.group.as_str(), sender, text, hit.event_type);
                    Evaluation::Matched(event, hit.keyword)
                }
            }
        }));

        match evaluation {
            Ok(Evaluation::Unmatched) => {
                self.mark_seen(seen, id);
                report.unmatched += 1;
            }
            Ok(Evaluation::Matched(event, keyword)) => match self.store.append(&event) {
                Ok(_) => {
                    self.mark_seen(seen, id);
                    report.emitted += 1;
                    tracing::info!(
                        target: "rollcall::scan",
                        event_type = %event.event_type,
                        member = %event.name,
                        keyword = %keyword,
                        "Detected attendance event"
                    );
                    self.notify(WsServerMessage::NewEvent { event });
                }
                Err(e) => {
                    // Left unseen so the next scan retries it.
                    tracing::error!(target: "rollcall::store", "Failed to store event {}: {}", event.id, e);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", event.id, e));
                }
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(target: "rollcall::scan", candidate = ?node, "Candidate panicked: {}", message);
                report.failed += 1;
                report.errors.push(format!("candidate panicked: {}", message));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Identity,
    Evaluation,
}

#[cfg(test)]
thread_local! {
    /// Panic at `Stage` for candidates whose text contains the needle.
    static FAIL_POINT: std::cell::Cell<Option<(Stage, &'static str)>> = const { std::cell::Cell::new(None) };
}

#[cfg(test)]
fn fail_point(stage: Stage, text: &str) {
    if let Some((at, needle)) = FAIL_POINT.with(|f| f.get()) {
        if at == stage && text.contains(needle) {
            panic!("{:?} failed for {:?}", stage, text);
        }
    }
}

#[cfg(not(test))]
#[inline(always)]
fn fail_point(_stage: Stage, _text: &str) {}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_html, KeyValueStore, MemoryStore, Record};
    use rollcall_types::EventType;

    const CHAT: &str = r#"
        <html><head><title>Gate Crew - WhatsApp</title></head><body>
        <div data-testid="conversation-panel-messages">
          <div title="John">
            <div data-testid="msg-container"><span dir="ltr">John: check-in at gate 2</span></div>
          </div>
          <div data-testid="msg-container"><span title="Mia"></span><span dir="ltr">Lunch at noon?</span></div>
          <div data-testid="msg-container"><span title="Mia"></span><span dir="ltr">Checked out, bye</span></div>
        </div></body></html>"#;

    fn processor_with(kv: Arc<dyn KeyValueStore>) -> EventProcessor {
        EventProcessor::new(Arc::new(EventStore::new(kv)), Arc::new(HostProfile::default()))
    }

    fn processor() -> EventProcessor {
        processor_with(Arc::new(MemoryStore::new()))
    }

    fn report(outcome: ScanOutcome) -> ScanReport {
        match outcome {
            ScanOutcome::Completed { report } => report,
            other => panic!("expected a completed scan, got {:?}", other),
        }
    }

    #[test]
    fn test_end_to_end_scan_is_idempotent() {
        let processor = processor();
        let doc = parse_html(CHAT);

        let first = report(processor.scan(&doc, ScanTrigger::Manual));
        assert_eq!(first.group, "Gate Crew");
        assert_eq!(first.candidates, 3);
        assert_eq!(first.emitted, 2);
        assert_eq!(first.unmatched, 1);

        let events = processor.store().events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "John");
        assert_eq!(events[0].message, "John: check-in at gate 2");
        assert_eq!(events[0].event_type, EventType::CheckIn);
        assert_eq!(events[0].group, "Gate Crew");
        assert_eq!(events[1].name, "Mia");
        assert_eq!(events[1].event_type, EventType::CheckOut);

        let second = report(processor.scan(&doc, ScanTrigger::Timer));
        assert_eq!(second.emitted, 0);
        assert_eq!(second.already_seen, 3);
        assert_eq!(processor.store().count().unwrap(), 2);
    }

    #[test]
    fn test_event_id_carries_fingerprint() {
        let processor = processor();
        let doc = parse_html(CHAT);
        processor.scan(&doc, ScanTrigger::Manual);

        let event = &processor.store().events().unwrap()[0];
        let expected = fingerprint("John: check-in at gate 2", "");
        assert!(event.id.starts_with(&format!("msg_{}_", expected)));
    }

    #[test]
    fn test_new_message_after_rescan() {
        let processor = processor();
        processor.scan(&parse_html(CHAT), ScanTrigger::Manual);

        let updated = CHAT.replace(
            "</div></body>",
            r#"<div data-testid="msg-container"><span title="Raj"></span><span dir="ltr">present</span></div></div></body>"#,
        );
        let report = report(processor.scan(&parse_html(&updated), ScanTrigger::Mutation));
        assert_eq!(report.emitted, 1);
        assert_eq!(processor.store().events().unwrap()[2].name, "Raj");
    }

    #[test]
    fn test_identical_text_from_two_senders_counts_once() {
        let processor = processor();
        let doc = parse_html(
            r#"<div id="main">
                <div data-testid="msg-container"><span title="A"></span><span dir="ltr">here</span></div>
                <div data-testid="msg-container"><span title="B"></span><span dir="ltr">here</span></div>
            </div>"#,
        );
        let report = report(processor.scan(&doc, ScanTrigger::Manual));
        assert_eq!(report.emitted, 1);
        assert_eq!(report.already_seen, 1);
    }

    #[test]
    fn test_disabled_logging_skips_scans() {
        let processor = processor();
        processor.set_logging_enabled(false).unwrap();
        assert!(matches!(
            processor.scan(&parse_html(CHAT), ScanTrigger::Timer),
            ScanOutcome::Disabled
        ));
        assert_eq!(processor.store().count().unwrap(), 0);
        assert!(!processor.store().logging_enabled().unwrap());
    }

    #[test]
    fn test_logging_flag_loaded_from_store() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        EventStore::new(kv.clone()).set_logging_enabled(false).unwrap();
        assert!(!processor_with(kv).logging_enabled());
    }

    #[test]
    fn test_busy_while_guard_held() {
        let processor = processor();
        let guard = ScanGuard::try_acquire(&processor.scanning).unwrap();
        assert!(processor.is_scanning());
        assert!(matches!(
            processor.scan(&parse_html(CHAT), ScanTrigger::Manual),
            ScanOutcome::Busy
        ));
        drop(guard);
        assert!(!processor.is_scanning());
        assert!(processor.scan(&parse_html(CHAT), ScanTrigger::Manual).report().is_some());
    }

    #[test]
    fn test_exhausted_locator_is_an_empty_scan() {
        let processor = processor();
        let report = report(processor.scan(&parse_html("<p>hi</p>"), ScanTrigger::Timer));
        assert_eq!(report.tier, None);
        assert_eq!(report.candidates, 0);
    }

    /// Accepts reads but refuses to store events.
    struct FailingEvents {
        inner: MemoryStore,
    }

    impl KeyValueStore for FailingEvents {
        fn get(&self, keys: &[&str]) -> Result<Record> {
            self.inner.get(keys)
        }

        fn set(&self, record: Record) -> Result<()> {
            if record.contains_key("events") {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.set(record)
        }
    }

    #[test]
    fn test_failed_append_is_retried_next_scan() {
        let processor = processor_with(Arc::new(FailingEvents {
            inner: MemoryStore::new(),
        }));
        let doc = parse_html(CHAT);

        let first = report(processor.scan(&doc, ScanTrigger::Manual));
        assert_eq!(first.emitted, 0);
        assert_eq!(first.failed, 2);
        assert_eq!(first.errors.len(), 2);
        assert!(first.errors[0].contains("disk full"));

        // The unmatched message is seen; the two failed ones are not.
        assert_eq!(processor.seen_count(), 1);
        let second = report(processor.scan(&doc, ScanTrigger::Manual));
        assert_eq!(second.failed, 2);
    }

    #[tokio::test]
    async fn test_notifications() {
        let processor = processor();
        let mut rx = processor.subscribe();
        processor.scan(&parse_html(CHAT), ScanTrigger::Manual);

        let mut new_events = 0;
        let mut completed = false;
        while let Ok(message) = rx.try_recv() {
            match message {
                WsServerMessage::NewEvent { .. } => new_events += 1,
                WsServerMessage::ScanCompleted { report } => {
                    completed = true;
                    assert_eq!(report.emitted, 2);
                }
                _ => {}
            }
        }
        assert_eq!(new_events, 2);
        assert!(completed);

        processor.clear_events().unwrap();
        assert!(matches!(rx.try_recv(), Ok(WsServerMessage::EventsCleared)));
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        processor().notify(WsServerMessage::EventsCleared);
    }

    fn fail_at(point: Option<(Stage, &'static str)>) {
        FAIL_POINT.with(|f| f.set(point));
    }

    #[test]
    fn test_identity_panic_falls_back_to_random_fingerprint() {
        let processor = processor();
        let doc = parse_html(CHAT);

        fail_at(Some((Stage::Identity, "check-in")));
        let first = report(processor.scan(&doc, ScanTrigger::Manual));
        fail_at(None);

        assert_eq!(first.emitted, 2);
        assert_eq!(first.failed, 0);
        let john = &processor.store().events().unwrap()[0];
        assert_eq!(john.name, "John");
        let content_id = fingerprint("John: check-in at gate 2", "");
        assert!(!john.id.starts_with(&format!("msg_{}_", content_id)));

        // The content fingerprint was never recorded, so the message is new again.
        let second = report(processor.scan(&doc, ScanTrigger::Timer));
        assert_eq!(second.emitted, 1);
        assert_eq!(second.already_seen, 2);
    }

    #[test]
    fn test_evaluation_panic_is_isolated_and_retried() {
        let processor = processor();
        let doc = parse_html(CHAT);

        fail_at(Some((Stage::Evaluation, "Checked out")));
        let first = report(processor.scan(&doc, ScanTrigger::Manual));
        fail_at(None);

        assert_eq!(first.candidates, 3);
        assert_eq!(first.emitted, 1);
        assert_eq!(first.unmatched, 1);
        assert_eq!(first.failed, 1);
        assert!(first.errors[0].starts_with("candidate panicked"));
        assert_eq!(processor.seen_count(), 2);

        let second = report(processor.scan(&doc, ScanTrigger::Timer));
        assert_eq!(second.emitted, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(processor.store().events().unwrap()[1].name, "Mia");
    }

    #[test]
    fn test_seen_count_readable_while_set_locked() {
        let processor = processor();
        processor.scan(&parse_html(CHAT), ScanTrigger::Manual);

        let _held = processor.seen.lock().unwrap();
        assert_eq!(processor.seen_count(), 3);
    }
}
