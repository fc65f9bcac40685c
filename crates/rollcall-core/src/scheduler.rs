//! Scan triggering.
//!
//! Mutation notifications and the polling timer share one trigger channel
//! of depth one. A trigger that finds the channel full is dropped: a scan is
//! already pending and will see the same document.

use std::sync::Arc;
use std::time::Duration;

use rollcall_types::{ScanOutcome, ScanTrigger};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{DocumentSource, EventProcessor, Result};

/// Sending half of the trigger queue.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    tx: mpsc::Sender<ScanTrigger>,
}

impl ScanScheduler {
    /// Create the scheduler and the receiver the scan loop consumes.
    pub fn channel() -> (Self, mpsc::Receiver<ScanTrigger>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Queue a trigger. Returns `false` when one is already pending (or the
    /// loop has stopped) and this one was dropped.
    pub fn trigger(&self, trigger: ScanTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(target: "rollcall::scan", ?trigger, "Trigger coalesced");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(target: "rollcall::scan", ?trigger, "Scan loop stopped, trigger dropped");
                false
            }
        }
    }
}

/// Load a snapshot and scan it on the blocking pool.
pub async fn run_scan(
    processor: Arc<EventProcessor>,
    source: Arc<dyn DocumentSource>,
    trigger: ScanTrigger,
) -> Result<ScanOutcome> {
    tokio::task::spawn_blocking(move || {
        if !processor.logging_enabled() {
            return Ok(ScanOutcome::Disabled);
        }
        if processor.is_scanning() {
            return Ok(ScanOutcome::Busy);
        }
        match source.snapshot()? {
            Some(document) => Ok(processor.scan(&document, trigger)),
            None => Ok(ScanOutcome::NoDocument),
        }
    })
    .await?
}

/// Consume triggers one at a time, with `poll_interval` timer ticks as a
/// backstop for missed notifications. Ends when every scheduler is dropped.
pub fn spawn_scan_loop(
    processor: Arc<EventProcessor>,
    source: Arc<dyn DocumentSource>,
    mut rx: mpsc::Receiver<ScanTrigger>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            target: "rollcall::scan",
            source = %source.describe(),
            poll_secs = poll_interval.as_secs_f64(),
            "Scan loop started"
        );

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => ScanTrigger::Timer,
                received = rx.recv() => match received {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            match run_scan(processor.clone(), source.clone(), trigger).await {
                Ok(ScanOutcome::Completed { report }) if report.emitted > 0 => {
                    tracing::debug!(target: "rollcall::scan", emitted = report.emitted, "Scan stored new events");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "rollcall::scan", ?trigger, "Scan failed: {}", e);
                }
            }
        }

        tracing::info!(target: "rollcall::scan", "Scan loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_html, EventStore, HostProfile, MemorySource, MemoryStore};

    const CHAT: &str = r#"<div id="main">
        <div data-testid="msg-container"><span title="Ana"></span><span dir="ltr">arrived</span></div>
    </div>"#;

    fn processor() -> Arc<EventProcessor> {
        let store = Arc::new(EventStore::new(Arc::new(MemoryStore::new())));
        Arc::new(EventProcessor::new(store, Arc::new(HostProfile::default())))
    }

    #[test]
    fn test_trigger_coalesces_when_full() {
        let (scheduler, mut rx) = ScanScheduler::channel();
        assert!(scheduler.trigger(ScanTrigger::Mutation));
        assert!(!scheduler.trigger(ScanTrigger::Timer));
        assert_eq!(rx.try_recv().unwrap(), ScanTrigger::Mutation);
        assert!(rx.try_recv().is_err());
        assert!(scheduler.trigger(ScanTrigger::Manual));
    }

    #[test]
    fn test_trigger_after_loop_stopped() {
        let (scheduler, rx) = ScanScheduler::channel();
        drop(rx);
        assert!(!scheduler.trigger(ScanTrigger::Manual));
    }

    #[tokio::test]
    async fn test_run_scan_without_document() {
        let source: Arc<dyn DocumentSource> = Arc::new(MemorySource::new());
        let outcome = run_scan(processor(), source, ScanTrigger::Manual).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::NoDocument));
    }

    #[tokio::test]
    async fn test_run_scan_emits() {
        let source: Arc<dyn DocumentSource> = Arc::new(MemorySource::with_document(parse_html(CHAT)));
        let processor = processor();
        let outcome = run_scan(processor.clone(), source, ScanTrigger::Manual).await.unwrap();
        assert_eq!(outcome.report().unwrap().emitted, 1);
        assert_eq!(processor.store().events().unwrap()[0].name, "Ana");
    }

    #[tokio::test]
    async fn test_scan_loop_handles_mutation_trigger() {
        let source = Arc::new(MemorySource::new());
        let processor = processor();
        let mut events = processor.subscribe();
        let (scheduler, rx) = ScanScheduler::channel();
        let handle = spawn_scan_loop(
            processor.clone(),
            source.clone(),
            rx,
            Duration::from_secs(3600),
        );

        source.push(parse_html(CHAT)).unwrap();
        assert!(scheduler.trigger(ScanTrigger::Mutation));

        let message = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(rollcall_types::WsServerMessage::NewEvent { event }) = events.recv().await {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(message.message, "arrived");

        drop(scheduler);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
