//! Notifications pushed to WebSocket subscribers.

use serde::{Deserialize, Serialize};

use crate::{AttendanceEvent, ScanReport};

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// A new check-in or check-out was stored.
    NewEvent { event: AttendanceEvent },
    /// A scan finished.
    ScanCompleted { report: ScanReport },
    /// Logging was switched on or off.
    LoggingChanged { enabled: bool },
    /// The event log was cleared.
    EventsCleared,
}
