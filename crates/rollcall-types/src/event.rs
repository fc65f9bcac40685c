//! Attendance event types.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Group name used when the conversation title cannot be resolved.
pub const UNKNOWN_GROUP: &str = "Unknown Group";

/// Member name used when no sender can be found near a message.
pub const UNKNOWN_MEMBER: &str = "Unknown";

/// Kind of attendance event detected in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "checkin")]
    CheckIn,
    #[serde(rename = "checkout")]
    CheckOut,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CheckIn => "checkin",
            EventType::CheckOut => "checkout",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "checkin" => Ok(EventType::CheckIn),
            "checkout" => Ok(EventType::CheckOut),
            other => Err(format!("Unknown event type: '{}'", other)),
        }
    }
}

/// A detected check-in or check-out.
///
/// Serialized with the field names the event log has always used
/// (`name`, `type`, `isoTimestamp`), so stored logs stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    /// `msg_<fingerprint>_<unix millis>`
    pub id: String,
    /// Conversation display name
    pub group: String,
    /// Sender display name
    pub name: String,
    /// Extracted message body
    pub message: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Creation instant, millisecond precision
    pub iso_timestamp: DateTime<Utc>,
}

impl AttendanceEvent {
    /// Create an event stamped with the current instant.
    pub fn new(
        fingerprint: u32,
        group: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: format!("msg_{}_{}", fingerprint, now.timestamp_millis()),
            group: group.into(),
            name: name.into(),
            message: message.into(),
            event_type,
            iso_timestamp: now,
        }
    }

    /// Timestamp in the `2024-01-31T08:15:00.000Z` form.
    pub fn iso_string(&self) -> String {
        self.iso_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
