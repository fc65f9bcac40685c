//! Keyword classification of message text.

use rollcall_types::{EventType, KeywordSet};

/// A classification together with the keyword that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub event_type: EventType,
    pub keyword: String,
}

/// Classify text as a check-in, a check-out, or neither.
///
/// Matching is case-insensitive substring containment: every check-in keyword
/// is tried in order before any check-out keyword, and the first hit wins.
/// There are no word boundaries, so `"in"` also matches inside `"testing"`.
pub fn classify(text: &str, keywords: &KeywordSet) -> Option<EventType> {
    classify_detailed(text, keywords).map(|m| m.event_type)
}

/// Like [`classify`], also reporting the matched keyword.
pub fn classify_detailed(text: &str, keywords: &KeywordSet) -> Option<KeywordMatch> {
    let lower = text.to_lowercase();

    let lists = [
        (EventType::CheckIn, &keywords.checkin),
        (EventType::CheckOut, &keywords.checkout),
    ];

    for (event_type, list) in lists {
        if let Some(keyword) = list
            .iter()
            .find(|k| !k.is_empty() && lower.contains(k.to_lowercase().as_str()))
        {
            return Some(KeywordMatch {
                event_type,
                keyword: keyword.clone(),
            });
        }
    }

    None
}
