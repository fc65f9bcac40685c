//! Check-in/check-out keyword configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CHECKIN: &[&str] = &[
    "check-in", "checked in", "checkin", "in", "present", "here", "arrived",
];

const DEFAULT_CHECKOUT: &[&str] = &[
    "check out", "checked out", "checkout", "out", "left", "exit", "gone", "departed",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeywordError {
    #[error("At least one check-in keyword is required")]
    EmptyCheckin,

    #[error("At least one check-out keyword is required")]
    EmptyCheckout,
}

/// Ordered keyword lists. Check-in keywords are tried before check-out
/// keywords, and within a list the first hit wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    pub checkin: Vec<String>,
    pub checkout: Vec<String>,
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self {
            checkin: DEFAULT_CHECKIN.iter().map(|k| k.to_string()).collect(),
            checkout: DEFAULT_CHECKOUT.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl KeywordSet {
    /// Build a validated set. Keywords are trimmed and lower-cased; blank
    /// entries are dropped before the non-empty check.
    pub fn new<I, J, S, T>(checkin: I, checkout: J) -> Result<Self, KeywordError>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let checkin = normalize(checkin);
        let checkout = normalize(checkout);

        if checkin.is_empty() {
            return Err(KeywordError::EmptyCheckin);
        }
        if checkout.is_empty() {
            return Err(KeywordError::EmptyCheckout);
        }

        Ok(Self { checkin, checkout })
    }

    /// Parse the comma-separated form used by the keyword editor,
    /// e.g. `"check-in, here, arrived"`.
    pub fn from_comma_lists(checkin: &str, checkout: &str) -> Result<Self, KeywordError> {
        Self::new(checkin.split(','), checkout.split(','))
    }

    /// Re-validate a set that arrived from storage or over the wire.
    pub fn validated(self) -> Result<Self, KeywordError> {
        Self::new(self.checkin, self.checkout)
    }
}

fn normalize<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
