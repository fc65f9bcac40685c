//! Host markup profile.
//!
//! Every selector the pipeline knows about the chat page lives here, so a
//! markup change on the host side is a configuration edit rather than a code
//! change. The default profile targets the WhatsApp Web conventions
//! (`data-testid` hooks, `selectable-text` spans, `span[title]` senders).

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Selector;

/// Where to read a sender name from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRule {
    pub selector: Selector,
    pub attribute: String,
}

/// A regex that (de)serializes as its source string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl TryFrom<String> for Pattern {
    type Error = regex::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.0.as_str().to_string()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

/// Selectors and patterns describing the host chat page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Message panel; scanning is scoped to the first match.
    pub panel_selectors: Vec<Selector>,
    /// Structural message-container queries, most specific first.
    pub message_selectors: Vec<Selector>,
    /// Text-bearing spans used by the clustering scan.
    pub span_selector: Selector,
    /// Known message containers a span is attributed to first.
    pub container_selector: Selector,
    /// Element tag enumerated by the density scan.
    pub density_tag: String,
    /// Message body queries, most specific first.
    pub text_selectors: Vec<Selector>,
    pub sender_rules: Vec<SenderRule>,
    /// Ancestor hops searched for a sender.
    pub sender_max_hops: usize,
    /// Attribute on the candidate carrying "[time, date] sender:" metadata.
    pub meta_attribute: String,
    pub meta_selector: Selector,
    /// Conversation header queries for the group name.
    pub group_selectors: Vec<Selector>,
    /// Applied to the document title when no header matches; group 1 is the name.
    pub title_pattern: Pattern,
}

fn sel(source: &str) -> Selector {
    Selector::parse(source).expect("default profile selectors are valid")
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            panel_selectors: vec![
                sel(r#"[data-testid="conversation-panel-messages"]"#),
                sel("#main"),
            ],
            message_selectors: vec![
                sel(r#"[data-testid="msg-container"]"#),
                sel(r#"[data-testid="conversation-panel-messages"] [data-testid="msg-container"]"#),
                sel(r#"div[data-testid="conversation-panel-messages"] > div > div"#),
                sel(r#"div[data-testid="conversation-panel-messages"] div[data-testid="msg-container"]"#),
                sel(r#"div[data-testid="conversation-panel-messages"] > div[role="row"]"#),
                sel(r#"[data-testid="msg-container"] > div"#),
            ],
            span_selector: sel(
                r#"span.selectable-text, span[class*="selectable"], span[dir="ltr"], span[dir="auto"]"#,
            ),
            container_selector: sel(r#"[data-testid="msg-container"], div[role="row"]"#),
            density_tag: "div".to_string(),
            text_selectors: vec![
                sel("span.selectable-text.copyable-text"),
                sel(r#"span[data-testid="selectable-text"]"#),
                sel(".selectable-text"),
                sel(r#"span[dir="ltr"]"#),
                sel(r#"span[dir="auto"]"#),
                sel(r#"div[data-testid="msg-container"] span.selectable-text"#),
                sel(r#"[data-testid="msg-container"] span[class*="selectable"]"#),
                sel(".message-text"),
                sel("span.copyable-text"),
            ],
            sender_rules: vec![
                SenderRule {
                    selector: sel("span[title]"),
                    attribute: "title".to_string(),
                },
                SenderRule {
                    selector: sel("[data-sender]"),
                    attribute: "data-sender".to_string(),
                },
                SenderRule {
                    selector: sel("[title]"),
                    attribute: "title".to_string(),
                },
            ],
            sender_max_hops: 10,
            meta_attribute: "data-pre-plain-text".to_string(),
            meta_selector: sel(r#"[data-testid="msg-meta"]"#),
            group_selectors: vec![
                sel(r#"[data-testid="conversation-info-header"] span[title]"#),
                sel("header span[title]"),
                sel(r#"[data-testid="chatlist"] span[title]"#),
            ],
            title_pattern: Pattern::new(r"(.+?)\s*-\s*WhatsApp").expect("default title pattern is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_builds() {
        let profile = HostProfile::default();
        assert_eq!(profile.message_selectors.len(), 6);
        assert_eq!(profile.sender_max_hops, 10);
    }

    #[test]
    fn test_partial_toml_override_keeps_defaults() {
        let profile: HostProfile = from_json(
            r#"{"panel_selectors": ["main.chat"], "title_pattern": "(.+?) \\| Chat"}"#,
        );
        assert_eq!(profile.panel_selectors[0].as_str(), "main.chat");
        assert_eq!(profile.title_pattern.regex().as_str(), r"(.+?) \| Chat");
        assert_eq!(profile.text_selectors, HostProfile::default().text_selectors);
    }

    #[test]
    fn test_invalid_selector_rejected_on_load() {
        let result = serde_json::from_str::<HostProfile>(r#"{"span_selector": "span:hover"}"#);
        assert!(result.is_err());
    }

    fn from_json(json: &str) -> HostProfile {
        serde_json::from_str(json).unwrap()
    }
}
