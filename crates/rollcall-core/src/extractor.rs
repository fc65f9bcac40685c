//! Message body, sender and group extraction.
//!
//! Every method degrades instead of failing: missing text becomes an empty
//! string, a missing sender becomes [`UNKNOWN_MEMBER`], a missing group
//! becomes [`UNKNOWN_GROUP`].

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rollcall_types::{UNKNOWN_GROUP, UNKNOWN_MEMBER};

use crate::{Document, HostProfile, NodeRef};

/// Longest accepted message body, exclusive.
const MAX_TEXT_LEN: usize = 500;

/// Longest accepted sender name, exclusive.
const MAX_SENDER_LEN: usize = 100;

static PURE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d{1,2}:\d{2}\s*(AM|PM)?$").unwrap());

static PURE_CHECKMARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[✓✔]+$").unwrap());

static ANY_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d{1,2}:\d{2}\s*(AM|PM)?").unwrap());

static READ_RECEIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"✓\s*✓").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn is_noise(text: &str) -> bool {
    PURE_TIMESTAMP.is_match(text) || PURE_CHECKMARK.is_match(text)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Pulls (text, sender, metadata) out of candidate nodes.
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    profile: Arc<HostProfile>,
}

impl MessageExtractor {
    pub fn new(profile: Arc<HostProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    /// Best-effort plain-text message body.
    pub fn extract_text(&self, node: NodeRef<'_>) -> String {
        for selector in &self.profile.text_selectors {
            for element in node.select(selector) {
                let content = element.text_content();
                let text = content.trim();
                if text.is_empty() || is_noise(text) {
                    continue;
                }
                if char_len(text) < MAX_TEXT_LEN {
                    return text.to_string();
                }
            }
        }

        let content = node.text_content();

        let line = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_noise(line))
            .find(|line| (2..MAX_TEXT_LEN).contains(&char_len(line)));
        if let Some(line) = line {
            return line.to_string();
        }

        let stripped = ANY_TIMESTAMP.replace_all(&content, "");
        let stripped = READ_RECEIPT.replace_all(&stripped, "");
        let collapsed = WHITESPACE.replace_all(&stripped, " ");
        let collapsed = collapsed.trim();
        if !collapsed.is_empty() && char_len(collapsed) < MAX_TEXT_LEN {
            return collapsed.to_string();
        }

        String::new()
    }

    /// Sender display name from the node's own subtree or a nearby ancestor.
    pub fn extract_sender(&self, node: NodeRef<'_>) -> String {
        let hops = std::iter::once(node)
            .chain(node.ancestors())
            .take(self.profile.sender_max_hops + 1);

        for current in hops {
            if let Some(name) = self.sender_at(current) {
                return name;
            }
        }

        UNKNOWN_MEMBER.to_string()
    }

    fn sender_at(&self, element: NodeRef<'_>) -> Option<String> {
        let rules = &self.profile.sender_rules;

        let own = rules
            .iter()
            .filter(|rule| element.is_element() && element.matches(&rule.selector))
            .find_map(|rule| sender_value(element, &rule.attribute));
        if own.is_some() {
            return own;
        }

        rules.iter().find_map(|rule| {
            element
                .select(&rule.selector)
                .into_iter()
                .find_map(|found| sender_value(found, &rule.attribute))
        })
    }

    /// Rendered timestamp metadata (e.g. `"[09:12, 3/4/2025] John: "`), or
    /// empty when the node carries none.
    pub fn extract_timestamp_meta(&self, node: NodeRef<'_>) -> String {
        let attribute = self.profile.meta_attribute.as_str();

        if let Some(meta) = node.attr(attribute) {
            return meta.to_string();
        }
        if let Some(meta) = node
            .descendant_elements()
            .find_map(|element| element.attr(attribute))
        {
            return meta.to_string();
        }

        node.select_first(&self.profile.meta_selector)
            .map(|meta| meta.text_content().trim().to_string())
            .unwrap_or_default()
    }

    /// Conversation name from the header, else from the document title.
    pub fn resolve_group(&self, document: &Document) -> String {
        let root = document.root();

        for selector in &self.profile.group_selectors {
            for header in root.select(selector) {
                let title = header.attr("title").map(str::trim).unwrap_or("");
                if !title.is_empty() {
                    return title.to_string();
                }
                let content = header.text_content();
                let text = content.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }

        document
            .title()
            .and_then(|title| {
                self.profile
                    .title_pattern
                    .regex()
                    .captures(&title)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
    }
}

fn sender_value(element: NodeRef<'_>, attribute: &str) -> Option<String> {
    let value = element.attr(attribute)?.trim();
    (!value.is_empty() && char_len(value) < MAX_SENDER_LEN).then(|| value.to_string())
}
