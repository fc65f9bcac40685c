//! Candidate message location.
//!
//! A cascade of strategies, each strictly more permissive than the one
//! before. The first strategy that yields any candidate wins; noise that the
//! looser strategies let through is filtered later by keyword matching.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rollcall_types::LocatorTier;

use crate::{Document, HostProfile, NodeId, NodeRef, Selector};

/// Span text length bounds for clustering, `[1, 500)`.
const SPAN_TEXT_MIN: usize = 1;
const SPAN_TEXT_MAX: usize = 500;

/// Containers above this length are whole conversations, not messages.
const CONTAINER_TEXT_MAX: usize = 1000;

/// Density scan keeps text lengths in `(2, 500)`.
const DENSITY_TEXT_MIN: usize = 2;
const DENSITY_TEXT_MAX: usize = 500;

/// Content prefix used as a cluster key when no attribute identifies a container.
const KEY_PREFIX_LEN: usize = 100;

static DENSITY_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(✓|✓✓|\d{1,2}:\d{2}|AM|PM)$").unwrap());

/// One way of finding message-like nodes.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Host-specific selectors; the first selector with any match wins.
    StructuralQuery { selectors: Vec<Selector> },
    /// Text-bearing spans clustered into their enclosing containers.
    TextClusterScan { spans: Selector, containers: Selector },
    /// Every container of `tag` with a plausible amount of text, innermost only.
    DensityScan { tag: String },
}

/// Candidates produced by one strategy.
#[derive(Debug)]
pub struct Located<'a> {
    pub tier: LocatorTier,
    /// Structural selector that matched, for tier one.
    pub selector: Option<String>,
    pub nodes: Vec<NodeRef<'a>>,
}

impl Strategy {
    pub fn tier(&self) -> LocatorTier {
        match self {
            Strategy::StructuralQuery { .. } => LocatorTier::StructuralQuery,
            Strategy::TextClusterScan { .. } => LocatorTier::TextClusterScan,
            Strategy::DensityScan { .. } => LocatorTier::DensityScan,
        }
    }

    /// Run against `scope`; `None` when nothing qualifies.
    pub fn run<'a>(&self, scope: NodeRef<'a>) -> Option<Located<'a>> {
        let (selector, nodes) = match self {
            Strategy::StructuralQuery { selectors } => {
                let (selector, nodes) = selectors.iter().find_map(|selector| {
                    let found = scope.select(selector);
                    (!found.is_empty()).then_some((selector, found))
                })?;
                (Some(selector.as_str().to_string()), nodes)
            }
            Strategy::TextClusterScan { spans, containers } => {
                (None, cluster_spans(scope, spans, containers))
            }
            Strategy::DensityScan { tag } => (None, density_scan(scope, tag)),
        };

        if nodes.is_empty() {
            return None;
        }

        Some(Located {
            tier: self.tier(),
            selector,
            nodes,
        })
    }
}

fn cluster_spans<'a>(scope: NodeRef<'a>, spans: &Selector, containers: &Selector) -> Vec<NodeRef<'a>> {
    let mut keys = HashSet::new();
    let mut found = Vec::new();

    for span in scope.select(spans) {
        let len = span.text_len();
        if !(SPAN_TEXT_MIN..SPAN_TEXT_MAX).contains(&len) {
            continue;
        }

        let start = span
            .closest(containers)
            .filter(|c| *c != scope && scope.contains(c))
            .or_else(|| span.parent());

        let Some(container) = start.and_then(|start| enclosing_message(scope, start)) else {
            continue;
        };

        if keys.insert(cluster_key(container)) {
            found.push(container);
        }
    }

    found
}

/// Walk up from `start` to the first node whose text could be one message.
fn enclosing_message<'a>(scope: NodeRef<'a>, start: NodeRef<'a>) -> Option<NodeRef<'a>> {
    let mut current = Some(start);
    while let Some(node) = current {
        if node == scope || !scope.contains(&node) {
            return None;
        }
        let len = node.text_len();
        if len > 0 && len < CONTAINER_TEXT_MAX {
            return Some(node);
        }
        current = node.parent();
    }
    None
}

fn cluster_key(container: NodeRef<'_>) -> String {
    for attribute in ["data-id", "data-testid", "class"] {
        if let Some(value) = container.attr(attribute).filter(|v| !v.is_empty()) {
            return format!("{}:{}", attribute, value);
        }
    }
    let prefix: String = container.text_content().chars().take(KEY_PREFIX_LEN).collect();
    format!("text:{}", prefix)
}

fn density_scan<'a>(scope: NodeRef<'a>, tag: &str) -> Vec<NodeRef<'a>> {
    let kept: Vec<NodeRef<'a>> = scope
        .descendant_elements()
        .filter(|node| node.tag_name() == Some(tag))
        .filter(|node| {
            let content = node.text_content();
            let text = content.trim();
            let len = text.chars().count();
            len > DENSITY_TEXT_MIN && len < DENSITY_TEXT_MAX && !DENSITY_NOISE.is_match(text)
        })
        .collect();

    let kept_ids: HashSet<NodeId> = kept.iter().map(|n| n.id()).collect();
    let mut outer: HashSet<NodeId> = HashSet::new();
    for node in &kept {
        for ancestor in node.ancestors() {
            if kept_ids.contains(&ancestor.id()) && !outer.insert(ancestor.id()) {
                // Everything above was already marked by a sibling.
                break;
            }
        }
    }

    kept.into_iter().filter(|n| !outer.contains(&n.id())).collect()
}

/// Runs the strategy cascade over a document.
#[derive(Debug, Clone)]
pub struct CandidateLocator {
    panel_selectors: Vec<Selector>,
    strategies: Vec<Strategy>,
}

impl CandidateLocator {
    pub fn new(panel_selectors: Vec<Selector>, strategies: Vec<Strategy>) -> Self {
        Self {
            panel_selectors,
            strategies,
        }
    }

    /// Standard three-tier cascade for a host profile.
    pub fn from_profile(profile: &HostProfile) -> Self {
        Self::new(
            profile.panel_selectors.clone(),
            vec![
                Strategy::StructuralQuery {
                    selectors: profile.message_selectors.clone(),
                },
                Strategy::TextClusterScan {
                    spans: profile.span_selector.clone(),
                    containers: profile.container_selector.clone(),
                },
                Strategy::DensityScan {
                    tag: profile.density_tag.to_ascii_lowercase(),
                },
            ],
        )
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// The message panel, or the whole document when none is recognised.
    pub fn scope<'a>(&self, document: &'a Document) -> NodeRef<'a> {
        let root = document.root();
        self.panel_selectors
            .iter()
            .find_map(|selector| root.select_first(selector))
            .unwrap_or(root)
    }

    /// First non-empty strategy result, or `None` when every tier is exhausted.
    pub fn locate<'a>(&self, document: &'a Document) -> Option<Located<'a>> {
        let scope = self.scope(document);

        for strategy in &self.strategies {
            if let Some(located) = strategy.run(scope) {
                tracing::debug!(
                    target: "rollcall::locator",
                    tier = ?located.tier,
                    selector = located.selector.as_deref().unwrap_or("-"),
                    candidates = located.nodes.len(),
                    "Located candidates"
                );
                return Some(located);
            }
            tracing::trace!(target: "rollcall::locator", tier = ?strategy.tier(), "Strategy found nothing");
        }

        tracing::debug!(target: "rollcall::locator", "No candidates in any tier");
        None
    }
}
