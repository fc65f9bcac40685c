//! Owned document tree.
//!
//! Nodes live in an arena indexed by [`NodeId`]; [`NodeRef`] is a cheap,
//! copyable handle that borrows the [`Document`] and exposes the read-only
//! DOM-like operations the pipeline needs (attributes, text content,
//! ancestor walks, selector queries).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Selector;

/// Tag of the synthetic root node. It is not an element: it never matches a
/// selector and never appears as a parent.
const ROOT_TAG: &str = "#document";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed document snapshot.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Element {
                    tag: ROOT_TAG.to_string(),
                    attrs: Vec::new(),
                },
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// The synthetic root. Query it to search the whole document.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef { doc: self, id: NodeId(0) }
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { doc: self, id })
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Append an element under `parent`. Tag and attribute names are
    /// lower-cased.
    pub fn append_element<I, K, V>(&mut self, parent: NodeId, tag: &str, attrs: I) -> NodeId
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        self.push(
            parent,
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs,
            },
        )
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.push(parent, NodeKind::Text(text.into()))
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Trimmed text of the first `<title>` element.
    pub fn title(&self) -> Option<String> {
        self.root()
            .descendant_elements()
            .find(|n| n.tag_name() == Some("title"))
            .map(|n| n.text_content().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Build a document from a JSON snapshot node (see [`SnapshotNode`]).
    pub fn from_snapshot(snapshot: &SnapshotNode) -> Self {
        let mut doc = Self::new();
        let root = doc.root_id();
        doc.append_snapshot(root, snapshot);
        doc
    }

    /// Parse a JSON snapshot.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let snapshot: SnapshotNode = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(&snapshot))
    }

    fn append_snapshot(&mut self, parent: NodeId, snapshot: &SnapshotNode) {
        match snapshot {
            SnapshotNode::Text(text) => {
                self.append_text(parent, text.clone());
            }
            SnapshotNode::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.append_element(
                    parent,
                    tag,
                    attrs.iter().map(|(k, v)| (k.as_str(), v.clone())),
                );
                for child in children {
                    self.append_snapshot(id, child);
                }
            }
        }
    }
}

/// Serialized form of a document subtree, as produced by a page-side
/// serializer: text nodes are bare strings, elements are objects.
///
/// ```json
/// {"tag": "div", "attrs": {"data-id": "m1"}, "children": ["check-in"]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotNode {
    Text(String),
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<SnapshotNode>,
    },
}

/// Borrowed handle to a node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data().kind {
            NodeKind::Element { tag, .. } => write!(f, "<{}>#{}", tag, self.id.0),
            NodeKind::Text(text) => write!(f, "{:?}#{}", text, self.id.0),
        }
    }
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id.0]
    }

    fn wrap(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef { doc: self.doc, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn is_root(&self) -> bool {
        self.id.0 == 0
    }

    /// True for real elements (not text, not the root).
    pub fn is_element(&self) -> bool {
        !self.is_root() && matches!(self.data().kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data().kind, NodeKind::Text(_))
    }

    /// Lower-cased tag name; `None` for text nodes and the root.
    pub fn tag_name(&self) -> Option<&'a str> {
        match &self.data().kind {
            NodeKind::Element { tag, .. } if !self.is_root() => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        match &self.data().kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn classes(self) -> impl Iterator<Item = &'a str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Parent element, `None` at the top of the tree.
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data()
            .parent
            .map(|id| self.wrap(id))
            .filter(|p| !p.is_root())
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        self.data()
            .children
            .iter()
            .map(move |&id| NodeRef { doc, id })
    }

    /// Element ancestors, nearest first, excluding `self`.
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors { next: self.parent() }
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let mut stack: Vec<NodeId> = self.data().children.iter().rev().copied().collect();
        let doc = self.doc;
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(doc.nodes[id.0].children.iter().rev().copied());
            Some(NodeRef { doc, id })
        })
    }

    pub fn descendant_elements(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.descendants().filter(|n| n.is_element())
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self) -> String {
        if let NodeKind::Text(text) = &self.data().kind {
            return text.clone();
        }
        let mut out = String::new();
        for node in self.descendants() {
            if let NodeKind::Text(text) = &node.data().kind {
                out.push_str(text);
            }
        }
        out
    }

    /// Character count of the trimmed text content.
    pub fn text_len(&self) -> usize {
        self.text_content().trim().chars().count()
    }

    /// True when `other` is `self` or one of its descendants.
    pub fn contains(&self, other: &NodeRef<'_>) -> bool {
        if !std::ptr::eq(self.doc, other.doc) {
            return false;
        }
        let mut current = Some(other.id);
        while let Some(id) = current {
            if id == self.id {
                return true;
            }
            current = self.doc.nodes[id.0].parent;
        }
        false
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(*self)
    }

    /// Descendant elements matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<NodeRef<'a>> {
        self.descendant_elements()
            .filter(|n| selector.matches(*n))
            .collect()
    }

    pub fn select_first(&self, selector: &Selector) -> Option<NodeRef<'a>> {
        self.descendant_elements().find(|n| selector.matches(*n))
    }

    /// `self` or the nearest ancestor matching `selector`.
    pub fn closest(&self, selector: &Selector) -> Option<NodeRef<'a>> {
        if self.is_element() && selector.matches(*self) {
            return Some(*self);
        }
        self.ancestors().find(|n| selector.matches(*n))
    }
}

/// Iterator over element ancestors.
pub struct Ancestors<'a> {
    next: Option<NodeRef<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root_id();
        let html = doc.append_element(root, "HTML", Vec::<(&str, String)>::new());
        let div = doc.append_element(html, "div", [("Class", "row msg"), ("data-id", "m1")]);
        let span = doc.append_element(div, "span", [("title", "Ana")]);
        doc.append_text(span, "  checked in ");
        doc.append_text(div, "08:15");
        (doc, html, div, span)
    }

    #[test]
    fn test_names_are_lowercased() {
        let (doc, html, div, _) = sample();
        assert_eq!(doc.get(html).unwrap().tag_name(), Some("html"));
        let div = doc.get(div).unwrap();
        assert!(div.has_class("msg"));
        assert_eq!(div.attr("CLASS"), Some("row msg"));
    }

    #[test]
    fn test_text_content_concatenates_in_order() {
        let (doc, _, div, _) = sample();
        let div = doc.get(div).unwrap();
        assert_eq!(div.text_content(), "  checked in 08:15");
        assert_eq!(div.text_len(), "checked in 08:15".len());
    }

    #[test]
    fn test_parent_stops_below_root() {
        let (doc, html, _, span) = sample();
        let span = doc.get(span).unwrap();
        let chain: Vec<_> = span.ancestors().map(|n| n.id()).collect();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1], html);
        assert!(doc.get(html).unwrap().parent().is_none());
        assert!(!doc.root().is_element());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let (doc, _, div, span) = sample();
        let div = doc.get(div).unwrap();
        let span = doc.get(span).unwrap();
        assert!(div.contains(&span));
        assert!(div.contains(&div));
        assert!(!span.contains(&div));
    }

    #[test]
    fn test_descendants_document_order() {
        let (doc, _, _, _) = sample();
        let tags: Vec<_> = doc
            .root()
            .descendant_elements()
            .filter_map(|n| n.tag_name())
            .collect();
        assert_eq!(tags, vec!["html", "div", "span"]);
    }

    #[test]
    fn test_from_json_snapshot() {
        let json = r#"{
            "tag": "html",
            "children": [
                {"tag": "head", "children": [{"tag": "title", "children": ["Crew - WhatsApp"]}]},
                {"tag": "div", "attrs": {"data-id": "m1"}, "children": ["here", {"tag": "br"}]}
            ]
        }"#;
        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.title().as_deref(), Some("Crew - WhatsApp"));
        let div = doc
            .root()
            .descendant_elements()
            .find(|n| n.attr("data-id") == Some("m1"))
            .unwrap();
        assert_eq!(div.text_content(), "here");
    }
}
