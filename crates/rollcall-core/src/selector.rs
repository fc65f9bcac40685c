//! CSS selector subset used to query document snapshots.
//!
//! Supported: type and universal selectors, `.class`, `#id`, attribute
//! selectors (`[a]`, `[a=v]`, `[a*=v]`, `[a^=v]`, `[a$=v]`, `[a~=v]`),
//! descendant and child combinators, and comma-separated selector lists.
//! Pseudo-classes and sibling combinators are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::NodeRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{selector}': {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

/// A parsed selector list.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    /// Left to right; the first part has no combinator.
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    /// Relation to the previous part.
    combinator: Option<Combinator>,
    compound: Compound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    test: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let err = |message: String| SelectorError {
            selector: source.to_string(),
            message,
        };

        let alternatives = split_top_level(source)
            .into_iter()
            .map(|alt| Parser::new(alt).parse_complex().map_err(err))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any alternative. Combinators may match
    /// ancestors outside whatever subtree is being queried.
    pub fn matches(&self, node: NodeRef<'_>) -> bool {
        node.is_element() && self.alternatives.iter().any(|c| matches_parts(&c.parts, node))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({:?})", self.source)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.source
    }
}

fn matches_parts(parts: &[Part], node: NodeRef<'_>) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !last.compound.matches(node) {
        return false;
    }
    match last.combinator {
        None => true,
        Some(Combinator::Child) => node.parent().is_some_and(|p| matches_parts(rest, p)),
        Some(Combinator::Descendant) => node.ancestors().any(|a| matches_parts(rest, a)),
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, node: NodeRef<'_>) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && node.tag_name() != Some(tag.as_str()) {
                return false;
            }
        }
        if !self.ids.iter().all(|id| node.attr("id") == Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| node.has_class(c)) {
            return false;
        }
        self.attrs.iter().all(|a| a.matches(node))
    }
}

impl AttrSelector {
    fn matches(&self, node: NodeRef<'_>) -> bool {
        let Some(value) = node.attr(&self.name) else {
            return false;
        };
        match &self.test {
            None => true,
            Some((AttrOp::Equals, expected)) => value == expected,
            Some((AttrOp::Contains, expected)) => !expected.is_empty() && value.contains(expected.as_str()),
            Some((AttrOp::Prefix, expected)) => !expected.is_empty() && value.starts_with(expected.as_str()),
            Some((AttrOp::Suffix, expected)) => !expected.is_empty() && value.ends_with(expected.as_str()),
            Some((AttrOp::Word, expected)) => value.split_whitespace().any(|w| w == expected),
        }
    }
}

/// Split on commas that are not inside brackets or quotes.
fn split_top_level(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                out.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&source[start..]);
    out
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

struct Parser<'s> {
    chars: std::iter::Peekable<std::str::Chars<'s>>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            chars: source.trim().chars().peekable(),
        }
    }

    fn parse_complex(mut self) -> Result<Complex, String> {
        let mut parts = Vec::new();
        let mut pending: Option<Combinator> = None;

        loop {
            let mut saw_space = false;
            while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
                self.chars.next();
                saw_space = true;
            }

            match self.chars.peek() {
                None => break,
                Some('>') => {
                    self.chars.next();
                    if parts.is_empty() || pending == Some(Combinator::Child) {
                        return Err("unexpected '>'".to_string());
                    }
                    pending = Some(Combinator::Child);
                    continue;
                }
                Some('+') | Some('~') | Some(':') => {
                    return Err(format!("unsupported token '{}'", self.chars.peek().copied().unwrap_or(' ')));
                }
                Some(_) => {}
            }

            if saw_space && !parts.is_empty() && pending.is_none() {
                pending = Some(Combinator::Descendant);
            }

            let compound = self.parse_compound()?;
            if !parts.is_empty() && pending.is_none() {
                return Err("missing combinator".to_string());
            }
            parts.push(Part {
                combinator: if parts.is_empty() { None } else { pending.take() },
                compound,
            });
        }

        if parts.is_empty() {
            return Err("empty selector".to_string());
        }
        if pending.is_some() {
            return Err("dangling combinator".to_string());
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let mut compound = Compound::default();

        if self.chars.peek() == Some(&'*') {
            self.chars.next();
            compound.tag = Some("*".to_string());
        } else if self.chars.peek().is_some_and(|c| is_ident_char(*c)) {
            compound.tag = Some(self.ident().to_ascii_lowercase());
        }

        loop {
            match self.chars.peek() {
                Some('.') => {
                    self.chars.next();
                    let class = self.ident();
                    if class.is_empty() {
                        return Err("empty class name".to_string());
                    }
                    compound.classes.push(class);
                }
                Some('#') => {
                    self.chars.next();
                    let id = self.ident();
                    if id.is_empty() {
                        return Err("empty id".to_string());
                    }
                    compound.ids.push(id);
                }
                Some('[') => {
                    self.chars.next();
                    compound.attrs.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() {
            let found = self.chars.peek().copied().unwrap_or(' ');
            return Err(format!("unexpected '{}'", found));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrSelector, String> {
        self.skip_ws();
        let name = self.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err("empty attribute name".to_string());
        }
        self.skip_ws();

        let op = match self.chars.next() {
            Some(']') => return Ok(AttrSelector { name, test: None }),
            Some('=') => AttrOp::Equals,
            Some(c @ ('*' | '^' | '$' | '~')) => {
                if self.chars.next() != Some('=') {
                    return Err(format!("expected '=' after '{}'", c));
                }
                match c {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Word,
                }
            }
            Some(c) => return Err(format!("unexpected '{}' in attribute selector", c)),
            None => return Err("unterminated attribute selector".to_string()),
        };

        self.skip_ws();
        let value = match self.chars.peek().copied() {
            Some(q @ ('"' | '\'')) => {
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some(c) if c == q => break,
                        Some(c) => value.push(c),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                value
            }
            _ => self.ident(),
        };
        self.skip_ws();
        if self.chars.next() != Some(']') {
            return Err("expected ']'".to_string());
        }

        Ok(AttrSelector {
            name,
            test: Some((op, value)),
        })
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_html;

    fn ids(doc: &crate::Document, selector: &str) -> Vec<String> {
        let selector = Selector::parse(selector).unwrap();
        doc.root()
            .select(&selector)
            .into_iter()
            .map(|n| n.attr("id").unwrap_or("?").to_string())
            .collect()
    }

    const PAGE: &str = r#"
        <div id="panel" data-testid="conversation-panel-messages">
          <div id="row1" role="row">
            <div id="c1" data-testid="msg-container" class="message-in focusable">
              <span id="s1" class="selectable-text copyable-text" dir="ltr">hello</span>
            </div>
          </div>
          <section id="sec"><span id="s2" dir="auto">x</span></section>
        </div>"#;

    #[test]
    fn test_type_class_and_attribute() {
        let doc = parse_html(PAGE);
        assert_eq!(ids(&doc, "span.selectable-text"), vec!["s1"]);
        assert_eq!(ids(&doc, "[data-testid=\"msg-container\"]"), vec!["c1"]);
        assert_eq!(ids(&doc, "span[class*='selectable']"), vec!["s1"]);
        assert_eq!(ids(&doc, "div[class~=focusable]"), vec!["c1"]);
        assert_eq!(ids(&doc, "[data-testid^=msg]"), vec!["c1"]);
        assert_eq!(ids(&doc, "#sec"), vec!["sec"]);
    }

    #[test]
    fn test_combinators() {
        let doc = parse_html(PAGE);
        assert_eq!(
            ids(&doc, "div[data-testid=\"conversation-panel-messages\"] > div > div"),
            vec!["c1"]
        );
        assert_eq!(ids(&doc, "#panel span"), vec!["s1", "s2"]);
        assert_eq!(ids(&doc, "#panel > span"), Vec::<String>::new());
        assert_eq!(ids(&doc, "div[role=\"row\"]>div"), vec!["c1"]);
    }

    #[test]
    fn test_selector_list_keeps_document_order_without_duplicates() {
        let doc = parse_html(PAGE);
        assert_eq!(ids(&doc, "span[dir=\"auto\"], span.selectable-text, span[dir]"), vec!["s1", "s2"]);
    }

    #[test]
    fn test_comma_inside_attribute_value() {
        let selector = Selector::parse("[title=\"a,b\"], span").unwrap();
        assert_eq!(selector.alternatives.len(), 2);
    }

    #[test]
    fn test_scoped_query_can_match_outer_ancestors() {
        let doc = parse_html(PAGE);
        let panel = doc.root().select_first(&Selector::parse("#panel").unwrap()).unwrap();
        let found = panel.select(&Selector::parse("#panel [data-testid=\"msg-container\"]").unwrap());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("div:first-child").is_err());
        assert!(Selector::parse("a + b").is_err());
        assert!(Selector::parse("div >").is_err());
        assert!(Selector::parse("[title").is_err());
        assert!(Selector::parse("[title|=en]").is_err());
    }

    #[test]
    fn test_serde_uses_source_text() {
        let selector = Selector::parse("span[title]").unwrap();
        let json = serde_json::to_string(&selector).unwrap();
        assert_eq!(json, "\"span[title]\"");
        let back: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, selector);
        assert!(serde_json::from_str::<Selector>("\"div >\"").is_err());
    }
}
