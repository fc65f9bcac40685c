//! Tolerant HTML parser producing a [`Document`].
//!
//! Built for saved chat pages, not for standards compliance: unknown end tags are
//! ignored, unclosed elements are closed by their ancestors' end tags, and
//! `script`/`style` bodies are dropped.

use crate::{Document, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements closed by an opening tag of the same name (`<li>a<li>b`).
const SELF_NESTING_FORBIDDEN: &[&str] = &["li", "p", "option", "tr", "td", "th"];

/// Elements whose body is skipped entirely.
const RAW_TEXT_SKIPPED: &[&str] = &["script", "style"];

/// Elements whose body is kept as a single text node.
const RAW_TEXT_KEPT: &[&str] = &["title", "textarea"];

/// Parse an HTML string into a document tree.
pub fn parse_html(input: &str) -> Document {
    let mut doc = Document::new();
    let root = doc.root_id();
    let mut stack: Vec<(NodeId, String)> = vec![(root, String::new())];
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];

        if rest.starts_with("<!--") {
            pos = match rest[4..].find("-->") {
                Some(end) => pos + 4 + end + 3,
                None => input.len(),
            };
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = skip_past(input, pos, '>');
            continue;
        }

        if rest.starts_with("</") {
            let end = skip_past(input, pos, '>');
            let name: String = rest[2..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
                .collect::<String>()
                .to_ascii_lowercase();
            close_element(&mut stack, &name);
            pos = end;
            continue;
        }

        if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            let tag = parse_start_tag(rest);
            pos += tag.consumed;

            if SELF_NESTING_FORBIDDEN.contains(&tag.name.as_str()) {
                if let Some((_, open)) = stack.last() {
                    if *open == tag.name {
                        stack.pop();
                    }
                }
            }

            let parent = current(&stack, root);
            let id = doc.append_element(parent, &tag.name, tag.attrs);

            if tag.self_closing || VOID_ELEMENTS.contains(&tag.name.as_str()) {
                continue;
            }

            let is_skipped = RAW_TEXT_SKIPPED.contains(&tag.name.as_str());
            if is_skipped || RAW_TEXT_KEPT.contains(&tag.name.as_str()) {
                let (body_end, resume) = find_end_tag(input, pos, &tag.name);
                if !is_skipped && body_end > pos {
                    doc.append_text(id, decode_entities(&input[pos..body_end]));
                }
                pos = resume;
                continue;
            }

            stack.push((id, tag.name));
            continue;
        }

        // Text up to the next '<' (a stray '<' is kept as text).
        let search_from = if rest.starts_with('<') { 1 } else { 0 };
        let end = rest[search_from..]
            .find('<')
            .map(|i| pos + search_from + i)
            .unwrap_or(input.len());
        let text = decode_entities(&input[pos..end]);
        if !text.is_empty() {
            doc.append_text(current(&stack, root), text);
        }
        pos = end;
    }

    doc
}

fn current(stack: &[(NodeId, String)], root: NodeId) -> NodeId {
    stack.last().map(|(id, _)| *id).unwrap_or(root)
}

fn close_element(stack: &mut Vec<(NodeId, String)>, name: &str) {
    // Index 0 is the document root and never closes.
    if let Some(index) = stack.iter().rposition(|(_, open)| open == name) {
        if index > 0 {
            stack.truncate(index);
        }
    }
}

fn skip_past(input: &str, from: usize, ch: char) -> usize {
    input[from..]
        .find(ch)
        .map(|i| from + i + ch.len_utf8())
        .unwrap_or(input.len())
}

/// Returns (start of the end tag, position after it).
fn find_end_tag(input: &str, from: usize, name: &str) -> (usize, usize) {
    let needle = format!("</{}", name);
    let lower = input[from..].to_ascii_lowercase();
    match lower.find(&needle) {
        Some(i) => {
            let start = from + i;
            (start, skip_past(input, start, '>'))
        }
        None => (input.len(), input.len()),
    }
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    consumed: usize,
}

/// Parse `<name attr=value ...>` at the start of `s`.
fn parse_start_tag(s: &str) -> StartTag {
    let mut chars = s.char_indices().skip(1).peekable();
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() || c == '>' || c == '/' {
            break;
        }
        name.push(c.to_ascii_lowercase());
        chars.next();
    }

    let mut attrs = Vec::new();
    let mut self_closing = false;
    let mut consumed = s.len();

    loop {
        while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            chars.next();
        }
        let Some((i, c)) = chars.next() else {
            break;
        };
        match c {
            '>' => {
                consumed = i + 1;
                break;
            }
            '/' => {
                if chars.peek().is_some_and(|(_, c)| *c == '>') {
                    self_closing = true;
                }
                continue;
            }
            _ => {}
        }

        let mut attr_name = String::from(c);
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' || c == '>' || c == '/' {
                break;
            }
            attr_name.push(c);
            chars.next();
        }
        while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek().is_some_and(|(_, c)| *c == '=') {
            chars.next();
            while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
                chars.next();
            }
            match chars.peek().copied() {
                Some((_, q @ ('"' | '\''))) => {
                    chars.next();
                    for (_, c) in chars.by_ref() {
                        if c == q {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_whitespace() || c == '>' {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
        }

        attrs.push((attr_name.to_ascii_lowercase(), decode_entities(&value)));
    }

    StartTag {
        name,
        attrs,
        self_closing,
        consumed,
    }
}

/// Decode the common named entities and numeric character references.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..1 + semi]).map(|c| (c, semi + 2)));

        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
