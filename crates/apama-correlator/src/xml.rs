//! `apama-request` / `apama-response` XML envelope helpers.
//!
//! Responses are a root `<map name="apama-response">` holding nested
//! `<list>`, `<map>` and `<prop>` elements, each identified by its `name`
//! attribute. Lookups walk element children relative to a node, so a list
//! entry is read in place without re-parsing it as its own document.
//! Absent leaves fall back to an empty string, `0` or `false`.

use std::fmt::Write as _;

use roxmltree::{Document, Node};

use crate::error::EngineError;

const REQUEST_ENVELOPE: &str = "apama-request";

/// Parses a response body and returns the document.
pub(crate) fn parse(text: &str) -> Result<Document<'_>, EngineError> {
    let doc = Document::parse(text)?;
    Ok(doc)
}

/// Returns the envelope map, tolerating a missing `name` attribute.
pub(crate) fn envelope<'a, 'input>(doc: &'a Document<'input>) -> Node<'a, 'input> {
    doc.root_element()
}

fn is_named(node: &Node<'_, '_>, tag: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag && node.attribute("name") == Some(name)
}

/// First element child `<tag name="name">`.
pub(crate) fn child<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|child| is_named(child, tag, name))
}

/// All element children `<tag name="name">`, in document order.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |child| is_named(child, tag, name))
}

/// Follows a path of `(tag, name)` steps from `node`.
pub(crate) fn path<'a, 'input>(
    node: Node<'a, 'input>,
    steps: &[(&str, &str)],
) -> Option<Node<'a, 'input>> {
    steps
        .iter()
        .try_fold(node, |current, (tag, name)| child(current, tag, name))
}

/// Text content of `<prop name="name">`, empty when absent.
pub(crate) fn prop_text(node: Node<'_, '_>, name: &str) -> String {
    child(node, "prop", name)
        .map(|prop| {
            prop.descendants()
                .filter(Node::is_text)
                .filter_map(|text| text.text())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Integer value of a prop; absent or unparseable values read as `0`.
pub(crate) fn prop_int<T>(node: Node<'_, '_>, name: &str) -> T
where
    T: std::str::FromStr + Default,
{
    prop_text(node, name).trim().parse().unwrap_or_default()
}

pub(crate) fn prop_bool(node: Node<'_, '_>, name: &str) -> bool {
    prop_text(node, name).trim() == "true"
}

/// Builder for `<map name="apama-request">` bodies.
#[derive(Debug, Clone, Default)]
pub struct RequestBody {
    props: String,
}

impl RequestBody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prop(mut self, name: &str, value: impl ToString) -> Self {
        let _ = write!(
            self.props,
            "<prop name=\"{}\">{}</prop>",
            escape(name),
            escape(&value.to_string())
        );
        self
    }

    #[must_use]
    pub fn finish(self) -> String {
        format!("<map name=\"{REQUEST_ENVELOPE}\">{}</map>", self.props)
    }
}

/// The empty request map sent with control commands.
#[must_use]
pub fn empty_request() -> String {
    RequestBody::new().finish()
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
