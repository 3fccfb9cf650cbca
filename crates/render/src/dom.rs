//! Generic HTML tree parsing and serialization.
//!
//! The sanitizer operates on a plain value tree rather than a live DOM:
//! transforms take nodes by value and produce new nodes, which keeps every
//! pass headlessly testable. Parsing goes through kuchikikiki (html5ever),
//! so malformed attacker input gets browser-grade error recovery before any
//! policy runs.

use kuchikikiki::NodeRef;
use tendril::TendrilSink;

/// A node in the generic HTML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlNode {
    /// An element with attributes and children.
    Element(HtmlElement),
    /// A text node (unescaped content).
    Text(String),
    /// A comment. Never serialized; kept so sanitization can account for it.
    Comment(String),
}

impl HtmlNode {
    /// Returns the element payload, if this node is an element.
    pub fn as_element(&self) -> Option<&HtmlElement> {
        match self {
            HtmlNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// An element node: lowercase tag, attribute pairs, ordered children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HtmlElement {
    /// Lowercase tag name.
    pub tag: String,
    /// Attribute name/value pairs. Names are lowercase.
    pub attrs: Vec<(String, String)>,
    /// Ordered child nodes.
    pub children: Vec<HtmlNode>,
}

impl HtmlElement {
    /// Creates an empty element with the given tag.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Returns the first value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing an existing value.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(attr, _)| attr == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// Concatenated text content of the subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[HtmlNode], out: &mut String) {
    for node in nodes {
        match node {
            HtmlNode::Text(text) => out.push_str(text),
            HtmlNode::Element(el) => collect_text(&el.children, out),
            HtmlNode::Comment(_) => {}
        }
    }
}

/// Parses an HTML fragment into generic nodes.
///
/// html5ever always recovers, so this cannot fail; unparsable garbage yields
/// an empty tree.
pub fn parse_fragment(html: &str) -> Vec<HtmlNode> {
    let document = kuchikikiki::parse_html().one(html);
    match document.select_first("body") {
        Ok(body) => body.as_node().children().filter_map(convert).collect(),
        Err(()) => Vec::new(),
    }
}

fn convert(node: NodeRef) -> Option<HtmlNode> {
    if let Some(text) = node.as_text() {
        return Some(HtmlNode::Text(text.borrow().clone()));
    }
    if let Some(comment) = node.as_comment() {
        return Some(HtmlNode::Comment(comment.borrow().clone()));
    }
    let data = node.as_element()?;
    let tag = data.name.local.to_string();
    let attrs = data
        .attributes
        .borrow()
        .map
        .iter()
        .map(|(name, attr)| (name.local.to_string(), attr.value.clone()))
        .collect();
    let children = node.children().filter_map(convert).collect();
    Some(HtmlNode::Element(HtmlElement {
        tag,
        attrs,
        children,
    }))
}

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "source", "track", "wbr",
];

/// Serializes generic nodes back to HTML with strict escaping.
pub fn serialize(nodes: &[HtmlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &HtmlNode, out: &mut String) {
    match node {
        HtmlNode::Text(text) => out.push_str(&escape_text(text)),
        HtmlNode::Comment(_) => {}
        HtmlNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                if !is_serializable_attr_name(name) {
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            if VOID_TAGS.contains(&el.tag.as_str()) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn is_serializable_attr_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':'))
}

/// Escapes text-node content.
pub(crate) fn escape_text(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Escapes a double-quoted attribute value.
pub(crate) fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_text_and_comments() {
        let nodes = parse_fragment("<div class=\"x\">hi<!-- c --></div>");
        assert_eq!(nodes.len(), 1);
        let el = nodes[0].as_element().expect("element");
        assert_eq!(el.tag, "div");
        assert_eq!(el.attr("class"), Some("x"));
        assert_eq!(el.children.len(), 2);
        assert!(matches!(&el.children[0], HtmlNode::Text(t) if t == "hi"));
        assert!(matches!(&el.children[1], HtmlNode::Comment(_)));
    }

    #[test]
    fn parser_recovers_from_malformed_markup() {
        let nodes = parse_fragment("<div><p>unclosed");
        assert!(!nodes.is_empty());
    }

    #[test]
    fn custom_tags_survive_parsing() {
        let nodes = parse_fragment("<card title=\"Hi\">body</card>");
        let el = nodes[0].as_element().expect("element");
        assert_eq!(el.tag, "card");
        assert_eq!(el.attr("title"), Some("Hi"));
        assert_eq!(el.text_content(), "body");
    }

    #[test]
    fn tag_names_are_lowercased() {
        let nodes = parse_fragment("<DIV><SPAN>x</SPAN></DIV>");
        assert_eq!(nodes[0].as_element().expect("element").tag, "div");
    }

    #[test]
    fn serialization_escapes_text_and_attrs() {
        let el = HtmlElement {
            tag: "span".to_string(),
            attrs: vec![("title".to_string(), "a\"b".to_string())],
            children: vec![HtmlNode::Text("<x> & y".to_string())],
        };
        assert_eq!(
            serialize(&[HtmlNode::Element(el)]),
            "<span title=\"a&quot;b\">&lt;x&gt; &amp; y</span>"
        );
    }

    #[test]
    fn comments_never_serialize() {
        assert_eq!(serialize(&[HtmlNode::Comment("boo".to_string())]), "");
    }

    #[test]
    fn void_tags_self_close() {
        let mut img = HtmlElement::new("img");
        img.set_attr("src", "/a.png");
        assert_eq!(serialize(&[HtmlNode::Element(img)]), "<img src=\"/a.png\" />");
    }

    #[test]
    fn hostile_attr_names_skipped() {
        let el = HtmlElement {
            tag: "span".to_string(),
            attrs: vec![("on click".to_string(), "x()".to_string())],
            children: Vec::new(),
        };
        assert_eq!(serialize(&[HtmlNode::Element(el)]), "<span></span>");
    }

    #[test]
    fn round_trip_plain_text() {
        let nodes = parse_fragment("hello world");
        assert_eq!(serialize(&nodes), "hello world");
    }
}
