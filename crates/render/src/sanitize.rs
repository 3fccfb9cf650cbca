//! Allow-list HTML sanitization.
//!
//! The sanitizer is the single safety boundary between author input and the
//! shared surface. It parses the HTML, expands petmark widgets, then walks
//! the tree keeping only allow-listed tags and attributes. Everything else
//! is unwrapped or deleted; nothing is ever reported back to the caller,
//! because a sanitizer that fails on attack input is itself a lever.

use petmark_core::{sanitize_style, sanitize_url};

use crate::diagram::DiagramHub;
use crate::dom::{self, HtmlElement, HtmlNode};
use crate::widgets::{self, WidgetEnv};

/// Tags allowed to reach the surface.
const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "hr", "blockquote", "ul", "ol", "li",
    "table", "thead", "tbody", "tr", "th", "td", "a", "img", "button", "input", "code", "pre",
    "strong", "em", "b", "i", "u", "s", "del", "sup", "sub", "span", "div", "label",
];

/// Tags whose entire subtree is deleted. Everything else that is not
/// allowed is merely unwrapped.
const HARD_REMOVE_TAGS: &[&str] = &["script", "iframe", "object", "embed", "link", "meta", "style"];

/// Functions a diagram-container button may invoke through `onclick`.
const DIAGRAM_ACTIONS: &[&str] = &[
    "petDiagramZoomIn",
    "petDiagramZoomOut",
    "petDiagramReset",
    "petDiagramCopySource",
];

const MAX_CLASS_CHARS: usize = 128;
const MAX_LABEL_CHARS: usize = 200;
const MAX_DIAGRAM_SOURCE_CHARS: usize = 50_000;

/// Tree-walking allow-list sanitizer with optional widget collaborators.
#[derive(Default)]
pub struct Sanitizer<'a> {
    markdown: Option<&'a dyn Fn(&str) -> String>,
    diagrams: Option<&'a DiagramHub>,
}

impl<'a> Sanitizer<'a> {
    /// A sanitizer with no collaborators: widgets still expand, but
    /// container markdown stays as text and diagrams fall back statically.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the markdown renderer used for widget container content.
    pub fn with_markdown(mut self, hook: &'a dyn Fn(&str) -> String) -> Self {
        self.markdown = Some(hook);
        self
    }

    /// Supplies the diagram hub used for placeholder ids and scheduling.
    pub fn with_diagrams(mut self, hub: &'a DiagramHub) -> Self {
        self.diagrams = Some(hub);
        self
    }

    /// Sanitizes an HTML fragment. Total: any input yields a string, and no
    /// attacker-controlled markup survives unescaped.
    pub fn sanitize(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }
        let nodes = dom::parse_fragment(html);
        let env = WidgetEnv {
            markdown: self.markdown,
            diagrams: self.diagrams,
        };
        let expanded = widgets::expand_widgets(nodes, &env);
        dom::serialize(&sanitize_nodes(expanded, false))
    }
}

/// Sanitizes an HTML fragment with a bare [`Sanitizer`].
pub fn sanitize(html: &str) -> String {
    Sanitizer::new().sanitize(html)
}

fn sanitize_nodes(nodes: Vec<HtmlNode>, in_diagram: bool) -> Vec<HtmlNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            HtmlNode::Text(text) => out.push(HtmlNode::Text(text)),
            HtmlNode::Comment(_) => {}
            HtmlNode::Element(el) => {
                if HARD_REMOVE_TAGS.contains(&el.tag.as_str()) {
                    log::debug!("removing <{}> and its subtree", el.tag);
                    continue;
                }
                if !ALLOWED_TAGS.contains(&el.tag.as_str()) {
                    // Unknown tags are unwrapped: the children may still be
                    // legitimate content.
                    out.extend(sanitize_nodes(el.children, in_diagram));
                    continue;
                }
                if let Some(clean) = sanitize_element(el, in_diagram) {
                    out.push(HtmlNode::Element(clean));
                }
            }
        }
    }
    out
}

fn sanitize_element(el: HtmlElement, in_diagram: bool) -> Option<HtmlElement> {
    let scope_is_diagram = in_diagram || is_diagram_wrapper(&el);

    if el.tag == "input" {
        return sanitize_input(el);
    }

    let tag = el.tag;
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut had_rel = false;
    let mut target_blank = false;

    for (name, value) in el.attrs {
        let name = name.to_ascii_lowercase();
        if let Some(pair) = sanitize_attr(&tag, &name, &value, scope_is_diagram) {
            if pair.0 == "target" && pair.1 == "_blank" {
                target_blank = true;
            }
            attrs.push(pair);
            continue;
        }
        if name == "rel" && tag == "a" {
            had_rel = true;
        }
    }

    match tag.as_str() {
        "a" => {
            if had_rel || target_blank {
                attrs.retain(|(name, _)| name != "rel");
                attrs.push(("rel".to_string(), "noopener noreferrer".to_string()));
            }
        }
        "img" => {
            if !attrs.iter().any(|(name, _)| name == "loading") {
                attrs.push(("loading".to_string(), "lazy".to_string()));
            }
            if !attrs.iter().any(|(name, _)| name == "decoding") {
                attrs.push(("decoding".to_string(), "async".to_string()));
            }
        }
        "button" => {
            if !attrs.iter().any(|(name, _)| name == "type") {
                attrs.push(("type".to_string(), "button".to_string()));
            }
        }
        _ => {}
    }

    // Parsing yields attributes in name order; keep the output in the same
    // order so sanitization is stable under re-parsing.
    attrs.sort_by(|a, b| a.0.cmp(&b.0));

    let children = sanitize_nodes(el.children, scope_is_diagram);
    Some(HtmlElement {
        tag,
        attrs,
        children,
    })
}

/// Decides whether one attribute survives, returning its normalized form.
fn sanitize_attr(
    tag: &str,
    name: &str,
    value: &str,
    in_diagram: bool,
) -> Option<(String, String)> {
    if name.starts_with("on") {
        if name == "onclick" && tag == "button" && in_diagram && is_diagram_action(value) {
            return Some((name.to_string(), value.trim().to_string()));
        }
        log::debug!("stripping {name} handler");
        return None;
    }

    match name {
        "style" => sanitize_style(value).map(|clean| (name.to_string(), clean)),
        "class" => {
            let clean = clean_class(value);
            (!clean.is_empty()).then(|| (name.to_string(), clean))
        }
        "id" => is_valid_id(value).then(|| (name.to_string(), value.to_string())),
        "data-mermaid-code" => {
            (in_diagram && value.chars().count() <= MAX_DIAGRAM_SOURCE_CHARS)
                .then(|| (name.to_string(), value.to_string()))
        }
        "data-source-line" => (in_diagram
            && (value.is_empty() || value.bytes().all(|b| b.is_ascii_digit())))
        .then(|| (name.to_string(), value.to_string())),
        "title" | "aria-label" => Some((name.to_string(), cap_chars(value, MAX_LABEL_CHARS))),
        "type" if tag == "button" => {
            let lowered = value.to_ascii_lowercase();
            matches!(lowered.as_str(), "button" | "submit" | "reset")
                .then(|| (name.to_string(), lowered))
        }
        "href" if tag == "a" => {
            let safe = sanitize_url(value);
            (!safe.is_empty()).then(|| (name.to_string(), safe))
        }
        "target" if tag == "a" => {
            matches!(value, "_blank" | "_self").then(|| (name.to_string(), value.to_string()))
        }
        "src" if tag == "img" => {
            let safe = sanitize_url(value);
            (!safe.is_empty()).then(|| (name.to_string(), safe))
        }
        "alt" if tag == "img" => Some((name.to_string(), cap_chars(value, MAX_LABEL_CHARS))),
        "width" | "height" if tag == "img" => {
            let digits = (1..=4).contains(&value.len())
                && value.bytes().all(|b| b.is_ascii_digit());
            digits.then(|| (name.to_string(), value.to_string()))
        }
        "loading" if tag == "img" => {
            matches!(value, "lazy" | "eager").then(|| (name.to_string(), value.to_string()))
        }
        "decoding" if tag == "img" => {
            matches!(value, "async" | "sync" | "auto")
                .then(|| (name.to_string(), value.to_string()))
        }
        _ => None,
    }
}

/// `input` elements: only a disabled checkbox survives.
fn sanitize_input(el: HtmlElement) -> Option<HtmlElement> {
    let is_checkbox = el
        .attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case("checkbox"));
    if !is_checkbox {
        log::debug!("removing non-checkbox <input>");
        return None;
    }
    let mut clean = HtmlElement::new("input");
    if el.attr("checked").is_some() {
        clean.set_attr("checked", "");
    }
    clean.set_attr("disabled", "");
    clean.set_attr("type", "checkbox");
    Some(clean)
}

fn is_diagram_wrapper(el: &HtmlElement) -> bool {
    el.attr("class")
        .is_some_and(|class| class.split_whitespace().any(|token| token == "pet-diagram"))
}

/// One call to a fixed diagram action with a single quoted
/// `[A-Za-z0-9_-]+` argument, and nothing else.
fn is_diagram_action(value: &str) -> bool {
    let value = value.trim();
    let Some(open) = value.find("('") else {
        return false;
    };
    if !DIAGRAM_ACTIONS.contains(&&value[..open]) {
        return false;
    }
    let rest = &value[open + 2..];
    let Some(close) = rest.find("')") else {
        return false;
    };
    let argument = &rest[..close];
    let tail = &rest[close + 2..];
    !argument.is_empty()
        && argument
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
        && tail.is_empty()
}

fn clean_class(value: &str) -> String {
    let filtered: String = value
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    cap_chars(&collapsed, MAX_CLASS_CHARS)
}

fn is_valid_id(value: &str) -> bool {
    let mut bytes = value.bytes();
    let Some(first) = bytes.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && value.len() <= 128
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-'))
}

fn cap_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_subtree_deleted() {
        assert_eq!(sanitize("<p>a</p><script>alert(1)</script><p>b</p>"), "<p>a</p><p>b</p>");
        assert_eq!(sanitize("<script><p>nested</p></script>"), "");
    }

    #[test]
    fn hard_remove_set_deleted() {
        for tag in ["iframe", "object", "embed", "style"] {
            let html = format!("<{tag}>payload</{tag}>");
            assert_eq!(sanitize(&html), "", "tag {tag}");
        }
    }

    #[test]
    fn unknown_tags_unwrap_keeping_children() {
        assert_eq!(sanitize("<article><p>kept</p></article>"), "<p>kept</p>");
        assert_eq!(sanitize("<blink>still here</blink>"), "still here");
    }

    #[test]
    fn comments_removed() {
        assert_eq!(sanitize("<p>a<!-- hidden --></p>"), "<p>a</p>");
    }

    #[test]
    fn event_handlers_stripped() {
        let html = sanitize("<p onclick=\"alert(1)\" onmouseover=\"x()\">hi</p>");
        assert_eq!(html, "<p>hi</p>");
    }

    #[test]
    fn diagram_button_onclick_allowed() {
        let html = sanitize(
            "<div class=\"pet-diagram\"><button onclick=\"petDiagramZoomIn('pet-diagram-1')\">+</button></div>",
        );
        assert!(html.contains("onclick=\"petDiagramZoomIn('pet-diagram-1')\""));
    }

    #[test]
    fn diagram_onclick_rejected_outside_wrapper() {
        let html = sanitize("<button onclick=\"petDiagramZoomIn('x')\">+</button>");
        assert!(!html.contains("onclick"));
    }

    #[test]
    fn diagram_onclick_rejects_non_action_calls() {
        for value in [
            "alert('x')",
            "petDiagramZoomIn('x'); alert(1)",
            "petDiagramZoomIn('a b')",
            "petDiagramZoomIn(name)",
            "petDiagramZoomIn('')",
        ] {
            let html = sanitize(&format!(
                "<div class=\"pet-diagram\"><button onclick=\"{value}\">+</button></div>"
            ));
            assert!(!html.contains("onclick"), "kept {value:?}");
        }
    }

    #[test]
    fn style_filtered_through_css_guard() {
        let html = sanitize("<span style=\"color:red;position:fixed;width:9999px\">x</span>");
        assert_eq!(html, "<span style=\"color: red\">x</span>");
        let html = sanitize("<span style=\"position:fixed\">x</span>");
        assert_eq!(html, "<span>x</span>");
    }

    #[test]
    fn class_cleaned_and_capped() {
        let html = sanitize("<p class=\"ok;<bad>   spaced\">x</p>");
        assert_eq!(html, "<p class=\"okbad spaced\">x</p>");
        let long = "c".repeat(400);
        let html = sanitize(&format!("<p class=\"{long}\">x</p>"));
        assert!(html.contains(&"c".repeat(128)));
        assert!(!html.contains(&"c".repeat(129)));
    }

    #[test]
    fn id_validated() {
        assert!(sanitize("<p id=\"intro-1:a\">x</p>").contains("id=\"intro-1:a\""));
        assert!(!sanitize("<p id=\"1bad\">x</p>").contains("id="));
        assert!(!sanitize("<p id=\"has space\">x</p>").contains("id="));
    }

    #[test]
    fn anchor_href_guarded_and_rel_forced() {
        let html = sanitize("<a href=\"https://x.com/a\" target=\"_blank\">x</a>");
        assert!(html.contains("href=\"https://x.com/a\""));
        assert!(html.contains("rel=\"noopener noreferrer\""));

        let html = sanitize("<a href=\"javascript:alert(1)\">x</a>");
        assert!(!html.contains("href"));

        let html = sanitize("<a href=\"/ok\" rel=\"opener\">x</a>");
        assert!(html.contains("rel=\"noopener noreferrer\""));

        let html = sanitize("<a href=\"/ok\" target=\"_parent\">x</a>");
        assert!(!html.contains("target"));
    }

    #[test]
    fn image_policy() {
        let html = sanitize("<img src=\"https://x.com/a.png\" width=\"120\" height=\"80\">");
        assert!(html.contains("src=\"https://x.com/a.png\""));
        assert!(html.contains("width=\"120\""));
        assert!(html.contains("loading=\"lazy\""));
        assert!(html.contains("decoding=\"async\""));

        let html = sanitize("<img src=\"javascript:alert(1)\" width=\"99999\">");
        assert!(!html.contains("src"));
        assert!(!html.contains("width"));

        let html = sanitize("<img src=\"/a.png\" loading=\"eager\" decoding=\"sync\">");
        assert!(html.contains("loading=\"eager\""));
        assert!(html.contains("decoding=\"sync\""));
    }

    #[test]
    fn input_only_disabled_checkbox_survives() {
        let html = sanitize("<input type=\"checkbox\" checked onchange=\"x()\">");
        assert!(html.contains("type=\"checkbox\""));
        assert!(html.contains("disabled"));
        assert!(html.contains("checked"));
        assert!(!html.contains("onchange"));

        assert_eq!(sanitize("<input type=\"text\" value=\"x\">"), "");
        assert_eq!(sanitize("<input>"), "");
    }

    #[test]
    fn button_type_normalized() {
        let html = sanitize("<button>x</button>");
        assert!(html.contains("type=\"button\""));
        let html = sanitize("<button type=\"submit\">x</button>");
        assert!(html.contains("type=\"submit\""));
        let html = sanitize("<button type=\"evil\">x</button>");
        assert!(html.contains("type=\"button\""));
    }

    #[test]
    fn titles_capped() {
        let long = "t".repeat(300);
        let html = sanitize(&format!("<p title=\"{long}\">x</p>"));
        assert!(html.contains(&"t".repeat(200)));
        assert!(!html.contains(&"t".repeat(201)));
    }

    #[test]
    fn data_attrs_only_inside_diagram_wrapper() {
        let html = sanitize("<div class=\"pet-diagram\" data-mermaid-code=\"graph\" data-source-line=\"3\">x</div>");
        assert!(html.contains("data-mermaid-code=\"graph\""));
        assert!(html.contains("data-source-line=\"3\""));

        let html = sanitize("<div data-mermaid-code=\"graph\" data-source-line=\"3\">x</div>");
        assert!(!html.contains("data-mermaid-code"));
        assert!(!html.contains("data-source-line"));

        let html = sanitize("<div class=\"pet-diagram\" data-source-line=\"3; drop\">x</div>");
        assert!(!html.contains("data-source-line"));
    }

    #[test]
    fn unknown_attributes_dropped() {
        let html = sanitize("<p data-user=\"x\" contenteditable=\"true\" draggable=\"true\">x</p>");
        assert_eq!(html, "<p>x</p>");
    }

    #[test]
    fn empty_and_garbage_inputs() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n  "), "");
        // html5ever recovers; nothing here is allowed through as markup.
        let html = sanitize("<<<>>><scr<script>ipt>alert(1)</script>");
        assert!(!html.contains("<script"));
    }

    #[test]
    fn idempotent_on_adversarial_fragments() {
        let samples = [
            "<p>plain</p>",
            "<a href=\"https://x.com\" target=\"_blank\">x</a>",
            "<div class=\"pet-diagram\" id=\"pet-diagram-1\" data-mermaid-code=\"graph TD\"><button onclick=\"petDiagramZoomIn('pet-diagram-1')\">+</button></div>",
            "<card title=\"Hi\" href=\"javascript:alert(1)\">body</card>",
            "<tabs><tab label=\"A\">1</tab><tab>2</tab></tabs>",
            "<note type=\"gotcha\" title=\"T\">watch out</note>",
            "<img src=\"/a.png\">",
            "<input type=\"checkbox\" checked>",
            "<span style=\"color:#fff;width:4000px\">x</span>",
            "text &amp; entities <b>bold</b>",
        ];
        for sample in samples {
            let once = sanitize(sample);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn nested_diagram_scope_inherited() {
        let html = sanitize(
            "<div class=\"pet-diagram\"><div><button onclick=\"petDiagramReset('d1')\">r</button></div></div>",
        );
        assert!(html.contains("onclick"));
    }
}
