//! Markdown AST rendering with safety-guarded overrides.
//!
//! The markdown engine produces the AST; HTML emission happens here so the
//! pipeline's overrides apply uniformly: headings get slug ids, links and
//! images go through the URL guard, and `mermaid` fences become diagram
//! placeholders. Raw HTML passes through untouched; the sanitizer behind
//! this walker is the safety boundary, not the renderer.

use markdown::mdast::{AlignKind, Node};
use serde::Serialize;

use petmark_core::{Slugger, sanitize_url};

use crate::diagram::{self, DiagramHub};
use crate::dom::{escape_attr, escape_text};

/// A document outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Anchor id injected on the heading element.
    pub id: String,
    /// Heading depth, 1–6.
    pub level: u8,
    /// Plain text of the heading.
    pub text: String,
}

/// Mutable state for one body render: output buffer, slug counters,
/// collected headings, and list nesting.
pub(crate) struct RenderContext<'a> {
    html: String,
    headings: Vec<TocEntry>,
    slugger: Slugger,
    breaks: bool,
    diagrams: Option<&'a DiagramHub>,
    list_stack: Vec<bool>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(breaks: bool, diagrams: Option<&'a DiagramHub>) -> Self {
        Self {
            html: String::with_capacity(1024),
            headings: Vec::new(),
            slugger: Slugger::new(),
            breaks,
            diagrams,
            list_stack: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<TocEntry>) {
        (self.html, self.headings)
    }

    fn push_raw(&mut self, s: &str) {
        self.html.push_str(s);
    }

    fn push_text(&mut self, s: &str) {
        self.html.push_str(&escape_text(s));
    }

    /// True inside a tight list, where paragraph wrappers are suppressed.
    fn in_tight_list(&self) -> bool {
        self.list_stack.last().copied() == Some(false)
    }
}

/// Extracts plain text from heading children for slugs and the outline.
pub(crate) fn extract_text_from_nodes(nodes: &[Node]) -> String {
    let mut text = String::new();
    for node in nodes {
        extract_text_from_node(node, &mut text);
    }
    text.trim().to_string()
}

fn extract_text_from_node(node: &Node, buffer: &mut String) {
    match node {
        Node::Text(t) => buffer.push_str(&t.value),
        Node::InlineCode(code) => buffer.push_str(&code.value),
        Node::Strong(n) => {
            for child in &n.children {
                extract_text_from_node(child, buffer);
            }
        }
        Node::Emphasis(n) => {
            for child in &n.children {
                extract_text_from_node(child, buffer);
            }
        }
        Node::Link(n) => {
            for child in &n.children {
                extract_text_from_node(child, buffer);
            }
        }
        Node::Delete(n) => {
            for child in &n.children {
                extract_text_from_node(child, buffer);
            }
        }
        _ => {}
    }
}

/// Walks the document tree collecting heading entries with slug ids, using
/// the same slug state a full render would.
pub(crate) fn collect_headings(node: &Node, slugger: &mut Slugger, out: &mut Vec<TocEntry>) {
    if let Node::Heading(heading) = node {
        let text = extract_text_from_nodes(&heading.children);
        out.push(TocEntry {
            id: slugger.next_slug(&text),
            level: heading.depth,
            text,
        });
    }
    if let Some(children) = node.children() {
        for child in children {
            collect_headings(child, slugger, out);
        }
    }
}

/// Recursively renders an AST node to HTML, updating the context state.
pub(crate) fn render_node(node: &Node, ctx: &mut RenderContext<'_>) {
    match node {
        Node::Root(root) => {
            for child in &root.children {
                render_node(child, ctx);
            }
        }
        Node::Text(text) => render_text(&text.value, ctx),
        Node::Paragraph(para) => {
            let tight = ctx.in_tight_list();
            if !tight {
                ctx.push_raw("<p>");
            }
            for child in &para.children {
                render_node(child, ctx);
            }
            if !tight {
                ctx.push_raw("</p>");
            }
        }
        Node::Heading(heading) => render_heading(heading, ctx),
        Node::Link(link) => render_link(link, ctx),
        Node::Image(img) => render_image(img, ctx),
        Node::Code(code) => render_code(code, ctx),
        Node::InlineCode(code) => {
            ctx.push_raw("<code>");
            ctx.push_text(&code.value);
            ctx.push_raw("</code>");
        }
        Node::Strong(n) => {
            ctx.push_raw("<strong>");
            for child in &n.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</strong>");
        }
        Node::Emphasis(n) => {
            ctx.push_raw("<em>");
            for child in &n.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</em>");
        }
        Node::Delete(n) => {
            ctx.push_raw("<del>");
            for child in &n.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</del>");
        }
        Node::List(list) => {
            let tag = if list.ordered { "ol" } else { "ul" };
            ctx.push_raw(&format!("<{tag}>"));
            ctx.list_stack.push(list.spread);
            for child in &list.children {
                render_node(child, ctx);
            }
            ctx.list_stack.pop();
            ctx.push_raw(&format!("</{tag}>"));
        }
        Node::ListItem(item) => render_list_item(item, ctx),
        Node::Blockquote(quote) => {
            ctx.push_raw("<blockquote>");
            for child in &quote.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</blockquote>");
        }
        Node::ThematicBreak(_) => ctx.push_raw("<hr />"),
        Node::Break(_) => ctx.push_raw("<br />"),
        Node::Html(html) => {
            // Raw HTML flows through; the sanitizer decides what survives.
            ctx.push_raw(&html.value);
        }
        Node::Table(table) => render_table(table, ctx),
        Node::TableRow(_) | Node::TableCell(_) => {}
        other => {
            log::warn!("unhandled markdown node type: {other:?}");
        }
    }
}

fn render_text(value: &str, ctx: &mut RenderContext<'_>) {
    if !ctx.breaks {
        ctx.push_text(value);
        return;
    }
    let escaped = escape_text(value);
    ctx.push_raw(&escaped.replace('\n', "<br />\n"));
}

fn render_heading(heading: &markdown::mdast::Heading, ctx: &mut RenderContext<'_>) {
    let text = extract_text_from_nodes(&heading.children);
    let slug = ctx.slugger.next_slug(&text);
    ctx.headings.push(TocEntry {
        id: slug.clone(),
        level: heading.depth,
        text,
    });

    let tag = format!("h{}", heading.depth);
    ctx.push_raw(&format!("<{tag} id=\"{slug}\">"));
    for child in &heading.children {
        render_node(child, ctx);
    }
    ctx.push_raw(&format!("</{tag}>"));
}

fn render_link(link: &markdown::mdast::Link, ctx: &mut RenderContext<'_>) {
    let safe = sanitize_url(&link.url);
    if safe.is_empty() {
        // No anchor for a rejected target, just the link text.
        log::debug!("link target rejected: {}", link.url);
        ctx.push_text(&extract_text_from_nodes(&link.children));
        return;
    }

    ctx.push_raw(&format!("<a href=\"{}\"", escape_attr(&safe)));
    if let Some(title) = &link.title {
        ctx.push_raw(&format!(" title=\"{}\"", escape_attr(title)));
    }
    ctx.push_raw(" target=\"_blank\" rel=\"noopener noreferrer\">");
    for child in &link.children {
        render_node(child, ctx);
    }
    ctx.push_raw("</a>");
}

fn render_image(img: &markdown::mdast::Image, ctx: &mut RenderContext<'_>) {
    let safe = sanitize_url(&img.url);
    if safe.is_empty() {
        log::debug!("image source rejected: {}", img.url);
        ctx.push_text(&img.alt);
        return;
    }

    ctx.push_raw(&format!(
        "<img src=\"{}\" alt=\"{}\"",
        escape_attr(&safe),
        escape_attr(&img.alt)
    ));
    if let Some(title) = &img.title {
        ctx.push_raw(&format!(" title=\"{}\"", escape_attr(title)));
    }
    ctx.push_raw(" loading=\"lazy\" decoding=\"async\" />");
}

fn render_code(code: &markdown::mdast::Code, ctx: &mut RenderContext<'_>) {
    let lang = code.lang.as_deref().map(str::trim).unwrap_or_default();

    if matches!(lang, "mermaid" | "mmd") {
        let Some(hub) = ctx.diagrams else {
            ctx.push_raw(&diagram::fallback_code_block(&code.value));
            return;
        };
        let id = hub.next_placeholder_id();
        hub.enqueue(&id, &code.value);
        ctx.push_raw(&format!(
            "<div class=\"pet-diagram\" id=\"{id}\" data-mermaid-code=\"{}\">{}</div>",
            escape_attr(&code.value),
            diagram::fallback_code_block(&code.value)
        ));
        return;
    }

    if lang.is_empty() {
        ctx.push_raw("<pre><code>");
    } else {
        ctx.push_raw(&format!(
            "<pre><code class=\"language-{}\">",
            escape_attr(lang)
        ));
    }
    ctx.push_text(&code.value);
    ctx.push_raw("</code></pre>");
}

fn render_list_item(item: &markdown::mdast::ListItem, ctx: &mut RenderContext<'_>) {
    match item.checked {
        Some(checked) => {
            ctx.push_raw("<li class=\"task-list-item\">");
            ctx.push_raw(&format!(
                "<input type=\"checkbox\" disabled{} />",
                if checked { " checked" } else { "" }
            ));
            for child in &item.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</li>");
        }
        None => {
            ctx.push_raw("<li>");
            for child in &item.children {
                render_node(child, ctx);
            }
            ctx.push_raw("</li>");
        }
    }
}

fn render_table(table: &markdown::mdast::Table, ctx: &mut RenderContext<'_>) {
    ctx.push_raw("<table>");

    ctx.push_raw("<thead>");
    if let Some(Node::TableRow(row)) = table.children.first() {
        render_table_row(row, ctx, true, &table.align);
    }
    ctx.push_raw("</thead>");

    if table.children.len() > 1 {
        ctx.push_raw("<tbody>");
        for row in table.children.iter().skip(1) {
            if let Node::TableRow(r) = row {
                render_table_row(r, ctx, false, &table.align);
            }
        }
        ctx.push_raw("</tbody>");
    }

    ctx.push_raw("</table>");
}

fn render_table_row(
    row: &markdown::mdast::TableRow,
    ctx: &mut RenderContext<'_>,
    is_header: bool,
    aligns: &[AlignKind],
) {
    ctx.push_raw("<tr>");
    for (i, cell) in row.children.iter().enumerate() {
        let Node::TableCell(cell) = cell else {
            continue;
        };
        let tag = if is_header { "th" } else { "td" };

        // Alignment travels as an inline style so it survives the CSS
        // allow-list rather than a stripped `align` attribute.
        let style = match aligns.get(i) {
            Some(AlignKind::Left) => " style=\"text-align: left\"",
            Some(AlignKind::Right) => " style=\"text-align: right\"",
            Some(AlignKind::Center) => " style=\"text-align: center\"",
            _ => "",
        };

        ctx.push_raw(&format!("<{tag}{style}>"));
        for child in &cell.children {
            render_node(child, ctx);
        }
        ctx.push_raw(&format!("</{tag}>"));
    }
    ctx.push_raw("</tr>");
}
