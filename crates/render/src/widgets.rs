//! Widget expansion: custom author tags become plain HTML structures.
//!
//! This pass runs before the allow-list walk, in a fixed order: `<mermaid>`
//! extraction, markdown re-rendering inside container tags, `<cardgroup>`
//! unwrapping, tab-group rebuilding, card rebuilding, admonition
//! rebuilding. Each step assumes the previous ones already normalized the
//! tree. Everything produced here still goes through the allow-list pass,
//! so expansion never needs to be trusted.

use petmark_core::sanitize_url;

use crate::callout::normalize_admonition;
use crate::diagram::DiagramHub;
use crate::dom::{self, HtmlElement, HtmlNode};

/// Collaborators the expansion steps may use. Both are optional: a bare
/// sanitizer expands widgets without markdown re-rendering or diagram
/// scheduling.
pub(crate) struct WidgetEnv<'a> {
    /// Body-markdown renderer used for container tag content.
    pub markdown: Option<&'a dyn Fn(&str) -> String>,
    /// Diagram scheduling and placeholder ids.
    pub diagrams: Option<&'a DiagramHub>,
}

/// Tags whose text content is authored as markdown.
const CONTAINER_TAGS: &[&str] = &[
    "tabs", "card", "tab", "tabitem", "note", "info", "warning", "danger", "caution", "success",
];

const ADMONITION_TAGS: &[&str] = &["note", "info", "warning", "danger", "caution", "success"];

const TAB_TAGS: &[&str] = &["tab", "tabitem"];

const LABEL_ATTRS: &[&str] = &["label", "title", "name", "value"];

/// Nested containers re-render through at most this many passes.
const MAX_MARKDOWN_PASSES: usize = 5;

/// Internal marker for already-rendered containers; stripped later by the
/// allow-list walk.
const RENDERED_MARKER: &str = "data-pet-md-rendered";

pub(crate) fn expand_widgets(nodes: Vec<HtmlNode>, env: &WidgetEnv<'_>) -> Vec<HtmlNode> {
    let nodes = expand_mermaid(nodes, env);
    let nodes = render_container_markdown(nodes, env);
    let nodes = unwrap_card_groups(nodes);
    let nodes = rebuild_tab_groups(nodes);
    let nodes = rebuild_cards(nodes);
    rebuild_admonitions(nodes)
}

// --- step 1: <mermaid> ---------------------------------------------------

fn expand_mermaid(nodes: Vec<HtmlNode>, env: &WidgetEnv<'_>) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .flat_map(|node| match node {
            HtmlNode::Element(el) if el.tag == "mermaid" => {
                let source = dedent(&mermaid_source(&el));
                diagram_container(&source, env)
            }
            HtmlNode::Element(mut el) => {
                el.children = expand_mermaid(std::mem::take(&mut el.children), env);
                vec![HtmlNode::Element(el)]
            }
            other => vec![other],
        })
        .collect()
}

fn mermaid_source(el: &HtmlElement) -> String {
    for name in ["md", "markdown", "text", "content"] {
        if let Some(value) = el.attr(name)
            && !value.trim().is_empty()
        {
            return value.to_string();
        }
    }
    el.text_content()
}

/// Builds the placeholder for one diagram and schedules its render.
pub(crate) fn diagram_container(source: &str, env: &WidgetEnv<'_>) -> Vec<HtmlNode> {
    let Some(hub) = env.diagrams else {
        return vec![static_code_block(source)];
    };
    let id = hub.next_placeholder_id();
    hub.enqueue(&id, source);

    if let Some(engine) = hub.loaded_engine()
        && let Some(html) = engine.container(&id, source)
    {
        let nodes = dom::parse_fragment(&html);
        if !nodes.is_empty() {
            return nodes;
        }
    }
    vec![default_container(&id, source)]
}

fn static_code_block(source: &str) -> HtmlNode {
    let mut code = HtmlElement::new("code");
    code.set_attr("class", "language-mermaid");
    code.children.push(HtmlNode::Text(source.to_string()));
    let mut pre = HtmlElement::new("pre");
    pre.children.push(HtmlNode::Element(code));
    HtmlNode::Element(pre)
}

fn default_container(id: &str, source: &str) -> HtmlNode {
    let mut container = HtmlElement::new("div");
    container.set_attr("class", "pet-diagram");
    container.set_attr("id", id);
    container.set_attr("data-mermaid-code", source);
    container.children.push(static_code_block(source));
    HtmlNode::Element(container)
}

// --- step 2: markdown inside container tags ------------------------------

fn render_container_markdown(mut nodes: Vec<HtmlNode>, env: &WidgetEnv<'_>) -> Vec<HtmlNode> {
    let Some(markdown) = env.markdown else {
        return nodes;
    };
    for _ in 0..MAX_MARKDOWN_PASSES {
        let mut changed = false;
        nodes = rerender_pass(nodes, markdown, &mut changed);
        if !changed {
            break;
        }
    }
    nodes
}

fn rerender_pass(
    nodes: Vec<HtmlNode>,
    markdown: &dyn Fn(&str) -> String,
    changed: &mut bool,
) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            HtmlNode::Element(mut el) => {
                // Children first: markup generated for this element must
                // wait for the next bounded pass.
                el.children = rerender_pass(std::mem::take(&mut el.children), markdown, changed);
                if CONTAINER_TAGS.contains(&el.tag.as_str()) && el.attr(RENDERED_MARKER).is_none()
                {
                    el.children = std::mem::take(&mut el.children)
                        .into_iter()
                        .flat_map(|child| match child {
                            HtmlNode::Text(text) if !text.trim().is_empty() => {
                                *changed = true;
                                dom::parse_fragment(&markdown(&dedent(&text)))
                            }
                            other => vec![other],
                        })
                        .collect();
                    el.set_attr(RENDERED_MARKER, "1");
                }
                HtmlNode::Element(el)
            }
            other => other,
        })
        .collect()
}

// --- step 3: <cardgroup> -------------------------------------------------

fn unwrap_card_groups(nodes: Vec<HtmlNode>) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            HtmlNode::Element(mut el) => {
                el.children = unwrap_card_groups(std::mem::take(&mut el.children));
                if el.tag == "cardgroup" {
                    let mut group = HtmlElement::new("div");
                    group.set_attr("class", "pet-card-group");
                    group.children = el.children;
                    return HtmlNode::Element(group);
                }
                HtmlNode::Element(el)
            }
            other => other,
        })
        .collect()
}

// --- step 4: tab groups --------------------------------------------------

fn rebuild_tab_groups(nodes: Vec<HtmlNode>) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            HtmlNode::Element(mut el) => {
                if el.tag == "tabs" {
                    return build_tab_group(collect_tab_items(el.children));
                }
                if TAB_TAGS.contains(&el.tag.as_str()) {
                    return build_tab_group(vec![el]);
                }
                if let Some(tab) = lone_wrapped_tab(&el) {
                    return build_tab_group(vec![tab]);
                }
                el.children = rebuild_tab_groups(std::mem::take(&mut el.children));
                HtmlNode::Element(el)
            }
            other => other,
        })
        .collect()
}

fn collect_tab_items(children: Vec<HtmlNode>) -> Vec<HtmlElement> {
    let mut items = Vec::new();
    for child in children {
        match child {
            HtmlNode::Element(el) if TAB_TAGS.contains(&el.tag.as_str()) => items.push(el),
            HtmlNode::Text(text) if text.trim().is_empty() => {}
            HtmlNode::Comment(_) => {}
            other => {
                log::debug!("dropping non-tab child inside tab group: {other:?}");
            }
        }
    }
    items
}

/// A wrapper with no attributes holding exactly one tab element is absorbed
/// into the group built for that tab.
fn lone_wrapped_tab(el: &HtmlElement) -> Option<HtmlElement> {
    if !matches!(el.tag.as_str(), "div" | "p" | "span" | "section") || !el.attrs.is_empty() {
        return None;
    }
    let mut found: Option<&HtmlElement> = None;
    for child in &el.children {
        match child {
            HtmlNode::Element(inner) if TAB_TAGS.contains(&inner.tag.as_str()) => {
                if found.is_some() {
                    return None;
                }
                found = Some(inner);
            }
            HtmlNode::Text(text) if text.trim().is_empty() => {}
            HtmlNode::Comment(_) => {}
            _ => return None,
        }
    }
    found.cloned()
}

fn build_tab_group(items: Vec<HtmlElement>) -> HtmlNode {
    let mut nav = HtmlElement::new("div");
    nav.set_attr("class", "pet-tabs__nav");

    let mut panels = HtmlElement::new("div");
    panels.set_attr("class", "pet-tabs__panels");

    for (index, item) in items.into_iter().enumerate() {
        let label = tab_label(&item, index);

        let mut button = HtmlElement::new("button");
        button.set_attr("type", "button");
        button.set_attr(
            "class",
            if index == 0 {
                "pet-tabs__tab pet-tabs__tab--active"
            } else {
                "pet-tabs__tab"
            },
        );
        button.children.push(HtmlNode::Text(label));
        nav.children.push(HtmlNode::Element(button));

        let mut panel = HtmlElement::new("div");
        panel.set_attr(
            "class",
            if index == 0 {
                "pet-tabs__panel pet-tabs__panel--active"
            } else {
                "pet-tabs__panel"
            },
        );
        panel.children = rebuild_tab_groups(item.children);
        panels.children.push(HtmlNode::Element(panel));
    }

    let mut group = HtmlElement::new("div");
    group.set_attr("class", "pet-tabs");
    group.children = vec![HtmlNode::Element(nav), HtmlNode::Element(panels)];
    HtmlNode::Element(group)
}

fn tab_label(item: &HtmlElement, index: usize) -> String {
    for name in LABEL_ATTRS {
        if let Some(value) = item.attr(name)
            && !value.trim().is_empty()
        {
            return value.trim().to_string();
        }
    }
    format!("Tab {}", index + 1)
}

// --- step 5: cards -------------------------------------------------------

fn rebuild_cards(nodes: Vec<HtmlNode>) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            HtmlNode::Element(mut el) => {
                el.children = rebuild_cards(std::mem::take(&mut el.children));
                if el.tag == "card" {
                    return build_card(el);
                }
                HtmlNode::Element(el)
            }
            other => other,
        })
        .collect()
}

fn build_card(el: HtmlElement) -> HtmlNode {
    let title = el.attr("title").map(str::to_string);
    let icon = el.attr("icon").map(str::to_string);
    let description = el.attr("description").map(str::to_string);
    let href = el
        .attr("href")
        .map(sanitize_url)
        .filter(|href| !href.is_empty());

    let mut card = match &href {
        Some(href) => {
            let mut anchor = HtmlElement::new("a");
            anchor.set_attr("class", "pet-card pet-card--link");
            anchor.set_attr("href", href);
            anchor
        }
        None => {
            let mut div = HtmlElement::new("div");
            div.set_attr("class", "pet-card");
            div
        }
    };

    if icon.is_some() || title.is_some() {
        let mut header = HtmlElement::new("div");
        header.set_attr("class", "pet-card__header");
        if let Some(icon) = icon {
            let mut span = HtmlElement::new("span");
            span.set_attr("class", "pet-card__icon");
            span.children.push(HtmlNode::Text(icon));
            header.children.push(HtmlNode::Element(span));
        }
        if let Some(title) = title {
            let mut slot = HtmlElement::new("div");
            slot.set_attr("class", "pet-card__title");
            slot.children.push(HtmlNode::Text(title));
            header.children.push(HtmlNode::Element(slot));
        }
        card.children.push(HtmlNode::Element(header));
    }

    if let Some(description) = description {
        let mut para = HtmlElement::new("p");
        para.set_attr("class", "pet-card__description");
        para.children.push(HtmlNode::Text(description));
        card.children.push(HtmlNode::Element(para));
    }

    let body_children: Vec<HtmlNode> = el
        .children
        .into_iter()
        .filter(|child| !matches!(child, HtmlNode::Text(t) if t.trim().is_empty()))
        .collect();
    if !body_children.is_empty() {
        let mut body = HtmlElement::new("div");
        body.set_attr("class", "pet-card__body");
        body.children = body_children;
        card.children.push(HtmlNode::Element(body));
    }

    HtmlNode::Element(card)
}

// --- step 6: admonition tags ---------------------------------------------

fn rebuild_admonitions(nodes: Vec<HtmlNode>) -> Vec<HtmlNode> {
    nodes
        .into_iter()
        .map(|node| match node {
            HtmlNode::Element(mut el) => {
                el.children = rebuild_admonitions(std::mem::take(&mut el.children));
                if ADMONITION_TAGS.contains(&el.tag.as_str()) {
                    return build_admonition(el);
                }
                HtmlNode::Element(el)
            }
            other => other,
        })
        .collect()
}

fn build_admonition(el: HtmlElement) -> HtmlNode {
    let variant = ["type", "kind", "variant"]
        .iter()
        .filter_map(|name| el.attr(name))
        .find_map(normalize_admonition)
        .or_else(|| normalize_admonition(&el.tag))
        .unwrap_or("info");
    let title = el.attr("title").map(str::to_string);

    let mut tip = HtmlElement::new("div");
    tip.set_attr("class", &format!("pet-tip pet-tip--{variant}"));

    if let Some(title) = title
        && !title.trim().is_empty()
    {
        let mut slot = HtmlElement::new("div");
        slot.set_attr("class", "pet-tip__title");
        slot.children.push(HtmlNode::Text(title));
        tip.children.push(HtmlNode::Element(slot));
    }

    let mut body = HtmlElement::new("div");
    body.set_attr("class", "pet-tip__body");
    body.children = el.children;
    tip.children.push(HtmlNode::Element(body));

    HtmlNode::Element(tip)
}

// --- shared helpers ------------------------------------------------------

/// Strips the minimum common leading whitespace of non-blank lines.
fn dedent(source: &str) -> String {
    let min = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_ws)
        .min()
        .unwrap_or(0);
    if min == 0 {
        return source.to_string();
    }
    source
        .lines()
        .map(|line| if leading_ws(line) >= min { &line[min..] } else { "" })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_ws(line: &str) -> usize {
    line.bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count()
}
