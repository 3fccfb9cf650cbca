//! The public rendering pipeline.
//!
//! Entry points for hosts: full markdown rendering, outline extraction, and
//! the cheap streaming render for in-flight content. All three are total:
//! no input makes them fail, and everything they return has been through
//! the sanitizer.

use std::sync::Arc;

use petmark_core::{Slugger, split_frontmatter};

use crate::callout::render_frontmatter_callout;
use crate::diagram::{DiagramHub, EngineLoader};
use crate::render::{RenderContext, TocEntry, collect_headings, render_node};
use crate::sanitize::{Sanitizer, sanitize};

/// Options controlling a single render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Keep the metadata block in the body instead of extracting a callout.
    pub keep_frontmatter: bool,
    /// Render single newlines as hard breaks.
    pub breaks: bool,
    /// Enable GitHub Flavored Markdown constructs.
    pub gfm: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            keep_frontmatter: false,
            breaks: false,
            gfm: true,
        }
    }
}

/// Builds the markdown engine options for a render call.
///
/// Raw HTML is always enabled: custom widget tags must reach the sanitizer,
/// which is the safety boundary. The engine's own frontmatter handling stays
/// off because the block is split before the body is parsed.
pub(crate) fn engine_options(options: &RenderOptions) -> markdown::ParseOptions {
    let mut constructs = markdown::Constructs {
        frontmatter: false,
        code_indented: true,
        html_flow: true,
        html_text: true,
        ..Default::default()
    };

    if options.gfm {
        constructs.gfm_autolink_literal = true;
        constructs.gfm_strikethrough = true;
        constructs.gfm_table = true;
        constructs.gfm_task_list_item = true;
    }

    markdown::ParseOptions {
        constructs,
        ..markdown::ParseOptions::default()
    }
}

/// The document pipeline: frontmatter split, body render, widget expansion,
/// sanitization, and diagram scheduling.
///
/// One `Pipeline` is built by the host and shared; all per-render state
/// (slug counters, parsed trees) is call-scoped. The diagram hub is the
/// only cross-call state and is idempotent by construction.
pub struct Pipeline {
    diagrams: Arc<DiagramHub>,
}

impl Pipeline {
    /// A pipeline without a diagram engine; diagram blocks degrade to
    /// static code blocks when drained.
    pub fn new() -> Self {
        Self {
            diagrams: Arc::new(DiagramHub::new()),
        }
    }

    /// A pipeline whose diagram engine loads lazily through `loader`.
    pub fn with_diagram_loader(loader: EngineLoader) -> Self {
        Self {
            diagrams: Arc::new(DiagramHub::with_loader(loader)),
        }
    }

    /// The diagram hub, for hosts that drain deferred renders.
    pub fn diagrams(&self) -> &DiagramHub {
        &self.diagrams
    }

    /// Renders a full document to sanitized HTML.
    pub fn render_markdown_html(&self, text: &str, options: &RenderOptions) -> String {
        let (callout, body) = self.split_document(text, options);

        let hook = |md: &str| self.body_html(md, options);
        let sanitizer = Sanitizer::new()
            .with_markdown(&hook)
            .with_diagrams(&self.diagrams);

        if body.trim().is_empty() {
            if callout.is_empty() {
                return String::new();
            }
            return sanitizer.sanitize(&callout);
        }

        let body_html = self.body_html(body, options);
        sanitizer.sanitize(&format!("{callout}{body_html}"))
    }

    /// Extracts a flat outline with the same anchor ids a render produces,
    /// filtered to `[min_depth, max_depth]`.
    pub fn markdown_toc(
        &self,
        text: &str,
        options: &RenderOptions,
        min_depth: u8,
        max_depth: u8,
    ) -> Vec<TocEntry> {
        let body = split_frontmatter(text).body;

        let headings = match markdown::to_mdast(body, &engine_options(options)) {
            Ok(root) => {
                let mut slugger = Slugger::new();
                let mut out = Vec::new();
                collect_headings(&root, &mut slugger, &mut out);
                out
            }
            Err(err) => {
                log::debug!("outline falling back to line scan: {err}");
                heading_scan(body)
            }
        };

        headings
            .into_iter()
            .filter(|entry| entry.level >= min_depth && entry.level <= max_depth)
            .collect()
    }

    /// Cheap render for in-flight content: the callout when the body is
    /// still empty, otherwise escaped text with hard line breaks. No
    /// markdown parsing.
    pub fn render_streaming_html(&self, text: &str) -> String {
        let parsed = split_frontmatter(text);
        let callout = parsed
            .frontmatter
            .as_ref()
            .map(render_frontmatter_callout)
            .unwrap_or_default();

        if parsed.body.trim().is_empty() {
            if callout.is_empty() {
                return String::new();
            }
            return sanitize(&callout);
        }

        sanitize(&format!("{callout}{}", escape_with_breaks(parsed.body)))
    }

    fn split_document<'a>(&self, text: &'a str, options: &RenderOptions) -> (String, &'a str) {
        if options.keep_frontmatter {
            return (String::new(), text);
        }
        let parsed = split_frontmatter(text);
        let callout = parsed
            .frontmatter
            .as_ref()
            .map(render_frontmatter_callout)
            .unwrap_or_default();
        (callout, parsed.body)
    }

    /// Body markdown to HTML. Total: an engine failure degrades to escaped,
    /// line-broken text.
    fn body_html(&self, body: &str, options: &RenderOptions) -> String {
        match markdown::to_mdast(body, &engine_options(options)) {
            Ok(root) => {
                let mut ctx = RenderContext::new(options.breaks, Some(self.diagrams.as_ref()));
                render_node(&root, &mut ctx);
                ctx.finish().0
            }
            Err(err) => {
                log::warn!("markdown engine rejected input, using escaped fallback: {err}");
                escape_with_breaks(body)
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_with_breaks(text: &str) -> String {
    crate::dom::escape_text(text).replace('\n', "<br />\n")
}

/// Outline fallback: a fence-aware scan for `#` heading lines.
fn heading_scan(body: &str) -> Vec<TocEntry> {
    let mut slugger = Slugger::new();
    let mut out = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let level = trimmed.bytes().take_while(|b| *b == b'#').count();
        if (1..=6).contains(&level) && trimmed.as_bytes().get(level) == Some(&b' ') {
            let text = trimmed[level..].trim();
            out.push(TocEntry {
                id: slugger.next_slug(text),
                level: level as u8,
                text: text.to_string(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_becomes_callout_above_body() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_markdown_html(
            "---\ntitle: Release notes\nimpact: low\n---\n# Hello",
            &RenderOptions::default(),
        );
        assert!(html.contains("pet-tip--info"));
        assert!(html.contains("Release notes"));
        assert!(html.contains("<h1 id=\"hello\">"));
        let callout_pos = html.find("pet-tip").expect("callout present");
        let body_pos = html.find("<h1").expect("body present");
        assert!(callout_pos < body_pos);
    }

    #[test]
    fn empty_body_returns_callout_alone() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_markdown_html(
            "---\nimpact: high\ntags: [a, b]\n---\n",
            &RenderOptions::default(),
        );
        assert!(html.starts_with("<div class=\"pet-tip pet-tip--danger\">"));
        assert_eq!(html.matches("pet-chip").count(), 2);
        assert!(!html.contains("<p>"));
        assert!(!html.contains("<h1"));
    }

    #[test]
    fn empty_document_renders_empty() {
        let pipeline = Pipeline::new();
        assert_eq!(
            pipeline.render_markdown_html("", &RenderOptions::default()),
            ""
        );
        assert_eq!(
            pipeline.render_markdown_html("   \n", &RenderOptions::default()),
            ""
        );
    }

    #[test]
    fn keep_frontmatter_renders_block_as_text() {
        let pipeline = Pipeline::new();
        let options = RenderOptions {
            keep_frontmatter: true,
            ..RenderOptions::default()
        };
        let html = pipeline.render_markdown_html("---\ntitle: X\n---\nbody", &options);
        assert!(!html.contains("pet-tip"));
        assert!(html.contains("body"));
    }

    #[test]
    fn malformed_frontmatter_renders_as_body() {
        let pipeline = Pipeline::new();
        let html =
            pipeline.render_markdown_html("---\ntitle: unterminated", &RenderOptions::default());
        assert!(!html.contains("pet-tip"));
        assert!(html.contains("title: unterminated"));
    }

    #[test]
    fn toc_strips_frontmatter_and_filters_depth() {
        let pipeline = Pipeline::new();
        let text = "---\ntitle: X\n---\n# One\n\n## Two\n\n### Three\n\n## Two";
        let toc = pipeline.markdown_toc(text, &RenderOptions::default(), 2, 2);
        let ids: Vec<&str> = toc.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["two", "two-2"]);
    }

    #[test]
    fn toc_ignores_headings_inside_fences() {
        let pipeline = Pipeline::new();
        let text = "# Real\n\n```\n# Not a heading\n```\n";
        let toc = pipeline.markdown_toc(text, &RenderOptions::default(), 1, 6);
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].id, "real");
    }

    #[test]
    fn heading_scan_fallback_behaves_like_walker() {
        let entries = heading_scan("# One\n```\n# Skipped\n```\n## Two");
        let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[test]
    fn streaming_render_escapes_and_breaks() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_streaming_html("a <script>x</script>\nb **not bold**");
        assert!(!html.contains("<script"));
        assert!(html.contains("<br />"));
        assert!(html.contains("**not bold**"));
    }

    #[test]
    fn streaming_render_callout_only_for_empty_body() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_streaming_html("---\nimpact: high\n---\n");
        assert!(html.contains("pet-tip--danger"));

        assert_eq!(pipeline.render_streaming_html(""), "");
    }

    #[test]
    fn widget_tags_in_body_are_expanded_and_sanitized() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_markdown_html(
            "<note type=\"danger\">Watch **out**</note>",
            &RenderOptions::default(),
        );
        assert!(html.contains("pet-tip--danger"));
        // Container text re-rendered as markdown through the pipeline hook.
        assert!(html.contains("<strong>out</strong>"));
    }

    #[test]
    fn diagram_fence_schedules_deferred_render() {
        let pipeline = Pipeline::new();
        let html = pipeline.render_markdown_html(
            "```mermaid\ngraph TD; a-->b\n```",
            &RenderOptions::default(),
        );
        assert!(html.contains("pet-diagram"));
        assert!(html.contains("data-mermaid-code"));
        assert!(pipeline.diagrams().has_pending());

        let updates = pipeline.diagrams().drain();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].target_id.starts_with("pet-diagram-"));
        assert!(updates[0].html.contains("language-mermaid"));
    }

    #[test]
    fn gfm_can_be_disabled() {
        let pipeline = Pipeline::new();
        let options = RenderOptions {
            gfm: false,
            ..RenderOptions::default()
        };
        let html = pipeline.render_markdown_html("| a | b |\n|---|---|\n| 1 | 2 |", &options);
        assert!(!html.contains("<table>"));
    }
}
