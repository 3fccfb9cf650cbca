#![deny(missing_docs)]
//! Petmark render: widget expansion, allow-list sanitization, and the
//! markdown pipeline that feeds the shared rendering surface.

/// Metadata callout rendering.
pub mod callout;
/// Diagram collaborator plumbing.
pub mod diagram;
/// Generic HTML tree parsing and serialization.
pub mod dom;
/// The public rendering pipeline.
pub mod pipeline;
/// Markdown AST rendering with safety-guarded overrides.
pub mod render;
/// Allow-list HTML sanitization.
pub mod sanitize;

mod widgets;

pub use callout::render_frontmatter_callout;
pub use diagram::{DiagramEngine, DiagramError, DiagramHub, DiagramUpdate, EngineLoader};
pub use dom::{HtmlElement, HtmlNode};
pub use pipeline::{Pipeline, RenderOptions};
pub use render::TocEntry;
pub use sanitize::{Sanitizer, sanitize};
