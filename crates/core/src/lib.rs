#![deny(missing_docs)]
//! Petmark core: metadata block parsing, heading slugs, and safety guards.

/// Inline-style value validation.
pub mod css;
/// Metadata block extraction and the YAML-subset grammar.
pub mod frontmatter;
/// Heading slug generation.
pub mod slug;
/// Hyperlink and image URL validation.
pub mod url;

pub use css::sanitize_style;
pub use frontmatter::{ParsedDocument, split_frontmatter};
pub use slug::Slugger;
pub use url::sanitize_url;
