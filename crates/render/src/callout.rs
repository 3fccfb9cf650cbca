//! Metadata callout rendering.
//!
//! A successfully parsed frontmatter mapping is surfaced to readers as a
//! `pet-tip` callout above the document body: the well-known keys get
//! dedicated slots, everything else renders generically so authors never
//! lose data by adding fields.

use serde_json::Value;

use crate::dom::{escape_attr, escape_text};

/// Keys with dedicated callout slots; everything else renders generically.
const KNOWN_KEYS: &[&str] = &[
    "title",
    "name",
    "id",
    "impact",
    "type",
    "description",
    "impactDescription",
    "tags",
];

/// Maps an author-supplied admonition name onto the fixed variant set.
///
/// `gotcha` is a legacy alias for `warning`; anything else unknown is
/// rejected so variants can never smuggle markup into a class attribute.
pub(crate) fn normalize_admonition(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "note" => Some("note"),
        "info" => Some("info"),
        "warning" => Some("warning"),
        "danger" => Some("danger"),
        "caution" => Some("caution"),
        "success" => Some("success"),
        "gotcha" => Some("warning"),
        _ => None,
    }
}

/// Renders the metadata callout for a parsed frontmatter value.
///
/// Applies only to a plain mapping; anything else, or a mapping with nothing
/// displayable, yields an empty string.
pub fn render_frontmatter_callout(frontmatter: &Value) -> String {
    let Value::Object(map) = frontmatter else {
        return String::new();
    };
    if map.is_empty() {
        return String::new();
    }

    let title = first_scalar(map, &["title", "name", "id"]);
    let description = first_scalar(map, &["description", "impactDescription"]);
    let impact = map.get("impact").and_then(Value::as_str);
    let kind = map.get("type").and_then(Value::as_str);
    let variant = callout_variant(impact, kind);

    let mut body = String::new();
    if let Some(title) = title {
        body.push_str(&format!(
            "<div class=\"pet-tip__title\">{}</div>",
            escape_text(&title)
        ));
    }
    if let Some(description) = description {
        body.push_str(&format!(
            "<p class=\"pet-tip__description\">{}</p>",
            escape_text(&description)
        ));
    }
    if let Some(tags) = map.get("tags").and_then(Value::as_array)
        && !tags.is_empty()
    {
        body.push_str(&chip_row("tags", tags));
    }

    for (key, value) in map {
        if KNOWN_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => body.push_str(&chip_row(key, items)),
            Value::Object(_) => {
                let pretty =
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
                body.push_str(&format!(
                    "<pre class=\"pet-tip__json\" title=\"{}\"><code>{}</code></pre>",
                    escape_attr(key),
                    escape_text(&pretty)
                ));
            }
            _ => {
                if let Some(text) = scalar_display(value) {
                    body.push_str(&format!(
                        "<div class=\"pet-tip__field\"><span class=\"pet-tip__key\">{}</span> {}</div>",
                        escape_text(key),
                        escape_text(&text)
                    ));
                }
            }
        }
    }

    if body.is_empty() {
        return String::new();
    }
    format!("<div class=\"pet-tip pet-tip--{variant}\">{body}</div>")
}

/// Variant precedence: impact substring, then the admonition enum on
/// `type`, then `info`.
fn callout_variant(impact: Option<&str>, kind: Option<&str>) -> &'static str {
    if let Some(impact) = impact {
        let lowered = impact.to_ascii_lowercase();
        if lowered.contains("high") {
            return "danger";
        }
        if lowered.contains("medium") {
            return "warning";
        }
        if lowered.contains("low") {
            return "info";
        }
    }
    if let Some(kind) = kind
        && let Some(variant) = normalize_admonition(kind)
    {
        return variant;
    }
    "info"
}

fn chip_row(label: &str, items: &[Value]) -> String {
    let chips: String = items
        .iter()
        .filter_map(scalar_display)
        .map(|text| format!("<code class=\"pet-chip\">{}</code>", escape_text(&text)))
        .collect();
    if chips.is_empty() {
        return String::new();
    }
    format!(
        "<div class=\"pet-tip__tags\" title=\"{}\">{}</div>",
        escape_attr(label),
        chips
    )
}

fn first_scalar(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_display)
}

fn scalar_display(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn high_impact_with_tags() {
        let html = render_frontmatter_callout(&json!({ "impact": "high", "tags": ["a", "b"] }));
        assert!(html.contains("pet-tip--danger"));
        assert_eq!(html.matches("<code class=\"pet-chip\">").count(), 2);
        assert!(html.contains(">a</code>"));
        assert!(html.contains(">b</code>"));
    }

    #[test]
    fn impact_wins_over_type() {
        let html = render_frontmatter_callout(&json!({ "impact": "medium", "type": "danger", "title": "t" }));
        assert!(html.contains("pet-tip--warning"));
    }

    #[test]
    fn type_enum_fallback_and_gotcha_alias() {
        let html = render_frontmatter_callout(&json!({ "type": "gotcha", "title": "t" }));
        assert!(html.contains("pet-tip--warning"));

        let html = render_frontmatter_callout(&json!({ "type": "success", "title": "t" }));
        assert!(html.contains("pet-tip--success"));

        let html = render_frontmatter_callout(&json!({ "type": "sparkly", "title": "t" }));
        assert!(html.contains("pet-tip--info"));
    }

    #[test]
    fn title_aliases() {
        let html = render_frontmatter_callout(&json!({ "name": "From name" }));
        assert!(html.contains("pet-tip__title"));
        assert!(html.contains("From name"));
    }

    #[test]
    fn titles_are_escaped() {
        let html = render_frontmatter_callout(&json!({ "title": "<script>x</script>" }));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn unknown_scalar_keys_render_as_fields() {
        let html = render_frontmatter_callout(&json!({ "title": "t", "owner": "ada" }));
        assert!(html.contains("pet-tip__key"));
        assert!(html.contains("owner"));
        assert!(html.contains("ada"));
    }

    #[test]
    fn unknown_object_keys_render_as_json_block() {
        let html = render_frontmatter_callout(&json!({ "title": "t", "meta": { "a": 1 } }));
        assert!(html.contains("pet-tip__json"));
        assert!(html.contains("&quot;a&quot;") || html.contains("\"a\""));
    }

    #[test]
    fn non_mapping_or_empty_yields_nothing() {
        assert_eq!(render_frontmatter_callout(&json!(null)), "");
        assert_eq!(render_frontmatter_callout(&json!(["a"])), "");
        assert_eq!(render_frontmatter_callout(&json!({})), "");
        assert_eq!(render_frontmatter_callout(&json!({ "tags": [] })), "");
    }
}
