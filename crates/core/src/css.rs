//! Inline-style value validation.
//!
//! Author-supplied `style` attributes are reduced to a fixed set of layout
//! and typography properties with per-property value checks. The output is a
//! canonical `prop: value; …` string, or nothing when no declaration
//! survives.

/// Substrings that disqualify an entire declaration list, regardless of
/// which declaration carries them.
const POISON_NEEDLES: &[&str] = &["expression(", "javascript:", "vbscript:", "url("];

const LENGTH_UNITS: &[&str] = &["px", "em", "rem", "%", "vh", "vw"];

/// Lengths outside this range are layout attacks (offscreen overlays,
/// viewport-filling click shields), not styling.
const LENGTH_BOUND: f64 = 2000.0;

/// Validates an inline-style declaration list.
///
/// Returns the surviving declarations re-joined as `prop: value` pairs, or
/// `None` when nothing valid remains. The whole list is rejected when it
/// contains script-capable CSS constructs anywhere.
pub fn sanitize_style(style: &str) -> Option<String> {
    let lowered = style.to_ascii_lowercase();
    for needle in POISON_NEEDLES {
        if lowered.contains(needle) {
            log::debug!("rejected style containing {needle:?}");
            return None;
        }
    }

    let mut kept = Vec::new();
    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if value_allowed(&property, value) {
            kept.push(format!("{property}: {value}"));
        }
    }

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

fn value_allowed(property: &str, value: &str) -> bool {
    match property {
        "color" | "background-color" | "border-color" | "outline-color" => is_color(value),
        "width" | "height" | "max-width" | "max-height" | "min-width" | "min-height"
        | "margin" | "margin-top" | "margin-right" | "margin-bottom" | "margin-left"
        | "padding" | "padding-top" | "padding-right" | "padding-bottom" | "padding-left"
        | "font-size" | "border-radius" | "border-width" | "gap" | "letter-spacing"
        | "text-indent" => is_length(value),
        "line-height" => is_length(value) || is_bounded_number(value),
        "display" => matches_enum(
            value,
            &["block", "inline", "inline-block", "flex", "inline-flex", "grid", "none"],
        ),
        "text-align" => matches_enum(value, &["left", "right", "center", "justify"]),
        "vertical-align" => matches_enum(value, &["baseline", "top", "middle", "bottom"]),
        "white-space" => matches_enum(value, &["normal", "nowrap", "pre", "pre-wrap", "pre-line"]),
        "word-break" => matches_enum(value, &["normal", "break-all", "break-word", "keep-all"]),
        "overflow" | "overflow-x" | "overflow-y" => {
            matches_enum(value, &["visible", "hidden", "scroll", "auto"])
        }
        "border-style" => is_border_style(value),
        "font-weight" => is_font_weight(value),
        "font-style" => matches_enum(value, &["normal", "italic", "oblique"]),
        "text-decoration" => {
            matches_enum(value, &["none", "underline", "line-through", "overline"])
        }
        "border" => is_border_shorthand(value),
        _ => false,
    }
}

fn matches_enum(value: &str, allowed: &[&str]) -> bool {
    let lowered = value.to_ascii_lowercase();
    allowed.contains(&lowered.as_str())
}

fn is_border_style(value: &str) -> bool {
    matches_enum(value, &["none", "solid", "dashed", "dotted", "double"])
}

fn is_font_weight(value: &str) -> bool {
    if matches_enum(value, &["normal", "bold", "bolder", "lighter"]) {
        return true;
    }
    matches!(
        value.parse::<u32>(),
        Ok(weight) if (100..=900).contains(&weight) && weight % 100 == 0
    )
}

/// `<number><unit>` within the length bound, or a bare `0`.
fn is_length(value: &str) -> bool {
    let value = value.trim();
    if value == "0" {
        return true;
    }
    let Some(unit) = LENGTH_UNITS.iter().find(|unit| {
        value.len() > unit.len() && value.to_ascii_lowercase().ends_with(*unit)
    }) else {
        return false;
    };
    let magnitude = &value[..value.len() - unit.len()];
    matches!(
        magnitude.parse::<f64>(),
        Ok(n) if n.is_finite() && (-LENGTH_BOUND..=LENGTH_BOUND).contains(&n)
    )
}

/// Unitless multiplier for `line-height`.
fn is_bounded_number(value: &str) -> bool {
    matches!(value.parse::<f64>(), Ok(n) if n.is_finite() && (0.0..=100.0).contains(&n))
}

fn is_color(value: &str) -> bool {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return (hex.len() == 3 || hex.len() == 6)
            && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }
    let lowered = value.to_ascii_lowercase();
    if let Some(args) = lowered
        .strip_prefix("rgba(")
        .or_else(|| lowered.strip_prefix("rgb("))
    {
        return is_rgb_args(args);
    }
    // Bare keyword colors: `red`, `rebeccapurple`, `transparent`, …
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphabetic())
}

fn is_rgb_args(args: &str) -> bool {
    let Some(args) = args.strip_suffix(')') else {
        return false;
    };
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return false;
    }
    let channels_ok = parts[..3]
        .iter()
        .all(|part| matches!(part.parse::<i64>(), Ok(c) if (0..=255).contains(&c)));
    let alpha_ok = match parts.get(3) {
        Some(alpha) => matches!(alpha.parse::<f64>(), Ok(a) if (0.0..=1.0).contains(&a)),
        None => true,
    };
    channels_ok && alpha_ok
}

/// `border: <width> <style> <color>`, fixed order, all three parts.
fn is_border_shorthand(value: &str) -> bool {
    let parts: Vec<&str> = value.split_whitespace().collect();
    parts.len() == 3 && is_length(parts[0]) && is_border_style(parts[1]) && is_color(parts[2])
}
