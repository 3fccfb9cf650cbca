//! Hyperlink and image URL validation.
//!
//! Every `href`/`src` that reaches the shared surface must either carry an
//! allow-listed scheme or be relative to the surface itself. Anything else,
//! including unparsable input, is rejected outright.

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

const SAFE_PREFIXES: &[&str] = &["#", "/", "./", "../"];

/// Pasted markdown often wraps URLs in backticks or autolink brackets,
/// sometimes several layers deep.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Validates a raw `href`/`src` value.
///
/// Returns the accepted URL unchanged, or an empty string when the value
/// must not reach the output. Fragment and path-relative prefixes (`#`, `/`,
/// `./`, `../`) are accepted verbatim; explicit schemes are checked against
/// `http`/`https`/`mailto`; scheme-less values resolve against the current
/// origin and are accepted as-is.
pub fn sanitize_url(href: &str) -> String {
    let unwrapped = unwrap_decorations(href);
    if unwrapped.is_empty() {
        return String::new();
    }

    // Control characters make the value unparsable as a URL; a browser
    // would either reject it or let tab/newline stripping resurrect a
    // scheme we just failed to see.
    if unwrapped.chars().any(|c| c.is_ascii_control()) {
        log::debug!("rejected URL with control characters");
        return String::new();
    }

    if SAFE_PREFIXES.iter().any(|p| unwrapped.starts_with(p)) {
        return unwrapped.to_string();
    }

    match scheme_of(unwrapped) {
        Scheme::None => unwrapped.to_string(),
        Scheme::Named(scheme) => {
            if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
                unwrapped.to_string()
            } else {
                log::debug!("rejected URL scheme: {scheme}");
                String::new()
            }
        }
        Scheme::Invalid => {
            log::debug!("rejected unparsable URL");
            String::new()
        }
    }
}

/// Strips up to [`MAX_UNWRAP_DEPTH`] layers of backtick or angle-bracket
/// wrapping, trimming whitespace between layers.
fn unwrap_decorations(href: &str) -> &str {
    let mut value = href.trim();
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner = if value.len() >= 2 && value.starts_with('`') && value.ends_with('`') {
            &value[1..value.len() - 1]
        } else if value.len() >= 2 && value.starts_with('<') && value.ends_with('>') {
            &value[1..value.len() - 1]
        } else {
            return value;
        };
        value = inner.trim();
    }
    value
}

enum Scheme {
    /// No scheme; the value is relative to the current origin.
    None,
    /// A well-formed scheme, lowercased.
    Named(String),
    /// A colon appears where a scheme should be but the prefix is not a
    /// valid scheme token.
    Invalid,
}

/// Classifies the scheme position of a URL the way origin resolution would:
/// the scheme is everything before the first `:` that precedes any
/// `/`, `?`, or `#`, and must be `[A-Za-z][A-Za-z0-9+.-]*`.
fn scheme_of(value: &str) -> Scheme {
    for (i, ch) in value.char_indices() {
        match ch {
            ':' => {
                let candidate = &value[..i];
                let mut chars = candidate.chars();
                let valid = match chars.next() {
                    Some(first) if first.is_ascii_alphabetic() => chars
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')),
                    _ => false,
                };
                return if valid {
                    Scheme::Named(candidate.to_ascii_lowercase())
                } else {
                    Scheme::Invalid
                };
            }
            '/' | '?' | '#' => return Scheme::None,
            _ => {}
        }
    }
    Scheme::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert_eq!(sanitize_url("https://x.com/a"), "https://x.com/a");
        assert_eq!(sanitize_url("http://example.org"), "http://example.org");
        assert_eq!(sanitize_url("HTTPS://X.COM"), "HTTPS://X.COM");
    }

    #[test]
    fn accepts_mailto() {
        assert_eq!(sanitize_url("mailto:a@b.com"), "mailto:a@b.com");
    }

    #[test]
    fn accepts_relative_prefixes() {
        assert_eq!(sanitize_url("/relative/path"), "/relative/path");
        assert_eq!(sanitize_url("#anchor"), "#anchor");
        assert_eq!(sanitize_url("./sibling.md"), "./sibling.md");
        assert_eq!(sanitize_url("../up/one"), "../up/one");
    }

    #[test]
    fn accepts_scheme_less_values() {
        assert_eq!(sanitize_url("docs/guide"), "docs/guide");
        assert_eq!(sanitize_url("page?q=1"), "page?q=1");
    }

    #[test]
    fn rejects_script_schemes() {
        assert_eq!(sanitize_url("javascript:alert(1)"), "");
        assert_eq!(sanitize_url("vbscript:msgbox(1)"), "");
        assert_eq!(sanitize_url("data:text/html;base64,PHNjcmlwdD4="), "");
        assert_eq!(sanitize_url("JaVaScRiPt:alert(1)"), "");
    }

    #[test]
    fn rejects_control_character_smuggling() {
        assert_eq!(sanitize_url("java\tscript:alert(1)"), "");
        assert_eq!(sanitize_url("java\nscript:alert(1)"), "");
        assert_eq!(sanitize_url("javascript\u{0}:alert(1)"), "");
    }

    #[test]
    fn rejects_invalid_scheme_tokens() {
        assert_eq!(sanitize_url("ja va:alert(1)"), "");
        assert_eq!(sanitize_url("1http:foo"), "");
    }

    #[test]
    fn unwraps_backticks_and_brackets() {
        assert_eq!(sanitize_url("`https://x.com`"), "https://x.com");
        assert_eq!(sanitize_url("<https://x.com>"), "https://x.com");
        assert_eq!(sanitize_url("<`<https://x.com>`>"), "https://x.com");
    }

    #[test]
    fn unwrapping_does_not_rescue_bad_schemes() {
        assert_eq!(sanitize_url("`javascript:alert(1)`"), "");
    }

    #[test]
    fn unwrap_depth_is_bounded() {
        // Five layers leave one wrapper in place, which then fails scheme
        // classification.
        assert_eq!(sanitize_url("`````https://x.com`````"), "");
    }

    #[test]
    fn empty_input_rejected() {
        assert_eq!(sanitize_url(""), "");
        assert_eq!(sanitize_url("   "), "");
        assert_eq!(sanitize_url("``"), "");
    }
}
