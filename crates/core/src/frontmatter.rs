//! Metadata block extraction and the YAML-subset grammar.
//!
//! Author documents may open with a `---`-delimited metadata block. The
//! block is parsed with a deliberately small YAML-compatible grammar:
//! indent-classified mappings and sequences, a scalar layer with inline
//! `[...]` lists and quoted strings, `#` comments, and nothing else. Parsed
//! values are normalized to [`serde_json::Value`].
//!
//! Extraction never fails: a missing closing delimiter, a grammar violation,
//! or any other irregularity degrades to "no metadata, the whole input is
//! body text".

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Result of splitting a document into metadata and body.
#[derive(Debug)]
pub struct ParsedDocument<'a> {
    /// Parsed metadata, when a well-formed block was present.
    pub frontmatter: Option<Value>,
    /// Markdown body. On any parse failure this is the full original input.
    pub body: &'a str,
}

/// Internal parse failures; callers only ever observe the fail-open result.
#[derive(Debug, Error)]
enum MetaError {
    #[error("line {0}: expected a `key: value` entry")]
    ExpectedMapping(usize),
    #[error("line {0}: expected a `- ` sequence item")]
    ExpectedSequence(usize),
    #[error("line {0}: content outside the parsed block")]
    TrailingContent(usize),
}

/// Splits a document into its metadata block and body.
///
/// The block must open with an exact `---` line (leading blank lines are
/// skipped) and close with `---` or `...`. Absence of either delimiter, or
/// any grammar violation inside the block, yields
/// `{ frontmatter: None, body: <input unchanged> }`.
pub fn split_frontmatter(input: &str) -> ParsedDocument<'_> {
    let Some((block_lines, body)) = extract_block(input) else {
        return ParsedDocument {
            frontmatter: None,
            body: input,
        };
    };

    match parse_block(&block_lines) {
        Ok(value) => ParsedDocument {
            frontmatter: Some(value),
            body,
        },
        Err(err) => {
            log::debug!("metadata block rejected, treating document as plain body: {err}");
            ParsedDocument {
                frontmatter: None,
                body: input,
            }
        }
    }
}

/// Locates the delimited block. Returns its lines and the body slice, or
/// `None` when no complete block exists (fail open).
fn extract_block(input: &str) -> Option<(Vec<&str>, &str)> {
    let without_bom = input.strip_prefix('\u{feff}').unwrap_or(input);

    let mut cursor = 0usize;
    loop {
        let (line, next) = next_line(without_bom, cursor)?;
        if line.trim().is_empty() {
            cursor = next;
            continue;
        }
        if !is_opening_fence(line) {
            return None;
        }
        cursor = next;
        break;
    }

    let mut lines = Vec::new();
    let mut scan = cursor;
    loop {
        let (line, next) = next_line(without_bom, scan)?;
        if is_closing_fence(line) {
            return Some((lines, &without_bom[next..]));
        }
        lines.push(line.trim_end_matches('\r'));
        scan = next;
    }
}

fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }
    match input[start..].find('\n') {
        Some(pos) => Some((&input[start..start + pos], start + pos + 1)),
        None => Some((&input[start..], input.len())),
    }
}

fn is_opening_fence(line: &str) -> bool {
    line.trim_end_matches('\r') == "---"
}

fn is_closing_fence(line: &str) -> bool {
    matches!(line.trim_end_matches('\r'), "---" | "...")
}

/// One meaningful (non-blank, non-comment) block line.
struct Line<'a> {
    /// Leading-whitespace depth in columns; tabs count as 4.
    indent: usize,
    /// Trimmed content.
    text: &'a str,
    /// 1-based position inside the block, for diagnostics.
    number: usize,
}

fn meaningful_lines<'a>(raw: &[&'a str]) -> Vec<Line<'a>> {
    let mut lines = Vec::with_capacity(raw.len());
    for (i, line) in raw.iter().enumerate() {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let mut indent = 0usize;
        for b in line.bytes() {
            match b {
                b' ' => indent += 1,
                b'\t' => indent += 4,
                _ => break,
            }
        }
        lines.push(Line {
            indent,
            text,
            number: i + 1,
        });
    }
    lines
}

fn parse_block(raw: &[&str]) -> Result<Value, MetaError> {
    let lines = meaningful_lines(raw);
    if lines.is_empty() {
        return Ok(Value::Null);
    }
    let base = lines[0].indent;
    let (value, next) = parse_node(&lines, 0, base)?;
    if next < lines.len() {
        return Err(MetaError::TrailingContent(lines[next].number));
    }
    Ok(value)
}

/// Parses one block (mapping, sequence, or scalar) whose first line sits at
/// `indent`. Returns the value and the index of the first unconsumed line.
fn parse_node(lines: &[Line], start: usize, indent: usize) -> Result<(Value, usize), MetaError> {
    let first = &lines[start];
    if is_sequence_item(first.text) {
        parse_sequence(lines, start, indent)
    } else if split_entry(first.text).is_some() {
        parse_mapping(lines, start, indent)
    } else {
        Ok((parse_scalar(first.text), start + 1))
    }
}

fn parse_mapping(lines: &[Line], start: usize, indent: usize) -> Result<(Value, usize), MetaError> {
    let mut map = Map::new();
    let mut idx = start;

    while idx < lines.len() {
        let line = &lines[idx];
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(MetaError::ExpectedMapping(line.number));
        }
        if is_sequence_item(line.text) {
            break;
        }
        let Some((key, inline)) = split_entry(line.text) else {
            break;
        };
        idx += 1;

        let value = if inline.is_empty() {
            // Empty value: a deeper block supplies the value, else the key
            // maps to an empty container.
            if idx < lines.len() && lines[idx].indent > indent {
                let child_indent = lines[idx].indent;
                let (value, next) = parse_node(lines, idx, child_indent)?;
                idx = next;
                value
            } else {
                Value::Object(Map::new())
            }
        } else {
            parse_scalar(inline)
        };
        map.insert(key.to_string(), value);
    }

    if map.is_empty() {
        return Err(MetaError::ExpectedMapping(lines[start].number));
    }
    Ok((Value::Object(map), idx))
}

fn parse_sequence(lines: &[Line], start: usize, indent: usize) -> Result<(Value, usize), MetaError> {
    let mut items = Vec::new();
    let mut idx = start;

    while idx < lines.len() {
        let line = &lines[idx];
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(MetaError::ExpectedSequence(line.number));
        }
        if !is_sequence_item(line.text) {
            break;
        }
        let inline = sequence_rest(line.text);
        idx += 1;

        if inline.is_empty() {
            // `- ` alone: the item's value is the deeper block.
            if idx < lines.len() && lines[idx].indent > indent {
                let child_indent = lines[idx].indent;
                let (value, next) = parse_node(lines, idx, child_indent)?;
                idx = next;
                items.push(value);
            } else {
                items.push(Value::Null);
            }
        } else if let Some((key, value_text)) = split_entry(inline) {
            // `- key: value` becomes a single-key mapping item.
            let value = if value_text.is_empty() {
                if idx < lines.len() && lines[idx].indent > indent {
                    let child_indent = lines[idx].indent;
                    let (value, next) = parse_node(lines, idx, child_indent)?;
                    idx = next;
                    value
                } else {
                    Value::Object(Map::new())
                }
            } else {
                parse_scalar(value_text)
            };
            let mut item = Map::new();
            item.insert(key.to_string(), value);
            items.push(Value::Object(item));
        } else {
            items.push(parse_scalar(inline));
        }
    }

    Ok((Value::Array(items), idx))
}

fn is_sequence_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn sequence_rest(text: &str) -> &str {
    if text == "-" { "" } else { text[2..].trim() }
}

/// Splits a `key: value` entry. The colon must be followed by whitespace or
/// end the line, so scalars like `http://x` are not mistaken for entries.
fn split_entry(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b':' {
            continue;
        }
        let key = text[..i].trim();
        if key.is_empty() {
            return None;
        }
        return match bytes.get(i + 1) {
            None => Some((key, "")),
            Some(b' ') | Some(b'\t') => Some((key, text[i + 1..].trim())),
            _ => None,
        };
    }
    None
}

/// Parses a scalar literal: null, bool, number, inline list, quoted string,
/// or raw trimmed text.
fn parse_scalar(text: &str) -> Value {
    let text = text.trim();
    match text {
        "" | "\"\"" | "''" => return Value::String(String::new()),
        "null" | "~" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if text.len() >= 2 && text.starts_with('[') && text.ends_with(']') {
        let inner = text[1..text.len() - 1].trim();
        if inner.is_empty() {
            return Value::Array(Vec::new());
        }
        let items = split_inline_list(inner)
            .into_iter()
            .map(parse_scalar)
            .collect();
        return Value::Array(items);
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Value::String(unescape_double_quoted(&text[1..text.len() - 1]));
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Value::String(text[1..text.len() - 1].to_string());
    }

    if is_number_literal(text) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(Number::from(n));
        }
        if let Ok(f) = text.parse::<f64>()
            && let Some(n) = Number::from_f64(f)
        {
            return Value::Number(n);
        }
    }

    Value::String(text.to_string())
}

/// Optional sign, digits, at most one decimal point. Keeps `1.0.0` and
/// `nan` out of the number path.
fn is_number_literal(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() {
        return false;
    }
    let mut dots = 0usize;
    for b in digits.bytes() {
        match b {
            b'0'..=b'9' => {}
            b'.' => dots += 1,
            _ => return false,
        }
    }
    dots <= 1 && !digits.starts_with('.') && !digits.ends_with('.')
}

/// Splits inline-list elements on commas, respecting one level of quoting.
fn split_inline_list(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, ch) in inner.char_indices() {
        match ch {
            '"' | '\'' => match quote {
                None => quote = Some(ch),
                Some(open) if open == ch => quote = None,
                _ => {}
            },
            ',' if quote.is_none() => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
