//! Heading slug generation.
//!
//! Slugs are derived from heading text and used as anchor ids. Uniqueness is
//! per render call: a fresh [`Slugger`] is created for each document so the
//! same heading text always yields the same first slug.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const MAX_SLUG_CHARS: usize = 96;
const FALLBACK_SLUG: &str = "section";

/// Per-render slug generator with collision counting.
///
/// The first use of a base slug returns it bare; every later use appends
/// `-N` where `N` is the 1-based occurrence count (so the second use is
/// `-2`).
#[derive(Default)]
pub struct Slugger {
    counts: HashMap<String, usize>,
}

impl Slugger {
    /// Creates a new slugger.
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    /// Generates the next unique slug for the given heading text.
    pub fn next_slug(&mut self, text: &str) -> String {
        let base = slug_base(text);
        let entry = self.counts.entry(base.clone()).or_insert(0);
        *entry += 1;
        if *entry == 1 {
            base
        } else {
            format!("{base}-{}", *entry)
        }
    }
}

/// Normalizes heading text into a bare (collision-unaware) slug.
///
/// Steps: decode HTML entities, strip inline tags, decompose and drop
/// combining marks, lowercase, keep `[a-z0-9<CJK>\s_-]`, collapse separator
/// runs to single hyphens, trim edges, prefix `s-` when the result does not
/// start with a letter, cap at 96 chars, fall back to `"section"`.
pub fn slug_base(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    let stripped = strip_inline_tags(&decoded);

    let mut folded = String::with_capacity(stripped.len());
    for ch in stripped.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        for lower in ch.to_lowercase() {
            folded.push(lower);
        }
    }

    let mut slug = String::with_capacity(folded.len());
    let mut pending_separator = false;
    for ch in folded.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || is_cjk(ch) {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_separator = true;
        }
        // Everything else is dropped without acting as a separator.
    }

    if !slug.is_empty() {
        let first = slug.chars().next().unwrap_or_default();
        if !first.is_ascii_lowercase() && !is_cjk(first) {
            slug.insert_str(0, "s-");
        }
    }

    if slug.chars().count() > MAX_SLUG_CHARS {
        slug = slug.chars().take(MAX_SLUG_CHARS).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        slug.push_str(FALLBACK_SLUG);
    }
    slug
}

/// Removes `<...>` spans so markup inside headings does not leak into ids.
fn strip_inline_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Returns true for characters in the common CJK blocks that are kept in
/// slugs verbatim.
fn is_cjk(ch: char) -> bool {
    use std::ops::RangeInclusive;

    const RANGES: &[RangeInclusive<u32>] = &[
        // Hangul Jamo
        0x1100..=0x11FF,
        // CJK punctuation is excluded; ideographs and syllabaries only.
        // Hiragana
        0x3040..=0x309F,
        // Katakana
        0x30A0..=0x30FF,
        // CJK Unified Ideographs Extension A
        0x3400..=0x4DBF,
        // CJK Unified Ideographs
        0x4E00..=0x9FFF,
        // Hangul Syllables
        0xAC00..=0xD7AF,
        // CJK Compatibility Ideographs
        0xF900..=0xFAFF,
        // CJK Unified Ideographs Extension B
        0x2_0000..=0x2_A6DF,
    ];

    let cp = ch as u32;
    RANGES.iter().any(|r| r.contains(&cp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_basic() {
        assert_eq!(slug_base("Hello World"), "hello-world");
        assert_eq!(slug_base("Why Rust?"), "why-rust");
    }

    #[test]
    fn diacritics_folded() {
        assert_eq!(slug_base("Héllo Wörld"), "hello-world");
        assert_eq!(slug_base("Café Menü"), "cafe-menu");
    }

    #[test]
    fn cjk_preserved() {
        assert_eq!(slug_base("多言語 ガイド"), "多言語-ガイド");
        assert_eq!(slug_base("시작하기 Guide"), "시작하기-guide");
    }

    #[test]
    fn entities_decoded_before_normalization() {
        assert_eq!(slug_base("Tom &amp; Jerry"), "tom-jerry");
        assert_eq!(slug_base("A &lt;B&gt; C"), "a-c");
    }

    #[test]
    fn inline_tags_stripped() {
        assert_eq!(slug_base("<em>Hi</em> there"), "hi-there");
        assert_eq!(slug_base("Use <code>retry()</code> wisely"), "use-retry-wisely");
    }

    #[test]
    fn separators_collapse_and_edges_trim() {
        assert_eq!(slug_base("  a --- b  "), "a-b");
        assert_eq!(slug_base("one\t\ttwo"), "one-two");
    }

    #[test]
    fn dropped_characters_do_not_separate() {
        assert_eq!(slug_base("a!b"), "ab");
        assert_eq!(slug_base("import.meta.env"), "importmetaenv");
    }

    #[test]
    fn non_letter_start_gets_prefix() {
        assert_eq!(slug_base("2024 plans"), "s-2024-plans");
        assert_eq!(slug_base("_private"), "s-_private");
    }

    #[test]
    fn empty_input_falls_back() {
        assert_eq!(slug_base(""), "section");
        assert_eq!(slug_base("!!!"), "section");
        assert_eq!(slug_base("🚀"), "section");
    }

    #[test]
    fn long_input_truncated_without_trailing_hyphen() {
        let long = "word ".repeat(40);
        let slug = slug_base(&long);
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("word-word"));
    }

    #[test]
    fn duplicates_get_numbered_from_two() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.next_slug("Setup"), "setup");
        assert_eq!(slugger.next_slug("Setup"), "setup-2");
        assert_eq!(slugger.next_slug("Setup"), "setup-3");
        assert_eq!(slugger.next_slug("Other"), "other");
    }

    #[test]
    fn fresh_slugger_has_no_memory() {
        let mut first = Slugger::new();
        assert_eq!(first.next_slug("Intro"), "intro");
        assert_eq!(first.next_slug("Intro"), "intro-2");

        let mut second = Slugger::new();
        assert_eq!(second.next_slug("Intro"), "intro");
    }

    #[test]
    fn distinct_ids_for_many_duplicate_headings() {
        let mut slugger = Slugger::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(slugger.next_slug("Same Heading")));
        }
    }
}
