//! Title normalization shared by the resolver and the similarity scorer.
//!
//! Two flavours live here: slugs (for guessing storage filenames) and word
//! sets (for comparing titles with each other and with listed filenames).

use lazy_static::lazy_static;
use std::collections::HashSet;

/// Slugs longer than this were cut short by the catalog importer.
pub const LEGACY_SLUG_MAX_LEN: usize = 45;

lazy_static! {
    /// Words that say nothing about which piece a title refers to.
    static ref STOPWORDS: HashSet<&'static str> = [
        "the", "and", "but", "for", "with", "from", "about", "into", "through",
        "during", "before", "after", "above", "below", "between", "among",
        "against", "within", "without", "throughout", "towards", "upon",
        "concerning", "remix", "version", "edit", "mix", "remaster",
    ]
    .into_iter()
    .collect();
}

/// Filesystem-safe slug of a title.
///
/// Lowercases, drops punctuation, turns whitespace runs into hyphens,
/// collapses repeated hyphens and trims them from both ends.
///
/// ```
/// assert_eq!(cadence::text::slugify("Nocturne Op.9 No.2 (Remix)"), "nocturne-op9-no2-remix");
/// assert_eq!(cadence::text::slugify("  Rain; in   Spring -- "), "rain-in-spring");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Filename variations seen in older uploads, most likely first.
///
/// The plain slug, the slug without a trailing numeric disambiguator
/// (`title (2)` was uploaded as `title`), and the slug cut to the legacy
/// length limit.
pub fn slug_variations(title: &str) -> Vec<String> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Vec::new();
    }

    let mut variations = vec![slug.clone()];

    if let Some((head, tail)) = slug.rsplit_once('-') {
        if !head.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            variations.push(head.to_string());
        }
    }

    if slug.len() > LEGACY_SLUG_MAX_LEN {
        let truncated = slug[..LEGACY_SLUG_MAX_LEN].trim_end_matches('-').to_string();
        variations.push(truncated);
    }

    let mut seen = HashSet::new();
    variations.retain(|v| !v.is_empty() && seen.insert(v.clone()));
    variations
}

/// Lowercased alphanumeric tokens, in order.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Meaningful words of a title, in order of first appearance.
///
/// Short words and stopwords are dropped.
pub fn title_words(title: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(title)
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Tokens of a storage object name, extension removed.
pub fn filename_tokens(name: &str) -> Vec<String> {
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    };
    tokens(stem).collect()
}
