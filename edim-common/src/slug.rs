//! Slug validation and generation
//!
//! Slugs are the URL-safe technical names of events, dimensions and values.

use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

/// Maximum length of a dimension or value slug
pub const SLUG_MAX_LENGTH: usize = 255;

/// Validate a slug: non-empty, at most [`SLUG_MAX_LENGTH`] bytes,
/// ASCII letters, digits, `-` and `_` only
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::InvalidInput("slug must not be empty".to_string()));
    }
    if slug.len() > SLUG_MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "slug '{}...' exceeds {} characters",
            slug.chars().take(32).collect::<String>(),
            SLUG_MAX_LENGTH
        )));
    }
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::InvalidInput(format!(
            "slug '{}' contains forbidden character {:?}",
            slug, bad
        )));
    }
    Ok(())
}

fn fold_char(c: char, sep: char) -> Option<char> {
    match c {
        ' ' | '.' | '_' | '-' => Some(sep),
        'à' | 'á' | 'ä' | 'å' => Some('a'),
        'è' | 'é' | 'ë' => Some('e'),
        'ö' => Some('o'),
        'ü' => Some('u'),
        c if c.is_ascii_lowercase() || c.is_ascii_digit() => Some(c),
        _ => None,
    }
}

/// Turn free text into a slug using `sep` as the word separator
///
/// Lowercases, folds common accented letters, drops everything else and
/// collapses runs of separators.
pub fn slugify_with(text: &str, sep: char) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if let Some(folded) = fold_char(c, sep) {
            if folded == sep && slug.ends_with(sep) {
                continue;
            }
            slug.push(folded);
        }
    }
    slug
}

/// [`slugify_with`] using `-`
pub fn slugify(text: &str) -> String {
    slugify_with(text, '-')
}

/// Hands out unique slugs: repeats get `-2`, `-3`, ... suffixes
///
/// A suffixed slug is never handed out again, even when a later base slug
/// happens to equal it.
#[derive(Debug, Default)]
pub struct UniqueSlugs {
    counter: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl UniqueSlugs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, slug: &str) -> String {
        let count = self.counter.entry(slug.to_string()).or_insert(0);
        loop {
            *count += 1;
            let candidate = if *count == 1 {
                slug.to_string()
            } else {
                format!("{}-{}", slug, count)
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
