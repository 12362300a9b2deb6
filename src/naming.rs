//! Slug derivation shared by documents and heading anchors.
//!
//! A slug is the URL-safe identity of a document: lowercase ASCII letters and
//! digits separated by single hyphens, with no hyphen at either end.
//!
//! ## Rules
//!
//! - Letters are lowercased; non-ASCII characters are dropped
//! - Spaces and underscores become hyphens
//! - Anything else that is not `[a-z0-9-]` is removed
//! - Runs of hyphens collapse to one; leading/trailing hyphens are trimmed
//! - Slugs longer than [`MAX_SLUG_LEN`] are cut at the last hyphen before the limit
//!
//! ```text
//! "Hello World!"        → "hello-world"
//! "snake_case_title"    → "snake-case-title"
//! "  --Rust 2024--  "   → "rust-2024"
//! "Café au lait"        → "caf-au-lait"
//! ```
//!
//! Topics get slugs too ([`topic_keys`]): the display name stays as written
//! while the key names the page file and URL segment.

use std::collections::HashSet;

pub const MAX_SLUG_LEN: usize = 80;

/// Key used when a topic name has no slug characters at all.
const FALLBACK_TOPIC_KEY: &str = "topic";

/// `tags/index.html` belongs to the topics index.
const RESERVED_TOPIC_KEYS: &[&str] = &["index"];

/// Convert arbitrary text into a slug. May return an empty string when the
/// input contains no usable characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    // Separators are only emitted between two kept characters.
    let mut pending_hyphen = false;
    for c in text.chars() {
        let c = c.to_ascii_lowercase();
        match c {
            'a'..='z' | '0'..='9' => {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            }
            ' ' | '_' | '-' => pending_hyphen = true,
            _ => {}
        }
    }
    truncate(slug)
}

fn truncate(mut slug: String) -> String {
    if slug.len() <= MAX_SLUG_LEN {
        return slug;
    }
    let cut = slug[..=MAX_SLUG_LEN]
        .rfind('-')
        .filter(|&i| i > 0)
        .unwrap_or(MAX_SLUG_LEN);
    slug.truncate(cut);
    slug
}

/// Whether `s` already satisfies the slug rules.
pub fn is_slug(s: &str) -> bool {
    !s.is_empty() && slugify(s) == s
}

/// File-safe keys for topic names, in input order.
///
/// Each key is the slug of its name. Keys that would be empty, reserved or
/// already taken get a numeric suffix, so the result is unique and stable for
/// a given input order.
///
/// ```text
/// ["CI/CD", "Web Dev", "index", "C#", "C"] → ["cicd", "web-dev", "index-2", "c", "c-2"]
/// ```
pub fn topic_keys<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = RESERVED_TOPIC_KEYS.iter().map(|k| k.to_string()).collect();
    names
        .into_iter()
        .map(|name| {
            let base = match slugify(name) {
                s if s.is_empty() => FALLBACK_TOPIC_KEY.to_string(),
                s => s,
            };
            let mut key = base.clone();
            let mut n = 2;
            while taken.contains(&key) {
                key = format!("{base}-{n}");
                n += 1;
            }
            taken.insert(key.clone());
            key
        })
        .collect()
}
