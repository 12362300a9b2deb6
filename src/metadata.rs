//! Document decoding: metadata header + markdown body → [`Document`].
//!
//! Every content file starts with a YAML header fenced by `---` lines:
//!
//! ```text
//! ---
//! title: Hello World
//! date: 2024-03-15
//! description: A first post
//! tags: [rust, web]
//! slug: optional-explicit-slug
//! ---
//! Markdown body...
//! ```
//!
//! ## Required fields
//!
//! `title`, `date` and `description` must be present and non-blank. A file
//! missing any of them never becomes a [`Document`]; decoding fails with
//! [`DecodeError::MissingField`] and the scanner records it as a failure.
//!
//! ## Dates
//!
//! Accepted forms, all interpreted as UTC unless an offset is given:
//! RFC 3339 (`2024-03-15T09:30:00+02:00`), `2024-03-15 09:30:00`, `2024-03-15`.
//!
//! ## Slug resolution
//!
//! First non-empty of: explicit `slug` field, title, file stem. Each candidate
//! is normalized with [`slugify`], so an explicit slug is still URL-safe.
//!
//! ## Topics
//!
//! `tags` (or `topics`) accepts a list or a single string. Blank entries are
//! dropped and names equal ignoring case are kept once, first casing wins.

use crate::markdown::{self, MarkdownOptions};
use crate::naming::slugify;
use crate::types::Document;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("no front matter found")]
    MissingFrontMatter,
    #[error("front matter is not closed by a `---` line")]
    UnterminatedFrontMatter,
    #[error("invalid front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid date {0:?}: expected RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`")]
    InvalidDate(String),
    #[error("cannot derive a slug from slug, title or file name")]
    EmptySlug,
}

/// Turns one file's bytes into a validated [`Document`].
///
/// `source` is the file's path relative to the scan root; it becomes
/// [`Document::source`] and is the fallback for slug derivation.
pub trait Decode: Send + Sync {
    fn decode(&self, source: &str, bytes: &[u8]) -> Result<Document, DecodeError>;
}

impl<F> Decode for F
where
    F: Fn(&str, &[u8]) -> Result<Document, DecodeError> + Send + Sync,
{
    fn decode(&self, source: &str, bytes: &[u8]) -> Result<Document, DecodeError> {
        self(source, bytes)
    }
}

/// The standard decoder: YAML header, markdown body.
#[derive(Debug, Clone, Default)]
pub struct MarkdownDecoder {
    options: MarkdownOptions,
}

impl MarkdownDecoder {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }
}

impl Decode for MarkdownDecoder {
    fn decode(&self, source: &str, bytes: &[u8]) -> Result<Document, DecodeError> {
        let content = std::str::from_utf8(bytes)?;
        let (header, body) = split_front_matter(content)?;
        let front = FrontMatter::parse(header)?;
        front.into_document(source, body, &self.options)
    }
}

/// Split `content` into `(header, body)` at the `---` fences.
pub fn split_front_matter(content: &str) -> Result<(&str, &str), DecodeError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next().ok_or(DecodeError::MissingFrontMatter)?;
    if first.trim_end() != "---" {
        return Err(DecodeError::MissingFrontMatter);
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        let fence = line.trim_end();
        if fence == "---" || fence == "..." {
            let body_start = offset + line.len();
            return Ok((&content[header_start..offset], &content[body_start..]));
        }
        offset += line.len();
    }
    Err(DecodeError::UnterminatedFrontMatter)
}

/// Raw header fields as written by the author. Unknown keys are ignored so
/// authors can keep extra metadata (author, draft, ...) in their files.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "topics")]
    pub tags: Option<TagsField>,
    pub slug: Option<String>,
}

/// `tags: rust` or `tags: [rust, web]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagsField {
    One(String),
    Many(Vec<String>),
}

impl FrontMatter {
    pub fn parse(header: &str) -> Result<Self, DecodeError> {
        if header.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(header)?)
    }

    /// Validate required fields and build the document.
    pub fn into_document(
        self,
        source: &str,
        body: &str,
        options: &MarkdownOptions,
    ) -> Result<Document, DecodeError> {
        let title = required(self.title, "title")?;
        let date = required(self.date, "date")?;
        let description = required(self.description, "description")?;
        let publish_date = parse_date(&date)?;

        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let slug = [self.slug.as_deref(), Some(title.as_str()), Some(stem.as_str())]
            .into_iter()
            .flatten()
            .map(slugify)
            .find(|s| !s.is_empty())
            .ok_or(DecodeError::EmptySlug)?;

        let topics = match self.tags {
            None => Vec::new(),
            Some(TagsField::One(tag)) => normalize_topics(vec![tag]),
            Some(TagsField::Many(tags)) => normalize_topics(tags),
        };

        Ok(Document {
            slug,
            title,
            publish_date,
            description,
            topics,
            body_html: markdown::transform(body, options),
            raw_body: body.to_string(),
            source: source.to_string(),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(DecodeError::MissingField(field))
}

/// Parse a header date. Dates without a time are midnight UTC.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DecodeError::InvalidDate(raw.to_string()))
}

fn normalize_topics(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn decode(source: &str, content: &str) -> Result<Document, DecodeError> {
        MarkdownDecoder::default().decode(source, content.as_bytes())
    }

    const VALID: &str = "---\ntitle: Hello World\ndate: 2024-03-15\ndescription: A first post\ntags: [rust, Web]\n---\n# Heading\n\nSome **bold** text.\n";

    #[test]
    fn valid_document_decodes() {
        let doc = decode("posts/hello.md", VALID).unwrap();
        assert_eq!(doc.title, "Hello World");
        assert_eq!(doc.description, "A first post");
        assert_eq!(doc.topics, vec!["rust", "Web"]);
        assert_eq!(doc.source, "posts/hello.md");
        assert_eq!(doc.publish_date.year(), 2024);
        assert!(doc.body_html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn slug_generated_from_title() {
        let doc = decode("whatever.md", VALID).unwrap();
        assert_eq!(doc.slug, "hello-world");
    }

    #[test]
    fn explicit_slug_wins_and_is_normalized() {
        let content = "---\ntitle: Hello\ndate: 2024-01-01\ndescription: d\nslug: My Custom_Slug\n---\nbody";
        assert_eq!(decode("x.md", content).unwrap().slug, "my-custom-slug");
    }

    #[test]
    fn slug_falls_back_to_file_stem() {
        let content = "---\ntitle: \"!!!\"\ndate: 2024-01-01\ndescription: d\n---\nbody";
        assert_eq!(decode("dir/Fallback_Name.md", content).unwrap().slug, "fallback-name");
    }

    #[test]
    fn no_usable_slug_is_error() {
        let content = "---\ntitle: \"???\"\ndate: 2024-01-01\ndescription: d\n---\nbody";
        assert!(matches!(decode("!!.md", content), Err(DecodeError::EmptySlug)));
    }

    #[test]
    fn raw_body_excludes_header() {
        let doc = decode("a.md", VALID).unwrap();
        assert!(doc.raw_body.starts_with("# Heading"));
        assert!(!doc.raw_body.contains("title:"));
    }

    #[test]
    fn missing_title_is_error() {
        let content = "---\ndate: 2024-01-01\ndescription: d\n---\nbody";
        let err = decode("a.md", content).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("title")));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn blank_description_is_missing() {
        let content = "---\ntitle: T\ndate: 2024-01-01\ndescription: \"   \"\n---\nbody";
        assert!(matches!(
            decode("a.md", content),
            Err(DecodeError::MissingField("description"))
        ));
    }

    #[test]
    fn missing_date_is_error() {
        let content = "---\ntitle: T\ndescription: d\n---\nbody";
        assert!(matches!(
            decode("a.md", content),
            Err(DecodeError::MissingField("date"))
        ));
    }

    #[test]
    fn empty_header_reports_title_first() {
        let content = "---\n---\nbody";
        assert!(matches!(
            decode("a.md", content),
            Err(DecodeError::MissingField("title"))
        ));
    }

    #[test]
    fn no_front_matter_is_error() {
        assert!(matches!(
            decode("a.md", "# Just markdown\n"),
            Err(DecodeError::MissingFrontMatter)
        ));
        assert!(matches!(decode("a.md", ""), Err(DecodeError::MissingFrontMatter)));
    }

    #[test]
    fn unterminated_front_matter_is_error() {
        assert!(matches!(
            decode("a.md", "---\ntitle: T\n"),
            Err(DecodeError::UnterminatedFrontMatter)
        ));
    }

    #[test]
    fn invalid_yaml_is_error() {
        let content = "---\ntitle: [unclosed\n---\nbody";
        assert!(matches!(decode("a.md", content), Err(DecodeError::Yaml(_))));
    }

    #[test]
    fn invalid_utf8_is_error() {
        let bytes = b"---\ntitle: \xff\n---\n";
        assert!(matches!(
            MarkdownDecoder::default().decode("a.md", bytes),
            Err(DecodeError::Utf8(_))
        ));
    }

    #[test]
    fn crlf_and_bom_are_handled() {
        let content = "\u{feff}---\r\ntitle: T\r\ndate: 2024-01-01\r\ndescription: d\r\n---\r\nbody\r\n";
        let doc = decode("a.md", content).unwrap();
        assert_eq!(doc.title, "T");
        assert_eq!(doc.raw_body, "body\r\n");
    }

    #[test]
    fn single_string_tag_and_topics_alias() {
        let one = "---\ntitle: T\ndate: 2024-01-01\ndescription: d\ntags: rust\n---\n";
        assert_eq!(decode("a.md", one).unwrap().topics, vec!["rust"]);

        let alias = "---\ntitle: T\ndate: 2024-01-01\ndescription: d\ntopics: [go]\n---\n";
        assert_eq!(decode("a.md", alias).unwrap().topics, vec!["go"]);
    }

    #[test]
    fn topics_deduplicated_within_document() {
        let content =
            "---\ntitle: T\ndate: 2024-01-01\ndescription: d\ntags: [Rust, rust, \" \", RUST, web]\n---\n";
        assert_eq!(decode("a.md", content).unwrap().topics, vec!["Rust", "web"]);
    }

    #[test]
    fn unknown_header_fields_are_ignored() {
        let content = "---\ntitle: T\ndate: 2024-01-01\ndescription: d\nauthor: someone\n---\n";
        assert!(decode("a.md", content).is_ok());
    }

    #[test]
    fn date_formats() {
        let d = parse_date("2024-03-15T09:30:00+02:00").unwrap();
        assert_eq!((d.day(), d.hour()), (15, 7));

        let d = parse_date("2024-03-15 09:30:00").unwrap();
        assert_eq!((d.day(), d.hour(), d.minute()), (15, 9, 30));

        let d = parse_date("2024-03-15").unwrap();
        assert_eq!((d.month(), d.day(), d.hour()), (3, 15, 0));

        assert!(matches!(
            parse_date("15/03/2024"),
            Err(DecodeError::InvalidDate(_))
        ));
    }

    #[test]
    fn closures_implement_decode() {
        let always_fails = |_: &str, _: &[u8]| -> Result<Document, DecodeError> {
            Err(DecodeError::MissingFrontMatter)
        };
        assert!(always_fails.decode("a.md", b"").is_err());
    }
}
