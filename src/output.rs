//! CLI output formatting for the pipeline stages.
//!
//! # Layout
//!
//! Output is **information-centric, not file-centric**. Each post is shown by
//! its positional index and title; the source file and other details follow as
//! indented context lines. Failures are always listed with the file they came
//! from so they can be fixed without re-running with logging on.
//!
//! # Examples
//!
//! ## Scan (`check`)
//!
//! ```text
//! Posts
//! 001 Hello World (2024-03-15)
//!     Source: hello-world.md
//!     Topics: rust, web
//!     Description: A first post
//!
//! Failures
//!     drafts/broken.md: missing required field: title
//!
//! Scanned 1 post, 1 failure
//! ```
//!
//! ## Generate
//!
//! ```text
//! Home → index.html
//! 001 Hello World → posts/hello-world.html
//!
//! Topics
//!     rust (1 post) → tags/rust.html
//!     web (1 post) → tags/web.html
//! Topics index → tags/index.html
//!
//! Generated 1 post, 2 topics
//! ```
//!
//! # Architecture
//!
//! `format_*` functions build the lines and never touch stdout, so tests can
//! assert on them directly. The `print_*` wrappers just print those lines.

use crate::bundle::ArtifactBundle;
use crate::scan::ScanFailure;
use crate::types::{Document, DocumentList};
use serde::Serialize;

const DESCRIPTION_WIDTH: usize = 72;

// ============================================================================
// Shared display helpers
// ============================================================================

/// `1` → `001`.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("1 {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Cut to `max` chars (not bytes) and mark the cut with `...`.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `001 Title (2024-03-15)`
fn post_header(index: usize, doc: &Document) -> String {
    format!("{} {} ({})", format_index(index), doc.title, doc.short_date())
}

fn failure_lines(failures: &[ScanFailure], heading: &str) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![String::new(), heading.to_string()];
    lines.extend(failures.iter().map(|f| format!("{}{}", indent(1), f)));
    lines
}

// ============================================================================
// Scan
// ============================================================================

/// Format the result of a scan: every document, then every failure.
pub fn format_scan_output(documents: &DocumentList, failures: &[ScanFailure]) -> Vec<String> {
    let mut lines = Vec::new();

    if !documents.is_empty() {
        lines.push("Posts".to_string());
        for (i, doc) in documents.iter().enumerate() {
            lines.push(post_header(i + 1, doc));
            lines.push(format!("{}Source: {}", indent(1), doc.source));
            if !doc.topics.is_empty() {
                lines.push(format!("{}Topics: {}", indent(1), doc.topics.join(", ")));
            }
            lines.push(format!(
                "{}Description: {}",
                indent(1),
                truncate_desc(&doc.description, DESCRIPTION_WIDTH)
            ));
        }
    }

    lines.extend(failure_lines(failures, "Failures"));

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Scanned {}, {}",
        plural(documents.len(), "post"),
        plural(failures.len(), "failure")
    ));
    lines
}

pub fn print_scan_output(documents: &DocumentList, failures: &[ScanFailure]) {
    for line in format_scan_output(documents, failures) {
        println!("{}", line);
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    posts: Vec<PostSummary<'a>>,
    failures: Vec<FailureSummary>,
}

#[derive(Serialize)]
struct PostSummary<'a> {
    slug: &'a str,
    title: &'a str,
    date: String,
    topics: &'a [String],
    source: &'a str,
}

#[derive(Serialize)]
struct FailureSummary {
    path: String,
    error: String,
}

/// Machine-readable scan report for `check --json`.
pub fn format_scan_json(
    documents: &DocumentList,
    failures: &[ScanFailure],
) -> Result<String, serde_json::Error> {
    let report = CheckReport {
        posts: documents
            .iter()
            .map(|d| PostSummary {
                slug: &d.slug,
                title: &d.title,
                date: d.publish_date.to_rfc3339(),
                topics: &d.topics,
                source: &d.source,
            })
            .collect(),
        failures: failures
            .iter()
            .map(|f| FailureSummary {
                path: f.path.clone(),
                error: f.cause.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&report)
}

// ============================================================================
// Generate
// ============================================================================

/// Format what a generate pass produced, in the layout the static writer uses.
pub fn format_generate_output(
    documents: &DocumentList,
    bundle: &ArtifactBundle,
    failures: &[ScanFailure],
) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push("Home → index.html".to_string());
    let mut index = 0;
    for doc in documents.iter().filter(|d| bundle.posts.contains_key(&d.slug)) {
        index += 1;
        lines.push(format!(
            "{} {} → posts/{}.html",
            format_index(index),
            doc.title,
            doc.slug
        ));
    }

    if bundle.is_templated() {
        if !bundle.topic_infos.is_empty() {
            lines.push(String::new());
            lines.push("Topics".to_string());
            for topic in &bundle.topic_infos {
                lines.push(format!(
                    "{}{} ({}) → tags/{}.html",
                    indent(1),
                    topic.name,
                    plural(topic.post_count, "post"),
                    topic.key
                ));
            }
        }
        if !bundle.topics_index.is_empty() {
            lines.push("Topics index → tags/index.html".to_string());
        }
    }

    lines.extend(failure_lines(failures, "Skipped"));

    lines.push(String::new());
    let mut summary = format!("Generated {}", plural(bundle.posts.len(), "post"));
    if bundle.is_templated() {
        summary.push_str(&format!(", {}", plural(bundle.topics.len(), "topic")));
    }
    if !failures.is_empty() {
        summary.push_str(&format!(", skipped {}", plural(failures.len(), "file")));
    }
    lines.push(summary);
    lines
}

pub fn print_generate_output(
    documents: &DocumentList,
    bundle: &ArtifactBundle,
    failures: &[ScanFailure],
) {
    for line in format_generate_output(documents, bundle, failures) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AssemblyMode;
    use crate::metadata::DecodeError;
    use crate::scan::FailureCause;
    use crate::test_helpers::{doc, doc_with_topics};
    use crate::types::TopicInfo;

    fn failure(path: &str) -> ScanFailure {
        ScanFailure {
            path: path.to_string(),
            cause: FailureCause::Decode(DecodeError::MissingField("title")),
        }
    }

    fn documents() -> DocumentList {
        DocumentList::new(vec![
            doc_with_topics("newer", "2024-02-01", &["rust", "web"]),
            doc("older", "2024-01-01"),
        ])
    }

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn truncate_desc_respects_char_boundaries() {
        assert_eq!(truncate_desc("short", 10), "short");
        assert_eq!(truncate_desc("abcdef", 3), "abc...");
        assert_eq!(truncate_desc("ééééé", 2), "éé...");
    }

    #[test]
    fn scan_output_lists_posts_and_failures() {
        let lines = format_scan_output(&documents(), &[failure("drafts/bad.md")]);
        assert_eq!(lines[0], "Posts");
        assert_eq!(lines[1], "001 Title of newer (2024-02-01)");
        assert_eq!(lines[2], "    Source: newer.md");
        assert_eq!(lines[3], "    Topics: rust, web");
        assert!(lines.contains(&"002 Title of older (2024-01-01)".to_string()));
        assert!(lines.contains(&"Failures".to_string()));
        assert!(lines.contains(
            &"    drafts/bad.md: missing required field: title".to_string()
        ));
        assert_eq!(lines.last().unwrap(), "Scanned 2 posts, 1 failure");
    }

    #[test]
    fn scan_output_for_empty_scan() {
        let lines = format_scan_output(&DocumentList::default(), &[]);
        assert_eq!(lines, vec!["Scanned 0 posts, 0 failures"]);
    }

    #[test]
    fn scan_json_is_parseable() {
        let json = format_scan_json(&documents(), &[failure("bad.md")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["posts"][0]["slug"], "newer");
        assert_eq!(value["posts"][0]["topics"][1], "web");
        assert_eq!(value["failures"][0]["path"], "bad.md");
        assert_eq!(
            value["failures"][0]["error"],
            "missing required field: title"
        );
    }

    #[test]
    fn generate_output_templated() {
        let mut bundle = ArtifactBundle::empty(AssemblyMode::Templated);
        bundle.posts.insert("newer".into(), vec![1]);
        bundle.posts.insert("older".into(), vec![1]);
        bundle.topics.insert("rust".into(), vec![1]);
        bundle.topics.insert("web-dev".into(), vec![1]);
        bundle.topic_infos = vec![
            TopicInfo {
                name: "rust".into(),
                key: "rust".into(),
                post_count: 1,
            },
            TopicInfo {
                name: "Web Dev".into(),
                key: "web-dev".into(),
                post_count: 2,
            },
        ];
        bundle.topics_index = vec![1];

        let lines = format_generate_output(&documents(), &bundle, &[]);
        assert_eq!(lines[0], "Home → index.html");
        assert_eq!(lines[1], "001 Title of newer → posts/newer.html");
        assert_eq!(lines[2], "002 Title of older → posts/older.html");
        assert!(lines.contains(&"    rust (1 post) → tags/rust.html".to_string()));
        assert!(lines.contains(&"    Web Dev (2 posts) → tags/web-dev.html".to_string()));
        assert!(lines.contains(&"Topics index → tags/index.html".to_string()));
        assert_eq!(lines.last().unwrap(), "Generated 2 posts, 2 topics");
    }

    #[test]
    fn generate_output_raw_has_no_topics() {
        let mut bundle = ArtifactBundle::empty(AssemblyMode::Raw);
        bundle.posts.insert("newer".into(), vec![1]);
        bundle.posts.insert("older".into(), vec![1]);

        let lines = format_generate_output(&documents(), &bundle, &[failure("x.md")]);
        assert!(!lines.iter().any(|l| l.contains("tags/")));
        assert!(lines.contains(&"Skipped".to_string()));
        assert_eq!(lines.last().unwrap(), "Generated 2 posts, skipped 1 file");
    }
}
