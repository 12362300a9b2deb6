//! Record model shared by every pipeline stage.
//!
//! A [`Document`] is one decoded, validated post. A [`DocumentList`] is the
//! ordered collection the scanner produces and the assembler consumes. Both
//! are immutable once built and safe to share across threads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// One decoded content unit.
///
/// Documents are only built by [`crate::metadata`] from a header that passed
/// validation, so `title`, `description` and `publish_date` are always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// URL-safe identity, unique within a scan.
    pub slug: String,
    pub title: String,
    pub publish_date: DateTime<Utc>,
    pub description: String,
    /// Topic labels with their original casing. Compared case-insensitively.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    /// Body rendered to HTML by [`crate::markdown::transform`].
    pub body_html: String,
    /// Body text with the metadata header removed.
    pub raw_body: String,
    /// Path of the source file relative to the scan root.
    pub source: String,
}

impl Document {
    /// Case-insensitive topic membership.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| eq_ignore_case(t, topic))
    }

    /// Long display date, e.g. `March 15, 2024`.
    pub fn formatted_date(&self) -> String {
        self.publish_date.format("%B %-d, %Y").to_string()
    }

    /// ISO date, e.g. `2024-03-15`.
    pub fn short_date(&self) -> String {
        self.publish_date.format("%Y-%m-%d").to_string()
    }
}

/// Unicode-aware case-insensitive equality for topic names.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Ordered collection of valid documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentList(Vec<Document>);

impl DocumentList {
    pub fn new(documents: Vec<Document>) -> Self {
        Self(documents)
    }

    /// Sort newest first. Stable: documents with equal dates keep their
    /// relative order.
    pub fn sort_by_date(&mut self) {
        self.0.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
    }

    /// Documents carrying `topic` (case-insensitive), in current order.
    pub fn filter_by_topic(&self, topic: &str) -> Vec<&Document> {
        self.0.iter().filter(|d| d.has_topic(topic)).collect()
    }

    /// Distinct topic names across all documents.
    ///
    /// Names that differ only in case are the same topic; the casing of the
    /// first occurrence (in list order) is kept.
    pub fn topics(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut topics = Vec::new();
        for topic in self.0.iter().flat_map(|d| &d.topics) {
            if seen.insert(topic.to_lowercase()) {
                topics.push(topic.clone());
            }
        }
        topics
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Document> {
        self.0
    }
}

impl From<Vec<Document>> for DocumentList {
    fn from(documents: Vec<Document>) -> Self {
        Self(documents)
    }
}

impl<'a> IntoIterator for &'a DocumentList {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A topic name paired with the number of documents carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    /// Display name, as first seen in the newest document.
    pub name: String,
    /// File-safe key: `tags/{key}.html`, `/tags/{key}`.
    pub key: String,
    pub post_count: usize,
}
