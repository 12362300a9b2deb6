//! Shared test utilities for the simple-blog test suite.
//!
//! Provides fixture setup, document builders, a recording renderer and a tiny
//! HTTP client for exercising the live server over a real socket.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! write_post(tmp.path(), "extra.md", "Extra Post", "2024-05-01", &["rust"]);
//!
//! let list = DocumentList::new(vec![doc("a", "2024-01-01")]);
//! ```

use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use walkdir::WalkDir;

use crate::metadata::parse_date;
use crate::templates::{Page, RenderError, Renderer};
use crate::types::Document;

// =========================================================================
// Fixtures
// =========================================================================

/// Fresh copy of `fixtures/content/`, so tests may add or break files.
///
/// The fixture tree holds four valid posts and one invalid one
/// (`drafts/missing-title.md`).
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    for entry in WalkDir::new(&fixtures).min_depth(1) {
        let entry = entry.unwrap();
        let target = tmp.path().join(entry.path().strip_prefix(&fixtures).unwrap());
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).unwrap();
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
    tmp
}

// =========================================================================
// Documents
// =========================================================================

/// A valid document with title `Title of {slug}`, source `{slug}.md`.
pub fn doc(slug: &str, date: &str) -> Document {
    doc_with_topics(slug, date, &[])
}

pub fn doc_with_topics(slug: &str, date: &str, topics: &[&str]) -> Document {
    Document {
        slug: slug.to_string(),
        title: format!("Title of {slug}"),
        publish_date: parse_date(date).unwrap(),
        description: format!("About {slug}"),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        body_html: format!("<p>Body of {slug}</p>\n"),
        raw_body: format!("Body of {slug}\n"),
        source: format!("{slug}.md"),
    }
}

/// Source text of a valid post.
pub fn post_source(title: &str, date: &str, tags: &[&str]) -> String {
    format!(
        "---\ntitle: {title}\ndate: {date}\ndescription: About {title}\ntags: [{}]\n---\n# {title}\n\nBody of {title}.\n",
        tags.join(", ")
    )
}

/// Write a valid post to `dir/file`.
pub fn write_post(dir: &Path, file: &str, title: &str, date: &str, tags: &[&str]) {
    std::fs::write(dir.join(file), post_source(title, date, tags)).unwrap();
}

// =========================================================================
// Renderer
// =========================================================================

/// Renderer that records `(template, page title)` per call and can be told
/// to fail on one template.
#[derive(Default)]
pub struct RecordingRenderer {
    calls: parking_lot::Mutex<Vec<(String, String)>>,
    fail_on: Option<&'static str>,
}

impl RecordingRenderer {
    pub fn failing_on(template: &'static str) -> Self {
        Self {
            fail_on: Some(template),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, page: &Page<'_>) -> Result<Vec<u8>, RenderError> {
        let template = page.template_name();
        self.calls
            .lock()
            .push((template.to_string(), page.base().page_title.clone()));
        if self.fail_on == Some(template) {
            return Err(RenderError::Failed {
                template,
                message: "forced failure".into(),
            });
        }
        Ok(format!("{template}:{}", page.base().page_title).into_bytes())
    }
}

// =========================================================================
// HTTP
// =========================================================================

pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

/// Issue `GET path` over a fresh connection and read the whole response.
pub async fn http_get(addr: SocketAddr, path: &str) -> HttpResponse {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    HttpResponse {
        status,
        headers,
        body: body.to_string(),
    }
}
