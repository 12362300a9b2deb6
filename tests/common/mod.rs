//! Helpers shared by the integration tests.
//!
//! Each test binary compiles its own copy and uses a subset of it.
#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use walkdir::WalkDir;

// =========================================================================
// Content
// =========================================================================

/// Fresh copy of `fixtures/content/`: four valid posts and
/// `drafts/missing-title.md`, which has no title.
pub fn fixture_content() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_tree(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content"),
        tmp.path(),
    );
    tmp
}

pub fn copy_tree(src: &Path, dst: &Path) {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.unwrap();
        let target = dst.join(entry.path().strip_prefix(src).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Write a valid post. Tags are quoted, so any text works.
pub fn write_post(dir: &Path, file: &str, title: &str, date: &str, tags: &[&str]) {
    let tags: Vec<String> = tags.iter().map(|t| format!("{t:?}")).collect();
    fs::write(
        dir.join(file),
        format!(
            "---\ntitle: {title}\ndate: {date}\ndescription: About {title}\ntags: [{}]\n---\nBody of {title}.\n",
            tags.join(", ")
        ),
    )
    .unwrap();
}

/// Every `href="..."` value in `html`, in order.
pub fn hrefs(html: &str) -> Vec<&str> {
    html.split(r#"href=""#)
        .skip(1)
        .filter_map(|rest| rest.split_once('"').map(|(href, _)| href))
        .collect()
}

// =========================================================================
// HTTP
// =========================================================================

pub struct Reply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// `GET path` over a fresh connection, reading until the server closes it.
pub async fn get(addr: SocketAddr, path: &str) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
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
    let content_type = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.trim().to_string());
    Reply {
        status,
        content_type,
        body: body.to_string(),
    }
}
