//! Content directory scanning.
//!
//! Stage 1 of the build pipeline. Walks the content tree, decodes every
//! markdown file into a [`Document`] and collects the files that failed
//! instead of aborting the pass.
//!
//! ## Directory Structure
//!
//! Any layout works; subdirectories are only for the author's convenience:
//!
//! ```text
//! content/
//! ├── config.toml                  # Site configuration (optional, not scanned)
//! ├── hello-world.md               # Post
//! ├── 2024/
//! │   ├── rust-tips.markdown       # Post (both extensions accepted)
//! │   └── cover.png                # Ignored: not a content file
//! └── .drafts/                     # Ignored: hidden
//!     └── wip.md
//! ```
//!
//! ## Outcomes
//!
//! A scan has three distinguishable outcomes:
//!
//! - `Ok(Scan)`: the walk completed. [`Scan::documents`] holds every valid
//!   document, newest first; [`Scan::failures`] holds one entry per file that
//!   could not be read, decoded or validated. Both may be non-empty.
//! - `Err(ScanError::Walk)` / `Err(ScanError::NotADirectory)`: the root itself
//!   is unusable. No documents are returned.
//! - `Err(ScanError::Cancelled)`: the token fired between two files.
//!
//! ## Validation
//!
//! Beyond decoding, the scanner enforces slug uniqueness: a document whose
//! slug was already taken by an earlier file (in walk order) is a failure.

use crate::metadata::{Decode, DecodeError};
use crate::types::{Document, DocumentList};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Extensions (compared case-insensitively) that mark a content file.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Fatal scan errors. Per-file problems are [`ScanFailure`]s instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot walk content directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("content root is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("scan cancelled")]
    Cancelled,
}

/// Why a single file was rejected.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error("failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("slug {slug:?} already used by {first}")]
    DuplicateSlug { slug: String, first: String },
    #[error("cannot access path: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One file's failure, keyed by its path relative to the scan root.
#[derive(Error, Debug)]
#[error("{path}: {cause}")]
pub struct ScanFailure {
    pub path: String,
    #[source]
    pub cause: FailureCause,
}

/// Every failure of one scan, reported together.
#[derive(Debug, Default)]
pub struct ScanFailures(pub Vec<ScanFailure>);

impl ScanFailures {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScanFailure> {
        self.0.iter()
    }
}

impl fmt::Display for ScanFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no parsing errors");
        }
        write!(f, "failed to parse {} file(s):", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScanFailures {}

/// Result of a completed walk.
#[derive(Debug, Default)]
pub struct Scan {
    /// Valid documents, newest first.
    pub documents: DocumentList,
    pub failures: Vec<ScanFailure>,
}

impl Scan {
    /// Strict view: the documents only if no file failed.
    pub fn into_result(self) -> Result<DocumentList, ScanFailures> {
        if self.failures.is_empty() {
            Ok(self.documents)
        } else {
            Err(ScanFailures(self.failures))
        }
    }
}

/// Scan `root` recursively, decoding content files with `decoder`.
pub fn scan(
    root: &Path,
    decoder: &dyn Decode,
    cancel: &CancellationToken,
) -> Result<Scan, ScanError> {
    let mut documents: Vec<Document> = Vec::new();
    let mut failures = Vec::new();
    // slug → source of the document that claimed it
    let mut claimed: HashMap<String, String> = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        if cancel.is_cancelled() {
            debug!(root = %root.display(), "scan cancelled");
            return Err(ScanError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(ScanError::Walk {
                    path: root.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| relative_source(root, p))
                    .unwrap_or_default();
                warn!(%path, error = %err, "skipping unreadable path");
                failures.push(ScanFailure {
                    path,
                    cause: err.into(),
                });
                continue;
            }
        };

        if entry.depth() == 0 {
            if !entry.file_type().is_dir() {
                return Err(ScanError::NotADirectory(root.to_path_buf()));
            }
            continue;
        }
        if !entry.file_type().is_file() || !is_content_file(entry.path()) {
            continue;
        }

        let source = relative_source(root, entry.path());
        match read_document(entry.path(), &source, decoder) {
            Ok(doc) => {
                if let Some(first) = claimed.get(&doc.slug) {
                    warn!(%source, slug = %doc.slug, %first, "duplicate slug");
                    failures.push(ScanFailure {
                        path: source,
                        cause: FailureCause::DuplicateSlug {
                            slug: doc.slug,
                            first: first.clone(),
                        },
                    });
                    continue;
                }
                debug!(%source, slug = %doc.slug, "decoded document");
                claimed.insert(doc.slug.clone(), source);
                documents.push(doc);
            }
            Err(cause) => {
                warn!(%source, error = %cause, "skipping invalid document");
                failures.push(ScanFailure {
                    path: source,
                    cause,
                });
            }
        }
    }

    let mut documents = DocumentList::new(documents);
    documents.sort_by_date();
    Ok(Scan {
        documents,
        failures,
    })
}

fn read_document(
    path: &Path,
    source: &str,
    decoder: &dyn Decode,
) -> Result<Document, FailureCause> {
    let bytes = std::fs::read(path)?;
    Ok(decoder.decode(source, &bytes)?)
}

/// Whether `path` has a content extension.
pub fn is_content_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            CONTENT_EXTENSIONS
                .iter()
                .any(|c| ext.eq_ignore_ascii_case(c))
        })
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// `root`-relative path with `/` separators, used as the document source.
fn relative_source(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
