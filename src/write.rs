//! Static output: materialize an [`ArtifactBundle`] as files.
//!
//! ## Output Structure
//!
//! ```text
//! dist/
//! ├── index.html               # Landing page (always written)
//! ├── posts/
//! │   ├── hello-world.html
//! │   └── ...
//! └── tags/                    # Templated bundles only
//!     ├── index.html           # Topics index (when non-empty)
//!     ├── rust.html
//!     └── ...
//! ```
//!
//! Post slugs and topic keys must be slugs (see [`crate::naming`]); the whole
//! bundle is checked before the first file is written.
//!
//! Existing files are overwritten, so writing the same bundle twice leaves the
//! directory unchanged. Files already in the output directory that the bundle
//! does not mention are left alone.

use crate::bundle::ArtifactBundle;
use crate::naming;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} name {name:?} cannot be used as a file name")]
    InvalidName { kind: &'static str, name: String },
}

/// What [`DirectoryWriter::write`] put on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub posts: usize,
    pub topics: usize,
    pub topics_index: bool,
    pub bytes: usize,
}

impl WriteSummary {
    /// Files written, landing page included.
    pub fn files(&self) -> usize {
        self.posts + self.topics + usize::from(self.topics_index) + 1
    }
}

pub struct DirectoryWriter {
    out_dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn write(&self, bundle: &ArtifactBundle) -> Result<WriteSummary, WriteError> {
        // Validate every key before touching the disk.
        for slug in bundle.posts.keys() {
            check_name("post", slug)?;
        }
        if bundle.is_templated() {
            for key in bundle.topics.keys() {
                check_name("topic", key)?;
                // tags/index.html belongs to the topics index.
                if key == "index" {
                    return Err(WriteError::InvalidName {
                        kind: "topic",
                        name: key.clone(),
                    });
                }
            }
        }

        let mut summary = WriteSummary::default();

        let posts_dir = self.out_dir.join("posts");
        create_dir(&posts_dir)?;
        for (slug, bytes) in &bundle.posts {
            write_file(&posts_dir.join(format!("{slug}.html")), bytes)?;
            summary.posts += 1;
            summary.bytes += bytes.len();
        }

        if bundle.is_templated() {
            let tags_dir = self.out_dir.join("tags");
            create_dir(&tags_dir)?;
            for (key, bytes) in &bundle.topics {
                write_file(&tags_dir.join(format!("{key}.html")), bytes)?;
                summary.topics += 1;
                summary.bytes += bytes.len();
            }
            if !bundle.topics_index.is_empty() {
                write_file(&tags_dir.join("index.html"), &bundle.topics_index)?;
                summary.topics_index = true;
                summary.bytes += bundle.topics_index.len();
            }
        }

        write_file(&self.out_dir.join("index.html"), &bundle.landing)?;
        summary.bytes += bundle.landing.len();

        info!(
            out = %self.out_dir.display(),
            files = summary.files(),
            bytes = summary.bytes,
            "site written"
        );
        Ok(summary)
    }
}

/// Keys become file names as-is, so only slugs are accepted.
fn check_name(kind: &'static str, name: &str) -> Result<(), WriteError> {
    if !naming::is_slug(name) {
        return Err(WriteError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    debug!(path = %path.display(), bytes = bytes.len(), "writing");
    fs::write(path, bytes).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}
