//! The artifact bundle: everything one assembly pass produces.
//!
//! A bundle is built once, then only read. Consumers that need fresh content
//! build a new bundle and replace the old one wholesale; nothing mutates a
//! bundle after the assembler returns it.

use crate::naming;
use crate::types::TopicInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How documents are turned into artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Post bodies verbatim, no landing/topic pages.
    Raw,
    /// Every page rendered through a renderer.
    #[default]
    Templated,
}

/// Rendered site, keyed by slug and topic key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub mode: AssemblyMode,
    /// Slug → page bytes.
    pub posts: BTreeMap<String, Vec<u8>>,
    /// Topic key → page bytes. Empty in raw mode.
    pub topics: BTreeMap<String, Vec<u8>>,
    /// One entry per topic page, in topics-index order.
    pub topic_infos: Vec<TopicInfo>,
    pub landing: Vec<u8>,
    pub topics_index: Vec<u8>,
}

impl ArtifactBundle {
    pub fn empty(mode: AssemblyMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn post(&self, slug: &str) -> Option<&[u8]> {
        self.posts.get(slug).map(Vec::as_slice)
    }

    /// Topic page by key or name.
    ///
    /// Tries the key as given, then a topic whose display name matches ignoring
    /// case, then the slug of `name`. So `/tags/web-dev`, `/tags/Web%20Dev` and
    /// `/tags/web_dev` all find the "Web Dev" page.
    pub fn topic(&self, name: &str) -> Option<&[u8]> {
        if let Some(bytes) = self.topics.get(name) {
            return Some(bytes);
        }
        let wanted = name.to_lowercase();
        let key = match self
            .topic_infos
            .iter()
            .find(|info| info.name.to_lowercase() == wanted)
        {
            Some(info) => info.key.clone(),
            None => naming::slugify(name),
        };
        self.topics.get(&key).map(Vec::as_slice)
    }

    pub fn is_templated(&self) -> bool {
        self.mode == AssemblyMode::Templated
    }

    /// Number of non-empty artifacts.
    pub fn page_count(&self) -> usize {
        self.posts.len()
            + self.topics.len()
            + usize::from(!self.landing.is_empty())
            + usize::from(!self.topics_index.is_empty())
    }

    pub fn total_bytes(&self) -> usize {
        self.posts.values().map(Vec::len).sum::<usize>()
            + self.topics.values().map(Vec::len).sum::<usize>()
            + self.landing.len()
            + self.topics_index.len()
    }
}
