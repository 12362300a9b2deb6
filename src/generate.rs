//! Site assembly.
//!
//! Stage 2 of the build pipeline. Takes the scanner's [`DocumentList`] and
//! produces an [`ArtifactBundle`]:
//!
//! ```text
//! content/ ──scan──▶ DocumentList ──assemble──▶ ArtifactBundle ──▶ write / serve
//! ```
//!
//! ## Modes
//!
//! - **Raw** ([`AssemblyMode::Raw`]): each post's bundle entry is its body HTML,
//!   verbatim. No landing page, topic pages or topic index are produced.
//! - **Templated** ([`AssemblyMode::Templated`]): every page goes through the
//!   [`Renderer`]. One render per post, one for the landing page, one per
//!   topic and one for the topic index.
//!
//! ## Failure policy
//!
//! Rendering is all-or-nothing: the first page that fails to render aborts the
//! pass and no bundle is returned. What happens to files that failed to scan is
//! the caller's choice ([`ScanPolicy`]): skip them and build from the valid
//! subset, or refuse to build at all.
//!
//! ## Ordering
//!
//! Posts are rendered newest first. Topic pages list their posts in the same
//! order. The topic index is sorted by name ignoring case, with a
//! case-sensitive tie-break, so the output is byte-for-byte reproducible.

use crate::bundle::{ArtifactBundle, AssemblyMode};
use crate::markdown::MarkdownOptions;
use crate::metadata::{Decode, MarkdownDecoder};
use crate::naming;
use crate::scan::{self, ScanError, ScanFailure, ScanFailures};
use crate::templates::{
    BaseData, LandingPage, LinkStyle, Page, PostPage, RenderError, Renderer, SiteRoot,
    TopicPage, TopicsIndexPage,
};
use crate::types::{DocumentList, TopicInfo};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, info_span, warn};

/// What to do when some files fail to scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPolicy {
    /// Build from the valid documents; report failures alongside the bundle.
    #[default]
    Skip,
    /// Any failure aborts the build.
    Fail,
}

/// Which page a render error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    Post(String),
    Landing,
    Topic(String),
    TopicsIndex,
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderTarget::Post(slug) => write!(f, "post {slug:?}"),
            RenderTarget::Landing => write!(f, "landing page"),
            RenderTarget::Topic(name) => write!(f, "topic {name:?}"),
            RenderTarget::TopicsIndex => write!(f, "topics index"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Scan(#[from] ScanFailures),
    #[error(transparent)]
    Traversal(#[from] ScanError),
    #[error("templated mode requires a renderer")]
    MissingRenderer,
    #[error("failed to render {target}: {source}")]
    Render {
        target: RenderTarget,
        #[source]
        source: RenderError,
    },
}

impl GenerateError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerateError::Traversal(ScanError::Cancelled))
    }
}

/// Site-level settings for one generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub site_title: String,
    /// URL prefix for every link, e.g. `/blog/`. Empty or `/` for the site root.
    pub root: String,
    /// Whether links name the `.html` files or the live server's routes.
    pub link_style: LinkStyle,
    pub mode: AssemblyMode,
    pub scan_policy: ScanPolicy,
    pub markdown: MarkdownOptions,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            site_title: "simple-blog".to_string(),
            root: String::new(),
            link_style: LinkStyle::Clean,
            mode: AssemblyMode::Templated,
            scan_policy: ScanPolicy::Skip,
            markdown: MarkdownOptions::default(),
        }
    }
}

/// Output of a full scan + assemble pass.
#[derive(Debug)]
pub struct Generated {
    pub bundle: ArtifactBundle,
    /// Files skipped under [`ScanPolicy::Skip`].
    pub failures: Vec<ScanFailure>,
    pub documents: DocumentList,
}

/// Scans a content directory and assembles it into a bundle.
///
/// Cheap to share: the live server holds one behind an `Arc` and calls
/// [`generate`](Self::generate) on every refresh.
pub struct Generator {
    config: GeneratorConfig,
    root: SiteRoot,
    renderer: Option<Arc<dyn Renderer>>,
    decoder: Arc<dyn Decode>,
    span: Span,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("has_renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(config: GeneratorConfig, renderer: Option<Arc<dyn Renderer>>) -> Self {
        let decoder = Arc::new(MarkdownDecoder::new(config.markdown.clone()));
        Self {
            root: SiteRoot::new(&config.root).with_link_style(config.link_style),
            config,
            renderer,
            decoder,
            span: info_span!("generator"),
        }
    }

    /// Replace the default markdown decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decode>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Scan `source` and assemble the result.
    pub fn generate(
        &self,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        let _entered = self.span.enter();

        if self.config.mode == AssemblyMode::Templated && self.renderer.is_none() {
            return Err(GenerateError::MissingRenderer);
        }

        let scanned = scan::scan(source, self.decoder.as_ref(), cancel)?;
        if !scanned.failures.is_empty() {
            match self.config.scan_policy {
                ScanPolicy::Fail => return Err(ScanFailures(scanned.failures).into()),
                ScanPolicy::Skip => warn!(
                    failed = scanned.failures.len(),
                    valid = scanned.documents.len(),
                    "building from valid documents only"
                ),
            }
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled.into());
        }
        let bundle = self.assemble(&scanned.documents)?;
        info!(
            source = %source.display(),
            posts = bundle.posts.len(),
            topics = bundle.topics.len(),
            skipped = scanned.failures.len(),
            "site assembled"
        );
        Ok(Generated {
            bundle,
            failures: scanned.failures,
            documents: scanned.documents,
        })
    }

    /// Assemble already-decoded documents into a bundle.
    pub fn assemble(&self, documents: &DocumentList) -> Result<ArtifactBundle, GenerateError> {
        let _entered = self.span.enter();
        match self.config.mode {
            AssemblyMode::Raw => Ok(assemble_raw(documents)),
            AssemblyMode::Templated => {
                let renderer = self
                    .renderer
                    .as_deref()
                    .ok_or(GenerateError::MissingRenderer)?;
                self.assemble_templated(documents, renderer)
            }
        }
    }

    fn base(&self, root: &SiteRoot, page_title: &str, description: &str, year: i32) -> BaseData {
        BaseData {
            site_title: self.config.site_title.clone(),
            page_title: page_title.to_string(),
            description: description.to_string(),
            year,
            root: root.clone(),
        }
    }

    fn assemble_templated(
        &self,
        documents: &DocumentList,
        renderer: &dyn Renderer,
    ) -> Result<ArtifactBundle, GenerateError> {
        let mut documents = documents.clone();
        documents.sort_by_date();
        let year = Utc::now().year();
        let mut bundle = ArtifactBundle::empty(AssemblyMode::Templated);

        let topics = documents.topics();
        let keys = naming::topic_keys(topics.iter().map(String::as_str));
        let root = self
            .root
            .clone()
            .with_topic_keys(topics.iter().cloned().zip(keys.iter().cloned()));

        for post in &documents {
            let page = Page::Post(PostPage {
                base: self.base(&root, &post.title, &post.description, year),
                post,
            });
            let bytes = render(renderer, &page, || RenderTarget::Post(post.slug.clone()))?;
            bundle.posts.insert(post.slug.clone(), bytes);
        }

        let landing = Page::Landing(LandingPage {
            base: self.base(&root, "Home", "Recent posts", year),
            posts: documents.as_slice(),
            total_posts: documents.len(),
        });
        bundle.landing = render(renderer, &landing, || RenderTarget::Landing)?;

        let mut infos = Vec::new();
        for (topic, key) in topics.into_iter().zip(keys) {
            let posts = documents.filter_by_topic(&topic);
            let post_count = posts.len();
            let bytes = {
                let page = Page::Topic(TopicPage {
                    base: self.base(
                        &root,
                        &format!("Topic: {topic}"),
                        &format!("Posts about {topic}"),
                        year,
                    ),
                    topic: &topic,
                    posts,
                    post_count,
                });
                render(renderer, &page, || RenderTarget::Topic(topic.clone()))?
            };
            bundle.topics.insert(key.clone(), bytes);
            infos.push(TopicInfo {
                name: topic,
                key,
                post_count,
            });
        }

        sort_topic_infos(&mut infos);
        bundle.topic_infos = infos.clone();
        let index = Page::TopicsIndex(TopicsIndexPage {
            base: self.base(&root, "All Topics", "Every topic covered on this site", year),
            total_topics: infos.len(),
            topics: infos,
        });
        bundle.topics_index = render(renderer, &index, || RenderTarget::TopicsIndex)?;

        Ok(bundle)
    }
}

fn assemble_raw(documents: &DocumentList) -> ArtifactBundle {
    let mut bundle = ArtifactBundle::empty(AssemblyMode::Raw);
    for doc in documents {
        bundle
            .posts
            .insert(doc.slug.clone(), doc.body_html.clone().into_bytes());
    }
    bundle
}

fn render(
    renderer: &dyn Renderer,
    page: &Page<'_>,
    target: impl FnOnce() -> RenderTarget,
) -> Result<Vec<u8>, GenerateError> {
    match renderer.render(page) {
        Ok(bytes) => {
            debug!(
                template = page.template_name(),
                title = %page.base().page_title,
                bytes = bytes.len(),
                "rendered page"
            );
            Ok(bytes)
        }
        Err(source) => Err(GenerateError::Render {
            target: target(),
            source,
        }),
    }
}

/// Alphabetical ignoring case; exact-case order breaks ties.
pub fn sort_topic_infos(infos: &mut [TopicInfo]) {
    infos.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
}
