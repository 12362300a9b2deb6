//! Page data and HTML rendering.
//!
//! The assembler never builds HTML itself. It fills one page-data struct per
//! output page, wraps it in a [`Page`] and hands it to a [`Renderer`]:
//!
//! | Page | Template name | Rendered |
//! |------|---------------|----------|
//! | [`PostPage`] | `post` | once per document |
//! | [`LandingPage`] | `index` | once |
//! | [`TopicPage`] | `topic` | once per topic |
//! | [`TopicsIndexPage`] | `topics_index` | once |
//!
//! [`MaudRenderer`] is the built-in renderer. Any other implementation of
//! [`Renderer`] can be plugged into the [`Generator`](crate::generate::Generator).
//!
//! ## Links
//!
//! All links go through [`SiteRoot`], so a site generated with root `/blog/`
//! links to `/blog/posts/{slug}` while the default root links to `/posts/{slug}`.
//! With [`LinkStyle::Html`] links name the written files instead
//! (`/posts/{slug}.html`, `/tags/index.html`); the live server uses
//! [`LinkStyle::Clean`]. Topic links use the topic's key, never its raw name.

use crate::naming;
use crate::types::{Document, TopicInfo};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const STYLESHEET: &str = include_str!("../static/style.css");

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template {template:?} failed: {message}")]
    Failed {
        template: &'static str,
        message: String,
    },
}

/// How generated links name pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    /// `/posts/{slug}`, `/tags`: the live server's routes.
    #[default]
    Clean,
    /// `/posts/{slug}.html`, `/tags/index.html`: the files the static writer
    /// produces, so the output works from any file server.
    Html,
}

/// URL prefix every generated link starts with, plus how pages are named
/// below it.
///
/// The prefix is stored normalized: empty for the site root, otherwise
/// `/segment[/more]` without a trailing slash. Topic links use the file-safe
/// keys registered with [`SiteRoot::with_topic_keys`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteRoot {
    prefix: String,
    style: LinkStyle,
    /// Lowercased topic name → key.
    topic_keys: Arc<HashMap<String, String>>,
}

impl SiteRoot {
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self {
            prefix,
            ..Self::default()
        }
    }

    pub fn with_link_style(mut self, style: LinkStyle) -> Self {
        self.style = style;
        self
    }

    /// Register `(topic name, key)` pairs. Names match case-insensitively.
    pub fn with_topic_keys(mut self, keys: impl IntoIterator<Item = (String, String)>) -> Self {
        self.topic_keys = Arc::new(
            keys.into_iter()
                .map(|(name, key)| (name.to_lowercase(), key))
                .collect(),
        );
        self
    }

    /// `""` or `/segment`.
    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn link_style(&self) -> LinkStyle {
        self.style
    }

    /// Join a site-relative path onto the root.
    ///
    /// ```text
    /// SiteRoot::new("/blog/").join("posts/x") → "/blog/posts/x"
    /// SiteRoot::new("").join("posts/x")       → "/posts/x"
    /// ```
    pub fn join(&self, rel: &str) -> String {
        format!("{}/{}", self.prefix, rel.trim_start_matches('/'))
    }

    pub fn home(&self) -> String {
        self.join("")
    }

    pub fn post_url(&self, slug: &str) -> String {
        self.join(&format!("posts/{slug}{}", self.extension()))
    }

    /// Key for a topic name: the registered one, else its slug.
    pub fn topic_key(&self, name: &str) -> String {
        match self.topic_keys.get(&name.to_lowercase()) {
            Some(key) => key.clone(),
            None => naming::slugify(name),
        }
    }

    pub fn topic_url(&self, name: &str) -> String {
        self.topic_key_url(&self.topic_key(name))
    }

    pub fn topic_key_url(&self, key: &str) -> String {
        self.join(&format!("tags/{key}{}", self.extension()))
    }

    pub fn topics_url(&self) -> String {
        match self.style {
            LinkStyle::Clean => self.join("tags"),
            LinkStyle::Html => self.join("tags/index.html"),
        }
    }

    fn extension(&self) -> &'static str {
        match self.style {
            LinkStyle::Clean => "",
            LinkStyle::Html => ".html",
        }
    }
}

/// Fields every page carries.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseData {
    pub site_title: String,
    pub page_title: String,
    pub description: String,
    /// Current year, for the footer.
    pub year: i32,
    pub root: SiteRoot,
}

#[derive(Debug, Clone)]
pub struct PostPage<'a> {
    pub base: BaseData,
    pub post: &'a Document,
}

#[derive(Debug, Clone)]
pub struct LandingPage<'a> {
    pub base: BaseData,
    /// Newest first.
    pub posts: &'a [Document],
    pub total_posts: usize,
}

#[derive(Debug, Clone)]
pub struct TopicPage<'a> {
    pub base: BaseData,
    pub topic: &'a str,
    /// Newest first.
    pub posts: Vec<&'a Document>,
    pub post_count: usize,
}

#[derive(Debug, Clone)]
pub struct TopicsIndexPage {
    pub base: BaseData,
    /// Sorted by name, case-insensitively.
    pub topics: Vec<TopicInfo>,
    pub total_topics: usize,
}

/// One page handed to a [`Renderer`].
#[derive(Debug, Clone)]
pub enum Page<'a> {
    Post(PostPage<'a>),
    Landing(LandingPage<'a>),
    Topic(TopicPage<'a>),
    TopicsIndex(TopicsIndexPage),
}

impl Page<'_> {
    pub fn template_name(&self) -> &'static str {
        match self {
            Page::Post(_) => "post",
            Page::Landing(_) => "index",
            Page::Topic(_) => "topic",
            Page::TopicsIndex(_) => "topics_index",
        }
    }

    pub fn base(&self) -> &BaseData {
        match self {
            Page::Post(p) => &p.base,
            Page::Landing(p) => &p.base,
            Page::Topic(p) => &p.base,
            Page::TopicsIndex(p) => &p.base,
        }
    }
}

/// Turns page data into bytes.
pub trait Renderer: Send + Sync {
    fn render(&self, page: &Page<'_>) -> Result<Vec<u8>, RenderError>;
}

/// Built-in HTML renderer using maud, with the stylesheet inlined.
#[derive(Debug, Clone)]
pub struct MaudRenderer {
    css: Cow<'static, str>,
}

impl Default for MaudRenderer {
    fn default() -> Self {
        Self {
            css: Cow::Borrowed(STYLESHEET),
        }
    }
}

impl MaudRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the embedded stylesheet.
    pub fn with_stylesheet(css: impl Into<Cow<'static, str>>) -> Self {
        Self { css: css.into() }
    }
}

impl Renderer for MaudRenderer {
    fn render(&self, page: &Page<'_>) -> Result<Vec<u8>, RenderError> {
        let markup = match page {
            Page::Post(p) => render_post(p, &self.css),
            Page::Landing(p) => render_landing(p, &self.css),
            Page::Topic(p) => render_topic(p, &self.css),
            Page::TopicsIndex(p) => render_topics_index(p, &self.css),
        };
        Ok(markup.into_string().into_bytes())
    }
}

// ============================================================================
// HTML components
// ============================================================================

fn base_document(base: &BaseData, css: &str, body_class: &str, content: Markup) -> Markup {
    let title = if base.page_title.is_empty() || base.page_title == base.site_title {
        base.site_title.clone()
    } else {
        format!("{} | {}", base.page_title, base.site_title)
    };
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                @if !base.description.is_empty() {
                    meta name="description" content=(base.description);
                }
                title { (title) }
                style { (PreEscaped(css)) }
            }
            body class=(body_class) {
                (site_header(base))
                main { (content) }
                (site_footer(base))
            }
        }
    }
}

fn site_header(base: &BaseData) -> Markup {
    html! {
        header.site-header {
            a.site-title href=(base.root.home()) { (base.site_title) }
            nav.site-nav {
                a href=(base.root.home()) { "Home" }
                a href=(base.root.topics_url()) { "Topics" }
            }
        }
    }
}

fn site_footer(base: &BaseData) -> Markup {
    html! {
        footer.site-footer {
            "© " (base.year) " " (base.site_title)
        }
    }
}

fn topic_links(topics: &[String], root: &SiteRoot) -> Markup {
    html! {
        @if !topics.is_empty() {
            ul.topic-links {
                @for topic in topics {
                    li { a href=(root.topic_url(topic)) { (topic) } }
                }
            }
        }
    }
}

fn post_summary(post: &Document, root: &SiteRoot) -> Markup {
    html! {
        article.post-summary {
            h2 { a href=(root.post_url(&post.slug)) { (post.title) } }
            time datetime=(post.short_date()) { (post.formatted_date()) }
            p.description { (post.description) }
            (topic_links(&post.topics, root))
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("1 {word}")
    } else {
        format!("{count} {word}s")
    }
}

// ============================================================================
// Page renderers
// ============================================================================

fn render_post(page: &PostPage<'_>, css: &str) -> Markup {
    let post = page.post;
    let root = &page.base.root;
    let content = html! {
        article.post {
            header {
                h1 { (post.title) }
                time datetime=(post.short_date()) { (post.formatted_date()) }
                (topic_links(&post.topics, root))
            }
            div.post-body { (PreEscaped(&post.body_html)) }
        }
    };
    base_document(&page.base, css, "post-page", content)
}

fn render_landing(page: &LandingPage<'_>, css: &str) -> Markup {
    let root = &page.base.root;
    let content = html! {
        h1 { (page.base.site_title) }
        p.post-count { (plural(page.total_posts, "post")) }
        @if page.posts.is_empty() {
            p.empty { "Nothing published yet." }
        }
        @for post in page.posts {
            (post_summary(post, root))
        }
    };
    base_document(&page.base, css, "index-page", content)
}

fn render_topic(page: &TopicPage<'_>, css: &str) -> Markup {
    let root = &page.base.root;
    let content = html! {
        h1 { "Topic: " (page.topic) }
        p.post-count { (plural(page.post_count, "post")) }
        @for post in &page.posts {
            (post_summary(post, root))
        }
        p { a href=(root.topics_url()) { "All topics" } }
    };
    base_document(&page.base, css, "topic-page", content)
}

fn render_topics_index(page: &TopicsIndexPage, css: &str) -> Markup {
    let root = &page.base.root;
    let content = html! {
        h1 { "All Topics" }
        p.topic-count { (plural(page.total_topics, "topic")) }
        ul.topics-index {
            @for topic in &page.topics {
                li {
                    a href=(root.topic_key_url(&topic.key)) { (topic.name) }
                    " "
                    span.count { "(" (topic.post_count) ")" }
                }
            }
        }
    };
    base_document(&page.base, css, "topics-page", content)
}
