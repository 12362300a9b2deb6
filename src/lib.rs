//! # Simple Blog
//!
//! A markdown blog engine. A directory of markdown files with YAML headers
//! becomes a site of post pages, topic pages, a topic index and a landing
//! page, either written to disk or served live over HTTP.
//!
//! # Architecture: Scan → Assemble → Publish
//!
//! ```text
//! 1. Scan      content/       →  DocumentList     (files → validated documents)
//! 2. Assemble  DocumentList   →  ArtifactBundle   (documents → rendered pages)
//! 3. Publish   ArtifactBundle →  dist/ | HTTP     (static files or live server)
//! ```
//!
//! Each stage is a plain function of its input:
//!
//! - **Scanning never aborts on a bad file.** Every valid document is kept and
//!   every invalid one is reported with its path and cause. Only an unusable
//!   content root stops a scan.
//! - **Assembly is all-or-nothing.** If any page fails to render, no bundle is
//!   produced. A half-built site is never written or served.
//! - **Bundles are immutable.** New content means a new bundle, swapped in
//!   whole. The live server never mutates the bundle it is serving.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1: walks the content directory, decodes documents, collects failures |
//! | [`generate`] | Stage 2: orders and groups documents, renders pages into a bundle |
//! | [`write`] | Stage 3a: writes a bundle to an output directory |
//! | [`server`] | Stage 3b: serves a bundle over HTTP with atomic hot replacement |
//! | [`cache`] | Single-snapshot bundle store with get/set/clear |
//! | [`bundle`] | The [`ArtifactBundle`](bundle::ArtifactBundle) produced by assembly |
//! | [`templates`] | Page data, the [`Renderer`](templates::Renderer) trait and the built-in maud renderer |
//! | [`metadata`] | YAML header parsing and validation into a [`Document`](types::Document) |
//! | [`markdown`] | Markdown body → HTML transform |
//! | [`types`] | `Document`, `DocumentList`, `TopicInfo` |
//! | [`naming`] | Slug derivation shared by documents and heading anchors |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting for scan and generate results |
//!
//! # Design Decisions
//!
//! ## Maud Over Template Engines
//!
//! Pages are built with [Maud](https://maud.lambda.xyz/), a compile-time HTML
//! macro system. Malformed markup is a build error, all interpolation is escaped
//! and there is no template directory to ship. Other renderers plug in through
//! [`templates::Renderer`].
//!
//! ## Lock-Free Reads While Serving
//!
//! The live server keeps its bundle in an `ArcSwapOption`. Requests load the
//! current `Arc` without locking and answer entirely from it, so a refresh that
//! lands mid-request cannot produce a page mixing two versions.
//!
//! ## Explicit Failure Policy
//!
//! Whether files that fail to parse should stop a build is a per-site choice,
//! made with `build.on_scan_error` (`"skip"` or `"fail"`) or `--strict`.
//!
//! ## Logging
//!
//! The library emits `tracing` events and never installs a subscriber. The
//! binary installs one on stderr; embedders bring their own.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod generate;
pub mod markdown;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod scan;
pub mod server;
pub mod templates;
pub mod types;
pub mod write;

#[cfg(test)]
pub(crate) mod test_helpers;
