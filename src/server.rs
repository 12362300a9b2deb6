//! Live HTTP server with hot content replacement.
//!
//! Serves the pages of an [`ArtifactBundle`] and regenerates it from the
//! content directory on demand, swapping the new bundle in atomically.
//!
//! ## Routes
//!
//! With the site root `R` (`""` or `/segment`):
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET R/`, `GET R`, `GET R/posts` | landing page |
//! | `GET R/posts/{slug}` | post page, or 404 |
//! | `GET R/tags` | topics index |
//! | `GET R/tags/{key}` | topic page by key or display name, or 404 |
//!
//! Until the first bundle is installed every route answers 503.
//!
//! ## Replacement
//!
//! The live bundle sits in an [`ArcSwapOption`]. A request loads the current
//! `Arc` once and answers from it, so it sees exactly one bundle version even
//! if a refresh lands mid-request. Refreshes are serialized; a failed refresh
//! leaves the previous bundle serving and only reports the error to its caller.
//!
//! ## Shutdown
//!
//! [`Server::run`] stops accepting on SIGINT, SIGTERM or when the caller's
//! token is cancelled, then waits up to `shutdown_timeout` for in-flight
//! requests before dropping the remaining connections.

use crate::bundle::ArtifactBundle;
use crate::generate::{GenerateError, Generator};
use crate::scan::ScanFailure;
use crate::templates::SiteRoot;
use arc_swap::ArcSwapOption;
use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    /// The refresh was abandoned because its token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServerError::Generate(err) if err.is_cancelled())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route prefix, e.g. `/blog`. Empty or `/` serves from the site root.
    pub root: String,
    /// Upper bound on the graceful drain after a shutdown request.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            root: String::new(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outcome of a successful refresh.
#[derive(Debug)]
pub struct RefreshReport {
    pub source: PathBuf,
    pub posts: usize,
    pub topics: usize,
    /// Files skipped during the scan.
    pub failures: Vec<ScanFailure>,
}

struct Shared {
    generator: Arc<Generator>,
    /// Content directory. The lock also serializes refreshes.
    source: Mutex<PathBuf>,
    bundle: ArcSwapOption<ArtifactBundle>,
    config: ServerConfig,
    root: SiteRoot,
    span: Span,
}

/// Handle to a live server. Clones share the same state.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    pub fn new(generator: Arc<Generator>, source: impl Into<PathBuf>, config: ServerConfig) -> Self {
        Self::new_in_span(generator, source, config, info_span!("server"))
    }

    /// Like [`Server::new`], with every event of this server and its clones
    /// emitted under `span`.
    pub fn new_in_span(
        generator: Arc<Generator>,
        source: impl Into<PathBuf>,
        config: ServerConfig,
        span: Span,
    ) -> Self {
        let root = SiteRoot::new(&config.root);
        Self {
            shared: Arc::new(Shared {
                generator,
                source: Mutex::new(source.into()),
                bundle: ArcSwapOption::empty(),
                root,
                config,
                span,
            }),
        }
    }

    pub fn span(&self) -> &Span {
        &self.shared.span
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// The bundle currently being served.
    pub fn current(&self) -> Option<Arc<ArtifactBundle>> {
        self.shared.bundle.load_full()
    }

    /// Serve `bundle` from now on.
    pub fn install(&self, bundle: impl Into<Arc<ArtifactBundle>>) {
        self.shared.bundle.store(Some(bundle.into()));
    }

    pub async fn source(&self) -> PathBuf {
        self.shared.source.lock().await.clone()
    }

    /// Regenerate from the current content directory.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport, ServerError> {
        self.regenerate(None, cancel).await
    }

    /// Regenerate from `source`. The new directory is adopted only if
    /// generation succeeds.
    pub async fn update_posts(
        &self,
        source: impl Into<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, ServerError> {
        self.regenerate(Some(source.into()), cancel).await
    }

    async fn regenerate(
        &self,
        new_source: Option<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, ServerError> {
        let span = self.shared.span.clone();
        let mut current = self.shared.source.lock().await;
        let source = new_source.clone().unwrap_or_else(|| current.clone());

        let generator = self.shared.generator.clone();
        let token = cancel.clone();
        let dir = source.clone();
        let blocking_span = span.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            blocking_span.in_scope(|| generator.generate(&dir, &token))
        })
        .await
        .map_err(ServerError::from)
        .and_then(|r| r.map_err(ServerError::from));

        match outcome {
            Ok(generated) => {
                let report = RefreshReport {
                    source: source.clone(),
                    posts: generated.bundle.posts.len(),
                    topics: generated.bundle.topics.len(),
                    failures: generated.failures,
                };
                self.shared.bundle.store(Some(Arc::new(generated.bundle)));
                if new_source.is_some() {
                    *current = source;
                }
                info!(
                    parent: &span,
                    source = %report.source.display(),
                    posts = report.posts,
                    topics = report.topics,
                    skipped = report.failures.len(),
                    "site refreshed"
                );
                Ok(report)
            }
            Err(err) if err.is_cancelled() => {
                debug!(parent: &span, source = %source.display(), "refresh cancelled");
                Err(err)
            }
            Err(err) => {
                warn!(
                    parent: &span,
                    source = %source.display(),
                    error = %err,
                    "refresh failed, keeping previous site"
                );
                Err(err)
            }
        }
    }

    /// Routes for the configured root, bound to this server's state.
    pub fn router(&self) -> Router {
        let r = self.shared.root.as_str();
        let mut router = Router::new()
            .route(&format!("{r}/"), get(landing))
            .route(&format!("{r}/posts"), get(landing))
            .route(&format!("{r}/posts/{{slug}}"), get(post))
            .route(&format!("{r}/tags"), get(topics_index))
            .route(&format!("{r}/tags/{{name}}"), get(topic));
        if !r.is_empty() {
            router = router.route(r, get(landing));
        }
        router.with_state(self.shared.clone())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let addr = self.shared.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, cancel).await;
        Ok(())
    }

    /// Serve on an already-bound listener until a signal or `cancel`.
    ///
    /// Serve and shutdown errors are logged, not returned.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) {
        let span = self.shared.span.clone();
        let timeout = self.shared.config.shutdown_timeout;
        let draining = CancellationToken::new();
        let trigger = draining.clone();

        if let Ok(addr) = listener.local_addr() {
            info!(parent: &span, %addr, root = self.shared.root.as_str(), "listening");
        }

        let shutdown = async move {
            tokio::select! {
                _ = wait_for_shutdown_signal() => info!("shutdown signal received"),
                _ = cancel.cancelled() => info!("shutdown requested"),
            }
            trigger.cancel();
        };
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.instrument(span.clone()))
            .into_future();
        let deadline = async {
            draining.cancelled().await;
            tokio::time::sleep(timeout).await;
        };

        async {
            tokio::select! {
                result = server => match result {
                    Ok(()) => info!("server stopped"),
                    Err(err) => error!(error = %err, "server failed"),
                },
                _ = deadline => warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "graceful shutdown timed out, dropping open connections"
                ),
            }
        }
        .instrument(span)
        .await;
    }

    /// Refresh every `interval` until `cancel` fires. Failures are logged and
    /// the current bundle keeps serving.
    pub fn spawn_refresh_loop(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let server = self.clone();
        let span = self.shared.span.clone();
        // Fires with `cancel`.
        let refresh_token = cancel.child_token();
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            // Errors are already logged by regenerate.
                            let _ = server.refresh(&refresh_token).await;
                        }
                    }
                }
                debug!("refresh loop stopped");
            }
            .instrument(span),
        )
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "cannot listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

type AppState = State<Arc<Shared>>;

fn html(bytes: &[u8]) -> Response {
    ([(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], bytes.to_vec()).into_response()
}

fn not_ready() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "site is not ready yet\n").into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

impl Shared {
    /// Answer from one consistent bundle snapshot.
    fn respond(&self, route: &str, pick: impl FnOnce(&ArtifactBundle) -> Option<&[u8]>) -> Response {
        let Some(bundle) = self.bundle.load_full() else {
            debug!(parent: &self.span, route, "no bundle installed");
            return not_ready();
        };
        match pick(&bundle) {
            Some(bytes) => {
                debug!(parent: &self.span, route, bytes = bytes.len(), "served");
                html(bytes)
            }
            None => {
                debug!(parent: &self.span, route, "not found");
                not_found()
            }
        }
    }
}

async fn landing(State(shared): AppState) -> Response {
    shared.respond("landing", |b| Some(b.landing.as_slice()))
}

async fn topics_index(State(shared): AppState) -> Response {
    shared.respond("topics_index", |b| Some(b.topics_index.as_slice()))
}

async fn post(State(shared): AppState, UrlPath(slug): UrlPath<String>) -> Response {
    shared.respond("post", |b| b.post(&slug))
}

async fn topic(State(shared): AppState, UrlPath(name): UrlPath<String>) -> Response {
    shared.respond("topic", |b| b.topic(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AssemblyMode;
    use crate::generate::GeneratorConfig;
    use crate::templates::MaudRenderer;
    use crate::test_helpers::{http_get, write_post};
    use crate::types::TopicInfo;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    fn generator() -> Arc<Generator> {
        Arc::new(Generator::new(
            GeneratorConfig::default(),
            Some(Arc::new(MaudRenderer::default())),
        ))
    }

    fn fixed_bundle(tag: &str) -> ArtifactBundle {
        let mut b = ArtifactBundle::empty(AssemblyMode::Templated);
        b.posts.insert("hello".into(), format!("post {tag}").into_bytes());
        b.topics.insert("rust".into(), format!("topic {tag}").into_bytes());
        b.topic_infos = vec![TopicInfo {
            name: "Rust".into(),
            key: "rust".into(),
            post_count: 1,
        }];
        b.landing = format!("landing {tag}").into_bytes();
        b.topics_index = format!("index {tag}").into_bytes();
        b
    }

    async fn start(server: &Server) -> (SocketAddr, CancellationToken, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = server.clone();
        let stop = token.clone();
        let handle = tokio::spawn(async move { server.serve(listener, stop).await });
        (addr, token, handle)
    }

    fn server_with_root(root: &str) -> Server {
        Server::new(
            generator(),
            "unused",
            ServerConfig {
                root: root.into(),
                ..ServerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn every_route_is_503_before_install() {
        let server = server_with_root("");
        let (addr, token, _) = start(&server).await;
        for path in ["/", "/posts", "/posts/hello", "/tags", "/tags/Rust"] {
            let response = http_get(addr, path).await;
            assert_eq!(response.status, 503, "{path}");
        }
        token.cancel();
    }

    #[tokio::test]
    async fn routes_serve_bundle_entries() {
        let server = server_with_root("");
        server.install(fixed_bundle("v1"));
        let (addr, token, _) = start(&server).await;

        let cases = [
            ("/", "landing v1"),
            ("/posts", "landing v1"),
            ("/posts/hello", "post v1"),
            ("/tags", "index v1"),
            ("/tags/Rust", "topic v1"),
            ("/tags/rust", "topic v1"),
        ];
        for (path, body) in cases {
            let response = http_get(addr, path).await;
            assert_eq!(response.status, 200, "{path}");
            assert_eq!(response.body, body, "{path}");
            assert_eq!(
                response.header("content-type").as_deref(),
                Some(HTML_CONTENT_TYPE)
            );
        }
        token.cancel();
    }

    #[tokio::test]
    async fn unknown_entries_are_404() {
        let server = server_with_root("");
        server.install(fixed_bundle("v1"));
        let (addr, token, _) = start(&server).await;

        assert_eq!(http_get(addr, "/posts/missing").await.status, 404);
        assert_eq!(http_get(addr, "/tags/missing").await.status, 404);
        token.cancel();
    }

    #[tokio::test]
    async fn root_prefix_moves_every_route() {
        let server = server_with_root("/blog/");
        server.install(fixed_bundle("v1"));
        let (addr, token, _) = start(&server).await;

        assert_eq!(http_get(addr, "/blog").await.body, "landing v1");
        assert_eq!(http_get(addr, "/blog/").await.body, "landing v1");
        assert_eq!(http_get(addr, "/blog/posts/hello").await.body, "post v1");
        assert_eq!(http_get(addr, "/blog/tags").await.body, "index v1");
        assert_eq!(http_get(addr, "/").await.status, 404);
        assert_eq!(http_get(addr, "/posts/hello").await.status, 404);
        token.cancel();
    }

    #[tokio::test]
    async fn install_replaces_bundle() {
        let server = server_with_root("");
        server.install(fixed_bundle("v1"));
        let (addr, token, _) = start(&server).await;
        assert_eq!(http_get(addr, "/").await.body, "landing v1");

        server.install(fixed_bundle("v2"));
        assert_eq!(http_get(addr, "/").await.body, "landing v2");
        token.cancel();
    }

    #[tokio::test]
    async fn refresh_picks_up_new_content() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "First", "2024-01-01", &[]);
        let server = Server::new(generator(), tmp.path(), ServerConfig::default());
        let token = CancellationToken::new();

        let report = server.refresh(&token).await.unwrap();
        assert_eq!(report.posts, 1);

        write_post(tmp.path(), "b.md", "Second", "2024-02-01", &[]);
        server.refresh(&token).await.unwrap();
        let current = server.current().unwrap();
        assert!(current.posts.contains_key("first"));
        assert!(current.posts.contains_key("second"));
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_bundle_and_source() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "First", "2024-01-01", &[]);
        let server = Server::new(generator(), tmp.path(), ServerConfig::default());
        let token = CancellationToken::new();
        server.refresh(&token).await.unwrap();
        let before = server.current().unwrap();

        let result = server.update_posts(tmp.path().join("missing"), &token).await;
        assert!(matches!(result, Err(ServerError::Generate(_))));
        assert!(Arc::ptr_eq(&before, &server.current().unwrap()));
        assert_eq!(server.source().await, tmp.path());
    }

    #[tokio::test]
    async fn update_posts_adopts_new_source() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_post(first.path(), "a.md", "Old Post", "2024-01-01", &[]);
        write_post(second.path(), "b.md", "New Post", "2024-01-01", &[]);
        let server = Server::new(generator(), first.path(), ServerConfig::default());
        let token = CancellationToken::new();

        server.update_posts(second.path(), &token).await.unwrap();
        assert_eq!(server.source().await, second.path());
        let current = server.current().unwrap();
        assert!(current.posts.contains_key("new-post"));
        assert!(!current.posts.contains_key("old-post"));

        // A plain refresh now reads the adopted directory.
        write_post(second.path(), "c.md", "Another", "2024-02-01", &[]);
        server.refresh(&token).await.unwrap();
        assert!(server.current().unwrap().posts.contains_key("another"));
    }

    #[tokio::test]
    async fn cancellation_stops_serving() {
        let server = server_with_root("");
        server.install(fixed_bundle("v1"));
        let (addr, token, handle) = start(&server).await;
        assert_eq!(http_get(addr, "/").await.status, 200);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn run_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = Server::new(
            generator(),
            "unused",
            ServerConfig {
                port,
                ..ServerConfig::default()
            },
        );
        let result = server.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn refresh_loop_refreshes_until_cancelled() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "First", "2024-01-01", &[]);
        let server = Server::new(generator(), tmp.path(), ServerConfig::default());
        let token = CancellationToken::new();
        let handle = server.spawn_refresh_loop(Duration::from_millis(20), token.clone());

        let mut installed = false;
        for _ in 0..100 {
            if server.current().is_some() {
                installed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(installed, "refresh loop never installed a bundle");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresh loop did not stop")
            .unwrap();
    }

    /// Log sink for asserting on what a test emitted.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn cancelled_refresh_is_quiet_and_keeps_bundle() {
        let (logs, _guard) = capture_logs();
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "First", "2024-01-01", &[]);
        let server = Server::new(generator(), tmp.path(), ServerConfig::default());
        server.refresh(&CancellationToken::new()).await.unwrap();
        let before = server.current().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = server.refresh(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(Arc::ptr_eq(&before, &server.current().unwrap()));

        let text = logs.text();
        assert!(text.contains("refresh cancelled"), "{text}");
        assert!(!text.contains("WARN"), "{text}");
    }

    #[tokio::test]
    async fn stopping_refresh_loop_logs_no_warning() {
        let (logs, _guard) = capture_logs();
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "First", "2024-01-01", &[]);
        let server = Server::new(generator(), tmp.path(), ServerConfig::default());

        let cancel = CancellationToken::new();
        let refresher = server.spawn_refresh_loop(Duration::from_millis(5), cancel.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        refresher.await.unwrap();

        let text = logs.text();
        assert!(!text.contains("WARN"), "{text}");
    }

    #[test]
    fn span_given_at_construction_is_shared_by_clones() {
        let (_logs, _guard) = capture_logs();
        let server = Server::new_in_span(
            generator(),
            "unused",
            ServerConfig::default(),
            tracing::info_span!("blog", site = "test"),
        );
        let clone = server.clone();
        assert_eq!(clone.span().metadata().map(|m| m.name()), Some("blog"));
        assert_eq!(
            Server::new(generator(), "unused", ServerConfig::default())
                .span()
                .metadata()
                .map(|m| m.name()),
            Some("server")
        );
    }
}
