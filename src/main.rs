use clap::{Parser, Subcommand};
use simple_blog::config::{self, BlogConfig};
use simple_blog::generate::{Generator, ScanPolicy};
use simple_blog::metadata::MarkdownDecoder;
use simple_blog::server::Server;
use simple_blog::templates::{MaudRenderer, Renderer};
use simple_blog::write::DirectoryWriter;
use simple_blog::{output, scan};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simple-blog")]
#[command(about = "Markdown blog generator and live server")]
#[command(long_about = "\
Markdown blog generator and live server

Every markdown file under the content directory is a post. Each file starts
with a YAML header:

  ---
  title: Hello World          # required
  date: 2024-03-15            # required (RFC 3339, YYYY-MM-DD HH:MM:SS or YYYY-MM-DD)
  description: A first post   # required
  tags: [rust, web]           # optional
  slug: hello                 # optional, derived from the title otherwise
  ---

Content structure:

  content/
  ├── config.toml             # Site config (optional)
  ├── hello-world.md          # Post
  ├── 2024/
  │   └── rust-tips.markdown  # Subdirectories are for organisation only
  └── .drafts/                # Hidden entries are ignored

Files with an invalid header are reported and skipped (or fail the build with
--strict). Run 'simple-blog gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Config file (defaults to <source>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into the output directory
    Generate {
        /// Post bodies only: no landing, topic or topic index pages
        #[arg(long)]
        raw: bool,
        /// URL prefix for every link, e.g. /blog/
        #[arg(long)]
        root: Option<String>,
        /// Site title
        #[arg(long)]
        title: Option<String>,
        /// Fail when any file cannot be parsed
        #[arg(long)]
        strict: bool,
        /// Link to /posts/slug instead of /posts/slug.html
        #[arg(long)]
        clean_urls: bool,
    },
    /// Serve the site over HTTP, regenerating it from the content directory
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// URL prefix for every route, e.g. /blog/
        #[arg(long)]
        root: Option<String>,
        /// Seconds between automatic refreshes (0 disables)
        #[arg(long)]
        refresh_interval: Option<u64>,
    },
    /// Validate the content directory without building
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_logging(&cli)?;
    let mut site_config = load_site_config(&cli)?;

    match cli.command {
        Command::Generate {
            raw,
            root,
            title,
            strict,
            clean_urls,
        } => {
            if raw {
                site_config.build.raw = true;
            }
            if let Some(root) = root {
                site_config.site.root = root;
            }
            if let Some(title) = title {
                site_config.site.title = title;
            }
            if strict {
                site_config.build.on_scan_error = ScanPolicy::Fail;
            }
            if clean_urls {
                site_config.build.clean_urls = true;
            }
            site_config.validate()?;
            generate(&cli.source, &cli.output, &site_config)?;
        }
        Command::Serve {
            host,
            port,
            root,
            refresh_interval,
        } => {
            if let Some(host) = host {
                site_config.server.host = host;
            }
            if let Some(port) = port {
                site_config.server.port = port;
            }
            if let Some(root) = root {
                site_config.site.root = root;
            }
            if let Some(secs) = refresh_interval {
                site_config.server.refresh_interval_secs = secs;
            }
            site_config.validate()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(cli.source.clone(), site_config))?;
        }
        Command::Check { json } => {
            check(&cli.source, &site_config, json)?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over the flags.
fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let machine_output = matches!(cli.command, Command::Check { json: true });
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || machine_output {
        "error"
    } else if matches!(cli.command, Command::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| format!("failed to install logger: {err}"))?;
    Ok(())
}

fn load_site_config(cli: &Cli) -> Result<BlogConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(config::ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file not found: {}", path.display()),
                )));
            }
            config::load_config_file(path)
        }
        None => config::load_config(&cli.source),
    }
}

fn renderer() -> Option<Arc<dyn Renderer>> {
    Some(Arc::new(MaudRenderer::new()))
}

fn generate(
    source: &Path,
    out: &Path,
    site_config: &BlogConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("==> Generating {} → {}", source.display(), out.display());
    let generator = Generator::new(site_config.generator_config(), renderer());
    let generated = generator.generate(source, &CancellationToken::new())?;
    let summary = DirectoryWriter::new(out).write(&generated.bundle)?;
    output::print_generate_output(&generated.documents, &generated.bundle, &generated.failures);
    println!(
        "==> Wrote {} files ({} bytes) to {}",
        summary.files(),
        summary.bytes,
        out.display()
    );
    Ok(())
}

fn check(
    source: &Path,
    site_config: &BlogConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("==> Checking {}", source.display());
    }
    let decoder = MarkdownDecoder::new(site_config.markdown.clone());
    let scanned = scan::scan(source, &decoder, &CancellationToken::new())?;
    if json {
        println!(
            "{}",
            output::format_scan_json(&scanned.documents, &scanned.failures)?
        );
    } else {
        output::print_scan_output(&scanned.documents, &scanned.failures);
    }

    scanned.into_result()?;
    if !json {
        println!("==> Content is valid");
    }
    Ok(())
}

async fn serve(source: PathBuf, site_config: BlogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let generator = Arc::new(Generator::new(site_config.live_generator_config(), renderer()));
    let server = Server::new(generator, source, site_config.server_config());
    let cancel = CancellationToken::new();

    // The first generation must succeed; later refresh failures keep serving.
    let report = server.refresh(&cancel).await?;
    for failure in &report.failures {
        tracing::warn!(%failure, "skipped");
    }

    let refresher = site_config
        .refresh_interval()
        .map(|interval| server.spawn_refresh_loop(interval, cancel.clone()));
    if let Some(interval) = site_config.refresh_interval() {
        info!(every = ?interval, "periodic refresh enabled");
    }

    let served = server.run(cancel.clone()).await;
    cancel.cancel();
    if let Some(handle) = refresher {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    served?;
    Ok(())
}
