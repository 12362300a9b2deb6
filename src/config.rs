//! Blog configuration.
//!
//! Handles loading, validating and merging `config.toml`. User values are
//! layered over stock defaults, so a config file only needs the keys it wants
//! to change.
//!
//! ## Where it is read from
//!
//! `config.toml` in the content root is picked up automatically. The CLI's
//! `--config` flag points at a file anywhere else instead.
//!
//! ```text
//! content/
//! ├── config.toml              # Site config (optional)
//! ├── hello-world.md
//! └── ...
//! ```
//!
//! ## Keys
//!
//! ```toml
//! # Every key is optional; these are the defaults
//!
//! [site]
//! title = "simple-blog"     # Shown in headers, footers and <title>
//! root = "/"                # URL prefix for every link and route
//!
//! [markdown]
//! highlight = true          # Wrap fenced code in highlight markup
//! highlight_style = "base16-ocean.dark"
//! footnotes = true
//! hard_wraps = true         # Single newlines become <br>
//!
//! [build]
//! raw = false               # Bodies only: no landing or topic pages
//! on_scan_error = "skip"    # "skip" invalid files or "fail" the build
//! clean_urls = false        # Static links without ".html"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! shutdown_timeout_secs = 10
//! refresh_interval_secs = 0 # 0 disables periodic refresh
//! ```
//!
//! ## Validation
//!
//! Unknown keys are rejected at parse time. After parsing, [`BlogConfig::validate`]
//! checks the values that a type alone cannot: non-empty title, a known theme
//! when highlighting, a non-zero port and a shutdown timeout of 1 to 300 s.

use crate::bundle::AssemblyMode;
use crate::generate::{GeneratorConfig, ScanPolicy};
use crate::markdown::{self, MarkdownOptions};
use crate::server::ServerConfig;
use crate::templates::LinkStyle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config.toml";

const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Blog configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlogConfig {
    pub site: SiteConfig,
    pub markdown: MarkdownOptions,
    pub build: BuildConfig,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub title: String,
    /// URL prefix, e.g. `/blog/`.
    pub root: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "simple-blog".to_string(),
            root: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub raw: bool,
    pub on_scan_error: ScanPolicy,
    /// Link to `/posts/{slug}` instead of `/posts/{slug}.html` in static
    /// output, for hosts that map extensionless paths to `.html` files.
    pub clean_urls: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    /// Seconds between automatic refreshes; 0 disables them.
    pub refresh_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_timeout_secs: 10,
            refresh_interval_secs: 0,
        }
    }
}

impl BlogConfig {
    /// Range and emptiness checks serde cannot express. Messages name the key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site.title must not be empty".into(),
            ));
        }
        if self.markdown.highlight && !markdown::is_highlight_style(&self.markdown.highlight_style) {
            let known: Vec<&str> = markdown::highlight_styles().collect();
            return Err(ConfigError::Validation(format!(
                "markdown.highlight_style {:?} is not a known style (one of: {})",
                self.markdown.highlight_style,
                known.join(", ")
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.host must not be empty".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".into(),
            ));
        }
        if !(1..=MAX_SHUTDOWN_TIMEOUT_SECS).contains(&self.server.shutdown_timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "server.shutdown_timeout_secs must be 1-{MAX_SHUTDOWN_TIMEOUT_SECS}"
            )));
        }
        Ok(())
    }

    pub fn mode(&self) -> AssemblyMode {
        if self.build.raw {
            AssemblyMode::Raw
        } else {
            AssemblyMode::Templated
        }
    }

    /// Settings for `generate`: links name the written files unless
    /// `build.clean_urls` is set.
    pub fn generator_config(&self) -> GeneratorConfig {
        let link_style = if self.build.clean_urls {
            LinkStyle::Clean
        } else {
            LinkStyle::Html
        };
        GeneratorConfig {
            site_title: self.site.title.clone(),
            root: self.site.root.clone(),
            link_style,
            mode: self.mode(),
            scan_policy: self.build.on_scan_error,
            markdown: self.markdown.clone(),
        }
    }

    /// Settings for the live server, whose routes have no extension.
    pub fn live_generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            link_style: LinkStyle::Clean,
            ..self.generator_config()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            root: self.site.root.clone(),
            shutdown_timeout: Duration::from_secs(self.server.shutdown_timeout_secs),
        }
    }

    /// `None` when periodic refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.server.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// [`BlogConfig::default`] as a TOML table: the bottom layer every user
/// config is merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BlogConfig::default())?)
}

/// Layer `overlay` over `base`. Tables merge per key, recursively; any other
/// overlay value replaces the base value outright.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Apply `overlay` (if any) to `base` and turn the result into a validated config.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BlogConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BlogConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `config.toml` from the content root, falling back to stock defaults.
pub fn load_config(content_root: &Path) -> Result<BlogConfig, ConfigError> {
    load_config_file(&content_root.join(CONFIG_FILE_NAME))
}

/// Load a specific config file. A missing file yields the stock defaults.
pub fn load_config_file(path: &Path) -> Result<BlogConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// The documented default `config.toml` printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# simple-blog configuration
# =========================
# Every key is optional and shows its default value.
#
# Place this file at content/config.toml, or pass --config <file>.
# Misspelled or unknown keys are rejected.

# ---------------------------------------------------------------------------
# Site
# ---------------------------------------------------------------------------
[site]
# Site name, shown in the header, footer and page titles.
title = "simple-blog"

# URL prefix for every generated link and every served route.
# Use "/blog/" when the site lives below the domain root.
root = "/"

# ---------------------------------------------------------------------------
# Markdown
# ---------------------------------------------------------------------------
[markdown]
# Colour fenced code blocks token by token.
highlight = true

# Colour theme. One of: base16-eighties.dark, base16-mocha.dark,
# base16-ocean.dark, base16-ocean.light, InspiredGitHub,
# Solarized (dark), Solarized (light).
highlight_style = "base16-ocean.dark"

# Enable [^1] footnote syntax.
footnotes = true

# Render single newlines inside paragraphs as line breaks.
hard_wraps = true

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Raw mode writes post bodies only: no landing, topic or topic index pages.
raw = false

# What to do with files that fail to parse:
#   "skip" - build from the valid files and list the failures
#   "fail" - abort the build
on_scan_error = "skip"

# Static output links to "/posts/slug.html". Set to true when the host serves
# "/posts/slug" from "posts/slug.html" and extensionless links are wanted.
clean_urls = false

# ---------------------------------------------------------------------------
# Live server (`simple-blog serve`)
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 8080

# Seconds to wait for in-flight requests on shutdown (1-300).
shutdown_timeout_secs = 10

# Re-read the content directory every N seconds. 0 disables.
refresh_interval_secs = 0
"##
}
