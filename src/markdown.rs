//! Markdown body → HTML transform.
//!
//! Bodies are parsed with `pulldown-cmark` and the event stream is rewritten
//! before HTML emission:
//!
//! - **Code highlighting**: fenced code blocks are tokenized with `syntect`
//!   and emitted as `<pre class="highlight"><code class="language-{lang}">`
//!   holding one inline-styled `<span>` per token, coloured by the configured
//!   theme ([`highlight_styles`] lists the names). Unknown languages fall back
//!   to plain text; an unknown theme leaves the block uncoloured.
//! - **Heading ids**: headings without an explicit `{#id}` get a slug id,
//!   deduplicated within the document (`intro`, `intro-1`, ...).
//! - **Hard wraps**: soft line breaks become `<br />`.
//! - **Footnotes**: `[^1]` references and definitions.
//!
//! The transform is deterministic for a given input and option set.

use crate::naming::slugify;
use maud::{PreEscaped, html};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html as md_html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Color, Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

pub const DEFAULT_HIGHLIGHT_STYLE: &str = "base16-ocean.dark";

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Theme names accepted as `highlight_style`, sorted.
pub fn highlight_styles() -> impl Iterator<Item = &'static str> {
    THEMES.themes.keys().map(String::as_str)
}

pub fn is_highlight_style(name: &str) -> bool {
    THEMES.themes.contains_key(name)
}

/// Transform options, configured under `[markdown]` in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownOptions {
    /// Wrap fenced code blocks in highlight markup.
    pub highlight: bool,
    /// Colour theme for highlighted code, one of [`highlight_styles`].
    pub highlight_style: String,
    /// Enable footnote syntax.
    pub footnotes: bool,
    /// Render soft line breaks as hard breaks.
    pub hard_wraps: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            highlight: true,
            highlight_style: DEFAULT_HIGHLIGHT_STYLE.to_string(),
            footnotes: true,
            hard_wraps: true,
        }
    }
}

impl MarkdownOptions {
    fn parser_options(&self) -> Options {
        let mut opts = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES;
        if self.footnotes {
            opts |= Options::ENABLE_FOOTNOTES;
        }
        opts
    }
}

/// Render a markdown body to HTML.
pub fn transform(body: &str, options: &MarkdownOptions) -> String {
    let parser = Parser::new_ext(body, options.parser_options());
    let events = rewrite_events(parser, options);
    let mut out = String::with_capacity(body.len() + body.len() / 2);
    md_html::push_html(&mut out, events.into_iter());
    out
}

struct PendingCode {
    lang: Option<String>,
    text: String,
}

impl PendingCode {
    fn into_html(self, style: &str) -> String {
        let highlighted = THEMES.themes.get(style).and_then(|theme| {
            match highlight(&self.text, self.lang.as_deref(), theme) {
                Ok(spans) => Some((spans, pre_style(theme))),
                Err(err) => {
                    debug!(style, error = %err, "highlighting failed, emitting plain code");
                    None
                }
            }
        });
        let code_class = self.lang.map(|l| format!("language-{l}"));
        let markup = match highlighted {
            Some((spans, pre_style)) => html! {
                pre.highlight style=[pre_style] {
                    code class=[code_class] { (PreEscaped(spans)) }
                }
            },
            None => html! {
                pre.highlight { code class=[code_class] { (self.text) } }
            },
        };
        markup.into_string() + "\n"
    }
}

/// Token spans for `code`, one `<span style=...>` per styled region.
fn highlight(code: &str, lang: Option<&str>, theme: &Theme) -> Result<String, syntect::Error> {
    let syntax = lang
        .and_then(|token| SYNTAXES.find_syntax_by_token(token))
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let mut lines = HighlightLines::new(syntax, theme);
    let mut out = String::with_capacity(code.len() * 4);
    for line in LinesWithEndings::from(code) {
        let regions = lines.highlight_line(line, &SYNTAXES)?;
        out.push_str(&styled_line_to_highlighted_html(&regions, IncludeBackground::No)?);
    }
    Ok(out)
}

fn pre_style(theme: &Theme) -> Option<String> {
    let hex = |c: Color| format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b);
    match (theme.settings.background, theme.settings.foreground) {
        (Some(bg), Some(fg)) => Some(format!("background-color:{};color:{}", hex(bg), hex(fg))),
        (Some(bg), None) => Some(format!("background-color:{}", hex(bg))),
        (None, Some(fg)) => Some(format!("color:{}", hex(fg))),
        (None, None) => None,
    }
}

fn rewrite_events<'a>(
    parser: impl Iterator<Item = Event<'a>>,
    options: &MarkdownOptions,
) -> Vec<Event<'a>> {
    let mut out: Vec<Event<'a>> = Vec::new();
    let mut code: Option<PendingCode> = None;
    // Index in `out` of the open heading's start event, plus its text so far.
    let mut heading: Option<usize> = None;
    let mut heading_text = String::new();
    let mut used_ids: HashMap<String, usize> = HashMap::new();

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) if options.highlight => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(str::to_string)
                    }
                    CodeBlockKind::Indented => None,
                };
                code = Some(PendingCode {
                    lang,
                    text: String::new(),
                });
            }
            Event::Text(text) if code.is_some() => {
                if let Some(block) = code.as_mut() {
                    block.text.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) if code.is_some() => {
                if let Some(block) = code.take() {
                    out.push(Event::Html(block.into_html(&options.highlight_style).into()));
                }
            }
            Event::Start(Tag::Heading {
                level,
                id: None,
                classes,
                attrs,
            }) => {
                heading = Some(out.len());
                heading_text.clear();
                out.push(Event::Start(Tag::Heading {
                    level,
                    id: None,
                    classes,
                    attrs,
                }));
            }
            Event::End(TagEnd::Heading(level)) => {
                if let Some(start) = heading.take() {
                    let id = unique_id(slugify(&heading_text), &mut used_ids);
                    if let Some(id) = id
                        && let Event::Start(Tag::Heading { id: slot, .. }) = &mut out[start]
                    {
                        *slot = Some(id.into());
                    }
                }
                out.push(Event::End(TagEnd::Heading(level)));
            }
            Event::SoftBreak if options.hard_wraps => out.push(Event::HardBreak),
            other => {
                if heading.is_some()
                    && let Event::Text(t) | Event::Code(t) = &other
                {
                    heading_text.push_str(t);
                }
                out.push(other);
            }
        }
    }
    out
}

fn unique_id(base: String, used: &mut HashMap<String, usize>) -> Option<String> {
    if base.is_empty() {
        return None;
    }
    let count = used.entry(base.clone()).or_insert(0);
    let id = if *count == 0 {
        base
    } else {
        format!("{base}-{count}")
    };
    *count += 1;
    Some(id)
}
