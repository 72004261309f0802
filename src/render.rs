//! Markdown rendering.
//!
//! [`render`] is a pure function of `(body, options)`: the build cache relies
//! on identical input always producing identical HTML.
//!
//! ## Dialect
//!
//! | Option | Effect |
//! |--------|--------|
//! | `markdown.gfm` | tables, strikethrough, task lists |
//! | `markdown.pedantic` | original Markdown only; overrides `gfm` |
//! | `markdown.breaks` | single newlines become `<br />` |
//! | `markdown.smartypants` | curly quotes, en/em dashes, ellipses |
//!
//! ## Code blocks
//!
//! Fenced code is treated as opaque text. It is escaped and tagged with the
//! fence's language, never interpreted. With `highlight.enable` the block
//! is wrapped in the gutter table blog themes style:
//!
//! ```text
//! <figure class="highlight js"><table><tr>
//!   <td class="gutter"><pre><span class="line">1</span><br>...</pre></td>
//!   <td class="code"><pre><span class="line">const a = 1;</span><br>...</pre></td>
//! </tr></table></figure>
//! ```
//!
//! ## Excerpts
//!
//! Everything before a `<!-- more -->` marker is rendered a second time on
//! its own as the excerpt shown on listing pages.

use crate::config::{HighlightConfig, MarkdownConfig, SiteConfig};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RenderError {
    #[error("code fence opened on line {line} is never closed")]
    UnclosedFence { line: usize },
}

/// Renderer settings taken from the site config.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub markdown: MarkdownConfig,
    pub highlight: HighlightConfig,
}

impl RenderOptions {
    pub fn from_site_config(config: &SiteConfig) -> Self {
        Self {
            markdown: config.markdown.clone(),
            highlight: config.highlight.clone(),
        }
    }

    /// Parser options for the configured dialect.
    pub fn parser_options(&self) -> Options {
        let mut options = Options::empty();
        if self.markdown.gfm && !self.markdown.pedantic {
            options |= Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS;
        }
        if self.markdown.smartypants {
            options |= Options::ENABLE_SMART_PUNCTUATION;
        }
        options
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_site_config(&SiteConfig::default())
    }
}

/// Output of rendering one document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    /// Rendered text before the `<!-- more -->` marker, if there is one.
    pub excerpt: Option<String>,
}

/// Render a Markdown body to HTML.
pub fn render(body: &str, options: &RenderOptions) -> Result<Rendered, RenderError> {
    check_fences(body)?;
    let html = render_markdown(body, options);
    let excerpt = split_excerpt(body).map(|before| render_markdown(before, options));
    Ok(Rendered { html, excerpt })
}

fn render_markdown(text: &str, options: &RenderOptions) -> String {
    let parser = Parser::new_ext(text, options.parser_options());
    let mut events = Vec::new();
    // (language, collected source) while inside a code block
    let mut code: Option<(String, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, source)) = code.take() {
                    let block = render_code_block(&lang, &source, &options.highlight);
                    events.push(Event::Html(block.into()));
                }
            }
            Event::Text(text) => match code.as_mut() {
                Some((_, source)) => source.push_str(&text),
                None => events.push(Event::Text(text)),
            },
            Event::SoftBreak if options.markdown.breaks => events.push(Event::HardBreak),
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(text.len() + text.len() / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

fn render_code_block(lang: &str, source: &str, highlight: &HighlightConfig) -> String {
    let source = source.strip_suffix('\n').unwrap_or(source);
    let source = if highlight.tab_replace.is_empty() {
        source.to_string()
    } else {
        source.replace('\t', &highlight.tab_replace)
    };
    let lang = escape_html(lang);

    if !highlight.enable {
        let class = if lang.is_empty() {
            String::new()
        } else {
            format!(" class=\"language-{lang}\"")
        };
        return format!("<pre><code{class}>{}\n</code></pre>\n", escape_html(&source));
    }

    let figure_class = if lang.is_empty() { "plain" } else { &lang };
    let lines: Vec<&str> = source.split('\n').collect();
    let code = lines
        .iter()
        .map(|line| format!("<span class=\"line\">{}</span>", escape_html(line)))
        .collect::<Vec<_>>()
        .join("<br>");

    let mut out = format!("<figure class=\"highlight {figure_class}\"><table><tr>");
    if highlight.line_number {
        let gutter = (1..=lines.len())
            .map(|n| format!("<span class=\"line\">{n}</span>"))
            .collect::<Vec<_>>()
            .join("<br>");
        out.push_str(&format!("<td class=\"gutter\"><pre>{gutter}</pre></td>"));
    }
    out.push_str(&format!(
        "<td class=\"code\"><pre>{code}</pre></td></tr></table></figure>\n"
    ));
    out
}

/// Text before the first `<!-- more -->` marker (whitespace inside allowed).
///
/// Markers inside fenced code blocks are sample text, not markers.
pub fn split_excerpt(body: &str) -> Option<&str> {
    let fences = scan_fences(body);
    body.match_indices("<!--")
        .filter(|(idx, _)| !fences.spans.iter().any(|(start, end)| (*start..*end).contains(idx)))
        .find_map(|(idx, _)| {
            let rest = body[idx + 4..].trim_start();
            let rest = rest.strip_prefix("more")?.trim_start();
            rest.starts_with("-->").then(|| &body[..idx])
        })
}

/// Reject fenced code blocks that run to the end of the document.
fn check_fences(body: &str) -> Result<(), RenderError> {
    match scan_fences(body).unclosed {
        Some(line) => Err(RenderError::UnclosedFence { line }),
        None => Ok(()),
    }
}

struct FenceScan {
    /// Byte ranges of fenced blocks, opening fence line through closing
    /// fence line. An unclosed block runs to the end of the body.
    spans: Vec<(usize, usize)>,
    /// Line number of a fence that is never closed.
    unclosed: Option<usize>,
}

fn scan_fences(body: &str) -> FenceScan {
    // (fence char, fence length, line number, byte offset)
    let mut open: Option<(char, usize, usize, usize)> = None;
    let mut spans = Vec::new();
    let mut offset = 0;

    for (idx, raw) in body.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);

        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            continue;
        }
        let trimmed = &line[indent..];
        let Some(fence_char) = trimmed.chars().next().filter(|c| *c == '`' || *c == '~') else {
            continue;
        };
        let run = trimmed.chars().take_while(|c| *c == fence_char).count();
        if run < 3 {
            continue;
        }
        let rest = &trimmed[run..];

        match open {
            None => {
                // A backtick fence's info string may not contain backticks.
                if fence_char == '`' && rest.contains('`') {
                    continue;
                }
                open = Some((fence_char, run, idx + 1, start));
            }
            Some((c, len, _, opened_at)) if c == fence_char && run >= len && rest.trim().is_empty() => {
                spans.push((opened_at, offset));
                open = None;
            }
            Some(_) => {}
        }
    }

    let unclosed = open.map(|(_, _, line, opened_at)| {
        spans.push((opened_at, body.len()));
        line
    });
    FenceScan { spans, unclosed }
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RenderOptions {
        RenderOptions::default()
    }

    fn plain_code_options() -> RenderOptions {
        let mut opts = options();
        opts.highlight.enable = false;
        opts
    }

    #[test]
    fn renders_basic_markdown() {
        let out = render("# Title\n\nSome **bold** text.", &options()).unwrap();
        assert!(out.html.contains("<h1>Title</h1>"));
        assert!(out.html.contains("<strong>bold</strong>"));
        assert_eq!(out.excerpt, None);
    }

    #[test]
    fn render_is_deterministic() {
        let body = "Intro\n\n```js\nconst a = 1;\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let first = render(body, &options()).unwrap();
        let second = render(body, &options()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn gfm_tables_toggle() {
        let table = "| a | b |\n|---|---|\n| 1 | 2 |\n";
        assert!(render(table, &options()).unwrap().html.contains("<table>"));

        let mut opts = options();
        opts.markdown.gfm = false;
        assert!(!render(table, &opts).unwrap().html.contains("<table>"));
    }

    #[test]
    fn pedantic_overrides_gfm() {
        let mut opts = options();
        opts.markdown.pedantic = true;
        let parser_opts = opts.parser_options();
        assert!(!parser_opts.contains(Options::ENABLE_TABLES));
        assert!(!parser_opts.contains(Options::ENABLE_STRIKETHROUGH));
        assert!(!render("~~gone~~", &opts).unwrap().html.contains("<del>"));
    }

    #[test]
    fn breaks_mode_converts_soft_breaks() {
        let body = "line one\nline two";
        assert!(render(body, &options()).unwrap().html.contains("<br />"));

        let mut opts = options();
        opts.markdown.breaks = false;
        assert!(!render(body, &opts).unwrap().html.contains("<br />"));
    }

    #[test]
    fn smartypants_curls_quotes() {
        let body = "She said \"hello\"";
        assert!(render(body, &options()).unwrap().html.contains('\u{201c}'));

        let mut opts = options();
        opts.markdown.smartypants = false;
        assert!(!render(body, &opts).unwrap().html.contains('\u{201c}'));
    }

    #[test]
    fn code_blocks_are_opaque_and_escaped() {
        let body = "```html\n<script>alert(1)</script>\n```\n";
        let out = render(body, &plain_code_options()).unwrap();
        assert!(out.html.contains("class=\"language-html\""));
        assert!(out.html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!out.html.contains("<script>"));
    }

    #[test]
    fn code_blocks_skip_smart_punctuation() {
        let body = "```\nlet s = \"raw\";\n```\n";
        let out = render(body, &plain_code_options()).unwrap();
        assert!(out.html.contains("&quot;raw&quot;"));
    }

    #[test]
    fn highlight_wraps_code_with_gutter() {
        let body = "```cs\nvar a = 1;\nvar b = 2;\n```\n";
        let out = render(body, &options()).unwrap();
        assert!(out.html.contains("<figure class=\"highlight cs\">"));
        assert!(out.html.contains("<td class=\"gutter\">"));
        assert!(out.html.contains("<span class=\"line\">2</span>"));
        assert!(out.html.contains("<span class=\"line\">var b = 2;</span>"));
    }

    #[test]
    fn highlight_without_line_numbers() {
        let mut opts = options();
        opts.highlight.line_number = false;
        let out = render("```\nx\n```\n", &opts).unwrap();
        assert!(out.html.contains("<figure class=\"highlight plain\">"));
        assert!(!out.html.contains("gutter"));
    }

    #[test]
    fn tab_replace_applies_inside_code() {
        let mut opts = plain_code_options();
        opts.highlight.tab_replace = "  ".into();
        let out = render("```\n\tindented\n```\n", &opts).unwrap();
        assert!(out.html.contains("  indented"));
        assert!(!out.html.contains('\t'));
    }

    #[test]
    fn excerpt_split_on_more_marker() {
        let body = "Intro paragraph.\n\n<!-- more -->\n\nThe rest.";
        let out = render(body, &options()).unwrap();
        let excerpt = out.excerpt.unwrap();
        assert!(excerpt.contains("Intro paragraph."));
        assert!(!excerpt.contains("The rest."));
        assert!(out.html.contains("The rest."));
    }

    #[test]
    fn split_excerpt_accepts_compact_marker() {
        assert_eq!(split_excerpt("a<!--more-->b"), Some("a"));
        assert_eq!(split_excerpt("a<!-- other -->b"), None);
    }

    #[test]
    fn unclosed_fence_is_render_error() {
        let body = "Text\n\n```rust\nfn main() {}\n";
        assert_eq!(
            render(body, &options()),
            Err(RenderError::UnclosedFence { line: 3 })
        );
    }

    #[test]
    fn longer_closing_fence_closes() {
        assert!(render("````\ncode\n``````\n", &options()).is_ok());
        assert!(render("~~~\n```\n~~~\n", &options()).is_ok());
    }

    #[test]
    fn inline_backticks_are_not_fences() {
        assert!(render("Use ```inline``` here.\n", &options()).is_ok());
    }

    #[test]
    fn more_marker_inside_fence_is_ignored() {
        let body = "Intro.\n\n```html\n<!-- more -->\n<p>sample</p>\n```\n\nAfter the sample.\n\n<!-- more -->\n\nRest.";
        let before = split_excerpt(body).unwrap();
        assert!(before.contains("After the sample."));
        assert!(before.contains("<p>sample</p>\n```"));

        let out = render(body, &options()).unwrap();
        let excerpt = out.excerpt.unwrap();
        assert!(excerpt.contains("&lt;!-- more --&gt;"));
        assert!(!excerpt.contains("Rest."));
    }

    #[test]
    fn marker_only_inside_fence_means_no_excerpt() {
        let body = "```\n<!-- more -->\n```\n";
        assert_eq!(split_excerpt(body), None);
        assert_eq!(render(body, &options()).unwrap().excerpt, None);
    }

    #[test]
    fn escape_html_covers_attribute_chars() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
