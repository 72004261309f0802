//! CLI output formatting.
//!
//! # Format
//!
//! ## Build progress
//!
//! One line per event, status first so the eye can scan the left column:
//!
//! ```text
//! rendered  _posts/hello-world.md → 2020/09/26/hello-world/index.html
//! cached    _posts/site-news.md
//! failed    _posts/broken.md: code fence opened on line 3 is never closed
//! listing   tag rust → tags/rust/index.html
//! listing   home page 2 → page/2/index.html
//! removed   tags/old/index.html
//! ```
//!
//! ## Build summary
//!
//! ```text
//! Documents: 2 cached, 1 rendered (3 total)
//! Listings: 5 written, 2 unchanged
//! Assets: 1 copied, 0 unchanged
//! Removed 1 stale output
//! Failures
//!     _posts/broken.md: code fence opened on line 3 is never closed
//! Site generated at public
//! ```
//!
//! ## `list`
//!
//! ```text
//! Posts (2)
//! 2021-03-02  Rust Tips: Iterators  [Programming] #rust #intro
//!     Source: _posts/rust-tips.md
//!     URL: /2021/03/02/rust-tips-iterators/
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::build::{BuildEvent, BuildReport, SiteIndex};
use crate::collection::{Collection, CollectionKey};
use crate::config::SiteConfig;
use crate::route::{self, RouteOwner, RouteTable};
use crate::types::Document;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Status column padded to a fixed width.
fn status_line(status: &str, detail: &str) -> String {
    format!("{status:<9} {detail}")
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn listing_label(name: &str, page: usize) -> String {
    if page > 1 {
        format!("{name} page {page}")
    } else {
        name.to_string()
    }
}

// ============================================================================
// Build progress and summary
// ============================================================================

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    let line = match event {
        BuildEvent::DocumentRendered { id, output_path } => {
            status_line("rendered", &format!("{id} \u{2192} {output_path}"))
        }
        BuildEvent::DocumentCached { id, .. } => status_line("cached", id),
        BuildEvent::DocumentFailed { id, reason } => status_line("failed", &format!("{id}: {reason}")),
        BuildEvent::ListingWritten {
            name,
            page,
            output_path,
        } => status_line(
            "listing",
            &format!("{} \u{2192} {output_path}", listing_label(name, *page)),
        ),
        BuildEvent::StaleRemoved { output_path } => status_line("removed", output_path),
    };
    vec![line]
}

/// Format the end-of-build summary.
pub fn format_build_report(report: &BuildReport, public_dir: &Path) -> Vec<String> {
    let mut lines = vec![
        format!("Documents: {}", report.cache_stats),
        format!(
            "Listings: {} written, {} unchanged",
            report.listings_written, report.listings_unchanged
        ),
        format!(
            "Assets: {} copied, {} unchanged",
            report.assets_copied, report.assets_unchanged
        ),
    ];
    if !report.stale_removed.is_empty() {
        lines.push(format!(
            "Removed {}",
            plural(report.stale_removed.len(), "stale output", "stale outputs")
        ));
    }
    if report.skipped_drafts > 0 {
        lines.push(format!(
            "Skipped {} (set render_drafts to include)",
            plural(report.skipped_drafts, "draft", "drafts")
        ));
    }
    if !report.failures.is_empty() {
        lines.push("Failures".to_string());
        for failure in &report.failures {
            lines.push(format!("{}{}: {}", indent(1), failure.id, failure.reason));
        }
    }
    lines.push(format!("Site generated at {}", public_dir.display()));
    lines
}

/// Print one build event to stdout.
pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

/// Print the build summary to stdout.
pub fn print_build_report(report: &BuildReport, public_dir: &Path) {
    for line in format_build_report(report, public_dir) {
        println!("{}", line);
    }
}

// ============================================================================
// `list`
// ============================================================================

fn document_lines(doc: &Document, routes: &RouteTable, config: &SiteConfig) -> Vec<String> {
    let date = doc.date.format(&config.date_format);
    let mut header = format!("{date}  {}", doc.title);
    if doc.is_post() {
        if let Some(category) = &doc.category {
            header.push_str(&format!("  [{category}]"));
        }
        for tag in &doc.tags {
            header.push_str(&format!(" #{tag}"));
        }
    }
    if doc.draft {
        header.push_str("  (draft)");
    }

    let mut lines = vec![header, format!("{}Source: {}", indent(1), doc.id)];
    if let Some(route) = routes.document(&doc.id) {
        lines.push(format!("{}URL: {}", indent(1), route::href(config, &route.url)));
    }
    lines
}

/// Posts, newest first.
pub fn format_posts(index: &SiteIndex, config: &SiteConfig) -> Vec<String> {
    let home = index
        .collections
        .iter()
        .find(|c| c.key == CollectionKey::Home);
    let ids: Vec<&str> = home
        .map(|c| c.ids.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let mut lines = vec![format!("Posts ({})", ids.len())];
    for id in ids {
        if let Some(doc) = index.document(id) {
            lines.extend(document_lines(doc, &index.routes, config));
        }
    }
    lines
}

/// Pages, in source order.
pub fn format_pages(index: &SiteIndex, config: &SiteConfig) -> Vec<String> {
    let pages: Vec<&Document> = index.site.documents.iter().filter(|d| !d.is_post()).collect();
    let mut lines = vec![format!("Pages ({})", pages.len())];
    for doc in pages {
        lines.extend(document_lines(doc, &index.routes, config));
    }
    lines
}

/// Tag or category collections with post counts.
pub fn format_terms(
    heading: &str,
    collections: &[Collection],
    is_term: fn(&CollectionKey) -> bool,
    config: &SiteConfig,
) -> Vec<String> {
    let terms: Vec<&Collection> = collections.iter().filter(|c| is_term(&c.key)).collect();
    let mut lines = vec![format!("{heading} ({})", terms.len())];
    for term in terms {
        let url = route::collection_url(&term.key, 1, config);
        lines.push(format!(
            "{} ({})",
            term.name,
            plural(term.ids.len(), "post", "posts")
        ));
        lines.push(format!("{}URL: {}", indent(1), route::href(config, &url)));
    }
    lines
}

/// Every route the build would write, sorted by URL.
pub fn format_routes(routes: &RouteTable, config: &SiteConfig) -> Vec<String> {
    let mut entries: Vec<(String, String)> = routes
        .iter()
        .map(|r| {
            let owner = match &r.owner {
                RouteOwner::Document(id) | RouteOwner::Asset(id) => id.clone(),
                RouteOwner::Listing { key, page } => listing_label(&key.to_string(), *page),
            };
            (route::href(config, &r.url), owner)
        })
        .collect();
    entries.sort();

    let width = entries.iter().map(|(url, _)| url.len()).max().unwrap_or(0);
    let mut lines = vec![format!("Routes ({})", entries.len())];
    for (url, owner) in entries {
        lines.push(format!("{url:<width$}  {owner}"));
    }
    lines
}

/// Print lines produced by one of the `format_*` functions.
pub fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
