//! Built-in theme.
//!
//! Turns rendered Markdown and listing data into complete HTML documents.
//! Templates are [maud](https://maud.lambda.xyz/) markup compiled into the
//! binary; the stylesheet in `static/style.css` is inlined into every page.
//!
//! ## Layouts
//!
//! A document picks its layout with the `layout` front-matter key:
//!
//! | Name | Layout |
//! |------|--------|
//! | `post` | dated article with tags and category (default for posts) |
//! | `page` | plain article (default for pages) |
//! | `false`, `raw` | the rendered Markdown alone, no surrounding page |
//!
//! Listing pages use `index` (home), `archive`, `tag` and `category`.
//! Unknown names, and listing layouts named on a document, fall back to
//! the document kind's default with a warning.
//!
//! Templates only see the view structs in this module. Every link is
//! resolved by the caller, so the theme never consults the route table.

use crate::collection::CollectionKey;
use crate::config::{CollectionMode, SiteConfig};
use crate::route;
use crate::types::Document;
use chrono::NaiveDateTime;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fmt::Write as _;
use tracing::warn;

const CSS: &str = include_str!("../static/style.css");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Post,
    Page,
    Raw,
    Index,
    Archive,
    Tag,
    Category,
}

const LAYOUTS: &[(&str, Layout)] = &[
    ("post", Layout::Post),
    ("page", Layout::Page),
    ("false", Layout::Raw),
    ("raw", Layout::Raw),
    ("index", Layout::Index),
    ("archive", Layout::Archive),
    ("tag", Layout::Tag),
    ("category", Layout::Category),
];

/// Look a layout up by name.
pub fn lookup_layout(name: &str) -> Option<Layout> {
    LAYOUTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, layout)| *layout)
}

impl Layout {
    pub fn is_listing(self) -> bool {
        matches!(
            self,
            Layout::Index | Layout::Archive | Layout::Tag | Layout::Category
        )
    }
}

/// Layout for a document page.
pub fn document_layout(doc: &Document) -> Layout {
    let default = if doc.is_post() { Layout::Post } else { Layout::Page };
    let Some(name) = doc.layout.as_deref() else {
        return default;
    };
    match lookup_layout(name) {
        Some(layout) if !layout.is_listing() => layout,
        _ => {
            warn!(doc = %doc.id, layout = name, "unknown layout, using default");
            default
        }
    }
}

/// Layout for a collection's listing pages.
pub fn listing_layout(key: &CollectionKey) -> Layout {
    match key {
        CollectionKey::Home => Layout::Index,
        CollectionKey::Tag(_) => Layout::Tag,
        CollectionKey::Category(_) => Layout::Category,
        CollectionKey::Archive | CollectionKey::ArchiveYear(_) | CollectionKey::ArchiveMonth(..) => {
            Layout::Archive
        }
    }
}

// ============================================================================
// View data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub href: String,
}

/// Site-wide values every page shows.
#[derive(Debug, Clone)]
pub struct SiteMeta {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub author: String,
    pub language: String,
    pub date_format: String,
    pub root: String,
    pub nav: Vec<Link>,
}

impl SiteMeta {
    pub fn from_config(config: &SiteConfig) -> Self {
        let mut nav = vec![Link {
            name: "Home".into(),
            href: route::href(config, ""),
        }];
        if config.archive != CollectionMode::Off {
            let url = route::collection_url(&CollectionKey::Archive, 1, config);
            nav.push(Link {
                name: "Archives".into(),
                href: route::href(config, &url),
            });
        }
        Self {
            title: config.title.clone(),
            subtitle: config.subtitle.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            language: config.language.clone(),
            date_format: config.date_format.clone(),
            root: config.root.clone(),
            nav,
        }
    }

    /// Falls back to `%Y-%m-%d` when the format asks for something a plain
    /// date cannot supply.
    fn format_date(&self, date: &NaiveDateTime) -> String {
        let mut out = String::new();
        match write!(out, "{}", date.format(&self.date_format)) {
            Ok(()) => out,
            Err(_) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A document page ready for templating.
#[derive(Debug, Clone)]
pub struct DocumentView<'a> {
    pub title: &'a str,
    pub date: NaiveDateTime,
    pub updated: Option<NaiveDateTime>,
    pub description: Option<&'a str>,
    pub category: Option<Link>,
    pub tags: Vec<Link>,
    /// Rendered Markdown.
    pub content: &'a str,
}

/// One entry on a listing page.
#[derive(Debug, Clone)]
pub struct ListingItem<'a> {
    pub title: &'a str,
    pub href: String,
    pub date: NaiveDateTime,
    /// Rendered excerpt HTML.
    pub excerpt: Option<&'a str>,
    /// Plain-text fallback when there is no excerpt.
    pub description: Option<&'a str>,
}

/// One page of a collection listing.
#[derive(Debug, Clone)]
pub struct ListingView<'a> {
    pub heading: String,
    pub items: Vec<ListingItem<'a>>,
    pub page: usize,
    pub total: usize,
    pub prev: Option<String>,
    pub next: Option<String>,
    /// `false` for collections built as a single page.
    pub show_pagination: bool,
}

// ============================================================================
// HTML components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(meta: &SiteMeta, title: &str, description: Option<&str>, content: Markup) -> Markup {
    let full_title = if title.is_empty() || title == meta.title {
        meta.title.clone()
    } else {
        format!("{title} | {}", meta.title)
    };
    let description = description.unwrap_or(meta.description.as_str());

    html! {
        (DOCTYPE)
        html lang=(meta.language) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (full_title) }
                @if !description.is_empty() {
                    meta name="description" content=(description);
                }
                @if !meta.author.is_empty() {
                    meta name="author" content=(meta.author);
                }
                style { (PreEscaped(CSS)) }
            }
            body {
                (site_header(meta))
                main { (content) }
                (site_footer(meta))
            }
        }
    }
}

/// Renders the site header with title and navigation
fn site_header(meta: &SiteMeta) -> Markup {
    html! {
        header.site-header {
            div {
                a.site-title href=(meta.root) { (meta.title) }
                @if !meta.subtitle.is_empty() {
                    p.site-subtitle { (meta.subtitle) }
                }
            }
            nav.site-nav {
                @for link in &meta.nav {
                    a href=(link.href) { (link.name) }
                }
            }
        }
    }
}

fn site_footer(meta: &SiteMeta) -> Markup {
    html! {
        footer.site-footer {
            @if !meta.author.is_empty() {
                "© " (meta.author) " · "
            }
            "Built with quire"
        }
    }
}

fn date_tag(meta: &SiteMeta, date: &NaiveDateTime) -> Markup {
    html! {
        time datetime=(date.format("%Y-%m-%dT%H:%M:%S").to_string()) { (meta.format_date(date)) }
    }
}

fn pagination(view: &ListingView) -> Markup {
    html! {
        @if view.show_pagination && view.total > 1 {
            nav.pagination {
                @if let Some(prev) = &view.prev {
                    a.prev href=(prev) rel="prev" { "« Newer" }
                } @else {
                    span {}
                }
                span.page-number { "Page " (view.page) " of " (view.total) }
                @if let Some(next) = &view.next {
                    a.next href=(next) rel="next" { "Older »" }
                } @else {
                    span {}
                }
            }
        }
    }
}

// ============================================================================
// Page renderers
// ============================================================================

/// Render a document page with the given layout.
///
/// Listing layouts are never passed here; they are treated as `page`.
pub fn render_document(layout: Layout, view: &DocumentView, meta: &SiteMeta) -> Markup {
    match layout {
        Layout::Raw => PreEscaped(view.content.to_string()),
        Layout::Post => render_post(view, meta),
        _ => render_page(view, meta),
    }
}

fn render_post(view: &DocumentView, meta: &SiteMeta) -> Markup {
    let content = html! {
        article.post {
            header {
                h1 { (view.title) }
                div.post-meta {
                    (date_tag(meta, &view.date))
                    @if let Some(updated) = &view.updated {
                        " · updated " (date_tag(meta, updated))
                    }
                    @if let Some(category) = &view.category {
                        " · in " a href=(category.href) { (category.name) }
                    }
                }
            }
            div.post-content {
                (PreEscaped(view.content))
            }
            @if !view.tags.is_empty() {
                footer.post-tags {
                    @for tag in &view.tags {
                        a href=(tag.href) { "#" (tag.name) }
                    }
                }
            }
        }
    };
    base_document(meta, view.title, view.description, content)
}

fn render_page(view: &DocumentView, meta: &SiteMeta) -> Markup {
    let content = html! {
        article.page {
            h1 { (view.title) }
            div.page-content {
                (PreEscaped(view.content))
            }
        }
    };
    base_document(meta, view.title, view.description, content)
}

/// Render one listing page.
pub fn render_listing(layout: Layout, view: &ListingView, meta: &SiteMeta) -> Markup {
    let content = match layout {
        Layout::Index => html! {
            @for item in &view.items {
                (summary(item, meta))
            }
            (pagination(view))
        },
        _ => html! {
            h1.listing-heading { (view.heading) }
            ul.listing-compact {
                @for item in &view.items {
                    li {
                        (date_tag(meta, &item.date))
                        a href=(item.href) { (item.title) }
                    }
                }
            }
            (pagination(view))
        },
    };
    let title = if layout == Layout::Index { "" } else { view.heading.as_str() };
    base_document(meta, title, None, content)
}

fn summary(item: &ListingItem, meta: &SiteMeta) -> Markup {
    html! {
        article.post-summary {
            h2 { a href=(item.href) { (item.title) } }
            div.post-meta { (date_tag(meta, &item.date)) }
            @match (item.excerpt, item.description) {
                (Some(excerpt), _) => {
                    div.excerpt { (PreEscaped(excerpt)) }
                    a.read-more href=(item.href) { "Read more »" }
                }
                (None, Some(description)) => {
                    p { (description) }
                }
                (None, None) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentKind;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn meta() -> SiteMeta {
        let mut config = SiteConfig::default();
        config.title = "My Blog".into();
        config.author = "Sam".into();
        SiteMeta::from_config(&config)
    }

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 9, 26)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn unformattable_date_falls_back_to_iso() {
        let mut meta = meta();
        meta.date_format = "%d %b %Y %z".into();
        assert_eq!(meta.format_date(&date()), "2020-09-26");
        meta.date_format = "%d %b %Y".into();
        assert_eq!(meta.format_date(&date()), "26 Sep 2020");
    }

    fn doc(kind: DocumentKind, layout: Option<&str>) -> Document {
        Document {
            id: "x.md".into(),
            source: PathBuf::new(),
            kind,
            title: "X".into(),
            date: date(),
            updated: None,
            tags: vec![],
            category: None,
            layout: layout.map(String::from),
            draft: false,
            permalink: None,
            description: None,
            body: String::new(),
            content_hash: String::new(),
        }
    }

    fn view<'a>(content: &'a str) -> DocumentView<'a> {
        DocumentView {
            title: "Hello <World>",
            date: date(),
            updated: None,
            description: None,
            category: Some(Link {
                name: "Notes".into(),
                href: "/categories/notes/".into(),
            }),
            tags: vec![Link {
                name: "rust".into(),
                href: "/tags/rust/".into(),
            }],
            content,
        }
    }

    fn listing<'a>(items: Vec<ListingItem<'a>>, page: usize, total: usize) -> ListingView<'a> {
        ListingView {
            heading: "Tag: rust".into(),
            items,
            page,
            total,
            prev: (page > 1).then(|| "/page/1/".to_string()),
            next: (page < total).then(|| format!("/page/{}/", page + 1)),
            show_pagination: true,
        }
    }

    // =========================================================================
    // Layout lookup
    // =========================================================================

    #[test]
    fn lookup_table_names() {
        assert_eq!(lookup_layout("post"), Some(Layout::Post));
        assert_eq!(lookup_layout("false"), Some(Layout::Raw));
        assert_eq!(lookup_layout("raw"), Some(Layout::Raw));
        assert_eq!(lookup_layout("archive"), Some(Layout::Archive));
        assert_eq!(lookup_layout("fancy"), None);
    }

    #[test]
    fn document_layout_defaults_by_kind() {
        assert_eq!(document_layout(&doc(DocumentKind::Post, None)), Layout::Post);
        assert_eq!(document_layout(&doc(DocumentKind::Page, None)), Layout::Page);
        assert_eq!(document_layout(&doc(DocumentKind::Page, Some("post"))), Layout::Post);
    }

    #[test]
    fn unknown_or_listing_layout_falls_back() {
        assert_eq!(document_layout(&doc(DocumentKind::Post, Some("fancy"))), Layout::Post);
        assert_eq!(document_layout(&doc(DocumentKind::Page, Some("index"))), Layout::Page);
    }

    #[test]
    fn listing_layout_by_key() {
        assert_eq!(listing_layout(&CollectionKey::Home), Layout::Index);
        assert_eq!(listing_layout(&CollectionKey::ArchiveMonth(2020, 1)), Layout::Archive);
        assert_eq!(listing_layout(&CollectionKey::Tag("x".into())), Layout::Tag);
    }

    // =========================================================================
    // Documents
    // =========================================================================

    #[test]
    fn post_page_structure() {
        let html = render_document(Layout::Post, &view("<p>Body</p>"), &meta()).into_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Hello &lt;World&gt; | My Blog</title>"));
        assert!(html.contains("<p>Body</p>"));
        assert!(html.contains("href=\"/tags/rust/\""));
        assert!(html.contains("href=\"/categories/notes/\""));
        assert!(html.contains("2020-09-26"));
        assert!(html.contains("© Sam"));
    }

    #[test]
    fn page_layout_omits_post_meta() {
        let html = render_document(Layout::Page, &view("<p>Body</p>"), &meta()).into_string();
        assert!(html.contains("<p>Body</p>"));
        assert!(!html.contains("/tags/rust/"));
    }

    #[test]
    fn raw_layout_is_content_only() {
        let html = render_document(Layout::Raw, &view("<p>Body</p>"), &meta()).into_string();
        assert_eq!(html, "<p>Body</p>");
    }

    #[test]
    fn nav_includes_archives_unless_off() {
        let mut config = SiteConfig::default();
        assert!(SiteMeta::from_config(&config).nav.iter().any(|l| l.href == "/archives/"));
        config.archive = CollectionMode::Off;
        assert_eq!(SiteMeta::from_config(&config).nav.len(), 1);
    }

    // =========================================================================
    // Listings
    // =========================================================================

    #[test]
    fn index_shows_excerpt_or_description() {
        let items = vec![
            ListingItem {
                title: "With excerpt",
                href: "/a/".into(),
                date: date(),
                excerpt: Some("<p>Teaser</p>"),
                description: None,
            },
            ListingItem {
                title: "With description",
                href: "/b/".into(),
                date: date(),
                excerpt: None,
                description: Some("Short text"),
            },
        ];
        let html = render_listing(Layout::Index, &listing(items, 1, 1), &meta()).into_string();
        assert!(html.contains("<p>Teaser</p>"));
        assert!(html.contains("Read more"));
        assert!(html.contains("Short text"));
        assert!(html.contains("<title>My Blog</title>"));
    }

    #[test]
    fn pagination_links_on_middle_page() {
        let html = render_listing(Layout::Tag, &listing(vec![], 2, 3), &meta()).into_string();
        assert!(html.contains("rel=\"prev\""));
        assert!(html.contains("rel=\"next\""));
        assert!(html.contains("Page 2 of 3"));
        assert!(html.contains("Tag: rust"));
    }

    #[test]
    fn single_page_collections_hide_pagination() {
        let mut view = listing(vec![], 1, 1);
        assert!(!render_listing(Layout::Archive, &view, &meta()).into_string().contains("pagination"));
        view.total = 2;
        view.show_pagination = false;
        assert!(!render_listing(Layout::Archive, &view, &meta()).into_string().contains("pagination"));
    }
}
