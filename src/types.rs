//! Shared types passed between pipeline stages.
//!
//! A [`Document`] is built once by the loader and then only read: routes,
//! collections, the cache plan and the renderer all borrow it.

use chrono::NaiveDateTime;
use std::path::PathBuf;

/// Where a document lives in the site and which collections it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Dated entry under `_posts/` (or `_drafts/`): permalink + collections.
    Post,
    /// Standalone page: URL mirrors the source path, no collections.
    Page,
}

/// A source document after front-matter parsing.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source-relative path with `/` separators, e.g. `_posts/hello-world.md`.
    pub id: String,
    pub source: PathBuf,
    pub kind: DocumentKind,
    pub title: String,
    pub date: NaiveDateTime,
    pub updated: Option<NaiveDateTime>,
    pub tags: Vec<String>,
    /// Resolved category. Posts without one get `default_category`.
    pub category: Option<String>,
    /// Layout name from front-matter (`post`, `page`, `false`, ...).
    pub layout: Option<String>,
    pub draft: bool,
    /// Per-document permalink override.
    pub permalink: Option<String>,
    pub description: Option<String>,
    pub body: String,
    /// SHA-256 of the raw source bytes.
    pub content_hash: String,
}

impl Document {
    /// File stem of the source, e.g. `hello-world` for `_posts/hello-world.md`.
    pub fn stem(&self) -> &str {
        let name = self.id.rsplit('/').next().unwrap_or(&self.id);
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }

    pub fn is_post(&self) -> bool {
        self.kind == DocumentKind::Post
    }
}

/// A static file copied verbatim into the output tree.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Source-relative path with `/` separators; also the output path.
    pub id: String,
    pub source: PathBuf,
}
