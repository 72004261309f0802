//! URL resolution and the route table.
//!
//! Every file the build writes has exactly one owner: a document, an asset,
//! or one page of a collection listing. [`RouteTable`] maps each owner to its
//! URL and output path and refuses a second owner for the same output path.
//!
//! URLs are site-relative and carry no leading slash (`2020/09/26/hello/`);
//! [`href`] prefixes `root` when a link is rendered. A URL ending in `/` (or
//! the empty home URL) is written to `index.html` inside that directory.
//!
//! ## Permalink tokens
//!
//! | Token | Value |
//! |-------|-------|
//! | `:year` | 4-digit year |
//! | `:month`, `:day` | zero-padded |
//! | `:i_month`, `:i_day` | unpadded |
//! | `:hour`, `:minute`, `:second` | zero-padded |
//! | `:title` | slugified title |
//! | `:name` | slugified file stem |
//! | `:category` | slugified category, or `default_category` |
//!
//! Anything else after a `:` is left in the URL verbatim.

use crate::collection::CollectionKey;
use crate::config::SiteConfig;
use crate::slug::slugify;
use crate::types::Document;
use chrono::{Datelike, Timelike};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// What a route writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteOwner {
    /// Document id (source-relative path).
    Document(String),
    /// Asset id (source-relative path).
    Asset(String),
    /// Listing page of a collection.
    Listing { key: CollectionKey, page: usize },
}

impl fmt::Display for RouteOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOwner::Document(id) => write!(f, "document {id}"),
            RouteOwner::Asset(id) => write!(f, "asset {id}"),
            RouteOwner::Listing { key, page } => write!(f, "{key} listing page {page}"),
        }
    }
}

/// Two owners resolved to the same output file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("route conflict at {output_path}: {first} and {second}")]
pub struct RouteConflictError {
    pub output_path: String,
    pub first: RouteOwner,
    pub second: RouteOwner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub owner: RouteOwner,
    /// Site-relative URL, no leading slash.
    pub url: String,
    /// Path under `public_dir`, `/`-separated.
    pub output_path: String,
}

/// All routes of one build, unique by output path.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    by_output: HashMap<String, usize>,
    by_owner: HashMap<RouteOwner, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `owner` at `url`.
    ///
    /// Fails without modifying the table if another owner already writes the
    /// same output path.
    pub fn insert(&mut self, owner: RouteOwner, url: String) -> Result<&Route, RouteConflictError> {
        let output_path = output_path(&url);
        if let Some(&existing) = self.by_output.get(&output_path) {
            return Err(RouteConflictError {
                output_path,
                first: self.routes[existing].owner.clone(),
                second: owner,
            });
        }
        let idx = self.routes.len();
        self.by_output.insert(output_path.clone(), idx);
        self.by_owner.insert(owner.clone(), idx);
        self.routes.push(Route {
            owner,
            url,
            output_path,
        });
        Ok(&self.routes[idx])
    }

    pub fn get(&self, owner: &RouteOwner) -> Option<&Route> {
        self.by_owner.get(owner).map(|&idx| &self.routes[idx])
    }

    pub fn document(&self, id: &str) -> Option<&Route> {
        self.get(&RouteOwner::Document(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Every output path in the table.
    pub fn output_paths(&self) -> HashSet<String> {
        self.by_output.keys().cloned().collect()
    }
}

/// URL of a document: posts (and anything with a front-matter `permalink`)
/// go through the permalink template, pages mirror their source path.
pub fn document_url(doc: &Document, config: &SiteConfig) -> String {
    match (&doc.permalink, doc.is_post()) {
        (Some(pattern), _) => normalize_url(&expand_permalink(pattern, doc, config)),
        (None, true) => normalize_url(&expand_permalink(&config.permalink, doc, config)),
        (None, false) => page_url(&doc.id),
    }
}

/// Substitute permalink tokens for one document.
pub fn expand_permalink(pattern: &str, doc: &Document, config: &SiteConfig) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;

    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let token_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let token = &after[..token_len];

        match token_value(token, doc, config) {
            Some(value) => out.push_str(&value),
            None => {
                out.push(':');
                out.push_str(token);
            }
        }
        rest = &after[token_len..];
    }
    out.push_str(rest);
    out
}

fn token_value(token: &str, doc: &Document, config: &SiteConfig) -> Option<String> {
    let date = doc.date;
    let value = match token {
        "year" => format!("{:04}", date.year()),
        "month" => format!("{:02}", date.month()),
        "day" => format!("{:02}", date.day()),
        "i_month" => date.month().to_string(),
        "i_day" => date.day().to_string(),
        "hour" => format!("{:02}", date.hour()),
        "minute" => format!("{:02}", date.minute()),
        "second" => format!("{:02}", date.second()),
        "title" => {
            let slug = slugify(&doc.title);
            if slug.is_empty() { slugify(doc.stem()) } else { slug }
        }
        "name" => slugify(doc.stem()),
        "category" => {
            let category = doc.category.as_deref().unwrap_or(&config.default_category);
            slugify(category)
        }
        _ => return None,
    };
    Some(value)
}

/// `about/index.md` → `about/index.html`, `notes.markdown` → `notes.html`.
pub fn page_url(id: &str) -> String {
    let stem = match id.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && !stem.ends_with('/') => stem,
        _ => id,
    };
    format!("{stem}.html")
}

/// URL of page `page` (1-based) of a collection listing.
pub fn collection_url(key: &CollectionKey, page: usize, config: &SiteConfig) -> String {
    let base = match key {
        CollectionKey::Home => String::new(),
        CollectionKey::Tag(slug) => format!("{}/{slug}/", config.tag_dir),
        CollectionKey::Category(slug) => format!("{}/{slug}/", config.category_dir),
        CollectionKey::Archive => format!("{}/", config.archive_dir),
        CollectionKey::ArchiveYear(year) => format!("{}/{year:04}/", config.archive_dir),
        CollectionKey::ArchiveMonth(year, month) => {
            format!("{}/{year:04}/{month:02}/", config.archive_dir)
        }
    };
    if page > 1 {
        format!("{base}{}/{page}/", config.pagination_dir)
    } else {
        base
    }
}

/// Output file for a URL: directory URLs get `index.html`.
pub fn output_path(url: &str) -> String {
    if url.is_empty() || url.ends_with('/') {
        format!("{url}index.html")
    } else {
        url.to_string()
    }
}

/// Strip leading slashes, collapse `//`, drop `.` and `..` segments, and
/// give extensionless file URLs an `.html` suffix.
///
/// Every URL stays inside `public_dir`, whatever a permalink says.
fn normalize_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 5);
    for segment in url
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    {
        out.push_str(segment);
        out.push('/');
    }
    if !url.ends_with('/') && out.ends_with('/') {
        out.pop();
        let last = out.rsplit('/').next().unwrap_or(&out);
        if !last.contains('.') {
            out.push_str(".html");
        }
    }
    out
}

/// Absolute link for a site-relative URL.
pub fn href(config: &SiteConfig, url: &str) -> String {
    format!("{}{url}", config.root)
}
