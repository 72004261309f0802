//! Collection indexing.
//!
//! Groups posts into the listings a blog shows: the home page, one listing
//! per tag and category, and archives (all posts, per year, per month).
//! Pages never join a collection.
//!
//! Within every collection posts are newest first. Posts with the same date
//! keep their load order. Tags and categories are keyed by slug, so `Rust`
//! and `rust` share one collection; the first name seen in load order is the
//! one displayed.

use crate::config::{CollectionMode, SiteConfig};
use crate::slug::slugify;
use crate::types::Document;
use chrono::Datelike;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Identity of a collection. Tag and category keys hold slugs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    Home,
    Tag(String),
    Category(String),
    Archive,
    ArchiveYear(i32),
    ArchiveMonth(i32, u32),
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKey::Home => write!(f, "home"),
            CollectionKey::Tag(slug) => write!(f, "tag {slug}"),
            CollectionKey::Category(slug) => write!(f, "category {slug}"),
            CollectionKey::Archive => write!(f, "archive"),
            CollectionKey::ArchiveYear(year) => write!(f, "archive {year:04}"),
            CollectionKey::ArchiveMonth(year, month) => write!(f, "archive {year:04}/{month:02}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub key: CollectionKey,
    /// Display name: tag or category as first written, `2020`, `2020/09`.
    pub name: String,
    /// Post ids, newest first.
    pub ids: Vec<String>,
    /// Page size for this collection. `0` means one page, no pagination links.
    pub per_page: usize,
}

impl Collection {
    fn new(key: CollectionKey, name: String, per_page: usize) -> Self {
        Self {
            key,
            name,
            ids: Vec::new(),
            per_page,
        }
    }
}

/// Build every enabled collection from the loaded documents.
///
/// Order of the result: home, archives (all, then years and months newest
/// first), categories, tags. Within categories and tags the order is first
/// appearance in load order.
pub fn build_collections(documents: &[Document], config: &SiteConfig) -> Vec<Collection> {
    let mut posts: Vec<&Document> = documents.iter().filter(|d| d.is_post()).collect();

    // Display names in load order, before sorting by date.
    let mut tags = Buckets::default();
    let mut categories = Buckets::default();
    for post in &posts {
        for tag in &post.tags {
            tags.register(tag, &post.id);
        }
        let category = post.category.as_deref().unwrap_or(&config.default_category);
        categories.register(category, &post.id);
    }

    // `sort_by` is stable: equal dates keep load order.
    posts.sort_by(|a, b| b.date.cmp(&a.date));

    let mut home = Collection::new(CollectionKey::Home, config.title.clone(), config.per_page);
    let archive_size = mode_page_size(config.archive, config.per_page);
    let mut archives: Vec<Collection> = Vec::new();
    let mut archive_index: HashMap<CollectionKey, usize> = HashMap::new();
    if let Some(per_page) = archive_size {
        archives.push(Collection::new(CollectionKey::Archive, "Archives".into(), per_page));
    }

    for post in &posts {
        home.ids.push(post.id.clone());

        if let Some(per_page) = archive_size {
            let year = post.date.year();
            let month = post.date.month();
            archives[0].ids.push(post.id.clone());
            for (key, name) in [
                (CollectionKey::ArchiveYear(year), format!("{year:04}")),
                (CollectionKey::ArchiveMonth(year, month), format!("{year:04}/{month:02}")),
            ] {
                let idx = *archive_index.entry(key.clone()).or_insert_with(|| {
                    archives.push(Collection::new(key, name, per_page));
                    archives.len() - 1
                });
                archives[idx].ids.push(post.id.clone());
            }
        }

        for tag in &post.tags {
            tags.push(tag, &post.id);
        }
        let category = post.category.as_deref().unwrap_or(&config.default_category);
        categories.push(category, &post.id);
    }

    let mut collections = vec![home];
    collections.extend(archives);
    if let Some(per_page) = mode_page_size(config.category, config.per_page) {
        collections.extend(categories.into_collections(CollectionKey::Category, per_page));
    }
    if let Some(per_page) = mode_page_size(config.tag, config.per_page) {
        collections.extend(tags.into_collections(CollectionKey::Tag, per_page));
    }
    collections
}

/// `None` when the collection type is off, otherwise its page size.
fn mode_page_size(mode: CollectionMode, per_page: usize) -> Option<usize> {
    match mode {
        CollectionMode::Off => None,
        CollectionMode::Single => Some(0),
        CollectionMode::Paged => Some(per_page),
    }
}

/// Slug-keyed tag or category buckets in first-seen order.
#[derive(Default)]
struct Buckets {
    order: Vec<(String, String)>,
    ids: HashMap<String, Vec<String>>,
}

impl Buckets {
    fn register(&mut self, name: &str, doc_id: &str) {
        let slug = slugify(name);
        if slug.is_empty() {
            warn!(doc = doc_id, name, "ignoring tag or category with an empty slug");
            return;
        }
        if !self.ids.contains_key(&slug) {
            self.ids.insert(slug.clone(), Vec::new());
            self.order.push((slug, name.trim().to_string()));
        }
    }

    fn push(&mut self, name: &str, doc_id: &str) {
        if let Some(ids) = self.ids.get_mut(&slugify(name)) {
            // A post tagged `Rust` and `rust` is listed once.
            if ids.last().map(String::as_str) != Some(doc_id) {
                ids.push(doc_id.to_string());
            }
        }
    }

    fn into_collections(
        mut self,
        key: fn(String) -> CollectionKey,
        per_page: usize,
    ) -> Vec<Collection> {
        self.order
            .into_iter()
            .map(|(slug, name)| {
                let ids = self.ids.remove(&slug).unwrap_or_default();
                Collection {
                    key: key(slug),
                    name,
                    ids,
                    per_page,
                }
            })
            .collect()
    }
}
