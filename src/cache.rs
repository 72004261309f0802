//! Incremental build cache.
//!
//! Rendering and writing every document on every build is wasted work when
//! only one post changed. This module records, per document, the content
//! hash that produced its output, so the next build can skip documents whose
//! source bytes and output location are unchanged.
//!
//! # Cache keys
//!
//! - **`content_hash`**: SHA-256 of the raw source file. Content-based rather
//!   than mtime-based so it survives `git checkout`.
//! - **`params_hash`**: SHA-256 of every config value that changes what a
//!   document page looks like (Markdown dialect, highlight options, site
//!   metadata, URL layout). A params change invalidates every entry.
//!
//! A document is skipped only when all of these hold:
//! 1. The params hash matches the stored one
//! 2. An entry exists with the same content hash
//! 3. The entry's output path equals the document's current output path
//! 4. That output file still exists on disk
//!
//! # Stale outputs
//!
//! [`BuildCache::plan`] also works out which files in `public_dir` no longer
//! belong to anything: outputs of documents removed from the source tree,
//! old locations of documents whose route moved, listing pages that the
//! current build no longer generates, and copies of deleted assets. A path
//! that some other owner writes this build is never reported stale.
//!
//! Documents that failed to load or render keep their previous entry. Their
//! last good output is left in place, and is re-checked against the content
//! hash on the next build.
//!
//! # Storage
//!
//! The cache is a JSON file at `<site_root>/.quire-cache.json`, written to a
//! temporary file and renamed into place once a build completes without a
//! fatal error. `generate --force` plans as if every entry were stale.

use crate::config::{CollectionMode, SiteConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the cache file within the site root.
pub const CACHE_FILENAME: &str = ".quire-cache.json";

/// Version of the cache format. Bump this to invalidate all existing caches
/// when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

/// What the last successful build produced for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub content_hash: String,
    /// Output path relative to `public_dir`, `/`-separated.
    pub output_path: String,
    /// Rendered excerpt, reused by listing pages when the document is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// On-disk cache: document entries plus the listing and asset outputs of
/// the last build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCache {
    pub version: u32,
    pub params_hash: String,
    pub entries: BTreeMap<String, CacheEntry>,
    pub listings: BTreeSet<String>,
    #[serde(default)]
    pub assets: BTreeSet<String>,
}

/// One document as the planner sees it.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub id: &'a str,
    pub content_hash: &'a str,
    pub output_path: &'a str,
}

/// Who last wrote a stale output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleOwner {
    Document(String),
    Listing,
    Asset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleOutput {
    pub output_path: String,
    pub owner: StaleOwner,
}

/// Result of comparing the current documents against the cache.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildPlan {
    /// Document ids that must be rendered and written, in input order.
    pub to_render: Vec<String>,
    /// Document ids whose existing output is still valid.
    pub unchanged: Vec<String>,
    /// Output paths to delete once the build has written everything else.
    pub stale_outputs: Vec<StaleOutput>,
}

impl BuildPlan {
    /// Drop stale outputs last written by any of `ids`.
    ///
    /// Used when a document fails to render: its previous output survives.
    pub fn keep_outputs_of(&mut self, ids: &HashSet<String>) {
        self.stale_outputs.retain(|stale| match &stale.owner {
            StaleOwner::Document(id) => !ids.contains(id),
            StaleOwner::Listing | StaleOwner::Asset => true,
        });
    }
}

impl BuildCache {
    /// Create an empty cache (first build).
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn new(params_hash: String) -> Self {
        Self {
            version: CACHE_VERSION,
            params_hash,
            entries: BTreeMap::new(),
            listings: BTreeSet::new(),
            assets: BTreeSet::new(),
        }
    }

    /// Load from the site root. Returns an empty cache if the file doesn't
    /// exist or can't be parsed (version mismatch, corruption).
    pub fn load(site_root: &Path) -> Self {
        let path = cache_path(site_root);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(err) => {
                debug!(path = %path.display(), %err, "ignoring unreadable build cache");
                return Self::empty();
            }
        };
        if cache.version != CACHE_VERSION {
            debug!(found = cache.version, expected = CACHE_VERSION, "build cache version mismatch");
            return Self::empty();
        }
        cache
    }

    /// Save to the site root via a temporary file and rename.
    pub fn save(&self, site_root: &Path) -> io::Result<()> {
        let path = cache_path(site_root);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: String, entry: CacheEntry) {
        self.entries.insert(id, entry);
    }

    /// Copy `id`'s entry from `previous`, if it has one.
    pub fn carry_over(&mut self, previous: &BuildCache, id: &str) {
        if let Some(entry) = previous.entries.get(id) {
            self.entries.insert(id.to_string(), entry.clone());
        }
    }

    /// Decide what this build must render and what it must delete.
    ///
    /// `failed` holds ids of documents that could not be loaded this build.
    /// `live_outputs` is every output path the build will write (documents,
    /// listings and assets).
    pub fn plan<'a>(
        &self,
        documents: impl IntoIterator<Item = PlanInput<'a>>,
        failed: &HashSet<String>,
        params_hash: &str,
        force: bool,
        public_dir: &Path,
        live_outputs: &HashSet<String>,
    ) -> BuildPlan {
        let trusted = !force && self.params_hash == params_hash;
        if !trusted && !self.entries.is_empty() {
            debug!(force, "build cache not trusted; rendering everything");
        }

        let mut plan = BuildPlan::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for doc in documents {
            seen.insert(doc.id);
            let previous = self.entries.get(doc.id);

            if let Some(prev) = previous
                && prev.output_path != doc.output_path
                && !live_outputs.contains(&prev.output_path)
            {
                debug!(id = doc.id, from = %prev.output_path, to = doc.output_path, "route moved");
                plan.stale_outputs.push(StaleOutput {
                    output_path: prev.output_path.clone(),
                    owner: StaleOwner::Document(doc.id.to_string()),
                });
            }

            let fresh = trusted
                && previous.is_some_and(|prev| {
                    prev.content_hash == doc.content_hash
                        && prev.output_path == doc.output_path
                        && public_dir.join(&prev.output_path).is_file()
                });
            if fresh {
                debug!(id = doc.id, "cache hit");
                plan.unchanged.push(doc.id.to_string());
            } else {
                debug!(id = doc.id, "cache miss");
                plan.to_render.push(doc.id.to_string());
            }
        }

        for (id, entry) in &self.entries {
            if seen.contains(id.as_str()) || failed.contains(id) {
                continue;
            }
            if !live_outputs.contains(&entry.output_path) {
                debug!(id, output = %entry.output_path, "document removed");
                plan.stale_outputs.push(StaleOutput {
                    output_path: entry.output_path.clone(),
                    owner: StaleOwner::Document(id.clone()),
                });
            }
        }

        for listing in &self.listings {
            if !live_outputs.contains(listing) {
                plan.stale_outputs.push(StaleOutput {
                    output_path: listing.clone(),
                    owner: StaleOwner::Listing,
                });
            }
        }

        for asset in &self.assets {
            if !live_outputs.contains(asset) {
                debug!(output = %asset, "asset removed");
                plan.stale_outputs.push(StaleOutput {
                    output_path: asset.clone(),
                    owner: StaleOwner::Asset,
                });
            }
        }

        plan
    }
}

/// Resolve the cache file path for a site root.
pub fn cache_path(site_root: &Path) -> PathBuf {
    site_root.join(CACHE_FILENAME)
}

/// SHA-256 of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Config values that change the HTML of a document page.
#[derive(Serialize)]
struct OutputParams<'a> {
    title: &'a str,
    subtitle: &'a str,
    description: &'a str,
    author: &'a str,
    language: &'a str,
    url: &'a str,
    root: &'a str,
    permalink: &'a str,
    tag_dir: &'a str,
    archive_dir: &'a str,
    category_dir: &'a str,
    pagination_dir: &'a str,
    default_category: &'a str,
    date_format: &'a str,
    // Collection modes decide which nav, tag and category links a page carries.
    archive: CollectionMode,
    category: CollectionMode,
    tag: CollectionMode,
    highlight: &'a crate::config::HighlightConfig,
    markdown: &'a crate::config::MarkdownConfig,
}

/// SHA-256 of the output-affecting config, plus the crate version so a new
/// built-in theme invalidates old pages.
pub fn hash_params(config: &SiteConfig) -> String {
    let params = OutputParams {
        title: &config.title,
        subtitle: &config.subtitle,
        description: &config.description,
        author: &config.author,
        language: &config.language,
        url: &config.url,
        root: &config.root,
        permalink: &config.permalink,
        tag_dir: &config.tag_dir,
        archive_dir: &config.archive_dir,
        category_dir: &config.category_dir,
        pagination_dir: &config.pagination_dir,
        default_category: &config.default_category,
        date_format: &config.date_format,
        archive: config.archive,
        category: config.category,
        tag: config.tag,
        highlight: &config.highlight,
        markdown: &config.markdown,
    };
    let mut hasher = Sha256::new();
    hasher.update(b"document\0");
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(b"\0");
    // Serializing borrowed strings and plain structs cannot fail.
    hasher.update(serde_json::to_vec(&params).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}
