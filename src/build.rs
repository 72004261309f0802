//! Build orchestration.
//!
//! Runs the pipeline stages in order and owns every write to `public_dir`:
//!
//! ```text
//! load ─→ collections ─→ routes ─→ cache plan ─→ render + write (parallel)
//!                                                    ─→ listings ─→ assets
//!                                                    ─→ delete stale ─→ save cache
//! ```
//!
//! Everything up to and including the cache plan is pure and single-threaded,
//! so a route conflict aborts the build before a single file is written.
//! Document pages are rendered on the rayon pool; each output path has
//! exactly one owner in the route table, so workers never race on a file.
//! The cache is only touched here, after the workers have joined, and is
//! saved last: a fatal error leaves the previous cache in place.
//!
//! Progress is reported as [`BuildEvent`]s over an optional channel, the
//! same way the CLI streams them to [`crate::output`].

use crate::cache::{self, BuildCache, CacheEntry, CacheStats, PlanInput};
use crate::collection::{self, Collection, CollectionKey};
use crate::config::{CollectionMode, ConfigError, SiteConfig};
use crate::loader::{self, LoadError, LoadedSite};
use crate::pager;
use crate::render::{self, RenderOptions};
use crate::route::{self, RouteConflictError, RouteOwner, RouteTable};
use crate::slug::slugify;
use crate::theme::{self, DocumentView, Link, ListingItem, ListingView, SiteMeta};
use crate::types::Document;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    RouteConflict(#[from] RouteConflictError),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Render every document regardless of the cache.
    pub force: bool,
}

/// Progress notifications sent while a build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    DocumentRendered { id: String, output_path: String },
    DocumentCached { id: String, output_path: String },
    DocumentFailed { id: String, reason: String },
    ListingWritten { name: String, page: usize, output_path: String },
    StaleRemoved { output_path: String },
}

/// A document that produced no new output this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub id: String,
    pub reason: String,
}

/// Summary of a completed build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub rendered: Vec<String>,
    pub cached: Vec<String>,
    /// Parse and render failures; the build carried on without them.
    pub failures: Vec<DocumentFailure>,
    pub listings_written: usize,
    pub listings_unchanged: usize,
    pub assets_copied: usize,
    pub assets_unchanged: usize,
    pub stale_removed: Vec<String>,
    pub skipped_drafts: usize,
    pub cache_stats: CacheStats,
}

/// Everything known about the site before any output is written.
#[derive(Debug)]
pub struct SiteIndex {
    pub site: LoadedSite,
    pub collections: Vec<Collection>,
    pub routes: RouteTable,
}

impl SiteIndex {
    pub fn document(&self, id: &str) -> Option<&Document> {
        self.site.documents.iter().find(|d| d.id == id)
    }
}

/// Load the source tree and resolve collections and routes.
///
/// Fails on the first route conflict. Nothing is written.
pub fn index_site(site_root: &Path, config: &SiteConfig) -> Result<SiteIndex, BuildError> {
    let site = loader::load(&config.source_path(site_root), config)?;
    let collections = collection::build_collections(&site.documents, config);
    let routes = resolve_routes(&site, &collections, config)?;
    Ok(SiteIndex {
        site,
        collections,
        routes,
    })
}

/// Build the route table: documents, then assets, then listing pages.
pub fn resolve_routes(
    site: &LoadedSite,
    collections: &[Collection],
    config: &SiteConfig,
) -> Result<RouteTable, RouteConflictError> {
    let mut routes = RouteTable::new();
    for doc in &site.documents {
        routes.insert(
            RouteOwner::Document(doc.id.clone()),
            route::document_url(doc, config),
        )?;
    }
    for asset in &site.assets {
        routes.insert(RouteOwner::Asset(asset.id.clone()), asset.id.clone())?;
    }
    for collection in collections {
        let pages = pager::paginate(&collection.ids, collection.per_page);
        for page in pages {
            let url = route::collection_url(&collection.key, page.index, config);
            routes.insert(
                RouteOwner::Listing {
                    key: collection.key.clone(),
                    page: page.index,
                },
                url,
            )?;
        }
    }
    Ok(routes)
}

/// Run a full build of the site at `site_root`.
pub fn build(
    site_root: &Path,
    config: &SiteConfig,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildReport, BuildError> {
    let index = index_site(site_root, config)?;
    let public = config.public_path(site_root);
    info!(
        documents = index.site.documents.len(),
        assets = index.site.assets.len(),
        collections = index.collections.len(),
        routes = index.routes.len(),
        "site indexed"
    );

    let previous = BuildCache::load(site_root);
    let params_hash = cache::hash_params(config);
    let load_failed: HashSet<String> = index.site.failures.iter().map(|f| f.id.clone()).collect();

    let mut plan = {
        let inputs = index.site.documents.iter().filter_map(|doc| {
            let route = index.routes.document(&doc.id)?;
            Some(PlanInput {
                id: &doc.id,
                content_hash: &doc.content_hash,
                output_path: &route.output_path,
            })
        });
        previous.plan(
            inputs,
            &load_failed,
            &params_hash,
            options.force,
            &public,
            &index.routes.output_paths(),
        )
    };
    info!(
        render = plan.to_render.len(),
        unchanged = plan.unchanged.len(),
        stale = plan.stale_outputs.len(),
        "build planned"
    );

    fs::create_dir_all(&public).map_err(|source| BuildError::Write {
        path: public.clone(),
        source,
    })?;

    let mut report = BuildReport {
        skipped_drafts: index.site.skipped_drafts,
        ..Default::default()
    };
    for failure in &index.site.failures {
        report.failures.push(DocumentFailure {
            id: failure.id.clone(),
            reason: failure.error.to_string(),
        });
        emit(
            &events,
            BuildEvent::DocumentFailed {
                id: failure.id.clone(),
                reason: failure.error.to_string(),
            },
        );
    }

    let docs: HashMap<&str, &Document> = index
        .site
        .documents
        .iter()
        .map(|d| (d.id.as_str(), d))
        .collect();
    let ctx = RenderContext {
        docs: &docs,
        routes: &index.routes,
        config,
        meta: SiteMeta::from_config(config),
        render_options: RenderOptions::from_site_config(config),
        public: &public,
    };

    // Document pages
    let outcomes = plan
        .to_render
        .par_iter()
        .map_with(events.clone(), |tx, id| ctx.render_document(id, tx))
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut next_cache = BuildCache::new(params_hash);
    let mut excerpts: HashMap<String, Option<String>> = HashMap::new();
    let mut render_failed: HashSet<String> = HashSet::new();

    for id in &plan.unchanged {
        next_cache.carry_over(&previous, id);
        let entry = previous.get(id);
        excerpts.insert(id.clone(), entry.and_then(|e| e.excerpt.clone()));
        if let Some(entry) = entry {
            emit(
                &events,
                BuildEvent::DocumentCached {
                    id: id.clone(),
                    output_path: entry.output_path.clone(),
                },
            );
        }
        report.cached.push(id.clone());
        report.cache_stats.hit();
    }
    for outcome in outcomes {
        match outcome {
            RenderOutcome::Rendered { id, entry } => {
                excerpts.insert(id.clone(), entry.excerpt.clone());
                next_cache.insert(id.clone(), entry);
                report.rendered.push(id);
                report.cache_stats.miss();
            }
            RenderOutcome::Failed { id, reason } => {
                next_cache.carry_over(&previous, &id);
                excerpts.insert(id.clone(), previous.get(&id).and_then(|e| e.excerpt.clone()));
                report.failures.push(DocumentFailure {
                    id: id.clone(),
                    reason,
                });
                render_failed.insert(id);
            }
        }
    }
    for id in &load_failed {
        next_cache.carry_over(&previous, id);
    }
    plan.keep_outputs_of(&render_failed);

    // Listing pages
    for collection in &index.collections {
        for page in pager::paginate(&collection.ids, collection.per_page) {
            let (output_path, written) = ctx.write_listing(collection, &page, &excerpts)?;
            if written {
                report.listings_written += 1;
                emit(
                    &events,
                    BuildEvent::ListingWritten {
                        name: collection.key.to_string(),
                        page: page.index,
                        output_path: output_path.clone(),
                    },
                );
            } else {
                report.listings_unchanged += 1;
            }
            next_cache.listings.insert(output_path);
        }
    }

    // Assets
    let copied = index
        .site
        .assets
        .par_iter()
        .map(|asset| copy_if_changed(&asset.source, &public.join(&asset.id)))
        .collect::<Result<Vec<bool>, BuildError>>()?;
    report.assets_copied = copied.iter().filter(|c| **c).count();
    report.assets_unchanged = copied.len() - report.assets_copied;
    next_cache
        .assets
        .extend(index.site.assets.iter().map(|asset| asset.id.clone()));

    // Stale outputs
    for stale in &plan.stale_outputs {
        if remove_output(&public, &stale.output_path)? {
            emit(
                &events,
                BuildEvent::StaleRemoved {
                    output_path: stale.output_path.clone(),
                },
            );
            report.stale_removed.push(stale.output_path.clone());
        }
    }

    next_cache.save(site_root)?;
    info!(cache = %report.cache_stats, failures = report.failures.len(), "build complete");
    Ok(report)
}

/// Remove the public directory and the build cache.
///
/// Returns the paths that existed and were removed.
pub fn clean(site_root: &Path, config: &SiteConfig) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let public = config.public_path(site_root);
    if public.exists() {
        fs::remove_dir_all(&public)?;
        removed.push(public);
    }
    let cache_file = cache::cache_path(site_root);
    if cache_file.exists() {
        fs::remove_file(&cache_file)?;
        removed.push(cache_file);
    }
    Ok(removed)
}

fn emit(events: &Option<Sender<BuildEvent>>, event: BuildEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening.
        let _ = tx.send(event);
    }
}

enum RenderOutcome {
    Rendered { id: String, entry: CacheEntry },
    Failed { id: String, reason: String },
}

/// Read-only state shared by the render workers.
struct RenderContext<'a> {
    docs: &'a HashMap<&'a str, &'a Document>,
    routes: &'a RouteTable,
    config: &'a SiteConfig,
    meta: SiteMeta,
    render_options: RenderOptions,
    public: &'a Path,
}

impl RenderContext<'_> {
    fn render_document(
        &self,
        id: &str,
        events: &mut Option<Sender<BuildEvent>>,
    ) -> Result<RenderOutcome, BuildError> {
        let (Some(doc), Some(route)) = (self.docs.get(id), self.routes.document(id)) else {
            // Plan inputs come from these same maps.
            return Ok(RenderOutcome::Failed {
                id: id.to_string(),
                reason: "document has no route".into(),
            });
        };

        let rendered = match render::render(&doc.body, &self.render_options) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(doc = id, error = %err, "skipping document");
                let reason = err.to_string();
                emit(
                    events,
                    BuildEvent::DocumentFailed {
                        id: id.to_string(),
                        reason: reason.clone(),
                    },
                );
                return Ok(RenderOutcome::Failed {
                    id: id.to_string(),
                    reason,
                });
            }
        };

        let view = DocumentView {
            title: &doc.title,
            date: doc.date,
            updated: doc.updated,
            description: doc.description.as_deref(),
            category: doc
                .category
                .as_deref()
                .filter(|_| doc.is_post())
                .and_then(|name| self.term_link(name, self.config.category, CollectionKey::Category)),
            tags: doc
                .tags
                .iter()
                .filter_map(|name| self.term_link(name, self.config.tag, CollectionKey::Tag))
                .collect(),
            content: &rendered.html,
        };
        let html = theme::render_document(theme::document_layout(doc), &view, &self.meta);
        write_output(self.public, &route.output_path, html.into_string().as_bytes())?;

        emit(
            events,
            BuildEvent::DocumentRendered {
                id: id.to_string(),
                output_path: route.output_path.clone(),
            },
        );
        Ok(RenderOutcome::Rendered {
            id: id.to_string(),
            entry: CacheEntry {
                content_hash: doc.content_hash.clone(),
                output_path: route.output_path.clone(),
                excerpt: rendered.excerpt,
            },
        })
    }

    /// Link to a tag or category listing, if that collection type is built.
    fn term_link(
        &self,
        name: &str,
        mode: CollectionMode,
        key: fn(String) -> CollectionKey,
    ) -> Option<Link> {
        let slug = slugify(name);
        if mode == CollectionMode::Off || slug.is_empty() {
            return None;
        }
        let url = route::collection_url(&key(slug), 1, self.config);
        Some(Link {
            name: name.trim().to_string(),
            href: route::href(self.config, &url),
        })
    }

    /// Render and write one listing page. Returns its output path and whether
    /// the file on disk changed.
    fn write_listing(
        &self,
        collection: &Collection,
        page: &pager::Page<'_, String>,
        excerpts: &HashMap<String, Option<String>>,
    ) -> Result<(String, bool), BuildError> {
        let owner = RouteOwner::Listing {
            key: collection.key.clone(),
            page: page.index,
        };
        let output_path = self
            .routes
            .get(&owner)
            .map(|r| r.output_path.clone())
            .unwrap_or_else(|| {
                route::output_path(&route::collection_url(&collection.key, page.index, self.config))
            });

        let items = page
            .items
            .iter()
            .filter_map(|id| {
                let doc = self.docs.get(id.as_str())?;
                let doc_route = self.routes.document(id)?;
                Some(ListingItem {
                    title: &doc.title,
                    href: route::href(self.config, &doc_route.url),
                    date: doc.date,
                    excerpt: excerpts.get(id).and_then(|e| e.as_deref()),
                    description: doc.description.as_deref(),
                })
            })
            .collect();

        let page_href = |n: usize| {
            route::href(self.config, &route::collection_url(&collection.key, n, self.config))
        };
        let view = ListingView {
            heading: listing_heading(collection),
            items,
            page: page.index,
            total: page.total,
            prev: page.prev().map(page_href),
            next: page.next().map(page_href),
            show_pagination: collection.per_page != 0,
        };
        let html = theme::render_listing(theme::listing_layout(&collection.key), &view, &self.meta);
        let written = write_if_changed(self.public, &output_path, html.into_string().as_bytes())?;
        Ok((output_path, written))
    }
}

fn listing_heading(collection: &Collection) -> String {
    match &collection.key {
        CollectionKey::Home => collection.name.clone(),
        CollectionKey::Tag(_) => format!("Tag: {}", collection.name),
        CollectionKey::Category(_) => format!("Category: {}", collection.name),
        CollectionKey::Archive => "Archives".into(),
        CollectionKey::ArchiveYear(_) | CollectionKey::ArchiveMonth(..) => {
            format!("Archives: {}", collection.name)
        }
    }
}

fn write_output(public: &Path, output_path: &str, contents: &[u8]) -> Result<(), BuildError> {
    let path = public.join(output_path);
    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)
    };
    write().map_err(|source| BuildError::Write {
        path: path.clone(),
        source,
    })
}

/// Write only when the bytes on disk differ. Returns whether it wrote.
fn write_if_changed(public: &Path, output_path: &str, contents: &[u8]) -> Result<bool, BuildError> {
    match fs::read(public.join(output_path)) {
        Ok(existing) if existing == contents => Ok(false),
        _ => write_output(public, output_path, contents).map(|()| true),
    }
}

/// Copy an asset unless the destination already has the same size and is
/// at least as new as the source.
fn copy_if_changed(source: &Path, dest: &Path) -> Result<bool, BuildError> {
    let write_err = |source| BuildError::Write {
        path: dest.to_path_buf(),
        source,
    };
    let src_meta = fs::metadata(source)?;
    if let Ok(dest_meta) = fs::metadata(dest)
        && dest_meta.len() == src_meta.len()
        && let (Ok(src_time), Ok(dest_time)) = (src_meta.modified(), dest_meta.modified())
        && dest_time >= src_time
    {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::copy(source, dest).map_err(write_err)?;
    Ok(true)
}

/// Delete a stale output and any directories it leaves empty.
fn remove_output(public: &Path, output_path: &str) -> Result<bool, BuildError> {
    let path = public.join(output_path);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    }
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == public || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
    Ok(true)
}
