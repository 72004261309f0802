//! # Quire
//!
//! A static site generator for blogs. Markdown files with YAML front-matter
//! under `source/` become HTML under `public/`; posts are also grouped into
//! paginated home, archive, tag and category listings.
//!
//! # Architecture: Build Pipeline
//!
//! Every build runs the same stages, each handing an immutable snapshot to
//! the next:
//!
//! ```text
//! 1. Load        source/      →  LoadedSite        (documents + assets)
//! 2. Index       LoadedSite   →  Vec<Collection>   (home, archives, tags, categories)
//! 3. Route       both         →  RouteTable        (one owner per output path)
//! 4. Plan        RouteTable   →  BuildPlan         (render / reuse / delete)
//! 5. Render      BuildPlan    →  public/           (parallel, one writer per file)
//! ```
//!
//! Route conflicts are detected in stage 3, before anything is written. A
//! document that fails to parse or render is reported and skipped; the rest
//! of the site still builds.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`loader`] | Walks `source_dir`, parses front-matter, classifies posts, pages and assets |
//! | [`render`] | Markdown to HTML with `pulldown-cmark`, code block highlighting, excerpts |
//! | [`route`] | Permalink expansion, listing URLs, the conflict-checked [`route::RouteTable`] |
//! | [`collection`] | Groups posts into home, archive, tag and category collections |
//! | [`pager`] | Splits a collection into fixed-size pages |
//! | [`theme`] | Built-in Maud layouts for documents and listings |
//! | [`cache`] | Content-hash build cache and stale output planning |
//! | [`build`] | Runs the pipeline, writes outputs, emits progress events |
//! | [`config`] | Layered `_config.yml` loading, merging and validation |
//! | [`slug`] | URL-safe slugs for titles, tags and categories |
//! | [`types`] | Shared document and asset types |
//! | [`output`] | CLI output formatting for builds and `list` |
//! | [`server`] | Local preview server for `public_dir` |
//!
//! # Incremental Builds
//!
//! A document is re-rendered only when its source bytes, its output path or
//! the output-affecting config changed (see [`cache`]). Listings are
//! regenerated every build but only written when their bytes differ, and
//! assets are copied only when size or modification time changed. Outputs
//! whose owner disappeared from the source tree are deleted.

pub mod build;
pub mod cache;
pub mod collection;
pub mod config;
pub mod loader;
pub mod output;
pub mod pager;
pub mod render;
pub mod route;
pub mod server;
pub mod slug;
pub mod theme;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
