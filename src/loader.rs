//! Content discovery and front-matter parsing.
//!
//! Stage 1 of the build. Walks `source_dir`, turning Markdown files into
//! [`Document`]s and everything else into [`Asset`]s.
//!
//! ## Source Layout
//!
//! ```text
//! source/
//! ├── _posts/                      # Posts: permalink + tag/category/archive collections
//! │   ├── hello-world.md
//! │   └── 2021/release-notes.md    # Subdirectories are fine
//! ├── _drafts/                     # Only loaded with `render_drafts: true`
//! ├── _partials/                   # Other `_`-prefixed entries are never loaded
//! ├── about/index.md               # Page → about/index.html
//! ├── guide/setup.md               # Page → guide/setup.html
//! └── images/logo.png              # Asset, copied verbatim
//! ```
//!
//! Hidden entries (`.` prefix) and anything matching an `exclude` glob are
//! skipped. Globs are matched against the source-relative path with `/`
//! separators, and `*` does not cross directory boundaries.
//!
//! ## Front-matter
//!
//! ```text
//! ---
//! title: Hello World
//! date: 2020-09-26 10:00:00
//! tags: [intro, meta]
//! categories: Notes
//! ---
//! Body text...
//! ```
//!
//! A malformed block fails only that document: it is reported as a
//! [`LoadFailure`] and the rest of the site still loads.

use crate::cache::hash_bytes;
use crate::config::SiteConfig;
use crate::types::{Asset, Document, DocumentKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const POSTS_DIR: &str = "_posts";
const DRAFTS_DIR: &str = "_drafts";

/// A document that could not be loaded. Never aborts the build.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{path}: front-matter block is not closed with '---'")]
    Unterminated { path: String },
    #[error("{path}: malformed front-matter: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("{path}: unrecognized date {value:?}")]
    Date { path: String, value: String },
    #[error("{path}: not valid UTF-8")]
    Encoding { path: String },
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Failures that stop loading altogether.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source directory not found: {0}")]
    MissingSource(PathBuf),
    #[error("Error walking source directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// A document skipped because it failed to parse.
#[derive(Debug)]
pub struct LoadFailure {
    pub id: String,
    pub error: ParseError,
}

/// Everything discovered under the source directory, in walk order.
#[derive(Debug, Default)]
pub struct LoadedSite {
    pub documents: Vec<Document>,
    pub assets: Vec<Asset>,
    pub failures: Vec<LoadFailure>,
    /// Drafts left out because `render_drafts` is off.
    pub skipped_drafts: usize,
}

/// Raw front-matter as written by the author.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    #[serde(deserialize_with = "opt_scalar")]
    title: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    date: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    updated: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    tags: Vec<String>,
    #[serde(alias = "categories", deserialize_with = "one_or_many")]
    category: Vec<String>,
    #[serde(deserialize_with = "opt_scalar")]
    layout: Option<String>,
    draft: bool,
    published: Option<bool>,
    #[serde(deserialize_with = "opt_scalar")]
    permalink: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    description: Option<String>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept any scalar (`title: 2048` is a title too); null means absent.
fn opt_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a single value")),
    }
}

/// Accept `tags: intro` as well as `tags: [intro, meta]`.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| serde::de::Error::custom("list entries must be plain values"))
            })
            .collect(),
        value => scalar_to_string(&value)
            .map(|s| vec![s])
            .ok_or_else(|| serde::de::Error::custom("expected a value or a list")),
    }
}

/// Load every document and asset under `source_root`.
pub fn load(source_root: &Path, config: &SiteConfig) -> Result<LoadedSite, LoadError> {
    if !source_root.is_dir() {
        return Err(LoadError::MissingSource(source_root.to_path_buf()));
    }

    // Patterns were checked by `SiteConfig::validate`.
    let excludes: Vec<Pattern> = config
        .exclude
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    let mut site = LoadedSite::default();
    let walker = WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| keep_entry(e, source_root, &excludes, config.render_drafts));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let id = relative_id(entry.path(), source_root);

        if !is_markdown(entry.path()) {
            site.assets.push(Asset {
                id,
                source: entry.path().to_path_buf(),
            });
            continue;
        }

        match load_document(&id, entry.path(), config) {
            Ok(doc) if doc.draft && !config.render_drafts => site.skipped_drafts += 1,
            Ok(doc) => site.documents.push(doc),
            Err(error) => {
                tracing::warn!(document = %id, error = %error, "skipping document");
                site.failures.push(LoadFailure { id, error });
            }
        }
    }

    tracing::debug!(
        documents = site.documents.len(),
        assets = site.assets.len(),
        failures = site.failures.len(),
        "source scan completed"
    );
    Ok(site)
}

fn keep_entry(entry: &DirEntry, root: &Path, excludes: &[Pattern], render_drafts: bool) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    if name.starts_with('_') {
        let top_level_dir = entry.depth() == 1 && entry.file_type().is_dir();
        let allowed = name == POSTS_DIR || (render_drafts && name == DRAFTS_DIR);
        if !(top_level_dir && allowed) {
            return false;
        }
    }
    let rel = relative_id(entry.path(), root);
    !is_excluded(&rel, excludes)
}

/// True when `rel` (source-relative, `/`-separated) matches any exclude glob.
pub fn is_excluded(rel: &str, excludes: &[Pattern]) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    excludes.iter().any(|p| p.matches_with(rel, options))
}

fn relative_id(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| MARKDOWN_EXTENSIONS.contains(&e.as_str()))
}

fn load_document(id: &str, path: &Path, config: &SiteConfig) -> Result<Document, ParseError> {
    let io_err = |source| ParseError::Io {
        path: id.to_string(),
        source,
    };
    let bytes = fs::read(path).map_err(io_err)?;
    let content_hash = hash_bytes(&bytes);
    let content = String::from_utf8(bytes).map_err(|_| ParseError::Encoding {
        path: id.to_string(),
    })?;
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(io_err)?;
    let fallback_date = DateTime::<Utc>::from(modified).naive_utc();

    let mut doc = parse_document(id, &content, fallback_date, config)?;
    doc.source = path.to_path_buf();
    doc.content_hash = content_hash;
    Ok(doc)
}

/// Build a [`Document`] from file contents.
///
/// `fallback_date` is used when the front-matter has no `date` (the loader
/// passes the file's modification time). `source` and `content_hash` are
/// left for the caller to fill in.
pub fn parse_document(
    id: &str,
    content: &str,
    fallback_date: NaiveDateTime,
    config: &SiteConfig,
) -> Result<Document, ParseError> {
    let (yaml, body) = split_front_matter(content).ok_or_else(|| ParseError::Unterminated {
        path: id.to_string(),
    })?;

    let front: FrontMatter = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).map_err(|source| ParseError::Yaml {
                path: id.to_string(),
                source,
            })?
        }
        _ => FrontMatter::default(),
    };

    let date_err = |value: &str| ParseError::Date {
        path: id.to_string(),
        value: value.to_string(),
    };
    let date = match &front.date {
        Some(raw) => parse_date(raw).ok_or_else(|| date_err(raw))?,
        None => fallback_date,
    };
    let updated = match &front.updated {
        Some(raw) => Some(parse_date(raw).ok_or_else(|| date_err(raw))?),
        None => None,
    };

    let in_drafts = id.starts_with(&format!("{DRAFTS_DIR}/"));
    let kind = if in_drafts || id.starts_with(&format!("{POSTS_DIR}/")) {
        DocumentKind::Post
    } else {
        DocumentKind::Page
    };

    let stem = {
        let name = id.rsplit('/').next().unwrap_or(id);
        name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name)
    };
    let title = front
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| stem.replace(['-', '_'], " "));

    let category = front.category.into_iter().next().or_else(|| {
        (kind == DocumentKind::Post).then(|| config.default_category.clone())
    });

    Ok(Document {
        id: id.to_string(),
        source: PathBuf::new(),
        kind,
        title,
        date,
        updated,
        tags: front.tags,
        category,
        layout: front.layout,
        draft: in_drafts || front.draft || front.published == Some(false),
        permalink: front.permalink,
        description: front.description,
        body: body.to_string(),
        content_hash: String::new(),
    })
}

/// Split `content` into an optional YAML block and the body.
///
/// Returns `None` when a block is opened but never closed.
pub fn split_front_matter(content: &str) -> Option<(Option<&str>, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');

    let Some(first) = lines.next() else {
        return Some((None, content));
    };
    if first.trim_end() != "---" {
        return Some((None, content));
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == "---" {
            let yaml = &content[yaml_start..offset];
            let body = &content[offset + line.len()..];
            return Some((Some(yaml), body));
        }
        offset += line.len();
    }
    None
}

/// Parse the date styles found in front-matter.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_local())
}
