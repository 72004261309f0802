//! Site configuration module.
//!
//! Handles loading, layering, and validating `_config.yml`. Stock defaults
//! are serialized to a YAML value, then each config file is merged on top
//! in order, so a site only needs to spell out what it changes.
//!
//! ## Config File Location
//!
//! ```text
//! my-site/
//! ├── _config.yml            # Site config (optional; stock defaults apply)
//! ├── _config.prod.yml       # Extra layer: `quire --config _config.yml,_config.prod.yml`
//! └── source/
//!     ├── _posts/
//!     └── about/index.md
//! ```
//!
//! ## Configuration Options
//!
//! ```yaml
//! title: Quire
//! permalink: :year/:month/:day/:title/
//! per_page: 10
//! archive: 2        # 0 = off, 1 = single page, 2 = paginated
//! category: 2
//! tag: 2
//! exclude:
//!   - "**/examples/**"
//! markdown:
//!   gfm: true
//!   breaks: true
//! ```
//!
//! Nested tables (`highlight`, `markdown`) reject unknown keys to catch
//! typos. Unknown top-level keys are tolerated because Hexo configs carry
//! plenty of plugin settings this generator has no use for; they are
//! reported at debug level.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read when no `--config` list is given.
pub const DEFAULT_CONFIG_FILE: &str = "_config.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How a collection type (archive, category, tag) is generated.
///
/// Serialized as the Hexo integers `0`, `1`, `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CollectionMode {
    /// `0`: the collection is not built at all.
    Off,
    /// `1`: listing pages are built, everything on one page.
    Single,
    /// `2`: listing pages are paginated by `per_page`.
    Paged,
}

impl TryFrom<u8> for CollectionMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Single),
            2 => Ok(Self::Paged),
            n => Err(format!("collection mode must be 0, 1 or 2 (got {n})")),
        }
    }
}

impl From<CollectionMode> for u8 {
    fn from(mode: CollectionMode) -> u8 {
        match mode {
            CollectionMode::Off => 0,
            CollectionMode::Single => 1,
            CollectionMode::Paged => 2,
        }
    }
}

/// Site configuration loaded from `_config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site metadata
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub author: String,
    pub language: String,
    /// Public URL of the deployed site (used for absolute links).
    pub url: String,
    /// URL prefix the site is served under. Must start and end with `/`.
    pub root: String,

    // URL layout
    /// Permalink template for posts, e.g. `:year/:month/:day/:title/`.
    pub permalink: String,
    pub tag_dir: String,
    pub archive_dir: String,
    pub category_dir: String,
    pub pagination_dir: String,
    pub default_category: String,

    // Directories, relative to the site root
    pub source_dir: String,
    pub public_dir: String,

    // Writing
    /// Build documents under `_drafts/` and documents flagged as drafts.
    pub render_drafts: bool,
    /// strftime format used for displayed dates. Moment-style formats
    /// (`YYYY-MM-DD`) are converted when the config is resolved.
    pub date_format: String,

    // Pagination and collections
    /// Posts per listing page. `0` disables pagination.
    pub per_page: usize,
    pub archive: CollectionMode,
    pub category: CollectionMode,
    pub tag: CollectionMode,

    /// Glob patterns (relative to `source_dir`) for files to ignore.
    pub exclude: Vec<String>,

    pub highlight: HighlightConfig,
    pub markdown: MarkdownConfig,

    /// Maximum number of parallel render workers.
    /// When absent, defaults to the number of CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Theme name. Only the built-in theme ships with this generator;
    /// the value is kept for compatibility with existing configs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Deployment settings belong to external tooling and are not read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<serde_yaml::Value>,

    /// Keys this generator does not recognize (plugin settings, etc.).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Quire".to_string(),
            subtitle: String::new(),
            description: String::new(),
            author: String::new(),
            language: "en".to_string(),
            url: "http://example.com".to_string(),
            root: "/".to_string(),
            permalink: ":year/:month/:day/:title/".to_string(),
            tag_dir: "tags".to_string(),
            archive_dir: "archives".to_string(),
            category_dir: "categories".to_string(),
            pagination_dir: "page".to_string(),
            default_category: "uncategorized".to_string(),
            source_dir: "source".to_string(),
            public_dir: "public".to_string(),
            render_drafts: false,
            date_format: "%Y-%m-%d".to_string(),
            per_page: 10,
            archive: CollectionMode::Paged,
            category: CollectionMode::Paged,
            tag: CollectionMode::Paged,
            exclude: Vec::new(),
            highlight: HighlightConfig::default(),
            markdown: MarkdownConfig::default(),
            max_workers: None,
            theme: None,
            deploy: None,
            extra: BTreeMap::new(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.starts_with('/') || !self.root.ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "root must start and end with '/' (got {:?})",
                self.root
            )));
        }
        if self.permalink.trim().is_empty() {
            return Err(ConfigError::Validation("permalink must not be empty".into()));
        }
        for (key, value) in [
            ("tag_dir", &self.tag_dir),
            ("archive_dir", &self.archive_dir),
            ("category_dir", &self.category_dir),
            ("pagination_dir", &self.pagination_dir),
            ("source_dir", &self.source_dir),
            ("public_dir", &self.public_dir),
        ] {
            if value.trim_matches('/').is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "max_workers must be at least 1".into(),
            ));
        }
        for pattern in &self.exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("invalid exclude pattern {pattern:?}: {e}"))
            })?;
        }
        for (key, value) in [
            ("tag_dir", &self.tag_dir),
            ("archive_dir", &self.archive_dir),
            ("category_dir", &self.category_dir),
            ("pagination_dir", &self.pagination_dir),
        ] {
            if value.split('/').any(|segment| segment == "." || segment == "..") {
                return Err(ConfigError::Validation(format!(
                    "{key} must stay inside public_dir (got {value:?})"
                )));
            }
        }
        // Formatting a NaiveDateTime fails for items it cannot supply (`%z`).
        let mut sample = String::new();
        let bad_format = chrono::format::StrftimeItems::new(&self.date_format)
            .any(|item| matches!(item, chrono::format::Item::Error))
            || write!(
                sample,
                "{}",
                chrono::NaiveDateTime::default().format(&self.date_format)
            )
            .is_err();
        if bad_format {
            return Err(ConfigError::Validation(format!(
                "date_format {:?} is not a valid strftime format for a date without timezone",
                self.date_format
            )));
        }
        Ok(())
    }

    /// Absolute source directory for a site rooted at `site_root`.
    pub fn source_path(&self, site_root: &Path) -> PathBuf {
        site_root.join(&self.source_dir)
    }

    /// Absolute output directory for a site rooted at `site_root`.
    pub fn public_path(&self, site_root: &Path) -> PathBuf {
        site_root.join(&self.public_dir)
    }
}

/// Code block presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HighlightConfig {
    /// Wrap fenced code in a `<figure class="highlight">` block.
    pub enable: bool,
    /// Add a line-number gutter (only when `enable` is set).
    pub line_number: bool,
    /// Replacement for tab characters inside code blocks. Empty keeps tabs.
    pub tab_replace: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enable: true,
            line_number: true,
            tab_replace: String::new(),
        }
    }
}

/// Markdown dialect toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    /// GitHub-flavored extensions: tables, strikethrough, task lists.
    pub gfm: bool,
    /// Stick to original Markdown. Overrides `gfm`.
    pub pedantic: bool,
    /// Treat single newlines as `<br />`.
    pub breaks: bool,
    /// Curly quotes, dashes and ellipses.
    pub smartypants: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            gfm: true,
            pedantic: false,
            breaks: true,
            smartypants: true,
        }
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(max_workers: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a YAML mapping.
///
/// This is the base layer that user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<serde_yaml::Value, ConfigError> {
    Ok(serde_yaml::to_value(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Mappings are merged key-by-key (overlay keys override base keys).
/// - A null overlay value (`subtitle:` with nothing after it) keeps the base.
/// - Other overlay values replace base values entirely.
pub fn merge_yaml(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_yaml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Read one config file as a raw YAML value. An empty file is an empty map.
pub fn load_raw_config(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: serde_yaml::Value,
    overlays: Vec<serde_yaml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_yaml);
    let mut config: SiteConfig = serde_yaml::from_value(merged)?;
    if !config.date_format.contains('%') {
        config.date_format = moment_to_strftime(&config.date_format);
    }
    config.validate()?;
    for key in config.extra.keys() {
        tracing::debug!(key = %key, "ignoring unrecognized config key");
    }
    Ok(config)
}

/// Load the site config for `site_root`.
///
/// With an empty `files` list, `_config.yml` is read if present and stock
/// defaults apply otherwise. An explicit list is merged in order (later
/// files win) and every listed file must exist.
pub fn load_config(site_root: &Path, files: &[PathBuf]) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let mut overlays = Vec::new();

    if files.is_empty() {
        let default_path = site_root.join(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            overlays.push(load_raw_config(&default_path)?);
        }
    } else {
        for file in files {
            overlays.push(load_raw_config(&site_root.join(file))?);
        }
    }

    resolve_config(base, overlays)
}

/// Moment-style tokens and their strftime equivalents, longest first.
const MOMENT_TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("MMMM", "%B"),
    ("dddd", "%A"),
    ("MMM", "%b"),
    ("ddd", "%a"),
    ("DDDD", "%j"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("M", "%-m"),
    ("D", "%-d"),
    ("H", "%-H"),
    ("h", "%-I"),
    ("m", "%-M"),
    ("s", "%-S"),
    ("A", "%p"),
    ("a", "%P"),
];

/// Translate a moment-style date format (`YYYY-MM-DD`) to strftime.
///
/// Text in `[brackets]` is copied literally, like moment does. Characters
/// that are not tokens pass through unchanged.
pub fn moment_to_strftime(format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;
    while let Some(c) = rest.chars().next() {
        if c == '[' {
            let literal_end = rest.find(']').unwrap_or(rest.len());
            out.push_str(&rest[1..literal_end]);
            rest = rest.get(literal_end + 1..).unwrap_or("");
            continue;
        }
        match MOMENT_TOKENS.iter().find(|(token, _)| rest.starts_with(token)) {
            Some((token, strftime)) => {
                out.push_str(strftime);
                rest = &rest[token.len()..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Returns a fully-commented stock `_config.yml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_yaml() -> &'static str {
    r##"# Quire Configuration
# ===================
# All settings are optional. Values shown below are the defaults.
# Layer several files with: quire --config _config.yml,_config.local.yml

# ---------------------------------------------------------------------------
# Site
# ---------------------------------------------------------------------------
title: Quire
subtitle:
description:
author:
language: en

# ---------------------------------------------------------------------------
# URL
# ---------------------------------------------------------------------------
url: http://example.com
# Path prefix the site is served under. Must start and end with '/'.
root: /
# Tokens: :year :month :day :i_month :i_day :hour :minute :second
#         :title :name :category
permalink: :year/:month/:day/:title/

# ---------------------------------------------------------------------------
# Directories
# ---------------------------------------------------------------------------
source_dir: source
public_dir: public
tag_dir: tags
archive_dir: archives
category_dir: categories
pagination_dir: page

# ---------------------------------------------------------------------------
# Writing
# ---------------------------------------------------------------------------
default_category: uncategorized
render_drafts: false
# Format for displayed dates: strftime (`%Y-%m-%d`), or moment-style tokens
# (`YYYY-MM-DD`, `MMM D YYYY`, `HH:mm`) as found in existing blog configs.
# A format without `%` is read as moment-style. Timezone items (`%z`, `%Z`)
# are rejected: post dates carry no timezone.
date_format: "%Y-%m-%d"

# Glob patterns (relative to source_dir) that are never loaded.
exclude: []

highlight:
  enable: true
  line_number: true
  tab_replace: ""

markdown:
  gfm: true
  pedantic: false
  breaks: true
  smartypants: true

# ---------------------------------------------------------------------------
# Pagination and collections
# ---------------------------------------------------------------------------
# Posts per listing page. 0 disables pagination.
per_page: 10
# 0 = not generated, 1 = single page, 2 = paginated
archive: 2
category: 2
tag: 2

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
# Maximum parallel render workers. Omit to use every CPU core.
# max_workers: 4
"##
}
