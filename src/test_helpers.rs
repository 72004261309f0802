//! Shared test utilities for the quire test suite.
//!
//! Provides a fixture site copied into a temp dir, plus lookup helpers that
//! panic with the available names on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_site();
//! let site = load(&tmp.path().join("source"), &SiteConfig::default()).unwrap();
//!
//! let doc = find_document(&site, "_posts/hello-world.md");
//! assert_eq!(doc.title, "Hello World");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::collection::{Collection, CollectionKey};
use crate::loader::LoadedSite;
use crate::types::Document;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

// =========================================================================
// Lookups (panic with the available names on a miss)
// =========================================================================

/// Find a loaded document by id. Panics if not found.
pub fn find_document<'a>(site: &'a LoadedSite, id: &str) -> &'a Document {
    site.documents
        .iter()
        .find(|d| d.id == id)
        .unwrap_or_else(|| panic!("document '{id}' not found. Available: {:?}", document_ids(site)))
}

/// Find a collection by key. Panics if not found.
pub fn find_collection<'a>(collections: &'a [Collection], key: &CollectionKey) -> &'a Collection {
    collections
        .iter()
        .find(|c| &c.key == key)
        .unwrap_or_else(|| {
            let keys: Vec<String> = collections.iter().map(|c| c.key.to_string()).collect();
            panic!("collection '{key}' not found. Available: {keys:?}")
        })
}

/// All document ids in load order.
pub fn document_ids(site: &LoadedSite) -> Vec<&str> {
    site.documents.iter().map(|d| d.id.as_str()).collect()
}
