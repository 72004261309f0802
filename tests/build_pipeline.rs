//! End-to-end builds of the `fixtures/site` sample site.

use quire::build::{self, BuildError, BuildOptions};
use quire::collection::CollectionKey;
use quire::config::{self, SiteConfig};
use quire::pager;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir(&fixtures, tmp.path());
    tmp
}

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn load(root: &Path) -> SiteConfig {
    config::load_config(root, &[]).unwrap()
}

fn build_site(root: &Path, config: &SiteConfig) -> build::BuildReport {
    build::build(root, config, &BuildOptions::default(), None).unwrap()
}

fn public(root: &Path) -> PathBuf {
    root.join("public")
}

// ---------------------------------------------------------------------------
// Full build
// ---------------------------------------------------------------------------

#[test]
fn fixture_site_builds_expected_files() {
    let tmp = setup_site();
    let config = load(tmp.path());
    let report = build_site(tmp.path(), &config);

    let out = public(tmp.path());
    assert!(out.join("index.html").is_file());
    assert!(out.join("2020/09/26/hello-world/index.html").is_file());
    assert!(out.join("about/index.html").is_file());
    assert!(out.join("docs/getting-started.html").is_file());
    assert!(out.join("embed.html").is_file());
    assert!(out.join("css/extra.css").is_file());

    // excluded, partial, hidden and draft sources produce nothing
    assert!(!out.join("docs/private/secret.html").exists());
    assert!(!out.join("_partials").exists());
    assert!(!out.join(".hidden.html").exists());
    assert!(!out.join("_drafts").exists());

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.skipped_drafts, 1);
}

#[test]
fn fixture_config_paginates_home_and_keeps_tags_on_one_page() {
    let tmp = setup_site();
    let config = load(tmp.path());
    assert_eq!(config.per_page, 2);
    build_site(tmp.path(), &config);

    let out = public(tmp.path());
    // 4 published posts at 2 per page
    assert!(out.join("page/2/index.html").is_file());
    assert!(!out.join("page/3/index.html").exists());
    // `tag: 1` puts every tag on a single page
    assert!(out.join("tags/intro/index.html").is_file());
    assert!(!out.join("tags/intro/page/2/index.html").exists());
}

#[test]
fn raw_layout_writes_body_only() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);

    let html = fs::read_to_string(public(tmp.path()).join("embed.html")).unwrap();
    assert!(html.contains("Raw fragment"));
    assert!(!html.contains("<html"));
}

// ---------------------------------------------------------------------------
// Incremental behavior
// ---------------------------------------------------------------------------

#[test]
fn unchanged_document_is_not_rewritten() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);

    let output = public(tmp.path()).join("2020/09/26/hello-world/index.html");
    let before = fs::metadata(&output).unwrap().modified().unwrap();

    let report = build_site(tmp.path(), &config);
    let after = fs::metadata(&output).unwrap().modified().unwrap();

    assert_eq!(before, after);
    assert!(report.cached.iter().any(|id| id == "_posts/hello-world.md"));
    assert!(report.rendered.is_empty(), "{:?}", report.rendered);
}

#[test]
fn force_renders_everything() {
    let tmp = setup_site();
    let config = load(tmp.path());
    let first = build_site(tmp.path(), &config);

    let forced = build::build(tmp.path(), &config, &BuildOptions { force: true }, None).unwrap();
    assert!(forced.cached.is_empty());
    assert_eq!(forced.rendered.len(), first.rendered.len());
}

#[test]
fn removed_document_output_is_deleted() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);

    let out = public(tmp.path());
    let post_output = out.join("2021/01/15/site-news/index.html");
    assert!(post_output.is_file());
    assert!(out.join("tags/meta/index.html").is_file());

    fs::remove_file(tmp.path().join("source/_posts/site-news.md")).unwrap();
    let report = build_site(tmp.path(), &config);

    assert!(!post_output.exists());
    // site-news was the only post tagged `meta`
    assert!(!out.join("tags/meta/index.html").exists());
    assert!(
        report
            .stale_removed
            .iter()
            .any(|p| p == "2021/01/15/site-news/index.html")
    );
}

#[test]
fn removed_asset_copy_is_deleted() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);

    let out = public(tmp.path());
    assert!(out.join("css/extra.css").is_file());

    fs::remove_file(tmp.path().join("source/css/extra.css")).unwrap();
    let report = build_site(tmp.path(), &config);

    assert!(!out.join("css/extra.css").exists());
    // the now-empty directory goes too
    assert!(!out.join("css").exists());
    assert!(report.stale_removed.iter().any(|p| p == "css/extra.css"));
}

#[test]
fn changing_tag_mode_rerenders_posts() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);

    fs::write(tmp.path().join("_config.notags.yml"), "tag: 0\n").unwrap();
    let files = vec![PathBuf::from("_config.yml"), PathBuf::from("_config.notags.yml")];
    let no_tags = config::load_config(tmp.path(), &files).unwrap();
    let report = build_site(tmp.path(), &no_tags);

    assert!(report.cached.is_empty(), "{:?}", report.cached);
    let html =
        fs::read_to_string(public(tmp.path()).join("2020/09/26/hello-world/index.html")).unwrap();
    assert!(!html.contains("/tags/intro/"));
    assert!(!public(tmp.path()).join("tags/intro/index.html").exists());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn route_conflict_writes_nothing() {
    let tmp = setup_site();
    let dir = tmp.path().join("source/2020/09/26/hello-world");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.md"), "---\ntitle: Impostor\n---\nSame path.\n").unwrap();

    let config = load(tmp.path());
    let err = build::build(tmp.path(), &config, &BuildOptions::default(), None).unwrap_err();

    match &err {
        BuildError::RouteConflict(conflict) => {
            assert_eq!(conflict.output_path, "2020/09/26/hello-world/index.html");
        }
        other => panic!("expected a route conflict, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("_posts/hello-world.md"), "{message}");
    assert!(message.contains("2020/09/26/hello-world/index.md"), "{message}");

    let out = public(tmp.path());
    assert!(!out.exists() || fs::read_dir(&out).unwrap().next().is_none());
}

#[test]
fn unclosed_fence_skips_only_that_document() {
    let tmp = setup_site();
    fs::write(
        tmp.path().join("source/_posts/broken.md"),
        "---\ntitle: Broken\ndate: 2021-06-01\n---\n```rust\nfn main() {}\n",
    )
    .unwrap();

    let config = load(tmp.path());
    let report = build_site(tmp.path(), &config);

    assert!(report.failures.iter().any(|f| f.id == "_posts/broken.md"));
    assert!(!public(tmp.path()).join("2021/06/01/broken/index.html").exists());
    assert!(public(tmp.path()).join("2020/09/26/hello-world/index.html").is_file());
}

// ---------------------------------------------------------------------------
// Config layering
// ---------------------------------------------------------------------------

#[test]
fn layered_config_disables_pagination() {
    let tmp = setup_site();
    fs::write(tmp.path().join("_config.local.yml"), "per_page: 0\n").unwrap();

    let files = vec![PathBuf::from("_config.yml"), PathBuf::from("_config.local.yml")];
    let config = config::load_config(tmp.path(), &files).unwrap();
    assert_eq!(config.per_page, 0);
    // earlier layers still apply
    assert_eq!(config.title, "Field Notes");

    let index = build::index_site(tmp.path(), &config).unwrap();
    let home = index
        .collections
        .iter()
        .find(|c| c.key == CollectionKey::Home)
        .unwrap();
    let pages = pager::paginate(&home.ids, home.per_page);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].items.len(), 4);

    build_site(tmp.path(), &config);
    assert!(!public(tmp.path()).join("page/2/index.html").exists());
}

#[test]
fn missing_layered_config_file_is_an_error() {
    let tmp = setup_site();
    let files = vec![PathBuf::from("_config.nope.yml")];
    assert!(config::load_config(tmp.path(), &files).is_err());
}

// ---------------------------------------------------------------------------
// Clean
// ---------------------------------------------------------------------------

#[test]
fn clean_removes_public_and_cache() {
    let tmp = setup_site();
    let config = load(tmp.path());
    build_site(tmp.path(), &config);
    assert!(quire::cache::cache_path(tmp.path()).exists());

    let removed = build::clean(tmp.path(), &config).unwrap();
    assert_eq!(removed.len(), 2);
    assert!(!public(tmp.path()).exists());
    assert!(!quire::cache::cache_path(tmp.path()).exists());
}
