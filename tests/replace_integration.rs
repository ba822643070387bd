//! Atomic replacement scenarios.

use std::time::Duration;

use tempfile::TempDir;

use worksync::replace::{CleanupRegistry, DirectoryReplacer};

#[test]
fn site_swap_parks_old_tree_until_flush() {
    let temp = TempDir::new().unwrap();

    // Freshly built artifacts and the directory currently being served.
    let new_build = temp.path().join("new");
    let site = temp.path().join("workspace/site");
    std::fs::create_dir_all(&new_build).unwrap();
    std::fs::write(new_build.join("index.html"), "v2").unwrap();
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("index.html"), "v1").unwrap();
    std::fs::write(site.join("legacy.html"), "old page").unwrap();

    let registry = CleanupRegistry::new();
    let replacer = DirectoryReplacer::new(&registry);
    replacer
        .replace(&new_build, &site, None)
        .expect("swap should succeed");

    // The target is fully the new content.
    assert_eq!(std::fs::read_to_string(site.join("index.html")).unwrap(), "v2");
    assert!(!site.join("legacy.html").exists());
    assert!(!new_build.exists());

    // The old content is intact at the staging path, pending deletion.
    let staging = temp.path().join("workspace/site.to-delete");
    assert_eq!(
        std::fs::read_to_string(staging.join("index.html")).unwrap(),
        "v1"
    );
    assert!(staging.join("legacy.html").exists());
    assert_eq!(registry.pending_count(), 1);

    // Flushing the queue deletes the parked tree in the background.
    registry.flush_all();
    for _ in 0..50 {
        if !staging.exists() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(!staging.exists());
    assert_eq!(std::fs::read_to_string(site.join("index.html")).unwrap(), "v2");
}

#[test]
fn repeated_swaps_reuse_the_staging_path() {
    let temp = TempDir::new().unwrap();
    let site = temp.path().join("site");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("index.html"), "v1").unwrap();

    let registry = CleanupRegistry::new();
    let replacer = DirectoryReplacer::new(&registry);

    for version in ["v2", "v3"] {
        let build = temp.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("index.html"), version).unwrap();
        replacer
            .replace(&build, &site, None)
            .expect("swap should succeed");
    }

    assert_eq!(std::fs::read_to_string(site.join("index.html")).unwrap(), "v3");
    // The staging path holds the most recently displaced tree.
    let staging = temp.path().join("site.to-delete");
    assert_eq!(
        std::fs::read_to_string(staging.join("index.html")).unwrap(),
        "v2"
    );
}

#[test]
fn guard_flushes_queue_when_scope_unwinds() {
    let temp = TempDir::new().unwrap();
    let site = temp.path().join("site");
    let build = temp.path().join("build");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("index.html"), "v1").unwrap();
    std::fs::create_dir_all(&build).unwrap();
    std::fs::write(build.join("index.html"), "v2").unwrap();

    let registry = CleanupRegistry::new();
    {
        let _guard = registry.guard();
        let replacer = DirectoryReplacer::new(&registry);
        replacer.replace(&build, &site, None).expect("swap should succeed");
    }

    assert!(registry.is_flushed());
    let staging = temp.path().join("site.to-delete");
    for _ in 0..50 {
        if !staging.exists() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(!staging.exists());
}
