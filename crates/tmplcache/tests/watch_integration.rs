//! End-to-end tests against the real OS watcher.
//!
//! Each test builds a template tree in a temp dir, starts the cache with
//! watching on, mutates the tree, and polls the store until the change lands
//! (bounded by a deadline, never a fixed sleep-and-hope).

use std::collections::HashMap;
use std::fs;
use std::path::{MAIN_SEPARATOR_STR, Path};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tmplcache::{CacheConfig, TemplateCache};

const DEADLINE: Duration = Duration::from_secs(10);

// ============================================================================
// Shared test setup
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tmplcache=debug")
        .with_test_writer()
        .try_init();
}

/// `a.txt` = "A", `sub/b.txt` = "B", `skip.txt` ignored.
fn template_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "A").unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub").join("b.txt"), "B").unwrap();
    fs::write(dir.path().join("skip.txt"), "S").unwrap();
    dir
}

fn watched_cache(root: &Path) -> TemplateCache {
    TemplateCache::init(
        CacheConfig::new(root)
            .with_watch(true)
            .with_ignore(["skip.txt"]),
    )
    .unwrap()
}

fn key(parts: &[&str]) -> String {
    parts.join(MAIN_SEPARATOR_STR)
}

/// Poll `check` until it holds or the deadline passes.
async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_concrete_scenario_without_watch() {
    let dir = template_tree();
    let cache = TemplateCache::init(CacheConfig::new(dir.path()).with_ignore(["skip.txt"])).unwrap();

    let mut expected = vec!["a.txt".to_string(), key(&["sub", "b.txt"])];
    expected.sort();
    assert_eq!(cache.store().keys(), expected);
    assert_eq!(&*cache.store().get(&key(&["sub", "b.txt"])).unwrap(), b"B");

    assert_eq!(&*cache.get_template("a.txt").unwrap(), b"A");
    assert!(cache.get_template("missing.txt").unwrap_err().is_not_found());
    assert!(!cache.is_watching());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_modified_file_served_from_memory() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    fs::write(dir.path().join("a.txt"), "A2").unwrap();
    wait_until("a.txt refresh", || {
        cache.store().get("a.txt").as_deref() == Some(&b"A2"[..])
    })
    .await;

    let reads_before = cache.stats().disk_reads;
    assert_eq!(&*cache.get_template("a.txt").unwrap(), b"A2");
    assert_eq!(cache.stats().disk_reads, reads_before);

    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_file_evicted() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());
    assert!(cache.store().contains("a.txt"));

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    wait_until("a.txt eviction", || !cache.store().contains("a.txt")).await;

    assert!(cache.get_template("a.txt").unwrap_err().is_not_found());
    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aliased_lookup_follows_modify_and_delete() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    assert_eq!(&*cache.get_template("./a.txt").unwrap(), b"A");
    assert!(!cache.store().contains("./a.txt"));

    fs::write(dir.path().join("a.txt"), "A2").unwrap();
    wait_until("a.txt refresh", || {
        cache.store().get("a.txt").as_deref() == Some(&b"A2"[..])
    })
    .await;
    assert_eq!(&*cache.get_template("./a.txt").unwrap(), b"A2");

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    wait_until("a.txt eviction", || !cache.store().contains("a.txt")).await;
    assert!(cache.get_template("./a.txt").unwrap_err().is_not_found());

    let mut expected = vec![key(&["sub", "b.txt"])];
    expected.sort();
    assert_eq!(cache.store().keys(), expected);
    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_subdirectory_file_cached() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    let nested = dir.path().join("fresh").join("deeper");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("c.txt"), "C").unwrap();

    let c_key = key(&["fresh", "deeper", "c.txt"]);
    wait_until("fresh/deeper/c.txt", || {
        cache.store().get(&c_key).as_deref() == Some(&b"C"[..])
    })
    .await;

    // Files created after the directory watch exists flow through events too.
    fs::write(nested.join("d.txt"), "D").unwrap();
    let d_key = key(&["fresh", "deeper", "d.txt"]);
    wait_until("fresh/deeper/d.txt", || cache.store().contains(&d_key)).await;

    let reads_before = cache.stats().disk_reads;
    assert_eq!(&*cache.get_template(&c_key).unwrap(), b"C");
    assert_eq!(cache.stats().disk_reads, reads_before);

    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_directory_purges_entries() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());
    let b_key = key(&["sub", "b.txt"]);
    assert!(cache.store().contains(&b_key));

    fs::remove_dir_all(dir.path().join("sub")).unwrap();
    wait_until("sub/ purge", || !cache.store().contains(&b_key)).await;
    assert!(cache.store().contains("a.txt"));

    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_renamed_file() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    fs::rename(dir.path().join("a.txt"), dir.path().join("moved.txt")).unwrap();
    wait_until("a.txt eviction", || !cache.store().contains("a.txt")).await;

    // Cached eagerly when the platform reports the new name, read through
    // otherwise. Either way the lookup succeeds.
    assert_eq!(&*cache.get_template("moved.txt").unwrap(), b"A");
    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_file_changes_never_cached() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    fs::write(dir.path().join("skip.txt"), "S2").unwrap();
    fs::write(dir.path().join("a.txt"), "after-skip").unwrap();
    wait_until("a.txt refresh", || {
        cache.store().get("a.txt").as_deref() == Some(&b"after-skip"[..])
    })
    .await;

    assert!(!cache.store().contains("skip.txt"));
    assert!(cache.stats().events_ignored > 0);
    cache.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopped_watcher_applies_nothing() {
    init_tracing();
    let dir = template_tree();
    let cache = watched_cache(dir.path());

    assert!(cache.stop_watcher().await);
    fs::write(dir.path().join("a.txt"), "late").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(&*cache.get_template("a.txt").unwrap(), b"A");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_during_churn() {
    init_tracing();
    let dir = template_tree();
    let names: Vec<String> = (0..8).map(|i| format!("t{i}.txt")).collect();
    for name in &names {
        fs::write(dir.path().join(name), format!("{name}:0")).unwrap();
    }
    let cache = Arc::new(watched_cache(dir.path()));

    let writer = {
        let root = dir.path().to_path_buf();
        let names = names.clone();
        tokio::task::spawn_blocking(move || {
            for version in 1..=20 {
                for name in &names {
                    fs::write(root.join(name), format!("{name}:{version}")).unwrap();
                }
            }
        })
    };

    let mut readers = Vec::new();
    for reader in 0..16 {
        let cache = Arc::clone(&cache);
        let names = names.clone();
        readers.push(tokio::task::spawn_blocking(move || {
            // Events are applied one at a time in write order, so a reader
            // must never see a key go back to an older version.
            let mut last_seen: HashMap<&str, u32> = HashMap::new();
            for round in 0..200 {
                // Half the readers share one hot key, the rest spread out.
                let name = if reader % 2 == 0 {
                    &names[0]
                } else {
                    &names[(reader + round) % names.len()]
                };
                let bytes = cache.get_template(name).unwrap();
                let text = std::str::from_utf8(&bytes).unwrap();
                // Truncate-then-write can surface an empty read; anything
                // non-empty must be a whole version of this file.
                if !text.is_empty() {
                    let (prefix, version) = text.rsplit_once(':').unwrap();
                    assert_eq!(prefix, name);
                    let version: u32 = version.parse().unwrap();
                    assert!(version <= 20);

                    let last = last_seen.entry(name.as_str()).or_insert(0);
                    assert!(
                        version >= *last,
                        "{name} went back from version {last} to {version}"
                    );
                    *last = version;
                }
            }
        }));
    }

    tokio::time::timeout(DEADLINE, async {
        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    })
    .await
    .expect("lookups deadlocked");

    for name in &names {
        let expected = format!("{name}:20");
        wait_until(name, || {
            cache.store().get(name).as_deref() == Some(expected.as_bytes())
        })
        .await;
    }

    cache.stop_watcher().await;
}
