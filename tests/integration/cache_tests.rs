use super::fixtures::{write_corrupt, write_png, Pattern};
use filetime::FileTime;
use imgdupes::cache::{compute_all, CacheConfig, CacheError, HashCache, RunNames};
use imgdupes::scanner::{HashFunction, HashMethod, PerceptualHasher, Walker, WalkerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn hasher(method: HashMethod) -> Arc<dyn HashFunction> {
    Arc::new(PerceptualHasher::new(method, 8).unwrap())
}

fn config() -> CacheConfig {
    CacheConfig::default().with_hash_threads(2)
}

fn collection(dir: &Path) -> Vec<PathBuf> {
    write_png(dir, "a.png", Pattern::HorizontalGradient);
    write_png(dir, "b.png", Pattern::VerticalGradient);
    write_png(dir, "c.png", Pattern::Checkerboard);
    write_png(dir, "d.png", Pattern::Diagonal);
    write_corrupt(dir, "e.png");
    Walker::new(dir, WalkerConfig::default())
        .collect_images()
        .unwrap()
}

fn set_mtime(path: &Path, offset_secs: u64) {
    let when = SystemTime::now() + Duration::from_secs(offset_secs);
    filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

fn backdate(path: &Path, secs: u64) {
    let when = SystemTime::now() - Duration::from_secs(secs);
    filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

fn cache_path(cache_dir: &Path, target: &Path, bits: u32) -> PathBuf {
    cache_dir.join(RunNames::new(target, "phash", false).cache_file(bits))
}

#[test]
fn test_one_bad_image_does_not_abort_batch() {
    let images = TempDir::new().unwrap();
    let paths = collection(images.path());
    assert_eq!(paths.len(), 5);

    let hash = hasher(HashMethod::Phash);
    let result = compute_all(&paths, hash.as_ref(), &config()).unwrap();

    assert_eq!(result.len(), 5);
    let failed: Vec<&PathBuf> = result
        .iter()
        .filter(|(_, v)| v.is_failed())
        .map(|(p, _)| p)
        .collect();
    assert_eq!(failed, vec![&images.path().join("e.png")]);
    assert!(result.values().all(|v| v.bits() == 64));
}

#[test]
fn test_compute_all_interrupted() {
    let images = TempDir::new().unwrap();
    let paths = collection(images.path());
    let flag = Arc::new(AtomicBool::new(true));

    let hash = hasher(HashMethod::Phash);
    let result = compute_all(&paths, hash.as_ref(), &config().with_shutdown_flag(flag));
    assert!(matches!(result, Err(CacheError::Interrupted)));
}

#[test]
fn test_dump_then_load_reuses_hashes() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);

    let mut first = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(!first.load(&file, images.path(), &paths).unwrap());
    assert!(first.dump(&file).unwrap());
    set_mtime(&file, 60);

    let mut second = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(second.load(&file, images.path(), &paths).unwrap());
    assert_eq!(second.entries(), first.entries());
}

#[test]
fn test_newer_image_invalidates_cache() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    cache.load(&file, images.path(), &paths).unwrap();
    cache.dump(&file).unwrap();
    set_mtime(&file, 60);
    set_mtime(&images.path().join("c.png"), 120);

    let mut reloaded = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(!reloaded.load(&file, images.path(), &paths).unwrap());
    assert_eq!(reloaded.len(), 5);
}

#[test]
fn test_method_mismatch_recomputes() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);

    let mut phash = HashCache::new(hasher(HashMethod::Phash), config());
    phash.load(&file, images.path(), &paths).unwrap();
    phash.dump(&file).unwrap();
    set_mtime(&file, 60);

    // Same file name on purpose: only the header tells the two apart
    let mut dhash = HashCache::new(hasher(HashMethod::Dhash), config());
    assert!(!dhash.load(&file, images.path(), &paths).unwrap());
}

#[test]
fn test_size_mismatch_recomputes() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let mut paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    cache.load(&file, images.path(), &paths).unwrap();
    cache.dump(&file).unwrap();
    set_mtime(&file, 60);

    paths.pop();
    let mut reloaded = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(!reloaded.load(&file, images.path(), &paths).unwrap());
    assert_eq!(reloaded.len(), 4);
}

#[test]
fn test_corrupted_cache_is_fatal() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);
    fs::write(&file, b"garbage").unwrap();
    set_mtime(&file, 60);

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    let result = cache.load(&file, images.path(), &paths);
    assert!(matches!(result, Err(CacheError::Corrupted { .. })));
}

#[test]
fn test_disabled_cache_never_touches_disk() {
    let images = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let paths = collection(images.path());
    let file = cache_path(caches.path(), images.path(), 64);

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config().with_enabled(false));
    assert!(!cache.load(&file, images.path(), &paths).unwrap());
    assert!(!cache.dump(&file).unwrap());
    assert!(!file.exists());
}

#[test]
fn test_incremental_update_matches_full_recompute() {
    let images = TempDir::new().unwrap();
    let paths = collection(images.path());

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    cache.compute(&paths).unwrap();

    fs::remove_file(images.path().join("b.png")).unwrap();
    write_png(images.path(), "f.png", Pattern::VerticalGradient);
    let current = Walker::new(images.path(), WalkerConfig::default())
        .collect_images()
        .unwrap();

    assert!(cache.update_incremental(&current).unwrap());
    assert!(!cache.update_incremental(&current).unwrap());

    let hash = hasher(HashMethod::Phash);
    let full = compute_all(&current, hash.as_ref(), &config()).unwrap();
    assert_eq!(cache.entries(), &full);
}

#[test]
fn test_cache_from_another_directory_is_not_reused() {
    let root = TempDir::new().unwrap();
    let caches = TempDir::new().unwrap();
    let first = root.path().join("first");
    let second = root.path().join("second");
    write_png(&first, "x.png", Pattern::HorizontalGradient);
    write_png(&first, "y.png", Pattern::Checkerboard);
    write_png(&second, "x.png", Pattern::VerticalGradient);
    write_png(&second, "y.png", Pattern::Diagonal);
    let first = fs::canonicalize(first).unwrap();
    let second = fs::canonicalize(second).unwrap();

    // One file name for both directories, as when two runs are started with the same relative path
    let file = caches.path().join("hash_cache_exact_._phash_64.json.zst");

    let first_paths = Walker::new(&first, WalkerConfig::default()).collect_images().unwrap();
    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    cache.load(&file, &first, &first_paths).unwrap();
    cache.dump(&file).unwrap();
    set_mtime(&file, 60);

    let second_paths = Walker::new(&second, WalkerConfig::default()).collect_images().unwrap();
    assert_eq!(second_paths.len(), first_paths.len());
    let mut reloaded = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(!reloaded.load(&file, &second, &second_paths).unwrap());
    assert_eq!(reloaded.target(), second.as_path());

    let hash = hasher(HashMethod::Phash);
    let fresh = compute_all(&second_paths, hash.as_ref(), &config()).unwrap();
    assert_eq!(reloaded.entries(), &fresh);
    assert!(reloaded.entries().keys().all(|p| p.starts_with(&second)));
}

#[test]
fn test_cache_names_differ_for_canonical_targets() {
    let root = TempDir::new().unwrap();
    let first = root.path().join("first");
    let second = root.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();

    let first = fs::canonicalize(first).unwrap();
    let second = fs::canonicalize(second).unwrap();
    assert_ne!(
        cache_path(Path::new("cache"), &first, 64),
        cache_path(Path::new("cache"), &second, 64)
    );
}

#[test]
fn test_cache_dir_inside_target_stays_fresh() {
    let images = TempDir::new().unwrap();
    let target = fs::canonicalize(images.path()).unwrap();
    let paths = collection(&target);
    let file = target.join(".cache").join("hashes.json.zst");

    let mut cache = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(!cache.load(&file, &target, &paths).unwrap());
    cache.dump(&file).unwrap();

    // The rename leaves the cache directory at least as new as the cache file
    for path in &paths {
        backdate(path, 120);
    }
    backdate(&target, 120);

    let mut reloaded = HashCache::new(hasher(HashMethod::Phash), config());
    assert!(reloaded.load(&file, &target, &paths).unwrap());
    assert_eq!(reloaded.entries(), cache.entries());
}
