use super::fixtures::{write_corrupt, write_png, Pattern};
use imgdupes::actions::canonicalize_groups;
use imgdupes::cache::{compute_all, CacheConfig};
use imgdupes::duplicates::{
    Backend, GroupTable, GroupingConfig, GroupingEngine, GroupingError, Strategy,
};
use imgdupes::error::ExitCode;
use imgdupes::scanner::{
    BitVector, HashFunction, HashMethod, HashVector, PerceptualHasher, Walker, WalkerConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn engine(threshold: u32, strategy: Strategy) -> GroupingEngine {
    GroupingEngine::new(
        GroupingConfig::default()
            .with_threshold(threshold)
            .with_strategy(strategy),
    )
}

fn vectors(bits: &[&str]) -> Vec<HashVector> {
    bits.iter()
        .map(|s| HashVector::Valid(s.parse::<BitVector>().unwrap()))
        .collect()
}

fn names(n: usize) -> Vec<PathBuf> {
    (0..n).map(|i| PathBuf::from(format!("{i}.png"))).collect()
}

/// Three pictures, two of them with a byte-identical copy elsewhere.
fn photo_library(dir: &Path) -> (Vec<PathBuf>, Vec<HashVector>) {
    let a = write_png(dir, "a.png", Pattern::HorizontalGradient);
    write_png(dir, "b.png", Pattern::Checkerboard);
    write_png(dir, "c.png", Pattern::VerticalGradient);
    fs::create_dir_all(dir.join("copies")).unwrap();
    fs::copy(&a, dir.join("copies/a2.png")).unwrap();
    fs::copy(dir.join("c.png"), dir.join("copies/c2.png")).unwrap();
    write_corrupt(dir, "broken.png");
    write_corrupt(dir, "broken2.png");

    let config = WalkerConfig {
        recursive: true,
        ..WalkerConfig::default()
    };
    let paths = Walker::new(dir, config).collect_images().unwrap();
    let hasher = PerceptualHasher::new(HashMethod::Phash, 8).unwrap();
    let mut hashes = compute_all(&paths, &hasher, &CacheConfig::default()).unwrap();
    let vectors = paths.iter().map(|p| hashes.remove(p).unwrap()).collect();
    (paths, vectors)
}

#[test]
fn test_copies_group_on_every_backend() {
    let dir = TempDir::new().unwrap();
    let (paths, vectors) = photo_library(dir.path());
    let root = dir.path();

    let expected = GroupTable::from_groups(vec![
        vec![root.join("a.png"), root.join("copies/a2.png")],
        vec![root.join("c.png"), root.join("copies/c2.png")],
    ]);

    for backend in Backend::ALL {
        let groups = engine(0, Strategy::for_backend(backend))
            .group(&paths, &vectors)
            .unwrap();
        assert_eq!(canonicalize_groups(groups), expected, "backend {backend:?}");
    }
}

#[test]
fn test_failed_images_never_group() {
    let dir = TempDir::new().unwrap();
    let (paths, vectors) = photo_library(dir.path());

    let groups = engine(64, Strategy::Exact).group(&paths, &vectors).unwrap();
    for (_, members) in groups.iter() {
        assert!(members.iter().all(|p| !p.ends_with("broken.png")));
        assert!(members.iter().all(|p| !p.ends_with("broken2.png")));
    }
}

#[test]
fn test_transitive_chain_merges() {
    let groups = engine(1, Strategy::Exact)
        .group(&names(4), &vectors(&["0000", "0001", "0011", "1111"]))
        .unwrap();
    assert_eq!(groups.duplicate_set_count(), 1);
    assert_eq!(groups.get(1).unwrap().len(), 3);
}

#[test]
fn test_threshold_zero_only_identical() {
    let groups = engine(0, Strategy::Exact)
        .group(&names(4), &vectors(&["1010", "1010", "1011", "0101"]))
        .unwrap();
    assert_eq!(
        groups.into_groups(),
        vec![vec![PathBuf::from("0.png"), PathBuf::from("1.png")]]
    );
}

#[test]
fn test_canonical_output_ignores_input_order() {
    let bits = ["0000", "1111", "0001", "1110", "0110", "0000"];
    let paths = names(bits.len());
    let vecs = vectors(&bits);

    let forward = canonicalize_groups(engine(1, Strategy::Exact).group(&paths, &vecs).unwrap());

    let mut order: Vec<usize> = (0..bits.len()).collect();
    order.reverse();
    order.swap(1, 3);
    let shuffled_paths: Vec<PathBuf> = order.iter().map(|&i| paths[i].clone()).collect();
    let shuffled_vecs: Vec<HashVector> = order.iter().map(|&i| vecs[i].clone()).collect();
    let shuffled = canonicalize_groups(
        engine(1, Strategy::Exact)
            .group(&shuffled_paths, &shuffled_vecs)
            .unwrap(),
    );

    assert_eq!(forward, shuffled);
}

#[test]
fn test_parallel_queries_match_sequential() {
    let bits = [
        "00000000", "00000001", "00000011", "11110000", "11110001", "10101010", "10101011",
        "01010101",
    ];
    let paths = names(bits.len());
    let vecs = vectors(&bits);

    for backend in [Backend::BkTree, Backend::Mih] {
        let run = |threads: usize| {
            let strategy = match Strategy::for_backend(backend) {
                Strategy::Approximate {
                    backend, k, params, ..
                } => Strategy::Approximate {
                    backend,
                    k,
                    params,
                    query_threads: threads,
                },
                Strategy::Exact => Strategy::Exact,
            };
            engine(1, strategy).group(&paths, &vecs).unwrap()
        };
        assert_eq!(run(1), run(4), "backend {backend:?}");
    }
}

#[test]
fn test_unknown_backend_maps_to_exit_code_3() {
    let err = "ngt".parse::<Backend>().unwrap_err();
    match &err {
        GroupingError::BackendUnavailable { name, available, .. } => {
            assert_eq!(name, "ngt");
            assert!(available.contains("exact"));
            assert!(available.contains("mih"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let err = anyhow::Error::new(err);
    assert_eq!(ExitCode::for_error(&err), ExitCode::BackendUnavailable);
}

#[test]
fn test_grouping_interrupted() {
    let flag = Arc::new(AtomicBool::new(true));
    let engine = GroupingEngine::new(GroupingConfig::default().with_shutdown_flag(flag));
    let result = engine.group(&names(3), &vectors(&["00", "00", "01"]));
    assert!(matches!(result, Err(GroupingError::Interrupted)));
}

#[test]
fn test_query_finds_copies_of_external_image() {
    let dir = TempDir::new().unwrap();
    let (paths, vectors) = photo_library(dir.path());

    let outside = TempDir::new().unwrap();
    let query = write_png(outside.path(), "needle.png", Pattern::HorizontalGradient);
    let hasher = PerceptualHasher::new(HashMethod::Phash, 8).unwrap();
    let needle = HashVector::Valid(hasher.hash_image(&query).unwrap());

    let matches = engine(0, Strategy::Exact)
        .query(&query, &needle, &paths, &vectors)
        .unwrap();
    let found: Vec<PathBuf> = matches.iter().map(|m| m.path.clone()).collect();
    assert_eq!(
        found,
        vec![dir.path().join("a.png"), dir.path().join("copies/a2.png")]
    );
    assert!(matches.iter().all(|m| m.distance == 0));
}
