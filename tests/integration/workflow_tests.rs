use super::fixtures::{write_png, write_png_sized, Pattern};
use clap::Parser;
use imgdupes::actions::{
    Completion, DeleteConfig, KeepFirst, PreservePrompt, PreserveWorkflow, SortCriterion,
    WorkflowConfig,
};
use imgdupes::cache::sanitize_target;
use imgdupes::cli::Cli;
use imgdupes::duplicates::GroupTable;
use imgdupes::error::ExitCode;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn workflow(run: bool, sort: SortCriterion) -> PreserveWorkflow {
    PreserveWorkflow::new(WorkflowConfig {
        sort,
        run,
        delete: DeleteConfig::permanent(),
        ..WorkflowConfig::default()
    })
}

/// One group of three sizes of the same picture, largest last by name.
fn sized_group(dir: &Path) -> GroupTable {
    let small = write_png_sized(dir, "1_small.png", Pattern::Diagonal, 16, 16);
    let medium = write_png_sized(dir, "2_medium.png", Pattern::Diagonal, 64, 64);
    let large = write_png_sized(dir, "3_large.png", Pattern::Diagonal, 256, 256);
    GroupTable::from_groups(vec![vec![small, medium, large]])
}

#[test]
fn test_dry_run_deletes_nothing() {
    let dir = TempDir::new().unwrap();
    let groups = sized_group(dir.path());
    let mut out = Vec::new();

    let report = workflow(false, SortCriterion::Size)
        .run(&groups, &mut KeepFirst, &mut out)
        .unwrap();

    assert_eq!(report.completion, Completion::Finished);
    assert_eq!(report.delete_candidates.len(), 2);
    assert!(report.deleted_paths().is_empty());
    assert!(report.delete_candidates.iter().all(|p| p.exists()));
    assert!(report.summary().contains("dry run"));
}

#[test]
fn test_keep_first_keeps_largest_file() {
    let dir = TempDir::new().unwrap();
    let groups = sized_group(dir.path());
    let mut out = Vec::new();

    let report = workflow(true, SortCriterion::Size)
        .run(&groups, &mut KeepFirst, &mut out)
        .unwrap();

    assert!(dir.path().join("3_large.png").exists());
    assert!(!dir.path().join("1_small.png").exists());
    assert!(!dir.path().join("2_medium.png").exists());
    assert_eq!(report.deletions.success_count(), 2);

    let listing = String::from_utf8(out).unwrap();
    assert!(listing.contains("256x256"));
    assert!(listing.contains("Set 1 of 1, "));
    assert!(listing.contains("   [+] "));
}

#[test]
fn test_interactive_answers_with_reprompt() {
    let dir = TempDir::new().unwrap();
    let groups = sized_group(dir.path());
    let mut prompt = PreservePrompt::new(Cursor::new("seven\n1,3\n"), Vec::new());
    let mut out = Vec::new();

    let report = workflow(true, SortCriterion::Path)
        .run(&groups, &mut prompt, &mut out)
        .unwrap();

    assert_eq!(report.completion, Completion::Finished);
    assert!(dir.path().join("1_small.png").exists());
    assert!(!dir.path().join("2_medium.png").exists());
    assert!(dir.path().join("3_large.png").exists());

    let (_, written) = prompt.into_inner();
    let written = String::from_utf8(written).unwrap();
    assert_eq!(written.matches("preserve files [1 - 3, all, none]: ").count(), 2);
}

#[test]
fn test_end_of_input_stops_workflow() {
    let dir = TempDir::new().unwrap();
    let groups = sized_group(dir.path());
    let mut prompt = PreservePrompt::new(Cursor::new(""), Vec::new());
    let mut out = Vec::new();

    let report = workflow(true, SortCriterion::Size)
        .run(&groups, &mut prompt, &mut out)
        .unwrap();

    assert_eq!(report.completion, Completion::EndOfInput);
    assert_eq!(report.groups_decided, 0);
    assert!(report.delete_candidates.is_empty());
}

#[test]
fn test_already_deleted_file_is_tolerated() {
    let dir = TempDir::new().unwrap();
    let groups = sized_group(dir.path());
    fs::remove_file(dir.path().join("1_small.png")).unwrap();
    let mut out = Vec::new();

    let report = workflow(true, SortCriterion::Size)
        .run(&groups, &mut KeepFirst, &mut out)
        .unwrap();

    assert_eq!(report.completion, Completion::Finished);
    assert_eq!(report.deletions.success_count(), 1);
    assert_eq!(report.deletions.missing.len(), 1);
    assert!(report.deletions.failures.is_empty());
}

fn run_cli(args: &[&str]) -> ExitCode {
    let mut argv = vec!["imgdupes", "--quiet"];
    argv.extend_from_slice(args);
    imgdupes::run_app(Cli::try_parse_from(argv).unwrap()).unwrap()
}

fn library(dir: &Path) -> PathBuf {
    let root = dir.join("pictures");
    write_png(&root, "a.png", Pattern::HorizontalGradient);
    write_png(&root, "b.png", Pattern::Checkerboard);
    write_png(&root, "nested/a_copy.png", Pattern::HorizontalGradient);
    root
}

#[test]
fn test_run_app_prints_and_reports_duplicates() {
    let dir = TempDir::new().unwrap();
    let root = library(dir.path());
    let cache_dir = dir.path().join("cache");
    let target = root.to_str().unwrap();

    let code = run_cli(&["-r", "--cache-dir", cache_dir.to_str().unwrap(), target, "phash", "0"]);
    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

    let code = run_cli(&["--no-cache", target, "phash", "0"]);
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_run_app_names_cache_after_canonical_target() {
    let dir = TempDir::new().unwrap();
    let root = library(dir.path());
    let cache_dir = dir.path().join("cache");
    let roundabout = root.join("nested").join("..");

    let code = run_cli(&[
        "-r",
        "--cache-dir",
        cache_dir.to_str().unwrap(),
        roundabout.to_str().unwrap(),
        "phash",
        "0",
    ]);
    assert_eq!(code, ExitCode::Success);

    let canonical = fs::canonicalize(&root).unwrap();
    let names: Vec<String> = fs::read_dir(&cache_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![format!("hash_cache_exact_{}_phash_64.json.zst", sanitize_target(&canonical))]
    );
}

#[test]
fn test_run_app_deletes_and_logs() {
    let dir = TempDir::new().unwrap();
    let root = library(dir.path());
    let logs = dir.path().join("logs");

    let code = run_cli(&[
        "-r",
        "-d",
        "--run",
        "-N",
        "--sort",
        "path",
        "--log",
        "--no-cache",
        "--log-dir",
        logs.to_str().unwrap(),
        root.to_str().unwrap(),
        "phash",
        "0",
    ]);

    assert_eq!(code, ExitCode::Success);
    assert!(root.join("a.png").exists());
    assert!(!root.join("nested/a_copy.png").exists());
    assert!(root.join("b.png").exists());

    let logged: Vec<String> = fs::read_dir(&logs)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(logged.iter().any(|n| n.contains("_dup_exact_")));
    assert!(logged.iter().any(|n| n.contains("_del_exact_")));
}

#[test]
fn test_run_app_unknown_backend() {
    let dir = TempDir::new().unwrap();
    let root = library(dir.path());
    let cli = Cli::try_parse_from([
        "imgdupes",
        "--quiet",
        "--backend",
        "hnsw",
        root.to_str().unwrap(),
    ])
    .unwrap();

    let err = imgdupes::run_app(cli).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::BackendUnavailable);
}
