//! imgdupes - near-duplicate image finder
//!
//! Hashes every image under a directory with a perceptual hash, links images
//! whose hashes are within a Hamming distance of each other, and either
//! prints the resulting duplicate sets or walks through them asking which
//! files to keep.
//!
//! The pipeline, in order:
//!
//! 1. [`scanner`]: enumerate images and compute [`scanner::HashVector`]s
//! 2. [`cache`]: reuse and persist hashes between runs
//! 3. [`duplicates`]: group by distance, exactly or through a neighbor index
//! 4. [`actions`]: order each group, decide what to preserve, delete the rest
//! 5. [`output`]: print groups or query matches

pub mod actions;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use crate::actions::{
    canonicalize_groups, ChannelLines, Completion, DecisionSource, KeepFirst, PreservePrompt,
    PreserveWorkflow, WorkflowReport,
};
use crate::cache::HashCache;
use crate::cli::Cli;
use crate::config::Config;
use crate::context::RunContext;
use crate::duplicates::{Backend, GroupTable, GroupingEngine, IndexParams, Strategy};
use crate::error::ExitCode;
use crate::output::{JsonOutput, JsonQueryOutput, OutputFormat, RunSummary};
use crate::scanner::{HashFunction, HashVector, PerceptualHasher, Walker, WalkerConfig};

/// Run imgdupes with parsed arguments.
///
/// # Errors
///
/// Returns an error for failures that make the result untrustworthy: an
/// unreadable target directory, an unknown backend, a corrupted cache file,
/// or an interrupt during hashing or grouping. Per-image and per-file
/// failures are logged and do not end the run.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let start = Instant::now();

    let interrupt = signal::install_handler().context("Failed to install signal handler")?;

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(&cli);
    config.validate()?;
    log::debug!("Effective configuration: {:?}", config);

    let backend: Backend = config.backend.parse()?;
    let strategy = strategy_for(backend, &config);
    let approximate = strategy.is_approximate();

    let ctx = RunContext::new(config, interrupt);
    let target = std::fs::canonicalize(&cli.target_dir)
        .with_context(|| format!("Cannot open target directory {}", cli.target_dir.display()))?;
    let target = target.as_path();

    let walker_config = WalkerConfig {
        recursive: ctx.config.recursive,
        ..WalkerConfig::default()
    };
    let paths = Walker::new(target, walker_config)
        .with_shutdown_flag(ctx.interrupt.flag())
        .collect_images()
        .with_context(|| format!("Failed to scan {}", target.display()))?;
    log::info!("Found {} image(s) under {}", paths.len(), target.display());

    let hasher: Arc<dyn HashFunction> = Arc::new(PerceptualHasher::new(
        ctx.config.hash_method,
        ctx.config.hash_size,
    )?);

    let names = ctx.run_names(target, approximate);
    let cache_path = ctx
        .config
        .resolved_cache_dir()
        .join(names.cache_file(hasher.bits()));

    let mut cache = HashCache::new(Arc::clone(&hasher), ctx.cache_config());
    let used_cache = cache
        .load(&cache_path, target, &paths)
        .context("Failed to load image hashes")?;
    let changed = used_cache
        && cache
            .update_incremental(&paths)
            .context("Failed to refresh cached hashes")?;
    let vectors = cache.vectors_for(&paths);

    let engine = GroupingEngine::new(ctx.grouping_config(strategy));

    let mut summary = RunSummary {
        total_images: paths.len(),
        failed_images: vectors.iter().filter(|v| v.is_failed()).count(),
        hash_method: ctx.config.hash_method.as_str().to_string(),
        hash_bits: hasher.bits(),
        threshold: ctx.config.threshold(),
        backend: backend.as_str().to_string(),
        used_cache,
        ..RunSummary::default()
    };

    let code = if let Some(query) = cli.query.as_deref() {
        run_query(&engine, hasher.as_ref(), query, &paths, &vectors, cli.output)?
    } else {
        let groups = canonicalize_groups(
            engine
                .group(&paths, &vectors)
                .context("Failed to group images")?,
        );
        summary.duplicate_sets = groups.duplicate_set_count();
        summary.duplicate_images = groups.member_count();
        log::info!(
            "{} duplicate set(s), {} image(s)",
            summary.duplicate_sets,
            summary.duplicate_images
        );

        if cli.delete {
            run_preserve(&ctx, target, approximate, &groups, !cli.no_color)?
        } else {
            let code = if groups.is_empty() {
                ExitCode::NoDuplicates
            } else {
                ExitCode::Success
            };
            summary.duration = start.elapsed();
            print_groups(&groups, &summary, code, ctx.config.same_line, cli.output)?;
            if ctx.config.log {
                write_duplicate_log(&ctx, target, approximate, &groups);
            }
            code
        }
    };

    if !used_cache || changed {
        match cache.dump(&cache_path) {
            Ok(true) => log::debug!("Saved {} hash(es) to {}", cache.len(), cache_path.display()),
            Ok(false) => {}
            Err(e) => log::warn!("Failed to save hash cache: {}", e),
        }
    }

    log::debug!("Finished in {:.2?}", start.elapsed());
    Ok(code)
}

fn strategy_for(backend: Backend, config: &Config) -> Strategy {
    if !backend.uses_index() {
        return Strategy::Exact;
    }
    Strategy::Approximate {
        backend,
        k: config.ann.k,
        params: IndexParams {
            build_threads: config.ann.build_threads,
            search_radius: config.ann.search_radius,
        },
        query_threads: config.ann.query_threads,
    }
}

fn run_query(
    engine: &GroupingEngine,
    hasher: &dyn HashFunction,
    query: &Path,
    paths: &[PathBuf],
    vectors: &[HashVector],
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let needle = match hasher.hash_image(query) {
        Ok(bits) => HashVector::Valid(bits),
        Err(e) => anyhow::bail!("Failed to hash query image {}: {}", query.display(), e),
    };
    let matches = engine
        .query(query, &needle, paths, vectors)
        .context("Failed to search for similar images")?;
    let code = if matches.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    };

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => output::write_query_matches(&matches, &mut stdout)?,
        OutputFormat::Json => {
            let doc = JsonQueryOutput {
                query: query.display().to_string(),
                matches,
            };
            doc.write_to(&mut stdout, true)?;
        }
    }
    Ok(code)
}

fn print_groups(
    groups: &GroupTable,
    summary: &RunSummary,
    code: ExitCode,
    same_line: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => output::write_groups(groups, same_line, &mut stdout)?,
        OutputFormat::Json => JsonOutput::new(groups, summary, code).write_to(&mut stdout, true)?,
    }
    Ok(())
}

fn run_preserve(
    ctx: &RunContext,
    target: &Path,
    approximate: bool,
    groups: &GroupTable,
    color: bool,
) -> anyhow::Result<ExitCode> {
    if groups.is_empty() {
        log::info!("No duplicate images found");
        if ctx.config.log {
            write_duplicate_log(ctx, target, approximate, groups);
        }
        return Ok(ExitCode::NoDuplicates);
    }

    let workflow = PreserveWorkflow::new(ctx.workflow_config(color));
    let mut decider: Box<dyn DecisionSource> = if ctx.config.no_prompt {
        Box::new(KeepFirst)
    } else {
        let answers = ChannelLines::stdin().context("Failed to read answers from stdin")?;
        Box::new(PreservePrompt::new(answers, io::stdout()).with_shutdown_flag(ctx.interrupt.flag()))
    };

    let mut stdout = io::stdout();
    let report = match workflow.run(groups, decider.as_mut(), &mut stdout) {
        Ok(report) => report,
        Err(e) => {
            if ctx.config.log {
                write_duplicate_log(ctx, target, approximate, groups);
                write_delete_log(ctx, target, approximate, e.partial_report());
            }
            return Err(anyhow::Error::new(e).context("Preserve workflow failed"));
        }
    };

    if ctx.config.log {
        write_duplicate_log(ctx, target, approximate, groups);
        write_delete_log(ctx, target, approximate, &report);
    }
    if !ctx.config.quiet {
        if let Err(e) = writeln!(stdout, "{}", report.summary()).and_then(|()| stdout.flush()) {
            log::warn!("Cannot print the summary: {}", e);
        }
    }

    Ok(match report.completion {
        Completion::Interrupted => ExitCode::Interrupted,
        Completion::Finished | Completion::EndOfInput => ExitCode::Success,
    })
}

fn write_duplicate_log(ctx: &RunContext, target: &Path, approximate: bool, groups: &GroupTable) {
    match ctx
        .audit_log(target, approximate)
        .write_duplicates(groups, ctx.config.same_line)
    {
        Ok(Some(path)) => log::info!("Duplicate sets logged to {}", path.display()),
        Ok(None) => {}
        Err(e) => log::warn!("{}", e),
    }
}

fn write_delete_log(ctx: &RunContext, target: &Path, approximate: bool, report: &WorkflowReport) {
    if !report.executed {
        return;
    }
    match ctx
        .audit_log(target, approximate)
        .write_deletions(&report.deleted_paths())
    {
        Ok(Some(path)) => log::info!("Deleted files logged to {}", path.display()),
        Ok(None) => {}
        Err(e) => log::warn!("{}", e),
    }
}
