//! Command-line interface definitions for imgdupes.
//!
//! Every option that also exists in the configuration file is optional here,
//! so that an absent flag leaves the configured value alone.
//!
//! # Example
//!
//! ```bash
//! # Print near-duplicate groups (pHash, distance 4)
//! imgdupes -r ~/Pictures
//!
//! # dHash, distance 0, then decide interactively what to delete
//! imgdupes -r --delete --run ~/Pictures dhash 0
//!
//! # Large collection through a neighbor index
//! imgdupes -r --backend mih --query-threads 8 ~/Pictures
//!
//! # Which pictures look like this one?
//! imgdupes -r --query ~/Downloads/photo.jpg ~/Pictures
//! ```

use std::path::PathBuf;

use clap::Parser;

use crate::actions::SortCriterion;
use crate::output::OutputFormat;
use crate::scanner::HashMethod;

/// Find and remove near-duplicate images by perceptual hash.
///
/// Images whose hashes differ in at most HAMMING_DISTANCE bits are linked,
/// and linked images form a duplicate set. With an index backend (bktree,
/// mih) some pairs within the distance may be missed on very large
/// collections; the exact backend never misses a pair.
#[derive(Debug, Parser)]
#[command(name = "imgdupes")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to search for images
    #[arg(value_name = "TARGET_DIR")]
    pub target_dir: PathBuf,

    /// Perceptual hash method
    #[arg(value_name = "HASH_METHOD", value_enum)]
    pub hash_method: Option<HashMethod>,

    /// Maximum Hamming distance between duplicates (default depends on the method)
    #[arg(value_name = "HAMMING_DISTANCE")]
    pub hamming_distance: Option<u32>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Search subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Review each duplicate set and choose files to delete
    #[arg(short, long)]
    pub delete: bool,

    /// Actually delete files (without it, deletion is a dry run)
    #[arg(long, requires = "delete")]
    pub run: bool,

    /// Move deleted files to the trash instead of removing them
    #[arg(long)]
    pub trash: bool,

    /// Keep the first file of each sorted set without asking
    #[arg(short = 'N', long, requires = "delete")]
    pub no_prompt: bool,

    /// Order of files within a set
    #[arg(long, value_enum)]
    pub sort: Option<SortCriterion>,

    /// Reverse the sort order
    #[arg(long)]
    pub reverse: bool,

    /// Warn when a set spans several directories
    #[arg(long)]
    pub print_warning: bool,

    /// Write duplicate-set and delete logs
    #[arg(long)]
    pub log: bool,

    /// Print each duplicate set on one line
    #[arg(long)]
    pub same_line: bool,

    /// Output format for printed duplicate sets
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Hash side length; the hash has HASH_SIZE² bits
    #[arg(long, value_name = "N")]
    pub hash_size: Option<u32>,

    /// Neighbor search backend: exact, bktree or mih
    #[arg(long, value_name = "NAME")]
    pub backend: Option<String>,

    /// Neighbors requested per image from an index backend
    #[arg(long, value_name = "K")]
    pub ann_k: Option<usize>,

    /// Per-chunk probe radius of the mih backend
    #[arg(long, value_name = "BITS")]
    pub search_radius: Option<u32>,

    /// Threads used to build a neighbor index
    #[arg(long, value_name = "N")]
    pub build_threads: Option<usize>,

    /// Threads used to query a neighbor index
    #[arg(long, value_name = "N")]
    pub query_threads: Option<usize>,

    /// Threads used for hashing (default: available cores minus one)
    #[arg(long, value_name = "N")]
    pub hash_threads: Option<usize>,

    /// Do not read or write the hash cache
    #[arg(long)]
    pub no_cache: bool,

    /// Directory for hash cache files
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for log files (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Find images similar to IMAGE instead of grouping the collection
    #[arg(long, value_name = "IMAGE", conflicts_with = "delete")]
    pub query: Option<PathBuf>,

    /// Configuration file (default: the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}
