//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config FILE`)
//! 3. `IMGDUPES_*` environment variables, `__` separating nested keys
//!    (`IMGDUPES_ANN__K=50`)
//! 4. command-line flags, applied by [`Config::apply_cli`]

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::SortCriterion;
use crate::cli::Cli;
use crate::scanner::{HashMethod, HASH_SIZE_RANGE};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "IMGDUPES_";

/// Errors from loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be read or did not match the expected shape.
    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be written.
    #[error("Failed to save configuration to {path}: {message}")]
    Save {
        /// Destination file
        path: PathBuf,
        /// What went wrong
        message: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Settings of the neighbor index backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Neighbors requested per image
    pub k: usize,
    /// Per-chunk probe radius (mih only)
    pub search_radius: u32,
    /// Threads used to build an index
    pub build_threads: usize,
    /// Threads used to query an index
    pub query_threads: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            k: 20,
            search_radius: 1,
            build_threads: 1,
            query_threads: 1,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search subdirectories
    pub recursive: bool,
    /// Perceptual hash method
    pub hash_method: HashMethod,
    /// Hash side length
    pub hash_size: u32,
    /// Hamming distance threshold; `None` uses the method's default
    pub hamming_distance: Option<u32>,
    /// Read and write the hash cache
    pub cache: bool,
    /// Where cache files live; `None` uses the platform cache directory
    pub cache_dir: Option<PathBuf>,
    /// Where log files are written; `None` uses the working directory
    pub log_dir: Option<PathBuf>,
    /// Neighbor search backend name
    pub backend: String,
    /// Index backend settings
    pub ann: AnnConfig,
    /// Hashing threads; `None` uses available cores minus one
    pub hash_threads: Option<usize>,
    /// Member ordering within a set
    pub sort: SortCriterion,
    /// Reverse the member ordering
    pub reverse: bool,
    /// Delete for real instead of a dry run
    pub run: bool,
    /// Move to trash instead of removing
    pub trash: bool,
    /// Write duplicate and delete logs
    pub log: bool,
    /// One line per duplicate set
    pub same_line: bool,
    /// Keep the first member of each set without asking
    pub no_prompt: bool,
    /// Warn when a set spans several directories
    pub print_warning: bool,
    /// Suppress progress bars and informational output
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive: false,
            hash_method: HashMethod::default(),
            hash_size: 8,
            hamming_distance: None,
            cache: true,
            cache_dir: None,
            log_dir: None,
            backend: "exact".to_string(),
            ann: AnnConfig::default(),
            hash_threads: None,
            sort: SortCriterion::default(),
            reverse: false,
            run: false,
            trash: false,
            log: false,
            same_line: false,
            no_prompt: false,
            print_warning: false,
            quiet: false,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer cannot be parsed or a value is invalid.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_file.map(Path::to_path_buf).or_else(Self::default_path);
        Self::figment(path.as_deref()).extract::<Self>()?.validated()
    }

    /// The layered provider chain without the CLI layer.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Platform-specific location of `config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "imgdupes").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Save the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Save`] if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let save_err = |message: String| ConfigError::Save {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        fs::write(path, content).map_err(|e| save_err(e.to_string()))
    }

    /// Overlay command-line flags. Boolean flags can only switch a setting on.
    pub fn apply_cli(&mut self, cli: &Cli) {
        self.recursive |= cli.recursive;
        self.reverse |= cli.reverse;
        self.run |= cli.run;
        self.trash |= cli.trash;
        self.log |= cli.log;
        self.same_line |= cli.same_line;
        self.no_prompt |= cli.no_prompt;
        self.print_warning |= cli.print_warning;
        self.quiet |= cli.quiet;
        if cli.no_cache {
            self.cache = false;
        }

        if let Some(method) = cli.hash_method {
            self.hash_method = method;
        }
        if let Some(distance) = cli.hamming_distance {
            self.hamming_distance = Some(distance);
        }
        if let Some(size) = cli.hash_size {
            self.hash_size = size;
        }
        if let Some(sort) = cli.sort {
            self.sort = sort;
        }
        if let Some(backend) = &cli.backend {
            self.backend.clone_from(backend);
        }
        if let Some(k) = cli.ann_k {
            self.ann.k = k;
        }
        if let Some(radius) = cli.search_radius {
            self.ann.search_radius = radius;
        }
        if let Some(threads) = cli.build_threads {
            self.ann.build_threads = threads;
        }
        if let Some(threads) = cli.query_threads {
            self.ann.query_threads = threads;
        }
        if cli.hash_threads.is_some() {
            self.hash_threads = cli.hash_threads;
        }
        if cli.cache_dir.is_some() {
            self.cache_dir.clone_from(&cli.cache_dir);
        }
        if cli.log_dir.is_some() {
            self.log_dir.clone_from(&cli.log_dir);
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !HASH_SIZE_RANGE.contains(&self.hash_size) {
            return Err(ConfigError::Invalid(format!(
                "hash_size must be between {} and {}, got {}",
                HASH_SIZE_RANGE.start(),
                HASH_SIZE_RANGE.end(),
                self.hash_size
            )));
        }
        if self.ann.k == 0 {
            return Err(ConfigError::Invalid("ann.k must be at least 1".to_string()));
        }
        for (name, value) in [
            ("ann.build_threads", self.ann.build_threads),
            ("ann.query_threads", self.ann.query_threads),
            ("hash_threads", self.hash_threads.unwrap_or(1)),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// The effective Hamming distance threshold.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.hamming_distance
            .unwrap_or_else(|| self.hash_method.default_threshold())
    }

    /// The directory cache files are written to.
    ///
    /// Falls back to the working directory when no platform cache directory exists.
    #[must_use]
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(|| ProjectDirs::from("", "", "imgdupes").map(|d| d.cache_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The directory log files are written to.
    #[must_use]
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
