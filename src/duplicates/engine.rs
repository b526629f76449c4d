//! The grouping engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use super::index::{Backend, IndexParams, Neighbor, NeighborIndex};
use super::union_find::DisjointSets;
use super::GroupingError;
use crate::progress::{NoProgress, ProgressCallback, PHASE_GROUPING, PHASE_INDEXING};
use crate::scanner::HashVector;

/// How candidate pairs are found.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Compare every unordered pair `(i, j)`, `i < j`, in index order.
    ///
    /// Quadratic, and never misses a pair within the threshold.
    Exact,
    /// Query a neighbor index for each vector and link the hits.
    ///
    /// Faster on large collections, but only as good as the index: a pair
    /// within the threshold that the index does not return (beyond the `k`
    /// cap, or outside the probed buckets) is not linked. Reduced recall is
    /// an accepted trade-off of this strategy.
    Approximate {
        /// Index backend
        backend: Backend,
        /// Neighbors requested per query, the query itself included
        k: usize,
        /// Index construction parameters
        params: IndexParams,
        /// Threads used for queries
        query_threads: usize,
    },
}

impl Strategy {
    /// Strategy for a backend with default approximate settings.
    #[must_use]
    pub fn for_backend(backend: Backend) -> Self {
        if backend.uses_index() {
            Self::Approximate {
                backend,
                k: 20,
                params: IndexParams::default(),
                query_threads: 1,
            }
        } else {
            Self::Exact
        }
    }

    /// Whether this strategy may miss pairs.
    #[must_use]
    pub fn is_approximate(&self) -> bool {
        matches!(self, Self::Approximate { .. })
    }
}

/// Configuration for [`GroupingEngine`].
#[derive(Clone)]
pub struct GroupingConfig {
    /// Maximum Hamming distance for two images to be linked
    pub threshold: u32,
    /// Pair-finding strategy
    pub strategy: Strategy,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress sink
    pub progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for GroupingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupingConfig")
            .field("threshold", &self.threshold)
            .field("strategy", &self.strategy)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish_non_exhaustive()
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            threshold: 4,
            strategy: Strategy::Exact,
            shutdown_flag: None,
            progress: Arc::new(NoProgress),
        }
    }
}

impl GroupingConfig {
    /// Set the distance threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    fn check_shutdown(&self) -> Result<(), GroupingError> {
        if self
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            Err(GroupingError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Final groups of one run: dense ids from 1, each with two or more members.
///
/// Member and group order carry no meaning here; see
/// [`canonicalize_groups`](crate::actions::canonicalize_groups).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupTable {
    groups: BTreeMap<u32, Vec<PathBuf>>,
}

impl GroupTable {
    /// Build a table from member lists; lists with fewer than two members are dropped.
    #[must_use]
    pub fn from_groups(groups: Vec<Vec<PathBuf>>) -> Self {
        let groups = groups
            .into_iter()
            .filter(|g| g.len() > 1)
            .zip(1u32..)
            .map(|(members, id)| (id, members))
            .collect();
        Self { groups }
    }

    /// Number of duplicate sets.
    #[must_use]
    pub fn duplicate_set_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether no duplicates were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Members of group `id`.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&[PathBuf]> {
        self.groups.get(&id).map(Vec::as_slice)
    }

    /// Groups in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[PathBuf])> {
        self.groups.iter().map(|(id, g)| (*id, g.as_slice()))
    }

    /// Total number of images across all groups.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Member lists in id order.
    #[must_use]
    pub fn into_groups(self) -> Vec<Vec<PathBuf>> {
        self.groups.into_values().collect()
    }
}

/// One corpus image matched by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMatch {
    /// Matched image
    pub path: PathBuf,
    /// Hamming distance to the query
    pub distance: u32,
}

/// Partitions images into duplicate groups.
#[derive(Debug, Clone)]
pub struct GroupingEngine {
    config: GroupingConfig,
}

impl GroupingEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: GroupingConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    /// Group `paths` by their parallel `vectors`.
    ///
    /// # Errors
    ///
    /// - [`GroupingError::LengthMismatch`] if the slices differ in length
    /// - [`GroupingError::Interrupted`] on shutdown
    /// - index construction errors for the approximate strategy
    pub fn group(
        &self,
        paths: &[PathBuf],
        vectors: &[HashVector],
    ) -> Result<GroupTable, GroupingError> {
        if paths.len() != vectors.len() {
            return Err(GroupingError::LengthMismatch {
                paths: paths.len(),
                vectors: vectors.len(),
            });
        }

        let sets = match &self.config.strategy {
            Strategy::Exact => self.link_exact(vectors)?,
            Strategy::Approximate {
                backend,
                k,
                params,
                query_threads,
            } => {
                let index = self.build_index(*backend, vectors, params)?;
                self.link_approximate(vectors, index.as_ref(), *k, *query_threads)?
            }
        };

        let groups: Vec<Vec<PathBuf>> = sets
            .into_groups()
            .into_iter()
            .map(|members| members.into_iter().map(|i| paths[i].clone()).collect())
            .collect();
        let table = GroupTable::from_groups(groups);
        log::info!(
            "Found {} duplicate set(s) covering {} image(s)",
            table.duplicate_set_count(),
            table.member_count()
        );
        Ok(table)
    }

    fn build_index(
        &self,
        backend: Backend,
        vectors: &[HashVector],
        params: &IndexParams,
    ) -> Result<Box<dyn NeighborIndex>, GroupingError> {
        log::info!("Building {} index over {} vectors", backend, vectors.len());
        self.config.progress.on_phase_start(PHASE_INDEXING, 0);
        let index = backend.build(vectors, params);
        self.config.progress.on_phase_end(PHASE_INDEXING);
        index
    }

    fn link_exact(&self, vectors: &[HashVector]) -> Result<DisjointSets, GroupingError> {
        let threshold = self.config.threshold;
        let mut sets = DisjointSets::new(vectors.len());
        self.config
            .progress
            .on_phase_start(PHASE_GROUPING, vectors.len());

        for (i, a) in vectors.iter().enumerate() {
            self.config.check_shutdown()?;
            if !a.is_failed() {
                for (j, b) in vectors.iter().enumerate().skip(i + 1) {
                    if a.matches(b, threshold) {
                        log::trace!("Linked {} and {} (exact)", i, j);
                        sets.union(i, j);
                    }
                }
            }
            self.config.progress.on_progress(i + 1, "");
        }

        self.config.progress.on_phase_end(PHASE_GROUPING);
        Ok(sets)
    }

    fn link_approximate(
        &self,
        vectors: &[HashVector],
        index: &dyn NeighborIndex,
        k: usize,
        query_threads: usize,
    ) -> Result<DisjointSets, GroupingError> {
        let threshold = self.config.threshold;
        let query = |i: usize| -> Vec<Neighbor> {
            vectors[i]
                .as_valid()
                .map(|v| index.query(v, k, threshold))
                .unwrap_or_default()
        };

        self.config
            .progress
            .on_phase_start(PHASE_GROUPING, vectors.len());

        let hits: Vec<Vec<Neighbor>> = if query_threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(query_threads)
                .build()?;
            let shutdown = &self.config;
            let results = pool.install(|| {
                (0..vectors.len())
                    .into_par_iter()
                    .map(|i| {
                        shutdown.check_shutdown()?;
                        Ok(query(i))
                    })
                    .collect::<Result<Vec<_>, GroupingError>>()
            });
            self.config.progress.on_progress(vectors.len(), "");
            results?
        } else {
            let mut hits = Vec::with_capacity(vectors.len());
            for i in 0..vectors.len() {
                self.config.check_shutdown()?;
                hits.push(query(i));
                self.config.progress.on_progress(i + 1, "");
            }
            hits
        };

        // Links are applied in index order so the result does not depend on
        // which query finished first.
        let mut sets = DisjointSets::new(vectors.len());
        for (i, neighbors) in hits.iter().enumerate() {
            for n in neighbors {
                if n.id != i && n.distance <= threshold {
                    log::trace!("Linked {} and {} (distance {})", i, n.id, n.distance);
                    sets.union(i, n.id);
                }
            }
        }

        self.config.progress.on_phase_end(PHASE_GROUPING);
        Ok(sets)
    }

    /// Corpus images within the threshold of a single external image.
    ///
    /// The corpus is only read. `query_path` itself is excluded from the
    /// matches; a failed query vector matches nothing. Results are sorted by
    /// distance, then path.
    ///
    /// # Errors
    ///
    /// - [`GroupingError::LengthMismatch`] if `paths` and `vectors` differ in length
    /// - index construction errors for the approximate strategy
    pub fn query(
        &self,
        query_path: &Path,
        query: &HashVector,
        paths: &[PathBuf],
        vectors: &[HashVector],
    ) -> Result<Vec<QueryMatch>, GroupingError> {
        if paths.len() != vectors.len() {
            return Err(GroupingError::LengthMismatch {
                paths: paths.len(),
                vectors: vectors.len(),
            });
        }
        let Some(needle) = query.as_valid() else {
            log::warn!("Query image {} could not be hashed", query_path.display());
            return Ok(Vec::new());
        };
        let threshold = self.config.threshold;

        let hits: Vec<(usize, u32)> = match &self.config.strategy {
            Strategy::Exact => vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| v.matches(query, threshold))
                .map(|(i, v)| (i, v.distance(query)))
                .collect(),
            Strategy::Approximate {
                backend, k, params, ..
            } => {
                let index = self.build_index(*backend, vectors, params)?;
                index
                    .query(needle, *k, threshold)
                    .into_iter()
                    .map(|n| (n.id, n.distance))
                    .collect()
            }
        };

        let mut matches: Vec<QueryMatch> = hits
            .into_iter()
            .filter(|(i, _)| paths[*i] != query_path)
            .map(|(i, distance)| QueryMatch {
                path: paths[i].clone(),
                distance,
            })
            .collect();
        matches.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.path.cmp(&b.path)));
        Ok(matches)
    }
}
