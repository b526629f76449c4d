//! Nearest-neighbor indexes over hash vectors.
//!
//! The approximate grouping strategy asks an index for the nearest
//! neighbors of each vector instead of comparing every pair. Two backends
//! ship with the crate:
//!
//! - [`BkTreeIndex`]: a BK-tree under Hamming distance. Radius search is
//!   exact; only the `k` cap can drop neighbors.
//! - [`MihIndex`]: multi-index hashing. Vectors are split into byte chunks
//!   and bucketed per chunk; a query probes every bucket within
//!   `search_radius` bits of its own chunk values. A neighbor whose
//!   differing bits are spread over every chunk can be missed, so recall is
//!   not guaranteed.
//!
//! Ids returned by an index are positions in the slice it was built from.
//! Failed vectors are never inserted.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bk_tree::{BKTree, Metric};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::GroupingError;
use crate::scanner::{BitVector, HashVector};

/// One neighbor returned by an index query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Neighbor {
    /// Hamming distance to the query
    pub distance: u32,
    /// Position of the neighbor in the indexed slice
    pub id: usize,
}

/// A searchable collection of hash vectors.
pub trait NeighborIndex: Send + Sync {
    /// Backend that built this index.
    fn backend(&self) -> Backend;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` nearest indexed vectors within `max_distance` of `query`.
    ///
    /// Results are sorted by distance, then id. The query itself is included
    /// if it was indexed.
    fn query(&self, query: &BitVector, k: usize, max_distance: u32) -> Vec<Neighbor>;
}

/// Neighbor search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// No index: compare every pair.
    #[default]
    Exact,
    /// BK-tree radius search.
    BkTree,
    /// Multi-index hashing.
    Mih,
}

impl Backend {
    /// Every available backend.
    pub const ALL: [Backend; 3] = [Backend::Exact, Backend::BkTree, Backend::Mih];

    /// Configuration name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::BkTree => "bktree",
            Self::Mih => "mih",
        }
    }

    /// Whether grouping with this backend goes through a neighbor index.
    #[must_use]
    pub fn uses_index(&self) -> bool {
        !matches!(self, Self::Exact)
    }

    /// Comma-separated list of backend names.
    #[must_use]
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(Backend::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Build an index of this backend over `vectors`.
    ///
    /// # Errors
    ///
    /// - [`GroupingError::NoIndex`] for [`Backend::Exact`]
    /// - [`GroupingError::InconsistentLength`] if valid vectors differ in length
    /// - [`GroupingError::ThreadPool`] if the build pool cannot be created
    pub fn build(
        &self,
        vectors: &[HashVector],
        params: &IndexParams,
    ) -> Result<Box<dyn NeighborIndex>, GroupingError> {
        match self {
            Self::Exact => Err(GroupingError::NoIndex),
            Self::BkTree => Ok(Box::new(BkTreeIndex::build(vectors))),
            Self::Mih => Ok(Box::new(MihIndex::build(vectors, params)?)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = GroupingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "exact" | "brute" => Ok(Self::Exact),
            "bktree" | "bk-tree" => Ok(Self::BkTree),
            "mih" => Ok(Self::Mih),
            _ => {
                let suggestion = Self::ALL
                    .iter()
                    .map(|b| (strsim::levenshtein(&normalized, b.as_str()), b.as_str()))
                    .filter(|(d, _)| *d <= 2)
                    .min()
                    .map(|(_, name)| name.to_string());
                Err(GroupingError::BackendUnavailable {
                    name: s.to_string(),
                    available: Self::available(),
                    suggestion,
                })
            }
        }
    }
}

/// Index construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    /// Threads used while building
    pub build_threads: usize,
    /// Per-chunk probe radius for [`MihIndex`]
    pub search_radius: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            build_threads: 1,
            search_radius: 1,
        }
    }
}

/// Keep the `k` closest of `neighbors` in (distance, id) order.
fn nearest(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_unstable();
    neighbors.truncate(k);
    neighbors
}

/// A distinct vector and every position holding it.
#[derive(Debug, Clone)]
struct IndexedVector {
    ids: Vec<usize>,
    vector: BitVector,
}

/// Hamming distance over [`IndexedVector`]s; ids do not participate.
#[derive(Debug, Default, Clone, Copy)]
struct IndexedHamming;

impl Metric<IndexedVector> for IndexedHamming {
    fn distance(&self, a: &IndexedVector, b: &IndexedVector) -> u32 {
        a.vector.hamming(&b.vector)
    }

    fn threshold_distance(
        &self,
        a: &IndexedVector,
        b: &IndexedVector,
        threshold: u32,
    ) -> Option<u32> {
        let d = self.distance(a, b);
        if d <= threshold {
            Some(d)
        } else {
            None
        }
    }
}

/// BK-tree over the valid vectors of a slice.
pub struct BkTreeIndex {
    tree: BKTree<IndexedVector, IndexedHamming>,
    count: usize,
}

impl BkTreeIndex {
    /// Insert every valid vector of `vectors`.
    ///
    /// Identical vectors share one tree node.
    #[must_use]
    pub fn build(vectors: &[HashVector]) -> Self {
        let mut slots: HashMap<&BitVector, usize> = HashMap::new();
        let mut distinct: Vec<IndexedVector> = Vec::new();
        let mut count = 0;
        for (id, vector) in vectors.iter().enumerate() {
            let Some(valid) = vector.as_valid() else { continue };
            count += 1;
            match slots.get(valid) {
                Some(&slot) => distinct[slot].ids.push(id),
                None => {
                    slots.insert(valid, distinct.len());
                    distinct.push(IndexedVector {
                        ids: vec![id],
                        vector: valid.clone(),
                    });
                }
            }
        }

        let nodes = distinct.len();
        let mut tree = BKTree::new(IndexedHamming);
        for item in distinct {
            tree.add(item);
        }
        log::debug!("Built BK-tree over {} vectors ({} distinct)", count, nodes);
        Self { tree, count }
    }
}

impl NeighborIndex for BkTreeIndex {
    fn backend(&self) -> Backend {
        Backend::BkTree
    }

    fn len(&self) -> usize {
        self.count
    }

    fn query(&self, query: &BitVector, k: usize, max_distance: u32) -> Vec<Neighbor> {
        let probe = IndexedVector {
            ids: Vec::new(),
            vector: query.clone(),
        };
        let found = self
            .tree
            .find(&probe, max_distance)
            .flat_map(|(distance, item)| {
                item.ids.iter().map(move |&id| Neighbor { distance, id })
            })
            .collect();
        nearest(found, k)
    }
}

/// Number of distinct values of one chunk.
const BUCKETS_PER_CHUNK: usize = 256;

/// Multi-index hashing over byte chunks, stored in CSR layout.
///
/// `offsets[c * 256 + v]..offsets[c * 256 + v + 1]` is the range of
/// `members` holding the ids whose chunk `c` equals `v`.
pub struct MihIndex {
    vectors: Vec<Option<BitVector>>,
    chunks: usize,
    offsets: Vec<u32>,
    members: Vec<u32>,
    search_radius: u32,
    count: usize,
}

impl MihIndex {
    /// Bucket every valid vector of `vectors`.
    ///
    /// # Errors
    ///
    /// - [`GroupingError::InconsistentLength`] if valid vectors differ in length
    /// - [`GroupingError::ThreadPool`] if the build pool cannot be created
    pub fn build(vectors: &[HashVector], params: &IndexParams) -> Result<Self, GroupingError> {
        let mut expected: Option<u32> = None;
        for vector in vectors.iter().filter_map(HashVector::as_valid) {
            match expected {
                None => expected = Some(vector.len()),
                Some(bits) if bits != vector.len() => {
                    return Err(GroupingError::InconsistentLength {
                        expected: bits,
                        found: vector.len(),
                    })
                }
                Some(_) => {}
            }
        }
        let chunks = expected.map_or(0, |bits| bits.div_ceil(8) as usize);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.build_threads.max(1))
            .build()?;
        let keys: Vec<Option<Vec<usize>>> = pool.install(|| {
            vectors
                .par_iter()
                .map(|v| {
                    v.as_valid().map(|valid| {
                        valid
                            .as_bytes()
                            .iter()
                            .enumerate()
                            .map(|(c, &byte)| c * BUCKETS_PER_CHUNK + byte as usize)
                            .collect()
                    })
                })
                .collect()
        });

        let total = chunks * BUCKETS_PER_CHUNK;
        let mut counts = vec![0u32; total];
        for flat in keys.iter().flatten().flatten() {
            counts[*flat] += 1;
        }

        let mut offsets = vec![0u32; total + 1];
        let mut running = 0u32;
        for (slot, count) in counts.iter().enumerate() {
            offsets[slot] = running;
            running += count;
        }
        offsets[total] = running;

        let mut write_pos = offsets.clone();
        let mut members = vec![0u32; running as usize];
        let mut count = 0;
        for (id, key) in keys.iter().enumerate() {
            let Some(key) = key else { continue };
            count += 1;
            for &flat in key {
                members[write_pos[flat] as usize] = id as u32;
                write_pos[flat] += 1;
            }
        }

        log::debug!(
            "Built MIH index over {} vectors ({} chunks, probe radius {})",
            count,
            chunks,
            params.search_radius
        );
        Ok(Self {
            vectors: vectors.iter().map(|v| v.as_valid().cloned()).collect(),
            chunks,
            offsets,
            members,
            search_radius: params.search_radius,
            count,
        })
    }

    fn bucket(&self, chunk: usize, value: usize) -> &[u32] {
        let slot = chunk * BUCKETS_PER_CHUNK + value;
        let start = self.offsets[slot] as usize;
        let end = self.offsets[slot + 1] as usize;
        &self.members[start..end]
    }
}

impl NeighborIndex for MihIndex {
    fn backend(&self) -> Backend {
        Backend::Mih
    }

    fn len(&self) -> usize {
        self.count
    }

    fn query(&self, query: &BitVector, k: usize, max_distance: u32) -> Vec<Neighbor> {
        if query.as_bytes().len() != self.chunks {
            return Vec::new();
        }

        let mut seen = vec![false; self.vectors.len()];
        let mut found = Vec::new();
        for (chunk, &byte) in query.as_bytes().iter().enumerate() {
            for value in 0..BUCKETS_PER_CHUNK {
                if ((value as u8) ^ byte).count_ones() > self.search_radius {
                    continue;
                }
                for &id in self.bucket(chunk, value) {
                    let id = id as usize;
                    if std::mem::replace(&mut seen[id], true) {
                        continue;
                    }
                    if let Some(candidate) = &self.vectors[id] {
                        let distance = candidate.hamming(query);
                        if distance <= max_distance {
                            found.push(Neighbor { distance, id });
                        }
                    }
                }
            }
        }
        nearest(found, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(bits: &[&str]) -> Vec<HashVector> {
        bits.iter()
            .map(|s| HashVector::from(s.parse::<BitVector>().unwrap()))
            .collect()
    }

    fn ids(neighbors: &[Neighbor]) -> Vec<usize> {
        neighbors.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("exact".parse::<Backend>().unwrap(), Backend::Exact);
        assert_eq!("BK-Tree".parse::<Backend>().unwrap(), Backend::BkTree);
        assert_eq!(" mih ".parse::<Backend>().unwrap(), Backend::Mih);
    }

    #[test]
    fn test_backend_unavailable_with_suggestion() {
        match "bktre".parse::<Backend>() {
            Err(GroupingError::BackendUnavailable {
                name, suggestion, ..
            }) => {
                assert_eq!(name, "bktre");
                assert_eq!(suggestion.as_deref(), Some("bktree"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_backend_unavailable_without_suggestion() {
        let err = "ngt".parse::<Backend>().unwrap_err();
        match &err {
            GroupingError::BackendUnavailable {
                suggestion,
                available,
                ..
            } => {
                assert!(suggestion.is_none());
                assert_eq!(available, "exact, bktree, mih");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.to_string().contains("ngt"));
    }

    #[test]
    fn test_exact_backend_has_no_index() {
        let result = Backend::Exact.build(&[], &IndexParams::default());
        assert!(matches!(result, Err(GroupingError::NoIndex)));
    }

    #[test]
    fn test_bktree_query() {
        let vs = vectors(&["0000", "0001", "1110", "1111"]);
        let index = BkTreeIndex::build(&vs);
        assert_eq!(index.len(), 4);

        let query = vs[0].as_valid().unwrap();
        let found = index.query(query, 10, 1);
        assert_eq!(ids(&found), vec![0, 1]);
        assert_eq!(found[1].distance, 1);
    }

    #[test]
    fn test_bktree_keeps_identical_vectors() {
        let vs = vectors(&["0101", "0101", "0101"]);
        let index = BkTreeIndex::build(&vs);
        assert_eq!(index.len(), 3);
        let found = index.query(vs[0].as_valid().unwrap(), 10, 0);
        assert_eq!(ids(&found), vec![0, 1, 2]);
    }

    #[test]
    fn test_bktree_respects_k() {
        let vs = vectors(&["0000", "0001", "0010", "0100"]);
        let index = BkTreeIndex::build(&vs);
        let found = index.query(vs[0].as_valid().unwrap(), 2, 4);
        assert_eq!(ids(&found), vec![0, 1]);
    }

    #[test]
    fn test_indexes_skip_failed_vectors() {
        let mut vs = vectors(&["00000000", "00000001"]);
        vs.push(HashVector::failed(8));

        let bk = BkTreeIndex::build(&vs);
        assert_eq!(bk.len(), 2);

        let mih = MihIndex::build(&vs, &IndexParams::default()).unwrap();
        assert_eq!(mih.len(), 2);
        let found = mih.query(vs[0].as_valid().unwrap(), 10, 64);
        assert_eq!(ids(&found), vec![0, 1]);
    }

    #[test]
    fn test_mih_finds_within_probe_radius() {
        let vs = vectors(&[
            "0000000000000000",
            "1000000000000000",
            "1100000010000000",
            "1111111111111111",
        ]);
        let params = IndexParams {
            build_threads: 2,
            search_radius: 1,
        };
        let index = MihIndex::build(&vs, &params).unwrap();

        let found = index.query(vs[0].as_valid().unwrap(), 10, 3);
        assert_eq!(ids(&found), vec![0, 1, 2]);
        assert_eq!(found[2].distance, 3);
    }

    #[test]
    fn test_mih_zero_radius_can_miss() {
        // Differences land in both chunks, so no bucket matches exactly.
        let vs = vectors(&["0000000000000000", "1000000010000000"]);
        let params = IndexParams {
            build_threads: 1,
            search_radius: 0,
        };
        let index = MihIndex::build(&vs, &params).unwrap();
        let found = index.query(vs[0].as_valid().unwrap(), 10, 2);
        assert_eq!(ids(&found), vec![0]);
    }

    #[test]
    fn test_mih_rejects_mixed_lengths() {
        let vs = vectors(&["0000", "00000000"]);
        let result = MihIndex::build(&vs, &IndexParams::default());
        assert!(matches!(
            result,
            Err(GroupingError::InconsistentLength { expected: 4, found: 8 })
        ));
    }
}
