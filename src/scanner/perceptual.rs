//! Perceptual image hashing for similarity detection.
//!
//! This module defines the bit-vector types the rest of the crate works with
//! and the [`HashFunction`] capability that turns an image into one.
//!
//! * [`BitVector`] - a fixed-length packed sequence of bits.
//! * [`HashVector`] - either a valid [`BitVector`] or the failure sentinel
//!   recorded for images that could not be decoded or hashed.
//! * [`PerceptualHasher`] - the default [`HashFunction`], backed by `image_hasher`.
//!
//! # Sentinel semantics
//!
//! A [`HashVector::Failed`] entry never matches anything, including another
//! failed entry. Its distance to every vector is `u32::MAX`.

use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Supported perceptual hashing algorithms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    /// aHash (Average Hash) - Mean-based, fast but less resilient.
    Ahash,
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    #[default]
    Phash,
    /// dHash (Difference Hash) - Horizontal gradient, very fast and effective.
    Dhash,
    /// Vertical difference hash.
    Vdhash,
}

impl HashMethod {
    /// Suggested Hamming distance threshold for a 64-bit hash of this kind.
    #[must_use]
    pub fn default_threshold(&self) -> u32 {
        match self {
            Self::Phash => 10,
            Self::Dhash | Self::Vdhash => 2,
            Self::Ahash => 5,
        }
    }

    /// Short lowercase name, used in cache and log file names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ahash => "ahash",
            Self::Phash => "phash",
            Self::Dhash => "dhash",
            Self::Vdhash => "vdhash",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ahash => write!(f, "aHash"),
            Self::Phash => write!(f, "pHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Vdhash => write!(f, "vdHash"),
        }
    }
}

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),

    /// The requested hash size is outside [`HASH_SIZE_RANGE`].
    #[error("Hash size must be between 2 and 64, got {0}")]
    InvalidHashSize(u32),

    /// A bit string contained something other than `0` and `1`.
    #[error("Invalid bit string: {0}")]
    InvalidBitString(String),
}

/// A fixed-length packed bit vector.
///
/// Bit `i` lives in byte `i / 8` at position `i % 8` (least significant first).
/// Unused high bits of the final byte are always zero, so equality and
/// Hamming distance only ever see the meaningful bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    bytes: Vec<u8>,
    bits: u32,
}

impl BitVector {
    /// Build a vector from packed bytes, keeping only the first `bits` bits.
    ///
    /// Missing bytes are treated as zero.
    #[must_use]
    pub fn from_bytes(mut bytes: Vec<u8>, bits: u32) -> Self {
        let needed = (bits as usize).div_ceil(8);
        bytes.resize(needed, 0);
        let tail = bits % 8;
        if tail != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= (1u8 << tail) - 1;
            }
        }
        Self { bytes, bits }
    }

    /// Build a vector from individual bits.
    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        Self {
            bytes,
            bits: bits.len() as u32,
        }
    }

    /// Number of bits in the vector.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.bits
    }

    /// Whether the vector has zero bits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Read bit `index`. Out-of-range reads return `false`.
    #[must_use]
    pub fn get(&self, index: u32) -> bool {
        if index >= self.bits {
            return false;
        }
        let i = index as usize;
        self.bytes[i / 8] & (1 << (i % 8)) != 0
    }

    /// Packed representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hamming distance: the number of bit positions that differ.
    ///
    /// Vectors of different lengths are compared over the shorter length and
    /// every extra bit of the longer one counts as a difference.
    #[must_use]
    pub fn hamming(&self, other: &Self) -> u32 {
        if self.bits == other.bits {
            return self
                .bytes
                .iter()
                .zip(&other.bytes)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
        }
        let common = self.bits.min(other.bits);
        let differing = (0..common)
            .filter(|&i| self.get(i) != other.get(i))
            .count() as u32;
        differing + self.bits.abs_diff(other.bits)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.bits {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BitVector {
    type Err = PerceptualError;

    /// Parse a string of `0` and `1` characters, first character = bit 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(PerceptualError::InvalidBitString(s.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_bits(&bits))
    }
}

/// Hash vector stored for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashVector {
    /// Successfully computed hash.
    Valid(BitVector),
    /// Sentinel recorded when hashing failed; never matches anything.
    Failed {
        /// Length the hash would have had.
        bits: u32,
    },
}

impl HashVector {
    /// Sentinel for a failed computation of a `bits`-long hash.
    #[must_use]
    pub fn failed(bits: u32) -> Self {
        Self::Failed { bits }
    }

    /// Whether this is the failure sentinel.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Vector length in bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        match self {
            Self::Valid(v) => v.len(),
            Self::Failed { bits } => *bits,
        }
    }

    /// The underlying bit vector, if hashing succeeded.
    #[must_use]
    pub fn as_valid(&self) -> Option<&BitVector> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Failed { .. } => None,
        }
    }

    /// Hamming distance, or `u32::MAX` when either side is the sentinel.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        match (self, other) {
            (Self::Valid(a), Self::Valid(b)) => a.hamming(b),
            _ => u32::MAX,
        }
    }

    /// Whether two vectors are within `threshold` of each other.
    #[must_use]
    pub fn matches(&self, other: &Self, threshold: u32) -> bool {
        match (self, other) {
            (Self::Valid(a), Self::Valid(b)) => a.hamming(b) <= threshold,
            _ => false,
        }
    }
}

impl From<BitVector> for HashVector {
    fn from(v: BitVector) -> Self {
        Self::Valid(v)
    }
}

/// Capability: image path to fixed-length bit vector.
///
/// Implementations must be shareable across the hashing worker pool.
pub trait HashFunction: Send + Sync {
    /// Hash one image. Errors are per-image and recovered by the caller.
    fn hash_image(&self, path: &Path) -> Result<BitVector, PerceptualError>;

    /// Length of every vector this function produces.
    fn bits(&self) -> u32;

    /// Method name recorded in cache envelopes and file names.
    fn method_name(&self) -> &str;
}

/// Accepted hash sizes; vectors are `hash_size * hash_size` bits long.
pub const HASH_SIZE_RANGE: std::ops::RangeInclusive<u32> = 2..=64;

/// Computes perceptual hashes for images.
pub struct PerceptualHasher {
    hasher: image_hasher::Hasher,
    method: HashMethod,
    hash_size: u32,
}

impl PerceptualHasher {
    /// Create a hasher producing `hash_size * hash_size` bit vectors.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError::InvalidHashSize`] if `hash_size` is outside
    /// [`HASH_SIZE_RANGE`].
    pub fn new(method: HashMethod, hash_size: u32) -> Result<Self, PerceptualError> {
        if !HASH_SIZE_RANGE.contains(&hash_size) {
            return Err(PerceptualError::InvalidHashSize(hash_size));
        }

        let mut config = HasherConfig::new().hash_size(hash_size, hash_size);
        config = match method {
            HashMethod::Phash => config.hash_alg(HashAlg::Median).preproc_dct(),
            HashMethod::Dhash => config.hash_alg(HashAlg::Gradient),
            HashMethod::Vdhash => config.hash_alg(HashAlg::VertGradient),
            HashMethod::Ahash => config.hash_alg(HashAlg::Mean),
        };

        Ok(Self {
            hasher: config.to_hasher(),
            method,
            hash_size,
        })
    }

    /// Get the algorithm used by this hasher.
    #[must_use]
    pub fn method(&self) -> HashMethod {
        self.method
    }
}

impl HashFunction for PerceptualHasher {
    fn hash_image(&self, path: &Path) -> Result<BitVector, PerceptualError> {
        let img = image::open(path)
            .map_err(|e| PerceptualError::LoadError(path.display().to_string(), e))?;
        let hash = self.hasher.hash_image(&img);
        Ok(BitVector::from_bytes(hash.as_bytes().to_vec(), self.bits()))
    }

    fn bits(&self) -> u32 {
        self.hash_size * self.hash_size
    }

    fn method_name(&self) -> &str {
        self.method.as_str()
    }
}
