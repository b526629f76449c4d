//! Ordering of group members and of groups.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::duplicates::GroupTable;

/// Key used to order the members of a group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SortCriterion {
    /// File size in bytes, largest first
    #[default]
    Size,
    /// Path string, ascending
    Path,
    /// Width plus height, largest first
    Pixels,
    /// Image width, largest first
    Width,
    /// Image height, largest first
    Height,
}

impl SortCriterion {
    /// Whether the natural direction of this key is descending.
    #[must_use]
    pub fn descending_by_default(&self) -> bool {
        !matches!(self, Self::Path)
    }

    fn compare(&self, a: &MemberInfo, b: &MemberInfo) -> Ordering {
        match self {
            Self::Size => a.size.cmp(&b.size),
            Self::Path => a.path.cmp(&b.path),
            Self::Pixels => a.pixels().cmp(&b.pixels()),
            Self::Width => a.width().cmp(&b.width()),
            Self::Height => a.height().cmp(&b.height()),
        }
    }
}

/// What the workflow knows about one member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    /// Image path
    pub path: PathBuf,
    /// File size in bytes, 0 if the file could not be inspected
    pub size: u64,
    /// Width and height, if the header could be read
    pub dimensions: Option<(u32, u32)>,
}

impl MemberInfo {
    /// Member with known attributes.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64, dimensions: Option<(u32, u32)>) -> Self {
        Self {
            path: path.into(),
            size,
            dimensions,
        }
    }

    /// Read size from the filesystem and dimensions from the image header.
    ///
    /// Unreadable attributes fall back to zero size or unknown dimensions.
    #[must_use]
    pub fn inspect(path: &Path) -> Self {
        let size = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                log::warn!("Cannot stat {}: {}", path.display(), e);
                0
            }
        };
        let dimensions = match image::image_dimensions(path) {
            Ok(dims) => Some(dims),
            Err(e) => {
                log::debug!("Cannot read dimensions of {}: {}", path.display(), e);
                None
            }
        };
        Self::new(path, size, dimensions)
    }

    /// Image width, 0 if unknown.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.map_or(0, |(w, _)| w)
    }

    /// Image height, 0 if unknown.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.map_or(0, |(_, h)| h)
    }

    /// Width plus height, 0 if unknown.
    #[must_use]
    pub fn pixels(&self) -> u64 {
        u64::from(self.width()) + u64::from(self.height())
    }

    /// `WxH`, or `?x?` when the dimensions are unknown.
    #[must_use]
    pub fn dimensions_label(&self) -> String {
        match self.dimensions {
            Some((w, h)) => format!("{w}x{h}"),
            None => "?x?".to_string(),
        }
    }
}

/// Order a group's members by `criterion`.
///
/// Each criterion has a natural direction (descending for size and
/// dimensions, ascending for paths); `reverse` flips it. The sort is stable:
/// members with equal keys keep their input order in both directions.
#[must_use]
pub fn sort_group_members(
    mut members: Vec<MemberInfo>,
    criterion: SortCriterion,
    reverse: bool,
) -> Vec<MemberInfo> {
    let descending = criterion.descending_by_default() != reverse;
    members.sort_by(|a, b| {
        let ord = criterion.compare(a, b);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    members
}

/// Deterministic form of a group table.
///
/// Members are sorted within each group, groups are sorted by their member
/// lists, and ids are reassigned `1..=N` in that order. The result depends
/// only on the partition, not on the order the engine produced it in.
#[must_use]
pub fn canonicalize_groups(table: GroupTable) -> GroupTable {
    let mut groups: Vec<Vec<PathBuf>> = table
        .into_groups()
        .into_iter()
        .map(|mut members| {
            members.sort();
            members
        })
        .collect();
    groups.sort();
    GroupTable::from_groups(groups)
}
