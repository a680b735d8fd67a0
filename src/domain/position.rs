/// Position Codec - Forced Matrix Coordinate Math
///
/// The forced matrix is a complete binary tree addressed with heap indexing:
/// level `L` holds positions `1..=2^L`, the children of `(L, P)` are
/// `(L+1, 2P-1)` and `(L+1, 2P)`.
///
/// Everything here is pure: no state, no I/O, no caching.
///
/// ## Bounds
/// Levels are capped at `MAX_LEVEL` (62). At that depth `2^level` and every
/// descendant-range bound still fit in a `u64`, so none of the shift
/// arithmetic below can overflow. Coordinates can only be built through
/// `Coordinate::new`, which enforces the bounds once.

use crate::domain::error::{PlacementError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::RangeInclusive;

/// Deepest supported level
pub const MAX_LEVEL: u32 = 62;

/// Ancestor paths rarely exceed a handful of levels in practice
pub type CoordinatePath = SmallVec<[Coordinate; 8]>;

/// One addressable cell of the forced matrix
///
/// Ordering is `(level, position)`, which is also breadth-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    level: u32,
    position: u64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    level: u32,
    position: u64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = PlacementError;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Coordinate::new(raw.level, raw.position)
    }
}

impl Coordinate {
    /// The top of the matrix
    pub const ROOT: Coordinate = Coordinate {
        level: 0,
        position: 1,
    };

    /// Builds a validated coordinate
    ///
    /// # Errors
    /// `InvalidInput` if `level > MAX_LEVEL` or `position` is outside `1..=2^level`.
    pub fn new(level: u32, position: u64) -> Result<Self> {
        if level > MAX_LEVEL {
            return Err(PlacementError::InvalidInput(format!(
                "level {} exceeds maximum supported level {}",
                level, MAX_LEVEL
            )));
        }
        if position == 0 || position > width(level) {
            return Err(PlacementError::InvalidInput(format!(
                "position {} is outside 1..={} for level {}",
                position,
                width(level),
                level
            )));
        }
        Ok(Self { level, position })
    }

    /// Parses signed/raw input from the outer layer (query strings, JSON)
    pub fn from_raw(level: i64, position: i64) -> Result<Self> {
        let level = u32::try_from(level)
            .map_err(|_| PlacementError::InvalidInput(format!("invalid level {}", level)))?;
        let position = u64::try_from(position).map_err(|_| {
            PlacementError::InvalidInput(format!("invalid position {}", position))
        })?;
        Self::new(level, position)
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.level, self.position)
    }
}

/// Number of slots on a level (`2^level`)
#[inline]
pub fn width(level: u32) -> u64 {
    1u64 << level
}

/// `(level-1, ceil(position/2))`, or `None` at the root
#[inline]
pub fn parent_of(c: Coordinate) -> Option<Coordinate> {
    if c.level == 0 {
        return None;
    }
    Some(Coordinate {
        level: c.level - 1,
        position: (c.position + 1) / 2,
    })
}

/// Left and right child, or `None` at `MAX_LEVEL`
#[inline]
pub fn children_of(c: Coordinate) -> Option<[Coordinate; 2]> {
    if c.level >= MAX_LEVEL {
        return None;
    }
    let level = c.level + 1;
    Some([
        Coordinate {
            level,
            position: 2 * c.position - 1,
        },
        Coordinate {
            level,
            position: 2 * c.position,
        },
    ])
}

/// Inclusive range of positions at `level` that descend from `ancestor`
///
/// Returns `None` when `level` is above the ancestor or beyond `MAX_LEVEL`.
/// At `level == ancestor.level` the range is the ancestor itself.
pub fn descendant_range(ancestor: Coordinate, level: u32) -> Option<RangeInclusive<u64>> {
    if level < ancestor.level || level > MAX_LEVEL {
        return None;
    }
    let depth = level - ancestor.level;
    let first = ((ancestor.position - 1) << depth) + 1;
    let last = ancestor.position << depth;
    Some(first..=last)
}

/// True iff `c` is strictly below `ancestor` in the ancestor's subtree
pub fn is_descendant(ancestor: Coordinate, c: Coordinate) -> bool {
    if c.level <= ancestor.level {
        return false;
    }
    descendant_range(ancestor, c.level)
        .map(|range| range.contains(&c.position))
        .unwrap_or(false)
}

/// Equality or strict descendance
#[inline]
pub fn is_self_or_descendant(ancestor: Coordinate, c: Coordinate) -> bool {
    ancestor == c || is_descendant(ancestor, c)
}

/// Chain of coordinates from `ancestor` down to `c`, both included,
/// in ascending level order
///
/// # Errors
/// `InvalidInput` if `c` is neither `ancestor` nor one of its descendants.
pub fn path_between(ancestor: Coordinate, c: Coordinate) -> Result<CoordinatePath> {
    if !is_self_or_descendant(ancestor, c) {
        return Err(PlacementError::InvalidInput(format!(
            "{} is not in the subtree of {}",
            c, ancestor
        )));
    }

    let mut path = CoordinatePath::new();
    let mut current = c;
    path.push(current);
    while current != ancestor {
        // Descendance was checked above, so the walk reaches `ancestor`
        // before running out of parents.
        match parent_of(current) {
            Some(parent) => {
                current = parent;
                path.push(current);
            }
            None => break,
        }
    }
    path.reverse();
    Ok(path)
}
