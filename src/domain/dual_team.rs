/// Dual-team (binary plan) model
///
/// Each distributor has at most one Left and one Right child. Placement
/// parent and personal sponsor are tracked separately so that a recruit can
/// spill over into someone else's leg.
///
/// ## Ordering
/// `placement_seq` is strictly increasing from ancestor to descendant. The
/// left/right volume aggregates downstream rely on that ordering, and keeping
/// it in its own column means distributor ids never change.

use crate::domain::error::PlacementError;
use crate::domain::DistributorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    /// Tree roots only
    Unassigned,
}

impl Side {
    /// The other leg; `Unassigned` stays unassigned
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Unassigned => Side::Unassigned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Unassigned => "unassigned",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-sponsor rule for where that sponsor's recruits land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    OutsideLeft,
    InsideLeft,
    OutsideRight,
    InsideRight,
}

impl PlacementPolicy {
    /// The sponsor's leg the recruit ends up in
    pub fn leg(&self) -> Side {
        match self {
            PlacementPolicy::OutsideLeft | PlacementPolicy::InsideLeft => Side::Left,
            PlacementPolicy::OutsideRight | PlacementPolicy::InsideRight => Side::Right,
        }
    }

    pub fn is_outside(&self) -> bool {
        matches!(self, PlacementPolicy::OutsideLeft | PlacementPolicy::OutsideRight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementPolicy::OutsideLeft => "outside-left",
            PlacementPolicy::InsideLeft => "inside-left",
            PlacementPolicy::OutsideRight => "outside-right",
            PlacementPolicy::InsideRight => "inside-right",
        }
    }
}

impl FromStr for PlacementPolicy {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outside-left" => Ok(PlacementPolicy::OutsideLeft),
            "inside-left" => Ok(PlacementPolicy::InsideLeft),
            "outside-right" => Ok(PlacementPolicy::OutsideRight),
            "inside-right" => Ok(PlacementPolicy::InsideRight),
            other => Err(PlacementError::InvalidInput(format!(
                "unknown placement policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualTeamLink {
    pub distributor_id: DistributorId,
    pub placement_parent_id: Option<DistributorId>,
    pub side: Side,
    pub personal_sponsor_id: Option<DistributorId>,
    pub placement_policy: Option<PlacementPolicy>,
    pub placement_seq: u64,
}

/// Materialized per-node leg data
///
/// `*_frontier` is the bottom node of the outer edge of that leg: the node
/// whose outer child slot receives the next outside placement. `None` means
/// the leg is empty and the owner itself is the frontier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegStats {
    pub left_count: u64,
    pub right_count: u64,
    pub left_frontier: Option<DistributorId>,
    pub right_frontier: Option<DistributorId>,
}

impl LegStats {
    pub fn count(&self, side: Side) -> u64 {
        match side {
            Side::Left => self.left_count,
            Side::Right => self.right_count,
            Side::Unassigned => 0,
        }
    }

    pub fn count_mut(&mut self, side: Side) -> Option<&mut u64> {
        match side {
            Side::Left => Some(&mut self.left_count),
            Side::Right => Some(&mut self.right_count),
            Side::Unassigned => None,
        }
    }

    pub fn frontier(&self, side: Side) -> Option<DistributorId> {
        match side {
            Side::Left => self.left_frontier,
            Side::Right => self.right_frontier,
            Side::Unassigned => None,
        }
    }

    pub fn set_frontier(&mut self, side: Side, node: Option<DistributorId>) {
        match side {
            Side::Left => self.left_frontier = node,
            Side::Right => self.right_frontier = node,
            Side::Unassigned => {}
        }
    }

    /// Lighter leg, or `None` on an exact tie
    pub fn lighter_side(&self) -> Option<Side> {
        use std::cmp::Ordering;
        match self.left_count.cmp(&self.right_count) {
            Ordering::Less => Some(Side::Left),
            Ordering::Greater => Some(Side::Right),
            Ordering::Equal => None,
        }
    }
}
