/// Forced-matrix slot rows and their change history

use crate::domain::position::Coordinate;
use crate::domain::DistributorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored row of the forced matrix
///
/// A row exists once something was placed there; vacating clears
/// `occupant` but keeps the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub coordinate: Coordinate,
    pub occupant: Option<DistributorId>,
}

impl Slot {
    pub fn new(coordinate: Coordinate, occupant: Option<DistributorId>) -> Self {
        Self {
            coordinate,
            occupant,
        }
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Audit row written when a slot is vacated or a distributor moves
///
/// First placements never produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
    pub distributor_id: DistributorId,
    pub old: Option<Coordinate>,
    pub new: Option<Coordinate>,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

impl PositionChange {
    /// The distributor left `old` and holds no slot afterwards
    pub fn vacated(distributor_id: DistributorId, old: Coordinate, notes: impl Into<String>) -> Self {
        Self {
            distributor_id,
            old: Some(old),
            new: None,
            notes: notes.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn moved(
        distributor_id: DistributorId,
        old: Coordinate,
        new: Coordinate,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            distributor_id,
            old: Some(old),
            new: Some(new),
            notes: notes.into(),
            timestamp: Utc::now(),
        }
    }
}
