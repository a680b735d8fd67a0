/// Placement Errors
///
/// Every operation in the engine returns `Result<T, PlacementError>`. The
/// variants map one-to-one to caller-visible outcomes:
///
/// - `NotFound` / `AccessDenied`: expected, user-facing (404 / 403)
/// - `InvalidInput`: caller bug (400)
/// - `SlotOccupied` / `LegOccupied`: recoverable during automatic search,
///   fatal for an explicitly requested position (409)
/// - `MatrixFull`: bounded search exhausted (507)
/// - `Timeout` / `Storage`: the store did not answer in time or failed

use crate::domain::dual_team::Side;
use crate::domain::position::Coordinate;
use crate::domain::DistributorId;
use std::fmt;
use thiserror::Error;

/// Stable error classification, used as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    SlotOccupied,
    InvalidInput,
    MatrixFull,
    Timeout,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::SlotOccupied => "slot_occupied",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::MatrixFull => "matrix_full",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("slot {slot} is already occupied by distributor {occupant}")]
    SlotOccupied {
        slot: Coordinate,
        occupant: DistributorId,
    },

    #[error("{side} leg of distributor {parent} is already taken by distributor {occupant}")]
    LegOccupied {
        parent: DistributorId,
        side: Side,
        occupant: DistributorId,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no open slot under {sponsor_slot} within {max_depth} levels")]
    MatrixFull {
        sponsor_slot: Coordinate,
        max_depth: u32,
    },

    #[error("store call `{operation}` timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl PlacementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlacementError::NotFound(_) => ErrorKind::NotFound,
            PlacementError::AccessDenied(_) => ErrorKind::AccessDenied,
            PlacementError::SlotOccupied { .. } | PlacementError::LegOccupied { .. } => {
                ErrorKind::SlotOccupied
            }
            PlacementError::InvalidInput(_) => ErrorKind::InvalidInput,
            PlacementError::MatrixFull { .. } => ErrorKind::MatrixFull,
            PlacementError::Timeout { .. } => ErrorKind::Timeout,
            PlacementError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// HTTP-equivalent status for the outer handler layer
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::AccessDenied => 403,
            ErrorKind::SlotOccupied => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::MatrixFull => 507,
            ErrorKind::Timeout => 504,
            ErrorKind::Storage => 500,
        }
    }

    /// Expected outcomes that should be shown to the end user as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::AccessDenied)
    }

    pub fn not_placed(distributor_id: DistributorId) -> Self {
        PlacementError::NotFound(format!(
            "distributor {} has no recorded slot",
            distributor_id
        ))
    }

    pub fn outside_subtree(sponsor_id: DistributorId, target: Coordinate) -> Self {
        PlacementError::AccessDenied(format!(
            "{} is outside the subtree of distributor {}",
            target, sponsor_id
        ))
    }
}

pub type Result<T> = std::result::Result<T, PlacementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlacementError::SlotOccupied {
            slot: Coordinate::new(2, 3).unwrap(),
            occupant: 7,
        };
        assert_eq!(
            err.to_string(),
            "slot (2,3) is already occupied by distributor 7"
        );
        assert_eq!(err.kind(), ErrorKind::SlotOccupied);
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_user_facing_kinds() {
        assert!(PlacementError::not_placed(1).is_user_facing());
        let denied = PlacementError::outside_subtree(1, Coordinate::ROOT);
        assert!(denied.is_user_facing());
        assert_eq!(denied.status_code(), 403);
        assert!(!PlacementError::InvalidInput("level".into()).is_user_facing());
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::MatrixFull.as_str(), "matrix_full");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        let err = PlacementError::Timeout {
            operation: "occupy",
            timeout_ms: 250,
        };
        assert_eq!(err.status_code(), 504);
        assert!(err.to_string().contains("occupy"));
    }
}
