/// Distributor directory records
///
/// The directory itself is an external collaborator; the engine only reads
/// these records to annotate query results.

use crate::domain::DistributorId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Distributor,
    Customer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorProfile {
    pub id: DistributorId,
    pub login: String,
    pub display_name: String,
    pub role: Role,
    /// Membership paid through this date (inclusive)
    pub renewal_date: Option<NaiveDate>,
    /// Who recruited this distributor, independent of placement
    pub personal_sponsor_id: Option<DistributorId>,
}

impl DistributorProfile {
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.renewal_date.map(|date| date >= today).unwrap_or(false)
    }

    pub fn is_recruited_by(&self, sponsor_id: DistributorId) -> bool {
        self.personal_sponsor_id == Some(sponsor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(renewal: Option<NaiveDate>) -> DistributorProfile {
        DistributorProfile {
            id: 5,
            login: "jdoe".into(),
            display_name: "J. Doe".into(),
            role: Role::Distributor,
            renewal_date: renewal,
            personal_sponsor_id: Some(2),
        }
    }

    #[test]
    fn test_active_through_renewal_date() {
        let renewal = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let p = profile(Some(renewal));
        assert!(p.is_active_on(renewal));
        assert!(p.is_active_on(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
        assert!(!p.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()));
        assert!(!profile(None).is_active_on(renewal));
    }

    #[test]
    fn test_recruited_by() {
        let p = profile(None);
        assert!(p.is_recruited_by(2));
        assert!(!p.is_recruited_by(3));
    }
}
