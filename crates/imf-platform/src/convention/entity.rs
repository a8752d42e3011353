//! Convention Entity
//!
//! A work-trial agreement record. Only the pieces the agency lifecycle
//! depends on are modelled: the status machine and the validation date
//! used by automatic agency closure. Full convention handling lives
//! outside this crate.

use chrono::{DateTime, Utc};
use imf_common::{AgencyId, ConventionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConventionStatus {
    Draft,
    ReadyToSign,
    PartiallySigned,
    InReview,
    AcceptedByCounsellor,
    AcceptedByValidator,
    Rejected,
    Cancelled,
    Deprecated,
}

impl ConventionStatus {
    /// Fully validated conventions count as agency activity.
    pub fn is_validated(&self) -> bool {
        matches!(self, ConventionStatus::AcceptedByValidator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Convention {
    pub id: ConventionId,
    pub agency_id: AgencyId,
    pub status: ConventionStatus,
    /// Set when the convention reaches AcceptedByValidator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_validation: Option<DateTime<Utc>>,
}

impl Convention {
    pub fn new(
        id: impl Into<ConventionId>,
        agency_id: impl Into<AgencyId>,
        status: ConventionStatus,
        date_validation: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            agency_id: agency_id.into(),
            status,
            date_validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_only_validator_accepted_is_validated() {
        assert!(ConventionStatus::AcceptedByValidator.is_validated());
        assert!(!ConventionStatus::AcceptedByCounsellor.is_validated());
        assert!(!ConventionStatus::Draft.is_validated());
        assert!(!ConventionStatus::Rejected.is_validated());
    }

    #[test]
    fn test_serde_status_names() {
        let convention = Convention::new(
            "conv-1",
            "agency-1",
            ConventionStatus::AcceptedByValidator,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()),
        );
        let json = serde_json::to_value(&convention).unwrap();
        assert_eq!(json["status"], "acceptedByValidator");
    }
}
