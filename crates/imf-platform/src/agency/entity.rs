//! Agency Aggregate
//!
//! An agency's configuration plus the map of user rights attached to it.
//! The rights map carries two invariants that every mutation must leave
//! intact:
//! - if any user holds the counsellor role, at least one counsellor must
//!   be notified by email (otherwise counsellor submissions are silently
//!   lost);
//! - if the agency has no parent (`refers_to_agency_id` is None), at
//!   least one notified validator must exist (otherwise nothing can ever
//!   be validated). Delegated agencies rely on their parent's validators
//!   and must not have validators of their own.

use chrono::{DateTime, Utc};
use imf_common::{AgencyId, AgencyRole, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Agency status machine: NeedsReview -> Active | Rejected; Active -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgencyStatus {
    NeedsReview,
    Active,
    Rejected,
    Closed,
}

impl AgencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyStatus::NeedsReview => "needsReview",
            AgencyStatus::Active => "active",
            AgencyStatus::Rejected => "rejected",
            AgencyStatus::Closed => "closed",
        }
    }

    /// Parse a status from its wire name.
    pub fn parse(s: &str) -> Option<AgencyStatus> {
        match s {
            "needsReview" => Some(AgencyStatus::NeedsReview),
            "active" => Some(AgencyStatus::Active),
            "rejected" => Some(AgencyStatus::Rejected),
            "closed" => Some(AgencyStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's rights on one agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRight {
    pub roles: BTreeSet<AgencyRole>,
    pub is_notified_by_email: bool,
}

impl UserRight {
    pub fn new(roles: impl IntoIterator<Item = AgencyRole>, is_notified_by_email: bool) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            is_notified_by_email,
        }
    }

    pub fn has_role(&self, role: AgencyRole) -> bool {
        self.roles.contains(&role)
    }

    /// Union of roles; notification is the more permissive of the two.
    pub fn merged_with(&self, other: &UserRight) -> UserRight {
        UserRight {
            roles: self.roles.union(&other.roles).copied().collect(),
            is_notified_by_email: self.is_notified_by_email || other.is_notified_by_email,
        }
    }
}

/// Rights-map invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RightsViolation {
    #[error("agency has counsellors but none is notified by email")]
    NotEnoughNotifiedCounsellors,
    #[error("non-delegated agency has no notified validator")]
    NotEnoughNotifiedValidators,
}

/// Invalid status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid agency status transition: {from} -> {to}")]
pub struct InvalidStatusTransition {
    pub from: AgencyStatus,
    pub to: AgencyStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub status: AgencyStatus,
    /// Parent agency when this agency is a delegation of another one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refers_to_agency_id: Option<AgencyId>,
    #[serde(default)]
    pub users_rights: BTreeMap<UserId, UserRight>,
    pub created_at: DateTime<Utc>,
}

impl Agency {
    /// New agency awaiting administrative review.
    pub fn new(
        id: impl Into<AgencyId>,
        name: impl Into<String>,
        refers_to_agency_id: Option<AgencyId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: AgencyStatus::NeedsReview,
            refers_to_agency_id,
            users_rights: BTreeMap::new(),
            created_at,
        }
    }

    pub fn is_delegated(&self) -> bool {
        self.refers_to_agency_id.is_some()
    }

    pub fn right_of(&self, user_id: &str) -> Option<&UserRight> {
        self.users_rights.get(user_id)
    }

    /// Add or replace a user's rights. Invariants are NOT checked here;
    /// callers validate the whole map afterwards so a rejected mutation
    /// can be rolled back as one unit.
    pub fn set_user_right(&mut self, user_id: impl Into<UserId>, right: UserRight) {
        self.users_rights.insert(user_id.into(), right);
    }

    pub fn remove_user_right(&mut self, user_id: &str) -> Option<UserRight> {
        self.users_rights.remove(user_id)
    }

    /// Validate the two rights-map invariants.
    pub fn validate_rights(&self) -> Result<(), RightsViolation> {
        let has_counsellor = self
            .users_rights
            .values()
            .any(|r| r.has_role(AgencyRole::Counsellor));
        if has_counsellor {
            let notified_counsellor = self
                .users_rights
                .values()
                .any(|r| r.has_role(AgencyRole::Counsellor) && r.is_notified_by_email);
            if !notified_counsellor {
                return Err(RightsViolation::NotEnoughNotifiedCounsellors);
            }
        }

        if !self.is_delegated() {
            let notified_validator = self
                .users_rights
                .values()
                .any(|r| r.has_role(AgencyRole::Validator) && r.is_notified_by_email);
            if !notified_validator {
                return Err(RightsViolation::NotEnoughNotifiedValidators);
            }
        }

        Ok(())
    }

    pub fn activate(&mut self) -> Result<(), InvalidStatusTransition> {
        self.transition(AgencyStatus::NeedsReview, AgencyStatus::Active)
    }

    pub fn reject(&mut self) -> Result<(), InvalidStatusTransition> {
        self.transition(AgencyStatus::NeedsReview, AgencyStatus::Rejected)
    }

    pub fn close(&mut self) -> Result<(), InvalidStatusTransition> {
        self.transition(AgencyStatus::Active, AgencyStatus::Closed)
    }

    fn transition(
        &mut self,
        expected: AgencyStatus,
        to: AgencyStatus,
    ) -> Result<(), InvalidStatusTransition> {
        if self.status != expected {
            return Err(InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn agency(refers_to: Option<&str>) -> Agency {
        Agency::new(
            "agency-1",
            "Mission Locale de Test",
            refers_to.map(String::from),
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        )
    }

    fn right(roles: &[AgencyRole], notified: bool) -> UserRight {
        UserRight::new(roles.iter().copied(), notified)
    }

    #[test]
    fn test_new_agency_needs_review() {
        let agency = agency(None);
        assert_eq!(agency.status, AgencyStatus::NeedsReview);
        assert!(!agency.is_delegated());
    }

    #[test]
    fn test_status_transitions() {
        let mut agency = agency(None);
        agency.activate().unwrap();
        assert_eq!(agency.status, AgencyStatus::Active);
        agency.close().unwrap();
        assert_eq!(agency.status, AgencyStatus::Closed);

        // Closed is terminal.
        let err = agency.activate().unwrap_err();
        assert_eq!(err.from, AgencyStatus::Closed);
    }

    #[test]
    fn test_reject_only_from_needs_review() {
        let mut agency = agency(None);
        agency.activate().unwrap();
        assert!(agency.reject().is_err());
    }

    #[test]
    fn test_validator_invariant_on_non_delegated_agency() {
        let mut agency = agency(None);
        assert_eq!(
            agency.validate_rights(),
            Err(RightsViolation::NotEnoughNotifiedValidators)
        );

        agency.set_user_right("user-1", right(&[AgencyRole::Validator], false));
        assert_eq!(
            agency.validate_rights(),
            Err(RightsViolation::NotEnoughNotifiedValidators)
        );

        agency.set_user_right("user-1", right(&[AgencyRole::Validator], true));
        assert!(agency.validate_rights().is_ok());
    }

    #[test]
    fn test_delegated_agency_needs_no_validator() {
        let agency = agency(Some("agency-parent"));
        assert!(agency.validate_rights().is_ok());
    }

    #[test]
    fn test_counsellor_invariant() {
        let mut agency = agency(Some("agency-parent"));
        agency.set_user_right("user-1", right(&[AgencyRole::Counsellor], false));
        assert_eq!(
            agency.validate_rights(),
            Err(RightsViolation::NotEnoughNotifiedCounsellors)
        );

        agency.set_user_right("user-2", right(&[AgencyRole::Counsellor], true));
        assert!(agency.validate_rights().is_ok());
    }

    #[test]
    fn test_right_merge() {
        let a = right(&[AgencyRole::Counsellor], false);
        let b = right(&[AgencyRole::Validator], true);
        let merged = a.merged_with(&b);
        assert!(merged.has_role(AgencyRole::Counsellor));
        assert!(merged.has_role(AgencyRole::Validator));
        assert!(merged.is_notified_by_email);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AgencyStatus::NeedsReview,
            AgencyStatus::Active,
            AgencyStatus::Rejected,
            AgencyStatus::Closed,
        ] {
            assert_eq!(AgencyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AgencyStatus::parse("unknown"), None);
    }
}
