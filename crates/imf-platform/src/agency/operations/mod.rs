//! Agency Operations
//!
//! Use cases for agency lifecycle and rights management.

pub mod add_agency;
pub mod close_inactive_agencies;
pub mod remove_user_rights;
pub mod review_agency;
pub mod update_user_rights;

pub use add_agency::{AddAgencyCommand, AddAgencyUseCase};
pub use close_inactive_agencies::{
    CloseInactiveAgenciesCommand, CloseInactiveAgenciesUseCase, ClosureReport,
};
pub use remove_user_rights::{RemoveUserRightsCommand, RemoveUserRightsUseCase};
pub use review_agency::{ReviewAgencyCommand, ReviewAgencyUseCase, ReviewDecision};
pub use update_user_rights::{UpdateUserRightsCommand, UpdateUserRightsUseCase};

use crate::agency::entity::{Agency, RightsViolation, UserRight};
use crate::details;
use crate::usecase::UseCaseError;
use imf_common::{AgencyRole, UserId};
use std::collections::BTreeSet;

/// Map a rights-map violation to its taxonomy error.
pub(crate) fn rights_violation_error(agency_id: &str, violation: RightsViolation) -> UseCaseError {
    let code = match violation {
        RightsViolation::NotEnoughNotifiedCounsellors => "AGENCY_NOT_ENOUGH_COUNSELLORS",
        RightsViolation::NotEnoughNotifiedValidators => "AGENCY_NOT_ENOUGH_VALIDATORS",
    };
    UseCaseError::business_rule_with_details(
        code,
        violation.to_string(),
        details! { "agencyId" => agency_id },
    )
}

/// Add or replace one user's rights on an agency. Validator edition on
/// delegated agencies is rejected before the merge; the map-level
/// invariants are re-checked after it. The agency is only mutated when
/// every check passes.
pub(crate) fn apply_user_right(
    agency: &mut Agency,
    user_id: &UserId,
    roles: &BTreeSet<AgencyRole>,
    is_notified_by_email: bool,
) -> Result<(), UseCaseError> {
    if agency.is_delegated() && roles.contains(&AgencyRole::Validator) {
        return Err(UseCaseError::business_rule_with_details(
            "AGENCY_VALIDATOR_EDITION_FORBIDDEN",
            "Cannot assign the validator role on a delegated agency; the parent agency's \
             validators act for it",
            details! { "agencyId" => &agency.id, "userId" => user_id },
        ));
    }

    let mut candidate = agency.clone();
    candidate.set_user_right(
        user_id.clone(),
        UserRight::new(roles.iter().copied(), is_notified_by_email),
    );
    candidate
        .validate_rights()
        .map_err(|v| rights_violation_error(&agency.id, v))?;

    *agency = candidate;
    Ok(())
}
