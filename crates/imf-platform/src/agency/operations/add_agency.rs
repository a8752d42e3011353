//! Add Agency Use Case
//!
//! Registers a new agency in NeedsReview status with its initial rights
//! map and emits `NewAgencyAdded`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agency::entity::{Agency, UserRight};
use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use crate::user::repository::UserRepository;
use imf_common::{AgencyId, AgencyRole, Clock, IdGenerator, UserId};
use imf_outbox::{EventFactory, EventPayload};

/// Command for registering a new agency.
///
/// Validators and counsellors listed here start notified by email, which
/// satisfies the rights-map invariants for a freshly created agency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAgencyCommand {
    pub name: String,

    /// Parent agency when registering a delegated agency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refers_to_agency_id: Option<AgencyId>,

    /// Users granted the validator role (must be empty for delegated
    /// agencies).
    #[serde(default)]
    pub validators: Vec<UserId>,

    /// Users granted the counsellor role.
    #[serde(default)]
    pub counsellors: Vec<UserId>,
}

pub struct AddAgencyUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    user_repo: Arc<dyn UserRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<U: UnitOfWork> AddAgencyUseCase<U> {
    pub fn new(
        agency_repo: Arc<dyn AgencyRepository>,
        user_repo: Arc<dyn UserRepository>,
        unit_of_work: Arc<U>,
        factory: Arc<EventFactory>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            agency_repo,
            user_repo,
            unit_of_work,
            factory,
            clock,
            ids,
        }
    }

    pub async fn execute(&self, command: AddAgencyCommand) -> UseCaseResult<Agency> {
        let name = command.name.trim();
        if name.is_empty() {
            return UseCaseResult::failure(UseCaseError::validation(
                "AGENCY_NAME_REQUIRED",
                "Agency name is required",
            ));
        }

        // Delegated agencies must reference an existing parent and cannot
        // carry their own validators.
        if let Some(ref parent_id) = command.refers_to_agency_id {
            match self.agency_repo.get_by_id(parent_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return UseCaseResult::failure(UseCaseError::not_found_with_details(
                        "AGENCY_NOT_FOUND",
                        format!("Parent agency '{}' not found", parent_id),
                        details! { "agencyId" => parent_id },
                    ));
                }
                Err(e) => {
                    return UseCaseResult::failure(UseCaseError::commit(e.to_string()));
                }
            }
            if !command.validators.is_empty() {
                return UseCaseResult::failure(UseCaseError::business_rule_with_details(
                    "AGENCY_VALIDATOR_EDITION_FORBIDDEN",
                    "Cannot assign the validator role on a delegated agency; the parent \
                     agency's validators act for it",
                    details! { "agencyId" => parent_id },
                ));
            }
        }

        // Every referenced user must already exist.
        for user_id in command.validators.iter().chain(&command.counsellors) {
            match self.user_repo.get_by_id(user_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return UseCaseResult::failure(UseCaseError::not_found_with_details(
                        "USER_NOT_FOUND",
                        format!("User '{}' not found", user_id),
                        details! { "userId" => user_id },
                    ));
                }
                Err(e) => {
                    return UseCaseResult::failure(UseCaseError::commit(e.to_string()));
                }
            }
        }

        let mut agency = Agency::new(
            self.ids.generate(),
            name,
            command.refers_to_agency_id.clone(),
            self.clock.now(),
        );

        for user_id in &command.validators {
            let mut roles: BTreeSet<AgencyRole> = BTreeSet::from([AgencyRole::Validator]);
            if command.counsellors.contains(user_id) {
                roles.insert(AgencyRole::Counsellor);
            }
            agency.set_user_right(user_id.clone(), UserRight::new(roles, true));
        }
        for user_id in &command.counsellors {
            if agency.right_of(user_id).is_none() {
                agency.set_user_right(
                    user_id.clone(),
                    UserRight::new([AgencyRole::Counsellor], true),
                );
            }
        }

        if let Err(violation) = agency.validate_rights() {
            return UseCaseResult::failure(super::rights_violation_error(&agency.id, violation));
        }

        let event = self.factory.create(EventPayload::NewAgencyAdded {
            agency_id: agency.id.clone(),
        });

        self.unit_of_work
            .commit(
                vec![AggregateChange::SaveAgency(agency.clone())],
                vec![event],
            )
            .await
            .map(|_| agency)
    }
}
