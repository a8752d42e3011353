//! Review Agency Use Case
//!
//! Administrative decision on an agency awaiting review: activation emits
//! `AgencyActivated`; rejection emits `AgencyRejected` carrying the
//! justification (subscribers notify the agency admins and, for delegated
//! agencies, the parent's validators).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agency::entity::Agency;
use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use imf_common::AgencyId;
use imf_outbox::{EventFactory, EventPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum ReviewDecision {
    Activate,
    Reject { justification: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAgencyCommand {
    pub agency_id: AgencyId,
    #[serde(flatten)]
    pub decision: ReviewDecision,
}

pub struct ReviewAgencyUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
}

impl<U: UnitOfWork> ReviewAgencyUseCase<U> {
    pub fn new(
        agency_repo: Arc<dyn AgencyRepository>,
        unit_of_work: Arc<U>,
        factory: Arc<EventFactory>,
    ) -> Self {
        Self {
            agency_repo,
            unit_of_work,
            factory,
        }
    }

    pub async fn execute(&self, command: ReviewAgencyCommand) -> UseCaseResult<Agency> {
        let mut agency = match self.agency_repo.get_by_id(&command.agency_id).await {
            Ok(Some(agency)) => agency,
            Ok(None) => {
                return UseCaseResult::failure(UseCaseError::not_found_with_details(
                    "AGENCY_NOT_FOUND",
                    format!("Agency '{}' not found", command.agency_id),
                    details! { "agencyId" => &command.agency_id },
                ));
            }
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        let transition = match &command.decision {
            ReviewDecision::Activate => agency.activate(),
            ReviewDecision::Reject { .. } => agency.reject(),
        };
        if let Err(invalid) = transition {
            return UseCaseResult::failure(UseCaseError::business_rule_with_details(
                "AGENCY_INVALID_STATUS_TRANSITION",
                invalid.to_string(),
                details! { "agencyId" => &agency.id, "status" => invalid.from.as_str() },
            ));
        }

        let payload = match command.decision {
            ReviewDecision::Activate => EventPayload::AgencyActivated {
                agency_id: agency.id.clone(),
            },
            ReviewDecision::Reject { justification } => EventPayload::AgencyRejected {
                agency_id: agency.id.clone(),
                justification,
            },
        };
        let event = self.factory.create(payload);

        self.unit_of_work
            .commit(
                vec![AggregateChange::SaveAgency(agency.clone())],
                vec![event],
            )
            .await
            .map(|_| agency)
    }
}
