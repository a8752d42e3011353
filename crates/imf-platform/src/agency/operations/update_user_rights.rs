//! Update User Rights Use Case
//!
//! Adds or replaces one user's rights on an agency and emits
//! `ConnectedUserAgencyRightChanged`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agency::entity::Agency;
use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use crate::user::repository::UserRepository;
use imf_common::{AgencyId, AgencyRole, UserId};
use imf_outbox::{EventFactory, EventPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRightsCommand {
    pub agency_id: AgencyId,
    pub user_id: UserId,
    pub roles: BTreeSet<AgencyRole>,
    pub is_notified_by_email: bool,
}

pub struct UpdateUserRightsUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    user_repo: Arc<dyn UserRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
}

impl<U: UnitOfWork> UpdateUserRightsUseCase<U> {
    pub fn new(
        agency_repo: Arc<dyn AgencyRepository>,
        user_repo: Arc<dyn UserRepository>,
        unit_of_work: Arc<U>,
        factory: Arc<EventFactory>,
    ) -> Self {
        Self {
            agency_repo,
            user_repo,
            unit_of_work,
            factory,
        }
    }

    pub async fn execute(&self, command: UpdateUserRightsCommand) -> UseCaseResult<Agency> {
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

        match self.user_repo.get_by_id(&command.user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return UseCaseResult::failure(UseCaseError::not_found_with_details(
                    "USER_NOT_FOUND",
                    format!("User '{}' not found", command.user_id),
                    details! { "userId" => &command.user_id },
                ));
            }
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        }

        if let Err(e) = super::apply_user_right(
            &mut agency,
            &command.user_id,
            &command.roles,
            command.is_notified_by_email,
        ) {
            return UseCaseResult::failure(e);
        }

        let event = self
            .factory
            .create(EventPayload::ConnectedUserAgencyRightChanged {
                agency_id: agency.id.clone(),
                user_id: command.user_id.clone(),
                roles: command.roles.clone(),
                is_notified_by_email: command.is_notified_by_email,
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
