//! Resolve Identity Conflict Use Case
//!
//! An OAuth login callback can resolve two distinct user records that are
//! the same person: one matched by the provider's subject id, one matched
//! by email. The record matched by external id is authoritative and kept;
//! the other record's agency rights are merged into it agency by agency
//! (union of roles, more permissive notification setting wins), then the
//! duplicate record is deleted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use crate::user::entity::User;
use crate::user::repository::UserRepository;
use imf_outbox::{EventFactory, EventPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveIdentityConflictCommand {
    /// OAuth subject id that matched one existing user.
    pub external_id: String,
    /// Email that matched another existing user.
    pub email: String,
}

pub struct ResolveIdentityConflictUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    user_repo: Arc<dyn UserRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
}

impl<U: UnitOfWork> ResolveIdentityConflictUseCase<U> {
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

    pub async fn execute(&self, command: ResolveIdentityConflictCommand) -> UseCaseResult<User> {
        let user_to_keep = match self.user_repo.find_by_external_id(&command.external_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return UseCaseResult::failure(UseCaseError::not_found_with_details(
                    "USER_NOT_FOUND",
                    format!("No user with external id '{}'", command.external_id),
                    details! { "externalId" => &command.external_id },
                ));
            }
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        let email = command.email.trim().to_lowercase();
        let user_to_delete = match self.user_repo.find_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return UseCaseResult::failure(UseCaseError::not_found_with_details(
                    "USER_NOT_FOUND",
                    format!("No user with email '{}'", email),
                    details! { "email" => &email },
                ));
            }
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        if user_to_keep.id == user_to_delete.id {
            return UseCaseResult::failure(UseCaseError::validation_with_details(
                "NO_IDENTITY_CONFLICT",
                "External id and email resolve to the same user",
                details! { "userId" => &user_to_keep.id },
            ));
        }

        let agencies = match self
            .agency_repo
            .get_agencies_with_rights_for_user(&user_to_delete.id)
            .await
        {
            Ok(agencies) => agencies,
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        // Merge agency by agency so roles combine per agency, not globally.
        let mut changes = Vec::with_capacity(agencies.len() + 1);
        let mut events = Vec::with_capacity(agencies.len() + 1);
        for mut agency in agencies {
            let deleted_right = match agency.remove_user_right(&user_to_delete.id) {
                Some(right) => right,
                None => continue,
            };
            let merged = match agency.right_of(&user_to_keep.id) {
                Some(existing) => existing.merged_with(&deleted_right),
                None => deleted_right,
            };
            agency.set_user_right(user_to_keep.id.clone(), merged.clone());

            events.push(
                self.factory
                    .create(EventPayload::ConnectedUserAgencyRightChanged {
                        agency_id: agency.id.clone(),
                        user_id: user_to_keep.id.clone(),
                        roles: merged.roles.clone(),
                        is_notified_by_email: merged.is_notified_by_email,
                    }),
            );
            changes.push(AggregateChange::SaveAgency(agency));
        }

        changes.push(AggregateChange::DeleteUser(user_to_delete.id.clone()));
        events.push(self.factory.create(EventPayload::UserAccountsMerged {
            kept_user_id: user_to_keep.id.clone(),
            deleted_user_id: user_to_delete.id.clone(),
        }));

        info!(
            kept = %user_to_keep.id,
            deleted = %user_to_delete.id,
            agencies = changes.len() - 1,
            "Resolving identity conflict"
        );

        self.unit_of_work
            .commit(changes, events)
            .await
            .map(|_| user_to_keep)
    }
}
