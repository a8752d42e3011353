//! Remove User Rights Use Case
//!
//! Detaches a user from an agency. The removal is refused when the
//! remaining rights map would break an invariant, so the last notified
//! validator of a non-delegated agency cannot be removed.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agency::entity::Agency;
use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use imf_common::{AgencyId, UserId};
use imf_outbox::{EventFactory, EventPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUserRightsCommand {
    pub agency_id: AgencyId,
    pub user_id: UserId,
}

pub struct RemoveUserRightsUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
}

impl<U: UnitOfWork> RemoveUserRightsUseCase<U> {
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

    pub async fn execute(&self, command: RemoveUserRightsCommand) -> UseCaseResult<Agency> {
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

        if agency.right_of(&command.user_id).is_none() {
            return UseCaseResult::failure(UseCaseError::not_found_with_details(
                "USER_NOT_FOUND",
                format!(
                    "User '{}' has no rights on agency '{}'",
                    command.user_id, command.agency_id
                ),
                details! { "agencyId" => &command.agency_id, "userId" => &command.user_id },
            ));
        }

        // Remove on a copy first so a refused removal leaves the agency as
        // loaded.
        let mut candidate = agency.clone();
        candidate.remove_user_right(&command.user_id);
        if let Err(violation) = candidate.validate_rights() {
            return UseCaseResult::failure(super::rights_violation_error(&agency.id, violation));
        }
        agency = candidate;

        let event = self
            .factory
            .create(EventPayload::ConnectedUserAgencyRightChanged {
                agency_id: agency.id.clone(),
                user_id: command.user_id.clone(),
                roles: BTreeSet::new(),
                is_notified_by_email: false,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::entity::UserRight;
    use crate::agency::repository::InMemoryAgencyRepository;
    use crate::usecase::InMemoryUnitOfWork;
    use crate::user::repository::InMemoryUserRepository;
    use chrono::{TimeZone, Utc};
    use imf_common::{AgencyRole, FixedClock, SequentialIds};
    use imf_outbox::{EventTopic, InMemoryOutboxRepository};
    use std::collections::HashSet;

    fn fixture() -> (
        Arc<InMemoryAgencyRepository>,
        Arc<InMemoryOutboxRepository>,
        RemoveUserRightsUseCase<InMemoryUnitOfWork>,
    ) {
        let agencies = Arc::new(InMemoryAgencyRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let outbox = Arc::new(InMemoryOutboxRepository::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let unit_of_work = Arc::new(InMemoryUnitOfWork::new(
            agencies.clone(),
            users,
            outbox.clone(),
        ));
        let factory = Arc::new(EventFactory::new(
            clock,
            Arc::new(SequentialIds::new("evt")),
            HashSet::new(),
        ));
        let use_case = RemoveUserRightsUseCase::new(agencies.clone(), unit_of_work, factory);
        (agencies, outbox, use_case)
    }

    fn agency_with_rights(rights: &[(&str, &[AgencyRole], bool)]) -> Agency {
        let mut agency = Agency::new(
            "agency-1",
            "Mission Locale de Test",
            None,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        );
        for (user_id, roles, notified) in rights {
            agency.set_user_right(*user_id, UserRight::new(roles.iter().copied(), *notified));
        }
        agency.activate().unwrap();
        agency
    }

    #[tokio::test]
    async fn test_remove_right_emits_empty_roles_event() {
        let (agencies, outbox, use_case) = fixture();
        agencies.insert(agency_with_rights(&[
            ("validator-0", &[AgencyRole::Validator], true),
            ("user-1", &[AgencyRole::Counsellor], true),
        ]));

        let agency = use_case
            .execute(RemoveUserRightsCommand {
                agency_id: "agency-1".to_string(),
                user_id: "user-1".to_string(),
            })
            .await
            .unwrap();

        assert!(agency.right_of("user-1").is_none());
        let events = outbox.all();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].topic(),
            EventTopic::ConnectedUserAgencyRightChanged
        );
        match &events[0].payload {
            EventPayload::ConnectedUserAgencyRightChanged {
                roles,
                is_notified_by_email,
                ..
            } => {
                assert!(roles.is_empty());
                assert!(!is_notified_by_email);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cannot_remove_sole_notified_validator() {
        let (agencies, outbox, use_case) = fixture();
        agencies.insert(agency_with_rights(&[
            ("validator-0", &[AgencyRole::Validator], true),
            ("validator-1", &[AgencyRole::Validator], false),
        ]));

        let err = use_case
            .execute(RemoveUserRightsCommand {
                agency_id: "agency-1".to_string(),
                user_id: "validator-0".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "AGENCY_NOT_ENOUGH_VALIDATORS");

        // The right is still there and nothing was published.
        let stored = agencies.get("agency-1").unwrap();
        assert!(stored.right_of("validator-0").is_some());
        assert!(outbox.all().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_right() {
        let (agencies, _, use_case) = fixture();
        agencies.insert(agency_with_rights(&[(
            "validator-0",
            &[AgencyRole::Validator],
            true,
        )]));

        let err = use_case
            .execute(RemoveUserRightsCommand {
                agency_id: "agency-1".to_string(),
                user_id: "user-404".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "USER_NOT_FOUND");
    }
}
