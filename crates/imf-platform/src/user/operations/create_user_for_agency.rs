//! Create User For Agency Use Case
//!
//! Registers a user on an agency by email. Users are created lazily: when
//! the email already belongs to a known user, that user is reused and only
//! their rights on the agency change.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agency::operations::apply_user_right;
use crate::agency::repository::AgencyRepository;
use crate::details;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use crate::user::entity::User;
use crate::user::repository::UserRepository;
use imf_common::{AgencyId, AgencyRole, Clock, IdGenerator};
use imf_outbox::{EventFactory, EventPayload};

/// Email validation pattern
fn email_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserForAgencyCommand {
    pub agency_id: AgencyId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: BTreeSet<AgencyRole>,
    pub is_notified_by_email: bool,
}

pub struct CreateUserForAgencyUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    user_repo: Arc<dyn UserRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<U: UnitOfWork> CreateUserForAgencyUseCase<U> {
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

    pub async fn execute(&self, command: CreateUserForAgencyCommand) -> UseCaseResult<User> {
        let email = command.email.trim().to_lowercase();
        if email.is_empty() {
            return UseCaseResult::failure(UseCaseError::validation(
                "EMAIL_REQUIRED",
                "Email address is required",
            ));
        }
        if !email_pattern().is_match(&email) {
            return UseCaseResult::failure(UseCaseError::validation_with_details(
                "INVALID_EMAIL_FORMAT",
                "Invalid email address format",
                details! { "email" => &command.email },
            ));
        }

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

        // Reuse the existing account when the email is already known.
        let user = match self.user_repo.find_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => User::new(
                self.ids.generate(),
                email,
                command.first_name.trim(),
                command.last_name.trim(),
                self.clock.now(),
            ),
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        if let Err(e) = apply_user_right(
            &mut agency,
            &user.id,
            &command.roles,
            command.is_notified_by_email,
        ) {
            return UseCaseResult::failure(e);
        }

        let event = self
            .factory
            .create(EventPayload::ConnectedUserAgencyRightChanged {
                agency_id: agency.id.clone(),
                user_id: user.id.clone(),
                roles: command.roles.clone(),
                is_notified_by_email: command.is_notified_by_email,
            });

        self.unit_of_work
            .commit(
                vec![
                    AggregateChange::SaveUser(user.clone()),
                    AggregateChange::SaveAgency(agency),
                ],
                vec![event],
            )
            .await
            .map(|_| user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::entity::{Agency, UserRight};
    use crate::agency::repository::InMemoryAgencyRepository;
    use crate::usecase::InMemoryUnitOfWork;
    use crate::user::repository::InMemoryUserRepository;
    use chrono::{TimeZone, Utc};
    use imf_common::{FixedClock, SequentialIds};
    use imf_outbox::{EventTopic, InMemoryOutboxRepository};
    use std::collections::HashSet;

    struct Fixture {
        agencies: Arc<InMemoryAgencyRepository>,
        users: Arc<InMemoryUserRepository>,
        outbox: Arc<InMemoryOutboxRepository>,
        use_case: CreateUserForAgencyUseCase<InMemoryUnitOfWork>,
    }

    fn fixture() -> Fixture {
        let agencies = Arc::new(InMemoryAgencyRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let outbox = Arc::new(InMemoryOutboxRepository::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let unit_of_work = Arc::new(InMemoryUnitOfWork::new(
            agencies.clone(),
            users.clone(),
            outbox.clone(),
        ));
        let factory = Arc::new(EventFactory::new(
            clock.clone(),
            Arc::new(SequentialIds::new("evt")),
            HashSet::new(),
        ));
        let use_case = CreateUserForAgencyUseCase::new(
            agencies.clone(),
            users.clone(),
            unit_of_work,
            factory,
            clock,
            Arc::new(SequentialIds::new("user")),
        );
        Fixture {
            agencies,
            users,
            outbox,
            use_case,
        }
    }

    fn seed_active_agency(fixture: &Fixture, id: &str) {
        let mut agency = Agency::new(
            id,
            format!("Agency {}", id),
            None,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        );
        agency.set_user_right(
            "validator-0",
            UserRight::new([AgencyRole::Validator], true),
        );
        agency.activate().unwrap();
        fixture.agencies.insert(agency);
    }

    fn command(agency_id: &str, email: &str) -> CreateUserForAgencyCommand {
        CreateUserForAgencyCommand {
            agency_id: agency_id.to_string(),
            email: email.to_string(),
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
            roles: BTreeSet::from([AgencyRole::Counsellor]),
            is_notified_by_email: true,
        }
    }

    #[tokio::test]
    async fn test_creates_user_and_grants_right() {
        let fixture = fixture();
        seed_active_agency(&fixture, "agency-1");

        let user = fixture
            .use_case
            .execute(command("agency-1", "Jean.Dupont@Example.com"))
            .await
            .unwrap();

        // Email is normalized to lowercase.
        assert_eq!(user.email, "jean.dupont@example.com");
        assert!(fixture.users.get(&user.id).is_some());

        let agency = fixture.agencies.get("agency-1").unwrap();
        assert!(agency
            .right_of(&user.id)
            .unwrap()
            .has_role(AgencyRole::Counsellor));

        let events = fixture.outbox.all();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].topic(),
            EventTopic::ConnectedUserAgencyRightChanged
        );
    }

    #[tokio::test]
    async fn test_reuses_existing_user_by_email() {
        let fixture = fixture();
        seed_active_agency(&fixture, "agency-1");
        fixture.users.insert(User::new(
            "user-existing",
            "jean.dupont@example.com",
            "Jean",
            "Dupont",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));

        let user = fixture
            .use_case
            .execute(command("agency-1", "jean.dupont@example.com"))
            .await
            .unwrap();

        assert_eq!(user.id, "user-existing");
        let agency = fixture.agencies.get("agency-1").unwrap();
        assert!(agency.right_of("user-existing").is_some());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let fixture = fixture();
        seed_active_agency(&fixture, "agency-1");

        let err = fixture
            .use_case
            .execute(command("agency-1", "not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_EMAIL_FORMAT");

        let err = fixture
            .use_case
            .execute(command("agency-1", "   "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMAIL_REQUIRED");
    }

    #[tokio::test]
    async fn test_rights_rules_apply_to_new_user() {
        let fixture = fixture();
        seed_active_agency(&fixture, "agency-parent");
        let mut delegated = Agency::new(
            "agency-child",
            "Delegated",
            Some("agency-parent".to_string()),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        );
        delegated.activate().unwrap();
        fixture.agencies.insert(delegated);

        let mut cmd = command("agency-child", "jean.dupont@example.com");
        cmd.roles = BTreeSet::from([AgencyRole::Validator]);

        let err = fixture.use_case.execute(cmd).await.unwrap_err();
        assert_eq!(err.code(), "AGENCY_VALIDATOR_EDITION_FORBIDDEN");
        // Nothing was committed.
        assert!(fixture.outbox.all().is_empty());
    }
}
