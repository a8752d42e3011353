//! Close Inactive Agencies Use Case
//!
//! Periodic administrative scan over every active agency. An agency with
//! no validated convention since the cutoff date, and no delegated child
//! agency with one, is moved to Closed and an `AgencyClosed` event is
//! emitted so the agency admins get notified. Each closure commits on its
//! own; one failing agency does not abort the scan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agency::entity::Agency;
use crate::agency::repository::AgencyRepository;
use crate::convention::repository::ConventionRepository;
use crate::usecase::{AggregateChange, UnitOfWork, UseCaseError, UseCaseResult};
use imf_common::AgencyId;
use imf_outbox::{EventFactory, EventPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseInactiveAgenciesCommand {
    /// Agencies without a validated convention on or after this date are
    /// candidates for closure.
    pub inactivity_cutoff: DateTime<Utc>,
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureReport {
    pub scanned: usize,
    pub closed: usize,
    pub kept: usize,
    pub failed: usize,
    pub closed_agency_ids: Vec<AgencyId>,
}

pub struct CloseInactiveAgenciesUseCase<U: UnitOfWork> {
    agency_repo: Arc<dyn AgencyRepository>,
    convention_repo: Arc<dyn ConventionRepository>,
    unit_of_work: Arc<U>,
    factory: Arc<EventFactory>,
}

impl<U: UnitOfWork> CloseInactiveAgenciesUseCase<U> {
    pub fn new(
        agency_repo: Arc<dyn AgencyRepository>,
        convention_repo: Arc<dyn ConventionRepository>,
        unit_of_work: Arc<U>,
        factory: Arc<EventFactory>,
    ) -> Self {
        Self {
            agency_repo,
            convention_repo,
            unit_of_work,
            factory,
        }
    }

    pub async fn execute(
        &self,
        command: CloseInactiveAgenciesCommand,
    ) -> UseCaseResult<ClosureReport> {
        let active = match self.agency_repo.get_all_active().await {
            Ok(agencies) => agencies,
            Err(e) => return UseCaseResult::failure(UseCaseError::commit(e.to_string())),
        };

        let mut report = ClosureReport {
            scanned: active.len(),
            ..ClosureReport::default()
        };

        for agency in active {
            match self.close_if_inactive(agency, command.inactivity_cutoff).await {
                Ok(Some(agency_id)) => {
                    report.closed += 1;
                    report.closed_agency_ids.push(agency_id);
                }
                Ok(None) => report.kept += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to close agency, continuing scan");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            closed = report.closed,
            kept = report.kept,
            failed = report.failed,
            "Inactive-agency scan finished"
        );
        UseCaseResult::success(report)
    }

    /// Close one agency if it shows no qualifying activity. Returns the
    /// agency id when a closure was committed.
    async fn close_if_inactive(
        &self,
        mut agency: Agency,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<AgencyId>, UseCaseError> {
        if self.has_activity_since(&agency.id, cutoff).await? {
            return Ok(None);
        }
        for child in self
            .agency_repo
            .get_children(&agency.id)
            .await
            .map_err(|e| UseCaseError::commit(e.to_string()))?
        {
            if self.has_activity_since(&child.id, cutoff).await? {
                return Ok(None);
            }
        }

        agency
            .close()
            .map_err(|e| UseCaseError::business_rule("AGENCY_INVALID_STATUS_TRANSITION", e.to_string()))?;

        let event = self.factory.create(EventPayload::AgencyClosed {
            agency_id: agency.id.clone(),
        });
        let agency_id = agency.id.clone();
        self.unit_of_work
            .commit(vec![AggregateChange::SaveAgency(agency)], vec![event])
            .await
            .into_result()?;
        Ok(Some(agency_id))
    }

    async fn has_activity_since(
        &self,
        agency_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, UseCaseError> {
        let latest = self
            .convention_repo
            .latest_validation_date_for_agency(agency_id)
            .await
            .map_err(|e| UseCaseError::commit(e.to_string()))?;
        Ok(matches!(latest, Some(date) if date >= cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::entity::{AgencyStatus, UserRight};
    use crate::agency::repository::InMemoryAgencyRepository;
    use crate::convention::entity::{Convention, ConventionStatus};
    use crate::convention::repository::InMemoryConventionRepository;
    use crate::usecase::InMemoryUnitOfWork;
    use crate::user::repository::InMemoryUserRepository;
    use chrono::TimeZone;
    use imf_common::{AgencyRole, FixedClock, SequentialIds};
    use imf_outbox::{EventTopic, InMemoryOutboxRepository};
    use std::collections::HashSet;

    struct Fixture {
        agencies: Arc<InMemoryAgencyRepository>,
        conventions: Arc<InMemoryConventionRepository>,
        outbox: Arc<InMemoryOutboxRepository>,
        use_case: CloseInactiveAgenciesUseCase<InMemoryUnitOfWork>,
    }

    fn fixture() -> Fixture {
        let agencies = Arc::new(InMemoryAgencyRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let conventions = Arc::new(InMemoryConventionRepository::new());
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
        let use_case = CloseInactiveAgenciesUseCase::new(
            agencies.clone(),
            conventions.clone(),
            unit_of_work,
            factory,
        );
        Fixture {
            agencies,
            conventions,
            outbox,
            use_case,
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn active_agency(id: &str, refers_to: Option<&str>) -> Agency {
        let mut agency = Agency::new(
            id,
            format!("Agency {}", id),
            refers_to.map(String::from),
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
        );
        agency.set_user_right(
            "validator-0",
            UserRight::new([AgencyRole::Validator], true),
        );
        agency.activate().unwrap();
        agency
    }

    fn validated_convention(id: &str, agency_id: &str, date: DateTime<Utc>) -> Convention {
        Convention::new(
            id,
            agency_id,
            ConventionStatus::AcceptedByValidator,
            Some(date),
        )
    }

    #[tokio::test]
    async fn test_closes_agency_without_recent_activity() {
        let fixture = fixture();
        fixture.agencies.insert(active_agency("agency-stale", None));
        fixture.agencies.insert(active_agency("agency-busy", None));
        // Activity before the cutoff does not count.
        fixture.conventions.insert(validated_convention(
            "conv-old",
            "agency-stale",
            Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap(),
        ));
        fixture.conventions.insert(validated_convention(
            "conv-new",
            "agency-busy",
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        ));

        let report = fixture
            .use_case
            .execute(CloseInactiveAgenciesCommand {
                inactivity_cutoff: cutoff(),
            })
            .await
            .unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.closed, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.closed_agency_ids, vec!["agency-stale".to_string()]);

        let stale = fixture.agencies.get("agency-stale").unwrap();
        assert_eq!(stale.status, AgencyStatus::Closed);
        let busy = fixture.agencies.get("agency-busy").unwrap();
        assert_eq!(busy.status, AgencyStatus::Active);

        let events = fixture.outbox.all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), EventTopic::AgencyClosed);
    }

    #[tokio::test]
    async fn test_child_activity_keeps_parent_open() {
        let fixture = fixture();
        fixture.agencies.insert(active_agency("agency-parent", None));
        fixture
            .agencies
            .insert(active_agency("agency-child", Some("agency-parent")));
        // Only the delegated child has validated anything recently.
        fixture.conventions.insert(validated_convention(
            "conv-1",
            "agency-child",
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        ));

        let report = fixture
            .use_case
            .execute(CloseInactiveAgenciesCommand {
                inactivity_cutoff: cutoff(),
            })
            .await
            .unwrap();

        assert_eq!(report.closed, 0);
        assert_eq!(report.kept, 2);
        let parent = fixture.agencies.get("agency-parent").unwrap();
        assert_eq!(parent.status, AgencyStatus::Active);
    }

    #[tokio::test]
    async fn test_never_active_agency_closed() {
        let fixture = fixture();
        fixture.agencies.insert(active_agency("agency-1", None));

        let report = fixture
            .use_case
            .execute(CloseInactiveAgenciesCommand {
                inactivity_cutoff: cutoff(),
            })
            .await
            .unwrap();

        assert_eq!(report.closed, 1);
        assert_eq!(
            fixture.agencies.get("agency-1").unwrap().status,
            AgencyStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_empty_scan() {
        let fixture = fixture();
        let report = fixture
            .use_case
            .execute(CloseInactiveAgenciesCommand {
                inactivity_cutoff: cutoff(),
            })
            .await
            .unwrap();
        assert_eq!(report, ClosureReport::default());
        assert!(fixture.outbox.all().is_empty());
    }
}
