//! Convention Repository
//!
//! Read-only view of conventions as the agency lifecycle needs them.

use crate::convention::entity::Convention;
use crate::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

#[async_trait]
pub trait ConventionRepository: Send + Sync {
    /// Most recent validation date among the agency's fully validated
    /// conventions. None when the agency never had one.
    async fn latest_validation_date_for_agency(
        &self,
        agency_id: &str,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// In-memory implementation for tests and development wiring.
#[derive(Default)]
pub struct InMemoryConventionRepository {
    conventions: Mutex<Vec<Convention>>,
}

impl InMemoryConventionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, convention: Convention) {
        self.conventions.lock().unwrap().push(convention);
    }
}

#[async_trait]
impl ConventionRepository for InMemoryConventionRepository {
    async fn latest_validation_date_for_agency(
        &self,
        agency_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .conventions
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.agency_id == agency_id && c.status.is_validated())
            .filter_map(|c| c.date_validation)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convention::entity::ConventionStatus;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_latest_validation_date() {
        let repo = InMemoryConventionRepository::new();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        repo.insert(Convention::new(
            "conv-1",
            "agency-1",
            ConventionStatus::AcceptedByValidator,
            Some(older),
        ));
        repo.insert(Convention::new(
            "conv-2",
            "agency-1",
            ConventionStatus::AcceptedByValidator,
            Some(newer),
        ));
        // In-review conventions do not count as activity.
        repo.insert(Convention::new(
            "conv-3",
            "agency-1",
            ConventionStatus::InReview,
            None,
        ));

        assert_eq!(
            repo.latest_validation_date_for_agency("agency-1")
                .await
                .unwrap(),
            Some(newer)
        );
        assert_eq!(
            repo.latest_validation_date_for_agency("agency-2")
                .await
                .unwrap(),
            None
        );
    }
}
