//! Agency Repository
//!
//! Read-side access to agencies. Writes go through the unit of work so
//! aggregate changes and domain events commit atomically.

use crate::agency::entity::{Agency, AgencyStatus};
use crate::shared::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[async_trait]
pub trait AgencyRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Agency>>;

    /// All agencies in Active status, for the automatic-closure scan.
    async fn get_all_active(&self) -> Result<Vec<Agency>>;

    /// Agencies whose `refers_to_agency_id` points at the given agency.
    async fn get_children(&self, parent_id: &str) -> Result<Vec<Agency>>;

    /// Agencies where the given user holds any right, for per-agency
    /// merging during identity-conflict resolution.
    async fn get_agencies_with_rights_for_user(&self, user_id: &str) -> Result<Vec<Agency>>;
}

/// In-memory implementation for tests and development wiring.
#[derive(Default)]
pub struct InMemoryAgencyRepository {
    agencies: Mutex<BTreeMap<String, Agency>>,
}

impl InMemoryAgencyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, agency: Agency) {
        self.agencies
            .lock()
            .unwrap()
            .insert(agency.id.clone(), agency);
    }

    /// Snapshot for assertions.
    pub fn get(&self, id: &str) -> Option<Agency> {
        self.agencies.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl AgencyRepository for InMemoryAgencyRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Agency>> {
        Ok(self.agencies.lock().unwrap().get(id).cloned())
    }

    async fn get_all_active(&self) -> Result<Vec<Agency>> {
        Ok(self
            .agencies
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.status == AgencyStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<Agency>> {
        Ok(self
            .agencies
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.refers_to_agency_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn get_agencies_with_rights_for_user(&self, user_id: &str) -> Result<Vec<Agency>> {
        Ok(self
            .agencies
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.users_rights.contains_key(user_id))
            .cloned()
            .collect())
    }
}
