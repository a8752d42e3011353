//! User Entity
//!
//! Identity record for platform users. Users are created lazily: on first
//! login, or on first reference by email (for example when added as an
//! agency validator before ever logging in). The optional `external_id`
//! is the OAuth provider's subject identifier; two records matching the
//! same person (one by external id, one by email) are merged by the
//! identity-conflict resolution use case.

use chrono::{DateTime, Utc};
use imf_common::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// OAuth subject id (ProConnect), set once the user has logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: impl Into<UserId>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            external_id: None,
            created_at,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_user_has_no_external_identity() {
        let user = User::new(
            "user-1",
            "jean.dupont@example.com",
            "Jean",
            "Dupont",
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        );
        assert!(user.external_id.is_none());
        assert_eq!(user.display_name(), "Jean Dupont");
    }

    #[test]
    fn test_with_external_id() {
        let user = User::new(
            "user-1",
            "jean.dupont@example.com",
            "Jean",
            "Dupont",
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        )
        .with_external_id("pc-sub-123");
        assert_eq!(user.external_id.as_deref(), Some("pc-sub-123"));
    }
}
