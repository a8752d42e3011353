//! User Repository

use crate::shared::Result;
use crate::user::entity::User;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Lookup by email, lowercased by callers.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Lookup by OAuth subject id.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>>;
}

/// In-memory implementation for tests and development wiring.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<BTreeMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn delete(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().remove(id)
    }

    /// Snapshot for assertions.
    pub fn get(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user(id: &str, email: &str, external_id: Option<&str>) -> User {
        let mut u = User::new(
            id,
            email,
            "Jean",
            "Dupont",
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        );
        if let Some(ext) = external_id {
            u = u.with_external_id(ext);
        }
        u
    }

    #[tokio::test]
    async fn test_lookups() {
        let repo = InMemoryUserRepository::new();
        repo.insert(user("user-1", "a@example.com", Some("pc-1")));
        repo.insert(user("user-2", "b@example.com", None));

        assert_eq!(
            repo.find_by_email("b@example.com").await.unwrap().unwrap().id,
            "user-2"
        );
        assert_eq!(
            repo.find_by_external_id("pc-1").await.unwrap().unwrap().id,
            "user-1"
        );
        assert!(repo.find_by_external_id("pc-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryUserRepository::new();
        repo.insert(user("user-1", "a@example.com", None));
        assert!(repo.delete("user-1").is_some());
        assert!(repo.get_by_id("user-1").await.unwrap().is_none());
    }
}
