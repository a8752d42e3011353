//! PostgreSQL User Repository

use crate::shared::Result;
use crate::user::entity::User;
use crate::user::repository::UserRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;

/// Insert or update a user row inside an open transaction. Shared with
/// the unit of work.
pub async fn save_user_tx(tx: &mut Transaction<'_, Postgres>, user: &User) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO users (id, email, first_name, last_name, external_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
           email = EXCLUDED.email, \
           first_name = EXCLUDED.first_name, \
           last_name = EXCLUDED.last_name, \
           external_id = EXCLUDED.external_id",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.external_id)
    .bind(user.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Hard-delete a user row inside an open transaction. Only the
/// identity-conflict resolution path deletes users.
pub async fn delete_user_tx(tx: &mut Transaction<'_, Postgres>, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the users table if it does not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                external_id TEXT,
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_external_id ON users(external_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Initialized users schema");
        Ok(())
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> User {
        let created_at: DateTime<Utc> = row.get("created_at");
        User {
            id: row.get("id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            external_id: row.get("external_id"),
            created_at,
        }
    }

    async fn fetch_one_where(&self, clause: &str, bind: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT id, email, first_name, last_name, external_id, created_at \
             FROM users WHERE {}",
            clause
        );
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::parse_row))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        self.fetch_one_where("id = $1", id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        self.fetch_one_where("external_id = $1", external_id).await
    }
}
