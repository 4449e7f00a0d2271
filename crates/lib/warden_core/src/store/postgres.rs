//! PostgreSQL [`AuthStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::models::auth::{LoginRecord, NewSession, NewUser, Permission, Role, Session, User};

type UserRow = (Uuid, String, String, String, DateTime<Utc>, DateTime<Utc>);
type LoginRow = (Uuid, Uuid, String, i64, DateTime<Utc>);
type SessionRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const USER_COLUMNS: &str = "id, email, password_hash, password_salt, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, user_id, login_id, token_hash, expires_at, created_at, revoked_at";

fn user_from_row((id, email, password_hash, password_salt, created_at, updated_at): UserRow) -> User {
    User {
        id,
        email,
        password_hash,
        password_salt,
        created_at,
        updated_at,
    }
}

fn login_from_row((id, user_id, device_id, login_count, last_login_at): LoginRow) -> LoginRecord {
    LoginRecord {
        id,
        user_id,
        device_id,
        login_count,
        last_login_at,
    }
}

fn session_from_row(
    (id, user_id, login_id, token_hash, expires_at, created_at, revoked_at): SessionRow,
) -> Session {
    Session {
        id,
        user_id,
        login_id,
        token_hash,
        expires_at,
        created_at,
        revoked_at,
    }
}

/// Single-statement insert-or-increment, safe under concurrent logins.
async fn upsert_login<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    device_id: &str,
    at: DateTime<Utc>,
) -> StoreResult<LoginRecord> {
    let row = sqlx::query_as::<_, LoginRow>(
        "INSERT INTO user_logins (id, user_id, device_id, login_count, last_login_at) \
         VALUES ($1, $2, $3, 1, $4) \
         ON CONFLICT (user_id, device_id) DO UPDATE \
           SET login_count = user_logins.login_count + 1, \
               last_login_at = EXCLUDED.last_login_at \
         RETURNING id, user_id, device_id, login_count, last_login_at",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(device_id)
    .bind(at)
    .fetch_one(executor)
    .await?;
    Ok(login_from_row(row))
}

async fn insert_session<'e, E: PgExecutor<'e>>(
    executor: E,
    new: &NewSession,
    login_id: Uuid,
) -> StoreResult<Session> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO auth_sessions (id, user_id, login_id, token_hash, expires_at, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(new.user_id)
    .bind(login_id)
    .bind(&new.token_hash)
    .bind(new.expires_at)
    .bind(new.created_at)
    .fetch_one(executor)
    .await?;
    Ok(session_from_row(row))
}

/// Postgres-backed store over a shared pool.
#[derive(Debug, Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, password_hash, password_salt, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.password_salt)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e
                && db.is_unique_violation()
            {
                return StoreError::DuplicateEmail;
            }
            StoreError::Db(e)
        })?;
        Ok(user_from_row(row))
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn upsert_login_record(
        &self,
        user_id: Uuid,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<LoginRecord> {
        upsert_login(&self.pool, user_id, device_id, at).await
    }

    async fn create_session(
        &self,
        device_id: &str,
        session: NewSession,
    ) -> StoreResult<(Session, LoginRecord)> {
        let mut tx = self.pool.begin().await?;
        let login = upsert_login(&mut *tx, session.user_id, device_id, session.created_at).await?;
        let session = insert_session(&mut *tx, &session, login.id).await?;
        tx.commit().await?;
        Ok((session, login))
    }

    async fn get_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM auth_sessions WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(session_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = $2 \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        new: NewSession,
    ) -> StoreResult<Option<Session>> {
        let mut tx = self.pool.begin().await?;
        let login_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE auth_sessions SET revoked_at = $2 \
             WHERE id = $1 AND revoked_at IS NULL \
             RETURNING login_id",
        )
        .bind(old_session_id)
        .bind(new.created_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(login_id) = login_id else {
            tx.rollback().await?;
            return Ok(None);
        };
        let session = insert_session(&mut *tx, &new, login_id).await?;
        tx.commit().await?;
        Ok(Some(session))
    }

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT r.id, r.name, r.description \
             FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, description)| Role {
                id,
                name,
                description,
            })
            .collect())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT p.id, p.name, p.description \
             FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, description)| Permission {
                id,
                name,
                description,
            })
            .collect())
    }

    async fn has_active_entitlement(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
               SELECT 1 FROM entitlements \
               WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2))",
        )
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
