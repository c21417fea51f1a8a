/// Durable per-user credential state, keyed by email.
///
/// The refresh protocol only sees the `UserStore` trait; the Postgres
/// implementation lives here. The one operation with real concurrency
/// discipline is `update_credentials`: the UPDATE is conditioned on the
/// refresh-token hash observed at verification time, so two refreshes
/// racing to rotate the same user's credentials cannot both succeed.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// A user's identity and credential state as stored.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Network origin recorded at the last successful issuance or rotation.
    pub origin_ip: String,
    /// Current per-user signing secret. Rotated on every refresh, which
    /// implicitly revokes every previously issued access token.
    pub signing_secret: String,
    /// bcrypt digest of the currently valid refresh token.
    pub refresh_token_hash: String,
}

/// Everything needed to create a user record.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub origin_ip: &'a str,
    pub signing_secret: &'a str,
    pub refresh_token_hash: &'a str,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Fails with `DuplicateEmail` if the email exists.
    async fn create(&self, user: NewUser<'_>) -> Result<Uuid, StoreError>;

    /// Look up a user by email. Fails with `NotFound` if absent.
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Atomically replace origin IP, signing secret, and refresh-token hash.
    ///
    /// The write only applies while `expected_refresh_token_hash` is still
    /// the stored hash; a stale caller gets `RotationConflict` instead of
    /// clobbering a concurrent winner's rotation.
    async fn update_credentials(
        &self,
        email: &str,
        new_ip: &str,
        new_secret: &str,
        new_refresh_token_hash: &str,
        expected_refresh_token_hash: &str,
    ) -> Result<Uuid, StoreError>;
}

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser<'_>) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, password_hash, origin_ip, signing_secret,
                 refresh_token_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.origin_ip)
        .bind(user.signing_secret)
        .bind(user.refresh_token_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, String, String)>(
            r#"
            SELECT id, email, password_hash, origin_ip, signing_secret, refresh_token_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(User {
            id: row.0,
            email: row.1,
            password_hash: row.2,
            origin_ip: row.3,
            signing_secret: row.4,
            refresh_token_hash: row.5,
        })
    }

    async fn update_credentials(
        &self,
        email: &str,
        new_ip: &str,
        new_secret: &str,
        new_refresh_token_hash: &str,
        expected_refresh_token_hash: &str,
    ) -> Result<Uuid, StoreError> {
        // Secret and refresh hash move together in one statement; a partial
        // write would leave a dangling live pair.
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET origin_ip = $1,
                signing_secret = $2,
                refresh_token_hash = $3,
                updated_at = $4
            WHERE email = $5
              AND refresh_token_hash = $6
            RETURNING id
            "#,
        )
        .bind(new_ip)
        .bind(new_secret)
        .bind(new_refresh_token_hash)
        .bind(Utc::now())
        .bind(email)
        .bind(expected_refresh_token_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = updated {
            return Ok(id);
        }

        // No row matched: either the user vanished or a concurrent refresh
        // already rotated the hash out from under us.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Err(StoreError::RotationConflict)
        } else {
            Err(StoreError::NotFound)
        }
    }
}
