//! User accounts: credential checks and lookups used by auth and broadcasts.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::PgPool;
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::User;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Same message for unknown email, wrong password and inactive account.
const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub struct UserService;

impl UserService {
    /// Hash a password with Argon2id and a random salt.
    pub fn hash_password(password: &str) -> Result<String, AppError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password cannot exceed {} characters",
                MAX_PASSWORD_LEN
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Stored password hash is malformed: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Check an email/password pair and record the login.
    pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<User, AppError> {
        let user: Option<User> = sqlx::query_as(
            "SELECT * FROM users WHERE lower(email) = lower($1) AND status = 'active'",
        )
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

        let Some(user) = user else {
            tracing::debug!(email, "Login for unknown or inactive account");
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        };

        // Argon2 verification is CPU-bound.
        let candidate = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || Self::verify_password(&candidate, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))??;

        if !valid {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        }

        let user: User = sqlx::query_as(
            "UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user.id)
        .fetch_one(pool)
        .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(user)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Load a user that may still act on the system.
    pub async fn find_active(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1 AND status = 'active'")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::Forbidden("User is inactive or no longer exists".to_string()))
    }

    /// Ids of every active user, the audience of an admin broadcast.
    pub async fn active_ids(pool: &PgPool) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar("SELECT id FROM users WHERE status = 'active' ORDER BY created_at")
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }

    /// Create an admin account, or reset an existing account with the same
    /// email to an active admin with the given name and password.
    pub async fn upsert_admin(
        pool: &PgPool,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User, AppError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation(format!("Invalid email '{}'", email)));
        }
        if name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        let password_hash = Self::hash_password(password)?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, status)
            VALUES ($1, $2, $3, $4, 'admin', 'active')
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                password_hash = EXCLUDED.password_hash,
                role = 'admin',
                status = 'active',
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .bind(email)
        .bind(&password_hash)
        .fetch_one(pool)
        .await?;

        tracing::info!(user_id = %user.id, email = %user.email, "Admin account ready");
        Ok(user)
    }
}
