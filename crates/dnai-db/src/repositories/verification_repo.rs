//! Verification repository implementation
//!
//! Profile verification flags, phone OTP tokens, 2FA backup codes, login
//! activity and the security/notification procedures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnai_core::{
    models::{
        LoginActivity, NewLoginActivity, NewNotification, NewPhoneToken, PhoneVerificationToken,
        SecurityEvent, VerificationProfile,
    },
    traits::VerificationRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of VerificationRepository
pub struct PgVerificationRepository {
    pool: PgPool,
}

impl PgVerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Remove the first backup code matching `code`, ignoring case and
/// surrounding whitespace. `None` when nothing matched.
fn remove_backup_code(codes: &[String], code: &str) -> Option<Vec<String>> {
    let normalized = code.trim().to_uppercase();
    let index = codes
        .iter()
        .position(|c| c.trim().to_uppercase() == normalized)?;

    let mut remaining = codes.to_vec();
    remaining.remove(index);
    Some(remaining)
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    error!("Database error {}: {}", context, e);
    AppError::Database(format!("Failed {}: {}", context, e))
}

#[async_trait]
impl VerificationRepository for PgVerificationRepository {
    #[instrument(skip(self))]
    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<VerificationProfile>> {
        let row = sqlx::query_as::<sqlx::Postgres, ProfileRow>(
            r#"
            SELECT
                p.id AS user_id,
                COALESCE(p.email_verified, FALSE) AS email_verified,
                COALESCE(p.phone_verified, FALSE) AS phone_verified,
                p.phone AS phone_number,
                COALESCE(t.enabled AND t.verified, FALSE) AS two_factor_enabled,
                p.kyc_status
            FROM user_profiles p
            LEFT JOIN user_2fa t ON t.user_id = p.id
            WHERE p.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetching verification profile", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, token), fields(user_id = %token.user_id))]
    async fn create_phone_token(&self, token: &NewPhoneToken) -> AppResult<PhoneVerificationToken> {
        let row = sqlx::query_as::<sqlx::Postgres, TokenRow>(
            r#"
            INSERT INTO phone_verification_tokens (user_id, phone_number, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, phone_number, token_hash,
                      expires_at, COALESCE(attempts, 0) AS attempts, used_at, created_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.phone_number)
        .bind(&token.code_hash)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("storing phone verification token", e))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn pending_phone_tokens(
        &self,
        user_id: Uuid,
        phone_number: &str,
    ) -> AppResult<Vec<PhoneVerificationToken>> {
        let rows = sqlx::query_as::<sqlx::Postgres, TokenRow>(
            r#"
            SELECT id, user_id, phone_number, token_hash,
                   expires_at, COALESCE(attempts, 0) AS attempts, used_at, created_at
            FROM phone_verification_tokens
            WHERE user_id = $1 AND phone_number = $2 AND used_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(phone_number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetching phone verification tokens", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_token_used(&self, token_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE phone_verification_tokens SET used_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("marking token used", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_token_attempts(&self, token_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE phone_verification_tokens SET attempts = COALESCE(attempts, 0) + 1 WHERE id = $1",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("updating token attempts", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_phone_verified(&self, user_id: Uuid, phone_number: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE user_profiles
            SET phone_verified = TRUE, phone = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(phone_number)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("updating phone verification", e))?;

        info!("Phone verified for user {}", user_id);
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn consume_backup_code(&self, user_id: Uuid, code: &str) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("starting transaction", e))?;

        let codes: Option<Option<Vec<String>>> =
            sqlx::query_scalar("SELECT backup_codes FROM user_2fa WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("reading backup codes", e))?;

        let codes = codes.flatten().unwrap_or_default();
        let Some(remaining) = remove_backup_code(&codes, code) else {
            debug!("No backup code matched for user {}", user_id);
            return Ok(false);
        };

        sqlx::query("UPDATE user_2fa SET backup_codes = $2, last_used_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(&remaining)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("consuming backup code", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("committing backup code", e))?;

        info!("Backup code consumed for user {}, {} left", user_id, remaining.len());
        Ok(true)
    }

    #[instrument(skip(self, event), fields(user_id = %event.user_id, event_type = %event.event_type))]
    async fn log_security_event(&self, event: &SecurityEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            SELECT log_security_event(
                p_user_id => $1,
                p_event_type => $2,
                p_severity => $3,
                p_details => $4
            )
            "#,
        )
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("logging security event", e))?;
        Ok(())
    }

    #[instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn create_notification(&self, notification: &NewNotification) -> AppResult<()> {
        sqlx::query(
            r#"
            SELECT create_notification(
                p_user_id => $1,
                p_type => $2,
                p_title => $3,
                p_message => $4
            )
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.message)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("creating notification", e))?;
        Ok(())
    }

    #[instrument(skip(self, activity), fields(user_id = %activity.user_id))]
    async fn log_login_activity(&self, activity: &NewLoginActivity) -> AppResult<()> {
        sqlx::query(
            r#"
            SELECT log_login_activity(
                p_user_id => $1,
                p_session_id => $2,
                p_ip_address => $3,
                p_user_agent => $4,
                p_login_method => $5
            )
            "#,
        )
        .bind(activity.user_id)
        .bind(activity.session_id.as_deref())
        .bind(activity.ip_address.as_deref())
        .bind(activity.user_agent.as_deref())
        .bind(&activity.login_method)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("logging login activity", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent_login_activity(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LoginActivity>> {
        let rows = sqlx::query_as::<sqlx::Postgres, LoginRow>(
            r#"
            SELECT
                id, user_id, session_id,
                ip_address::text AS ip_address,
                user_agent, device_type,
                browser_name, os_name,
                COALESCE(login_method, 'email') AS login_method,
                login_at, logout_at,
                COALESCE(is_active, FALSE) AS is_active
            FROM login_activity
            WHERE user_id = $1
            ORDER BY login_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetching login activity", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn deactivate_login(&self, user_id: Uuid, activity_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE login_activity
            SET is_active = FALSE, logout_at = NOW()
            WHERE id = $1 AND user_id = $2 AND is_active = TRUE
            "#,
        )
        .bind(activity_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("revoking session", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    email_verified: bool,
    phone_verified: bool,
    phone_number: Option<String>,
    two_factor_enabled: bool,
    kyc_status: Option<String>,
}

impl From<ProfileRow> for VerificationProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            email_verified: row.email_verified,
            phone_verified: row.phone_verified,
            phone_number: row.phone_number,
            two_factor_enabled: row.two_factor_enabled,
            kyc_status: row.kyc_status,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    phone_number: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for PhoneVerificationToken {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            phone_number: row.phone_number,
            code_hash: row.token_hash,
            expires_at: row.expires_at,
            attempts: row.attempts,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LoginRow {
    id: Uuid,
    user_id: Uuid,
    session_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    device_type: Option<String>,
    browser_name: Option<String>,
    os_name: Option<String>,
    login_method: String,
    login_at: DateTime<Utc>,
    logout_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl From<LoginRow> for LoginActivity {
    fn from(row: LoginRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            device_type: row.device_type,
            browser: row.browser_name,
            os: row.os_name,
            login_method: row.login_method,
            login_at: row.login_at,
            logout_at: row.logout_at,
            is_active: row.is_active,
        }
    }
}
