use super::KeyStore;
use crate::crypto::{self, EncryptedSecret};
use crate::errors::PassError;
use crate::models::{KeyStatus, SigningKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretBox};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;

/// Row shape of the `signing_keys` table.
#[derive(sqlx::FromRow)]
struct SigningKeyRow {
    key_id: String,
    secret_encrypted: Vec<u8>,
    encryption_nonce: Vec<u8>,
    encryption_tag: Vec<u8>,
    status: String,
    created_at: DateTime<Utc>,
    activates_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        key_id, secret_encrypted, encryption_nonce, encryption_tag,
        status, created_at, activates_at, expires_at
    FROM signing_keys
"#;

/// PostgreSQL-backed key store.
///
/// Key material is encrypted with AES-256-GCM under the master key before it
/// is written and decrypted on every read.
pub struct PgKeyStore {
    pool: PgPool,
    master_key: SecretBox<Vec<u8>>,
}

impl fmt::Debug for PgKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgKeyStore")
            .field("pool", &self.pool)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl PgKeyStore {
    pub fn new(pool: PgPool, master_key: SecretBox<Vec<u8>>) -> Self {
        Self { pool, master_key }
    }

    fn decode_row(&self, row: SigningKeyRow) -> Result<SigningKey, PassError> {
        let status = KeyStatus::from_str(&row.status).map_err(PassError::StoreRead)?;
        let encrypted = EncryptedSecret {
            encrypted_data: SecretBox::new(Box::new(row.secret_encrypted)),
            nonce: row.encryption_nonce,
            tag: row.encryption_tag,
        };
        let secret = crypto::decrypt_secret(&encrypted, self.master_key.expose_secret())?;

        Ok(SigningKey {
            key_id: row.key_id,
            secret,
            created_at: row.created_at,
            activates_at: row.activates_at,
            expires_at: row.expires_at,
            status,
        })
    }

    async fn fetch_status(&self, key_id: &str) -> Result<KeyStatus, PassError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM signing_keys WHERE key_id = $1")
                .bind(key_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PassError::StoreWrite(format!("Failed to fetch key status: {}", e)))?;

        let status =
            status.ok_or_else(|| PassError::StoreWrite(format!("Signing key not found: {}", key_id)))?;
        KeyStatus::from_str(&status).map_err(PassError::StoreWrite)
    }
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn get_active_key(&self) -> Result<SigningKey, PassError> {
        let row = sqlx::query_as::<_, SigningKeyRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = 'active' LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PassError::StoreRead(format!("Failed to fetch active key: {}", e)))?;

        let row = row.ok_or(PassError::NoActiveKey)?;
        self.decode_row(row)
    }

    async fn get_key_by_id(&self, key_id: &str) -> Result<Option<SigningKey>, PassError> {
        let row = sqlx::query_as::<_, SigningKeyRow>(&format!(
            "{SELECT_COLUMNS} WHERE key_id = $1 AND status IN ('active', 'retired')"
        ))
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PassError::StoreRead(format!("Failed to fetch key by id: {}", e)))?;

        row.map(|row| self.decode_row(row)).transpose()
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), PassError> {
        let encrypted =
            crypto::encrypt_secret(key.secret.expose_secret(), self.master_key.expose_secret())?;

        sqlx::query(
            r#"
            INSERT INTO signing_keys (
                key_id, secret_encrypted, encryption_nonce, encryption_tag,
                encryption_algorithm, status, created_at, activates_at, expires_at
            )
            VALUES ($1, $2, $3, $4, 'AES-256-GCM', 'pending', $5, $6, $7)
            "#,
        )
        .bind(&key.key_id)
        .bind(encrypted.encrypted_data.expose_secret())
        .bind(&encrypted.nonce)
        .bind(&encrypted.tag)
        .bind(key.created_at)
        .bind(key.activates_at)
        .bind(key.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PassError::StoreWrite(format!("Failed to insert signing key: {}", e)))?;

        tracing::debug!(target: "gatepass.store", key_id = %key.key_id, "Inserted pending signing key");
        Ok(())
    }

    async fn activate_key(&self, key_id: &str) -> Result<(), PassError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PassError::StoreWrite(format!("Failed to start transaction: {}", e)))?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM signing_keys WHERE key_id = $1 FOR UPDATE")
                .bind(key_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| PassError::StoreWrite(format!("Failed to lock signing key: {}", e)))?;

        let status =
            status.ok_or_else(|| PassError::StoreWrite(format!("Signing key not found: {}", key_id)))?;
        if KeyStatus::from_str(&status).map_err(PassError::StoreWrite)? != KeyStatus::Pending {
            // Dropping the transaction rolls it back
            return Ok(());
        }

        // Demote before promoting: the partial unique index allows only one
        // active row at statement boundaries.
        sqlx::query(
            r#"
            UPDATE signing_keys
            SET status = 'retired', updated_at = NOW()
            WHERE status = 'active'
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| PassError::StoreWrite(format!("Failed to retire previous key: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE signing_keys
            SET status = 'active', updated_at = NOW()
            WHERE key_id = $1
            "#,
        )
        .bind(key_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| PassError::StoreWrite(format!("Failed to activate key: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| PassError::StoreWrite(format!("Failed to commit activation: {}", e)))?;

        tracing::debug!(target: "gatepass.store", key_id = %key_id, "Activated signing key");
        Ok(())
    }

    async fn retire_key(&self, key_id: &str) -> Result<(), PassError> {
        let result = sqlx::query(
            r#"
            UPDATE signing_keys
            SET status = 'retired', updated_at = NOW()
            WHERE key_id = $1 AND status IN ('pending', 'active')
            "#,
        )
        .bind(key_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PassError::StoreWrite(format!("Failed to retire key: {}", e)))?;

        if result.rows_affected() == 0 {
            // Either already retired/purged (no-op) or unknown (error)
            self.fetch_status(key_id).await?;
        } else {
            tracing::debug!(target: "gatepass.store", key_id = %key_id, "Retired signing key");
        }
        Ok(())
    }

    async fn purge_key(&self, key_id: &str) -> Result<(), PassError> {
        let result = sqlx::query(
            r#"
            UPDATE signing_keys
            SET status = 'purged', updated_at = NOW()
            WHERE key_id = $1 AND status IN ('pending', 'retired')
            "#,
        )
        .bind(key_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PassError::StoreWrite(format!("Failed to purge key: {}", e)))?;

        if result.rows_affected() > 0 {
            tracing::debug!(target: "gatepass.store", key_id = %key_id, "Purged signing key");
            return Ok(());
        }

        match self.fetch_status(key_id).await? {
            KeyStatus::Active => Err(PassError::StoreWrite(format!(
                "Refusing to purge active signing key: {}",
                key_id
            ))),
            _ => Ok(()),
        }
    }

    async fn list_purgeable(&self, now: DateTime<Utc>) -> Result<Vec<String>, PassError> {
        sqlx::query_scalar(
            r#"
            SELECT key_id
            FROM signing_keys
            WHERE status IN ('retired', 'pending')
                AND expires_at < $1
            ORDER BY key_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PassError::StoreRead(format!("Failed to list purgeable keys: {}", e)))
    }

    async fn list_verification_keys(&self) -> Result<Vec<SigningKey>, PassError> {
        let rows = sqlx::query_as::<_, SigningKeyRow>(&format!(
            "{SELECT_COLUMNS} WHERE status IN ('active', 'retired') ORDER BY activates_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PassError::StoreRead(format!("Failed to list verification keys: {}", e)))?;

        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }
}
