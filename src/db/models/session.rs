//! Session store: active bearer tokens keyed by their SHA-256 digest.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Record `token` as an active session of `user_id`.
pub async fn login(pool: &SqlitePool, user_id: i64, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR REPLACE INTO auth (token_hash, user_id) VALUES (?, ?)")
        .bind(hash_token(token))
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Whether `token` belongs to a session that has not been logged out.
pub async fn is_active(pool: &SqlitePool, token: &str) -> Result<bool, sqlx::Error> {
    let user_id: Option<i64> = sqlx::query_scalar("SELECT user_id FROM auth WHERE token_hash = ?")
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;
    Ok(user_id.is_some())
}

/// Remove the session for `token`. Returns whether a session existed.
pub async fn logout(pool: &SqlitePool, token: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
