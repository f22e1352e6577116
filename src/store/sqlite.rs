//! SQLite-backed durable user-record store.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{DurableStore, UserRecord, UserUpdate};
use crate::error::{PresenceError, Result};

pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY NOT NULL,
            active INTEGER,
            last_seen INTEGER,
            tokens TEXT NOT NULL DEFAULT '[]',
            updated_at DATETIME,
            CHECK (user_id != '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteDurableStore {
    pool: SqlitePool,
}

impl SqliteDurableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `db_path` and migrate it
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = create_pool(db_path).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Provision a user record. Existing records are left as they are.
    pub async fn insert_user(&self, user_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_tokens(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(PresenceError::from)
}

impl DurableStore for SqliteDurableStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT user_id, active, last_seen, tokens, updated_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tokens: String = row.try_get("tokens")?;
        Ok(Some(UserRecord {
            user_id: row.try_get("user_id")?,
            active: row.try_get::<Option<bool>, _>("active")?,
            last_seen: row.try_get::<Option<i64>, _>("last_seen")?,
            tokens: decode_tokens(&tokens)?,
            updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        }))
    }

    async fn update(&self, user_id: &str, update: UserUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let tokens: Option<String> = sqlx::query_scalar("SELECT tokens FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(tokens) = tokens else {
            return Err(PresenceError::UserNotFound(user_id.to_string()));
        };

        let mut tokens = decode_tokens(&tokens)?;
        if let Some(token) = &update.add_token {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.clone());
            }
        }

        sqlx::query(
            r#"
            UPDATE users
            SET active = COALESCE(?, active),
                last_seen = COALESCE(?, last_seen),
                tokens = ?,
                updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(update.active)
        .bind(update.last_seen)
        .bind(serde_json::to_string(&tokens)?)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteDurableStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteDurableStore::open(&temp_dir.path().join("users.db"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let (_dir, store) = open_temp().await;
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_record_has_no_presence() {
        let (_dir, store) = open_temp().await;
        store.insert_user("u1").await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.active, None);
        assert_eq!(record.last_seen, None);
        assert!(record.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let (_dir, store) = open_temp().await;
        store.insert_user("u1").await.unwrap();

        store.update("u1", UserUpdate::token("tok-1")).await.unwrap();
        store
            .update("u1", UserUpdate::presence(true, 1000))
            .await
            .unwrap();
        store.update("u1", UserUpdate::last_seen(2000)).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.active, Some(true));
        assert_eq!(record.last_seen, Some(2000));
        assert_eq!(record.tokens, vec!["tok-1".to_string()]);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_token_not_added_twice() {
        let (_dir, store) = open_temp().await;
        store.insert_user("u1").await.unwrap();
        store.update("u1", UserUpdate::token("tok")).await.unwrap();
        store.update("u1", UserUpdate::token("tok")).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_user_creates_nothing() {
        let (_dir, store) = open_temp().await;
        let err = store
            .update("ghost", UserUpdate::presence(true, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::UserNotFound(_)));
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_user_is_idempotent() {
        let (_dir, store) = open_temp().await;
        store.insert_user("u1").await.unwrap();
        store
            .update("u1", UserUpdate::presence(false, 7))
            .await
            .unwrap();
        store.insert_user("u1").await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.active, Some(false));
    }

    #[tokio::test]
    async fn test_check() {
        let (_dir, store) = open_temp().await;
        store.check().await.unwrap();
    }
}
