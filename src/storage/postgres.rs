use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use super::{PreferenceStore, StoreStats, UserPreference};
use crate::error::StoreError;
use crate::i18n::Language;

const SEARCHES: &str = "searches";

/// PostgreSQL backend; every write is an upsert.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    default_footer: String,
}

impl PgStore {
    pub async fn connect(database_url: &str, default_footer: impl Into<String>) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        let store = Self { pool, default_footer: default_footer.into() };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        info!("Initializing preference schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_settings (
                user_id BIGINT PRIMARY KEY,
                language VARCHAR(8) NOT NULL,
                footer TEXT NOT NULL,
                username TEXT,
                created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        // tables created before usernames were kept
        sqlx::query(
            "ALTER TABLE user_settings
                ADD COLUMN IF NOT EXISTS username TEXT,
                ADD COLUMN IF NOT EXISTS created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bot_stats (
                name TEXT PRIMARY KEY,
                value BIGINT NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, user: i64, language: Option<Language>, footer: Option<&str>) -> Result<(), StoreError> {
        // missing fields take the defaults on insert and keep their value on update
        sqlx::query(
            "INSERT INTO user_settings (user_id, language, footer) VALUES ($1, COALESCE($2, $4), COALESCE($3, $5))
             ON CONFLICT (user_id) DO UPDATE SET
                language = COALESCE($2, user_settings.language),
                footer = COALESCE($3, user_settings.footer),
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(user)
        .bind(language.map(Language::code))
        .bind(footer)
        .bind(Language::BASE.code())
        .bind(&self.default_footer)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn resolve(&self, user: i64) -> Result<UserPreference, StoreError> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, language, footer) VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user)
        .bind(Language::BASE.code())
        .bind(&self.default_footer)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT language, footer FROM user_settings WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
        let code: String = row.try_get("language")?;
        let language = Language::from_code(&code).unwrap_or(Language::BASE);
        Ok(UserPreference { language, footer: row.try_get("footer")? })
    }

    async fn set_language(&self, user: i64, language: Language) -> Result<(), StoreError> {
        debug!(user_id = user, language = %language, "Updating language");
        self.upsert(user, Some(language), None).await
    }

    async fn set_footer(&self, user: i64, footer: &str) -> Result<(), StoreError> {
        debug!(user_id = user, "Updating footer");
        self.upsert(user, None, Some(footer)).await
    }

    async fn remember_username(&self, user: i64, username: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, language, footer, username) VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username",
        )
        .bind(user)
        .bind(Language::BASE.code())
        .bind(&self.default_footer)
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_search(&self) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO bot_stats (name, value) VALUES ($1, 1)
             ON CONFLICT (name) DO UPDATE SET value = bot_stats.value + 1
             RETURNING value",
        )
        .bind(SEARCHES)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get(0)?;
        Ok(total.max(0) as u64)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM user_settings) AS users,
                    COALESCE((SELECT value FROM bot_stats WHERE name = $1), 0) AS searches",
        )
        .bind(SEARCHES)
        .fetch_one(&self.pool)
        .await?;
        let users: i64 = row.try_get("users")?;
        let searches: i64 = row.try_get("searches")?;
        Ok(StoreStats { users: users.max(0) as u64, searches: searches.max(0) as u64 })
    }
}
