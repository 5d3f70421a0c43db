//! Durable per-user preferences (language, footer) and the search counter.

mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::i18n::Language;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub language: Language,
    pub footer: String,
}

impl UserPreference {
    pub fn with_footer(footer: impl Into<String>) -> Self {
        Self { language: Language::BASE, footer: footer.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub users: u64,
    pub searches: u64,
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Preferences of `user`, creating and persisting the defaults on first sight.
    async fn resolve(&self, user: i64) -> Result<UserPreference, StoreError>;

    async fn set_language(&self, user: i64, language: Language) -> Result<(), StoreError>;

    async fn set_footer(&self, user: i64, footer: &str) -> Result<(), StoreError>;

    /// Keeps the latest Telegram username seen for `user`.
    async fn remember_username(&self, user: i64, username: &str) -> Result<(), StoreError>;

    /// Increments the search counter and returns the new total.
    async fn record_search(&self) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileState {
    version: u32,
    // user id -> preferences
    users: HashMap<i64, UserPreference>,
    #[serde(default)]
    usernames: HashMap<i64, String>,
    searches: u64,
}

/// JSON snapshot on disk, rewritten whole after every mutation.
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<RwLock<FileState>>,
    // serializes snapshot + write + rename so the file never goes backwards
    flushing: Arc<Mutex<()>>,
    path: PathBuf,
    default_footer: String,
}

impl JsonStore {
    pub async fn open(path: impl Into<PathBuf>, default_footer: impl Into<String>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if fs::try_exists(&path).await.unwrap_or(false) {
            let data = fs::read(&path).await?;
            match serde_json::from_slice::<FileState>(&data) {
                Ok(mut s) => {
                    if s.version == 0 {
                        s.version = 1;
                    }
                    s
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable store, starting empty");
                    FileState { version: 1, ..Default::default() }
                }
            }
        } else {
            FileState { version: 1, ..Default::default() }
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(state)),
            flushing: Arc::new(Mutex::new(())),
            path,
            default_footer: default_footer.into(),
        })
    }

    fn defaults(&self) -> UserPreference {
        UserPreference::with_footer(self.default_footer.clone())
    }

    /// Applies `f` to the user's row (created with defaults if missing) and flushes.
    async fn update(&self, user: i64, f: impl FnOnce(&mut UserPreference)) -> Result<(), StoreError> {
        {
            let mut guard = self.inner.write().await;
            let defaults = self.defaults();
            f(guard.users.entry(user).or_insert(defaults));
        }
        self.flush().await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let _flushing = self.flushing.lock().await;
        // snapshot under the read lock, write outside it
        let snapshot = {
            let guard = self.inner.read().await;
            serde_json::to_vec_pretty(&*guard)?
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonStore {
    async fn resolve(&self, user: i64) -> Result<UserPreference, StoreError> {
        if let Some(pref) = self.inner.read().await.users.get(&user) {
            return Ok(pref.clone());
        }
        let pref = {
            let mut guard = self.inner.write().await;
            let defaults = self.defaults();
            guard.users.entry(user).or_insert(defaults).clone()
        };
        tracing::debug!(user_id = user, "created default preferences");
        self.flush().await?;
        Ok(pref)
    }

    async fn set_language(&self, user: i64, language: Language) -> Result<(), StoreError> {
        self.update(user, |p| p.language = language).await
    }

    async fn set_footer(&self, user: i64, footer: &str) -> Result<(), StoreError> {
        self.update(user, |p| p.footer = footer.to_string()).await
    }

    async fn remember_username(&self, user: i64, username: &str) -> Result<(), StoreError> {
        {
            let mut guard = self.inner.write().await;
            if guard.usernames.get(&user).map(String::as_str) == Some(username) {
                return Ok(());
            }
            guard.usernames.insert(user, username.to_string());
        }
        self.flush().await
    }

    async fn record_search(&self) -> Result<u64, StoreError> {
        let total = {
            let mut guard = self.inner.write().await;
            guard.searches += 1;
            guard.searches
        };
        self.flush().await?;
        Ok(total)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let guard = self.inner.read().await;
        Ok(StoreStats { users: guard.users.len() as u64, searches: guard.searches })
    }
}
