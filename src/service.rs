//! Transport-neutral bot core. Every operation answers with a [`Reply`] and never fails.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CachedResponse, QueryCache};
use crate::error::BotError;
use crate::format::{format_record, html_escape};
use crate::i18n::{translate, translate_with, Language};
use crate::model::MediaKind;
use crate::providers::{MetadataProvider, Provider};
use crate::selection::{Candidate, Pick, SelectionBook, SelectionToken};
use crate::storage::{PreferenceStore, UserPreference};

const INLINE_ANIME_PREFIX: &str = "anime ";

/// Who may talk to the bot. `None` lets everyone in.
#[derive(Debug, Clone, Default)]
pub struct AccessList(Option<HashSet<i64>>);

impl AccessList {
    pub fn open() -> Self {
        Self(None)
    }

    pub fn only(ids: impl IntoIterator<Item = i64>) -> Self {
        Self(Some(ids.into_iter().collect()))
    }

    pub fn allows(&self, user: i64) -> bool {
        self.0.as_ref().map_or(true, |ids| ids.contains(&user))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Record { text: String, poster: Option<String> },
    /// `buttons` are `(label, callback data)` pairs, one per row.
    Choices { text: String, buttons: Vec<(String, String)> },
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `username` is the sender's Telegram handle, when they have one.
    Start { username: Option<String> },
    Help,
    Search { kind: MediaKind, title: String },
    SetFooter(String),
    SetLanguage(String),
    Stats,
    ClearCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineItem {
    /// `<provider>_<id>`, echoed back by the chosen-result notification.
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub message: String,
}

/// Everything a handler needs, built once at startup and shared.
#[derive(Clone)]
pub struct AppContext {
    store: Arc<dyn PreferenceStore>,
    access: AccessList,
    providers: HashMap<Provider, Arc<dyn MetadataProvider>>,
    movie_provider: Provider,
    cache: QueryCache,
    selections: SelectionBook,
}

impl AppContext {
    pub fn new(store: Arc<dyn PreferenceStore>, access: AccessList) -> Self {
        Self {
            store,
            access,
            providers: HashMap::new(),
            movie_provider: Provider::Tmdb,
            cache: QueryCache::new(1000, None),
            selections: SelectionBook::new(10_000, Duration::from_secs(3600)),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_selections(mut self, selections: SelectionBook) -> Self {
        self.selections = selections;
        self
    }

    /// Provider answering `/movie` and plain inline queries.
    pub fn movie_provider(mut self, provider: Provider) -> Self {
        self.movie_provider = provider;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn PreferenceStore> {
        &self.store
    }

    /// Stored language of `user`, or the base language when the store is unavailable.
    pub async fn language(&self, user: i64) -> Language {
        match self.store.resolve(user).await {
            Ok(pref) => pref.language,
            Err(e) => {
                warn!(user_id = user, error = %e, "preferences unavailable, using base language");
                Language::BASE
            }
        }
    }

    /* ======= operations ======= */

    pub async fn handle(&self, user: i64, request: Request) -> Reply {
        let pref = match self.admit(user).await {
            Ok(pref) => pref,
            Err(e) => return self.reply_for(Language::BASE, e),
        };
        let lang = pref.language;
        match self.dispatch(user, pref, request).await {
            Ok(reply) => reply,
            Err(e) => self.reply_for(lang, e),
        }
    }

    /// Resolves a selection button press.
    pub async fn select(&self, user: i64, data: &str) -> Reply {
        let pref = match self.admit(user).await {
            Ok(pref) => pref,
            Err(e) => return self.reply_for(Language::BASE, e),
        };
        let Some(token) = SelectionToken::parse(data) else {
            debug!(user_id = user, data, "ignoring unknown callback data");
            return Reply::Ignore;
        };
        let lang = pref.language;
        let outcome = match self.selections.take(&token, user).await {
            Pick::ForeignUser => return Reply::Ignore,
            Pick::Expired => Err(BotError::SessionExpired),
            Pick::Resolved { provider, candidate } => match self.adapter(provider) {
                Ok(adapter) => self.resolve(adapter.as_ref(), candidate, &pref).await,
                Err(e) => Err(e),
            },
        };
        outcome.unwrap_or_else(|e| self.reply_for(lang, e))
    }

    /// Inline results for `query`; `anime <title>` searches anime, anything else movies.
    pub async fn inline_search(&self, user: i64, query: &str) -> Vec<InlineItem> {
        if !self.access.allows(user) {
            warn!(user_id = user, "inline query from unauthorized user");
            return Vec::new();
        }
        let query = query.trim();
        let (kind, title) = match strip_prefix_ci(query, INLINE_ANIME_PREFIX) {
            Some(rest) => (MediaKind::Anime, rest.trim()),
            None => (MediaKind::Movie, query),
        };
        if title.is_empty() {
            return Vec::new();
        }
        let Ok(adapter) = self.adapter_for(kind) else {
            return Vec::new();
        };
        let lang = self.language(user).await;

        let hits = self.cached_search(adapter.as_ref(), title).await;
        let tag = adapter.provider().tag();
        hits.iter()
            .filter_map(|raw| adapter.normalize(raw))
            .map(|record| {
                let icon = kind_icon(record.kind);
                let description = match record.year {
                    Some(y) => format!("{y} · {}", record.source_name),
                    None => record.source_name.to_string(),
                };
                InlineItem {
                    id: format!("{tag}_{}", record.source_id),
                    message: format!(
                        "{icon} <b>{}</b>\n\n{}",
                        html_escape(&record.primary_title),
                        translate(lang, "loading")
                    ),
                    title: record.primary_title,
                    description,
                    thumbnail: record.poster_url,
                }
            })
            .collect()
    }

    /// Full record for an inline result the user picked.
    pub async fn chosen_inline(&self, user: i64, result_id: &str) -> Reply {
        let pref = match self.admit(user).await {
            Ok(pref) => pref,
            Err(e) => return self.reply_for(Language::BASE, e),
        };
        let Some((provider, id)) = result_id
            .split_once('_')
            .and_then(|(tag, id)| Provider::from_tag(tag).map(|p| (p, id)))
        else {
            debug!(user_id = user, result_id, "ignoring unknown inline result");
            return Reply::Ignore;
        };
        let lang = pref.language;
        self.record_by_id(provider, id, &pref)
            .await
            .unwrap_or_else(|e| self.reply_for(lang, e))
    }

    /* ======= internals ======= */

    async fn admit(&self, user: i64) -> Result<UserPreference, BotError> {
        if !self.access.allows(user) {
            return Err(BotError::Unauthorized(user));
        }
        Ok(self.store.resolve(user).await?)
    }

    async fn dispatch(&self, user: i64, pref: UserPreference, request: Request) -> Result<Reply, BotError> {
        let lang = pref.language;
        match request {
            Request::Start { username } => {
                if let Some(name) = username.as_deref() {
                    if let Err(e) = self.store.remember_username(user, name).await {
                        warn!(user_id = user, error = %e, "could not save username");
                    }
                }
                Ok(Reply::Text(translate(lang, "start").to_string()))
            }
            Request::Help => Ok(Reply::Text(translate_with(lang, "help", &[("langs", &Language::codes())]))),
            Request::Search { kind, title } => self.search(user, kind, &title, &pref).await,
            Request::SetFooter(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(BotError::InvalidArgument("usage_setfooter"));
                }
                self.store.set_footer(user, text).await?;
                Ok(Reply::Text(translate(lang, "footer_updated").to_string()))
            }
            Request::SetLanguage(code) => {
                let language = Language::from_code(&code).ok_or(BotError::InvalidArgument("usage_setlang"))?;
                self.store.set_language(user, language).await?;
                Ok(Reply::Text(translate_with(language, "language_updated", &[("lang", language.code())])))
            }
            Request::Stats => {
                let stats = self.store.stats().await?;
                let entries = self.cache.len().await;
                let pending = self.selections.len().await;
                Ok(Reply::Text(translate_with(
                    lang,
                    "stats",
                    &[
                        ("searches", &stats.searches.to_string()),
                        ("users", &stats.users.to_string()),
                        ("entries", &entries.to_string()),
                        ("selections", &pending.to_string()),
                    ],
                )))
            }
            Request::ClearCache => {
                let count = self.cache.clear().await;
                info!(user_id = user, count, "query cache cleared");
                Ok(Reply::Text(translate_with(lang, "cache_cleared", &[("count", &count.to_string())])))
            }
        }
    }

    async fn search(&self, user: i64, kind: MediaKind, title: &str, pref: &UserPreference) -> Result<Reply, BotError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(BotError::InvalidArgument(match kind {
                MediaKind::Anime => "usage_anime",
                MediaKind::Movie => "usage_movie",
            }));
        }
        let adapter = self.adapter_for(kind)?;
        info!(user_id = user, provider = %adapter.provider(), query = title, "search");

        let hits = self.cached_search(adapter.as_ref(), title).await;
        let mut candidates: Vec<Candidate> = hits.iter().filter_map(|raw| adapter.candidate(raw)).collect();
        match candidates.len() {
            0 => Err(BotError::NotFound(title.to_string())),
            1 => self.resolve(adapter.as_ref(), candidates.remove(0), pref).await,
            _ => {
                let labels: Vec<String> = candidates.iter().map(|c| c.label.clone()).collect();
                let tokens = self.selections.open(adapter.provider(), user, candidates).await;
                let buttons = labels.into_iter().zip(tokens.iter().map(SelectionToken::encode)).collect();
                Ok(Reply::Choices {
                    text: translate_with(pref.language, "choose_candidate", &[("query", &html_escape(title))]),
                    buttons,
                })
            }
        }
    }

    /// Turns one candidate into a rendered record, fetching details when search hits are partial.
    async fn resolve(
        &self,
        adapter: &dyn MetadataProvider,
        candidate: Candidate,
        pref: &UserPreference,
    ) -> Result<Reply, BotError> {
        let raw = if adapter.needs_details() {
            match self.cached_details(adapter, &candidate.id).await {
                Some(details) => details,
                None => {
                    warn!(provider = %adapter.provider(), id = %candidate.id, "details unavailable, using search hit");
                    candidate.raw
                }
            }
        } else {
            candidate.raw
        };
        self.deliver(adapter, &raw, pref, &candidate.id).await
    }

    async fn deliver(
        &self,
        adapter: &dyn MetadataProvider,
        raw: &Value,
        pref: &UserPreference,
        id: &str,
    ) -> Result<Reply, BotError> {
        let record = adapter.normalize(raw).ok_or(BotError::UpstreamUnavailable)?;
        let text = format_record(&record, pref.language, &pref.footer);
        // the counter is bookkeeping; a rendered record is delivered regardless
        match self.store.record_search().await {
            Ok(total) => debug!(provider = %adapter.provider(), id, total, "record rendered"),
            Err(e) => warn!(provider = %adapter.provider(), id, error = %e, "search counter not updated"),
        }
        Ok(Reply::Record { text, poster: record.poster_url })
    }

    async fn record_by_id(&self, provider: Provider, id: &str, pref: &UserPreference) -> Result<Reply, BotError> {
        let adapter = self.adapter(provider)?;
        let raw = self
            .cached_details(adapter.as_ref(), id)
            .await
            .ok_or_else(|| BotError::NotFound(id.to_string()))?;
        self.deliver(adapter.as_ref(), &raw, pref, id).await
    }

    async fn cached_search(&self, adapter: &dyn MetadataProvider, title: &str) -> Vec<Value> {
        let key = CacheKey::search(adapter.provider(), title);
        if let Some(hit) = self.cache.get(&key).await {
            if let CachedResponse::Candidates(hits) = hit.as_ref() {
                debug!(provider = %key.provider, query = title, "search cache hit");
                return hits.clone();
            }
        }
        let hits = adapter.search(title).await;
        self.cache.put(key, CachedResponse::Candidates(hits.clone())).await;
        hits
    }

    async fn cached_details(&self, adapter: &dyn MetadataProvider, id: &str) -> Option<Value> {
        let key = CacheKey::details(adapter.provider(), id);
        if let Some(hit) = self.cache.get(&key).await {
            if let CachedResponse::Details(raw) = hit.as_ref() {
                return Some(raw.clone());
            }
        }
        let raw = adapter.fetch_details(id).await?;
        self.cache.put(key, CachedResponse::Details(raw.clone())).await;
        Some(raw)
    }

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn MetadataProvider>, BotError> {
        self.providers.get(&provider).cloned().ok_or_else(|| {
            error!(%provider, "no adapter registered");
            BotError::UpstreamUnavailable
        })
    }

    fn adapter_for(&self, kind: MediaKind) -> Result<Arc<dyn MetadataProvider>, BotError> {
        match kind {
            MediaKind::Anime => self.adapter(Provider::Anilist),
            MediaKind::Movie => self.adapter(self.movie_provider),
        }
    }

    fn reply_for(&self, lang: Language, err: BotError) -> Reply {
        let text = match &err {
            BotError::Unauthorized(user) => {
                warn!(user_id = user, "unauthorized access attempt");
                translate(Language::BASE, "access_denied").to_string()
            }
            BotError::NotFound(query) => translate_with(lang, "no_results", &[("query", &html_escape(query))]),
            BotError::InvalidArgument(key) => translate_with(lang, key, &[("langs", &Language::codes())]),
            BotError::SessionExpired => translate(lang, "session_expired").to_string(),
            BotError::UpstreamUnavailable | BotError::DeliveryFailure(_) | BotError::Store(_) => {
                error!(error = %err, "request failed");
                translate(lang, "generic_error").to_string()
            }
        };
        Reply::Text(text)
    }
}

fn kind_icon(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Anime => "🎌",
        MediaKind::Movie => "🎬",
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
