//! Metadata-provider adapters. Each one turns a provider's JSON into [`DisplayRecord`]s.
//!
//! Adapter calls never fail: timeouts, HTTP errors, malformed payloads and empty
//! result sets all come back as "no data" and are only logged.

pub mod anilist;
pub mod imdb;
pub mod omdb;
pub mod tmdb;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::ProviderError;
use crate::format::short_label;
use crate::model::{DisplayRecord, MediaKind};
use crate::selection::Candidate;

pub use anilist::AniListClient;
pub use imdb::ImdbApiClient;
pub use omdb::OmdbClient;
pub use tmdb::TmdbClient;

/// Search results are cut to this many candidates.
pub const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anilist,
    Tmdb,
    Omdb,
    ImdbApi,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Provider::Anilist, Provider::Tmdb, Provider::Omdb, Provider::ImdbApi];

    /// Short tag used in cache keys, inline result ids and callback data.
    pub fn tag(self) -> &'static str {
        match self {
            Provider::Anilist => "anilist",
            Provider::Tmdb => "tmdb",
            Provider::Omdb => "omdb",
            Provider::ImdbApi => "imdb",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| p.tag().eq_ignore_ascii_case(tag.trim()))
    }

    pub fn kind(self) -> MediaKind {
        match self {
            Provider::Anilist => MediaKind::Anime,
            Provider::Tmdb | Provider::Omdb | Provider::ImdbApi => MediaKind::Movie,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Up to [`MAX_RESULTS`] raw hits, possibly empty.
    async fn search(&self, title: &str) -> Vec<Value>;

    async fn fetch_details(&self, id: &str) -> Option<Value>;

    /// Whether search hits lack fields only the details endpoint returns.
    fn needs_details(&self) -> bool;

    fn candidate(&self, raw: &Value) -> Option<Candidate>;

    fn normalize(&self, raw: &Value) -> Option<DisplayRecord>;
}

/// HTTP client shared by one adapter; every request carries `timeout`.
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tg-fiche-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default http client");
            Client::new()
        })
}

/// Sends `req` and decodes the body as JSON, rejecting non-success statuses.
pub(crate) async fn fetch_json(req: RequestBuilder) -> Result<Value, ProviderError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status));
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Collapses an adapter result into the "no data" contract.
pub(crate) fn or_empty<T: Default>(provider: Provider, op: &str, res: Result<T, ProviderError>) -> T {
    res.unwrap_or_else(|e| {
        tracing::warn!(%provider, op, error = %e, "provider call failed");
        T::default()
    })
}

pub(crate) fn candidate_from(record: &DisplayRecord, raw: &Value) -> Candidate {
    Candidate {
        id: record.source_id.clone(),
        label: short_label(&record.primary_title, record.year),
        raw: raw.clone(),
    }
}
