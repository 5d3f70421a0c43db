use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{candidate_from, fetch_json, http_client, or_empty, MetadataProvider, Provider, MAX_RESULTS};
use crate::error::ProviderError;
use crate::model::{
    four_digit_year, present, year_span, DisplayRecord, Length, MediaKind, Rating, RatingScale, ReleaseDate,
};
use crate::selection::Candidate;

pub const DEFAULT_BASE_URL: &str = "https://www.omdbapi.com/";

const MONTH_ABBREVIATIONS: [&str; 12] =
    ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

#[derive(Clone)]
pub struct OmdbClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OmdbClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http: http_client(timeout) }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// OMDb answers 200 even on failure; `Response: "False"` carries the reason.
    async fn call(&self, params: &str) -> Result<Value, ProviderError> {
        let url = format!("{}?apikey={}&{params}", self.base_url, urlencoding::encode(&self.api_key));
        let raw = fetch_json(self.http.get(url)).await?;
        if raw.get("Response").and_then(Value::as_str) != Some("True") {
            let reason = raw.get("Error").and_then(Value::as_str).unwrap_or("no Response flag");
            return Err(ProviderError::Rejected(reason.to_string()));
        }
        Ok(raw)
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<Value>, ProviderError> {
        let raw = match self.call(&format!("s={}&type=movie", urlencoding::encode(query))).await {
            Err(ProviderError::Rejected(reason)) if reason.contains("not found") => return Ok(vec![]),
            other => other?,
        };
        let data: SearchResp = serde_json::from_value(raw)?;
        Ok(data.search.into_iter().take(MAX_RESULTS).collect())
    }

    async fn title_by_id(&self, id: &str) -> Result<Option<Value>, ProviderError> {
        let raw = self.call(&format!("i={}&plot=full", urlencoding::encode(id))).await?;
        Ok(Some(raw))
    }
}

#[async_trait]
impl MetadataProvider for OmdbClient {
    fn provider(&self) -> Provider {
        Provider::Omdb
    }

    async fn search(&self, title: &str) -> Vec<Value> {
        or_empty(Provider::Omdb, "search", self.search_titles(title).await)
    }

    async fn fetch_details(&self, id: &str) -> Option<Value> {
        or_empty(Provider::Omdb, "details", self.title_by_id(id).await)
    }

    fn needs_details(&self) -> bool {
        true
    }

    fn candidate(&self, raw: &Value) -> Option<Candidate> {
        self.normalize(raw).map(|r| candidate_from(&r, raw))
    }

    fn normalize(&self, raw: &Value) -> Option<DisplayRecord> {
        let t: Title = serde_json::from_value(raw.clone()).ok()?;
        let id = present(t.imdb_id.as_deref())?;
        let primary_title = present(t.title.as_deref())?;
        let (year, end_year) = t.year.as_deref().map(year_span).unwrap_or((None, None));
        let release = present(t.released.as_deref())
            .and_then(|r| parse_released(&r))
            .or_else(|| year.map(|y| ReleaseDate { year: Some(y), ..ReleaseDate::default() }));
        let rating = present(t.imdb_rating.as_deref())
            .and_then(|r| r.parse().ok())
            .and_then(|r| Rating::new(r, RatingScale::Ten));
        let length = present(t.runtime.as_deref())
            .and_then(|r| r.split_whitespace().next().and_then(|m| m.parse().ok()))
            .map_or(Length::Unknown, |minutes| Length::Runtime { minutes });
        let genres = present(t.genre.as_deref())
            .map(|g| g.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Some(DisplayRecord {
            kind: MediaKind::Movie,
            primary_title,
            alternate_titles: Vec::new(),
            year,
            end_year,
            release,
            format: present(t.kind.as_deref()).filter(|k| k != "movie"),
            genres,
            rating,
            popularity_rank: None,
            length,
            synopsis: present(t.plot.as_deref()).unwrap_or_default(),
            poster_url: present(t.poster.as_deref()),
            trailer_url: None,
            source_url: format!("https://www.imdb.com/title/{id}/"),
            source_id: id,
            source_name: "IMDb",
        })
    }
}

/// `"16 Jul 2010"` → day, month and year.
fn parse_released(s: &str) -> Option<ReleaseDate> {
    let mut parts = s.split_whitespace();
    let day = parts.next()?.parse().ok()?;
    let month = parts.next()?;
    let month = MONTH_ABBREVIATIONS.iter().position(|m| m.eq_ignore_ascii_case(month))? as u32 + 1;
    let year = parts.next()?.parse().ok().and_then(four_digit_year)?;
    Some(ReleaseDate { year: Some(year), month: Some(month), day: Some(day) })
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct SearchResp {
    #[serde(rename = "Search", default)]
    search: Vec<Value>,
}

#[derive(Deserialize, Debug)]
struct Title {
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "Released")]
    released: Option<String>,
    #[serde(rename = "Runtime")]
    runtime: Option<String>,
    #[serde(rename = "Genre")]
    genre: Option<String>,
    #[serde(rename = "Plot")]
    plot: Option<String>,
    #[serde(rename = "Poster")]
    poster: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}
