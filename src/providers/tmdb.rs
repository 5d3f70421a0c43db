use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{candidate_from, fetch_json, http_client, or_empty, MetadataProvider, Provider, MAX_RESULTS};
use crate::error::ProviderError;
use crate::model::{
    distinct_titles, four_digit_year, Length, MediaKind, Rating, RatingScale, ReleaseDate, DisplayRecord,
};
use crate::selection::Candidate;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Clone)]
pub struct TmdbClient {
    api_key: String,
    language: String,
    base_url: String,
    http: Client,
}

impl TmdbClient {
    pub fn new(api_key: String, language: String, timeout: Duration) -> Self {
        Self { api_key, language, base_url: DEFAULT_BASE_URL.to_string(), http: http_client(timeout) }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Movie search in the configured language, at most [`MAX_RESULTS`] hits.
    async fn search_movies(&self, query: &str) -> Result<Vec<Value>, ProviderError> {
        let url = format!(
            "{}/search/movie?query={}&language={}&include_adult=false&page=1",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(&self.language)
        );
        let data: SearchResp = serde_json::from_value(
            fetch_json(self.http.get(url).bearer_auth(&self.api_key)).await?,
        )?;
        Ok(data.results.into_iter().take(MAX_RESULTS).collect())
    }

    /// Movie details with their videos, so the trailer comes in the same round-trip.
    async fn movie_details(&self, id: &str) -> Result<Option<Value>, ProviderError> {
        let url = format!(
            "{}/movie/{}?language={}&append_to_response=videos",
            self.base_url,
            urlencoding::encode(id),
            urlencoding::encode(&self.language)
        );
        let raw = fetch_json(self.http.get(url).bearer_auth(&self.api_key)).await?;
        Ok(raw.get("id").is_some().then_some(raw))
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    fn provider(&self) -> Provider {
        Provider::Tmdb
    }

    async fn search(&self, title: &str) -> Vec<Value> {
        or_empty(Provider::Tmdb, "search", self.search_movies(title).await)
    }

    async fn fetch_details(&self, id: &str) -> Option<Value> {
        or_empty(Provider::Tmdb, "details", self.movie_details(id).await)
    }

    fn needs_details(&self) -> bool {
        true
    }

    fn candidate(&self, raw: &Value) -> Option<Candidate> {
        self.normalize(raw).map(|r| candidate_from(&r, raw))
    }

    fn normalize(&self, raw: &Value) -> Option<DisplayRecord> {
        let m: Movie = serde_json::from_value(raw.clone()).ok()?;
        let release = m.release_date.as_deref().and_then(ReleaseDate::parse_iso);
        let rating = match m.vote_count {
            Some(n) if n > 0 => m.vote_average.and_then(|v| Rating::new(v, RatingScale::Ten)),
            _ => None,
        };
        let length = match m.runtime {
            Some(minutes) if minutes > 0 => Length::Runtime { minutes },
            _ => Length::Unknown,
        };
        Some(DisplayRecord {
            kind: MediaKind::Movie,
            alternate_titles: distinct_titles(&m.title, [m.original_title.clone()]),
            primary_title: m.title,
            year: release.and_then(|d| d.year).and_then(four_digit_year),
            end_year: None,
            release,
            format: None,
            genres: m.genres.into_iter().map(|g| g.name).collect(),
            rating,
            popularity_rank: None,
            length,
            synopsis: m.overview.unwrap_or_default(),
            poster_url: m.poster_path.map(|p| format!("{POSTER_BASE}{p}")),
            trailer_url: m.videos.and_then(|v| best_trailer_url(&v.results)),
            source_url: format!("https://www.themoviedb.org/movie/{}", m.id),
            source_id: m.id.to_string(),
            source_name: "TMDB",
        })
    }
}

/// Best YouTube video: official first, then Trailer before Teaser before anything else.
fn best_trailer_url(videos: &[Video]) -> Option<String> {
    let mut candidates: Vec<&Video> = videos
        .iter()
        .filter(|v| v.site.eq_ignore_ascii_case("YouTube"))
        .collect();
    candidates.sort_by_key(|v| {
        let official = if v.official.unwrap_or(false) { 0 } else { 1 };
        let typ = match v.r#type.as_str() { "Trailer" => 0, "Teaser" => 1, _ => 2 };
        (official, typ)
    });
    candidates.first().map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct SearchResp {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Deserialize, Debug)]
struct Movie {
    id: u64,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    vote_count: Option<u64>,
    runtime: Option<u32>,
    #[serde(default)]
    genres: Vec<Genre>,
    videos: Option<VideosResp>,
}

#[derive(Deserialize, Debug)]
struct Genre {
    name: String,
}

#[derive(Deserialize, Debug)]
struct VideosResp {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Deserialize, Debug)]
struct Video {
    key: String,
    site: String,
    r#type: String,
    official: Option<bool>,
}
