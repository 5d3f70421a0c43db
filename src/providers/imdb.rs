use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{candidate_from, fetch_json, http_client, or_empty, MetadataProvider, Provider, MAX_RESULTS};
use crate::error::ProviderError;
use crate::model::{
    distinct_titles, four_digit_year, present, year_span, DisplayRecord, Length, MediaKind, Rating, RatingScale,
    ReleaseDate,
};
use crate::selection::Candidate;

pub const DEFAULT_BASE_URL: &str = "https://imdb-api.com/en/API";

#[derive(Clone)]
pub struct ImdbApiClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl ImdbApiClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http: http_client(timeout) }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, url: String) -> Result<Value, ProviderError> {
        let raw = fetch_json(self.http.get(url)).await?;
        match raw.get("errorMessage").and_then(Value::as_str) {
            Some(msg) if !msg.trim().is_empty() => Err(ProviderError::Rejected(msg.to_string())),
            _ => Ok(raw),
        }
    }

    async fn search_movies(&self, query: &str) -> Result<Vec<Value>, ProviderError> {
        let url = format!(
            "{}/SearchMovie?apiKey={}&expression={}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query)
        );
        let data: SearchResp = serde_json::from_value(self.call(url).await?)?;
        Ok(data.results.unwrap_or_default().into_iter().take(MAX_RESULTS).collect())
    }

    async fn title(&self, id: &str) -> Result<Option<Value>, ProviderError> {
        let url = format!(
            "{}/Title/{}/{}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(id)
        );
        let raw = self.call(url).await?;
        Ok(raw.get("id").and_then(Value::as_str).is_some_and(|s| !s.is_empty()).then_some(raw))
    }
}

#[async_trait]
impl MetadataProvider for ImdbApiClient {
    fn provider(&self) -> Provider {
        Provider::ImdbApi
    }

    async fn search(&self, title: &str) -> Vec<Value> {
        or_empty(Provider::ImdbApi, "search", self.search_movies(title).await)
    }

    async fn fetch_details(&self, id: &str) -> Option<Value> {
        or_empty(Provider::ImdbApi, "details", self.title(id).await)
    }

    fn needs_details(&self) -> bool {
        true
    }

    fn candidate(&self, raw: &Value) -> Option<Candidate> {
        self.normalize(raw).map(|r| candidate_from(&r, raw))
    }

    /// Works on both shapes: search hits (`description` carries the year) and full titles.
    fn normalize(&self, raw: &Value) -> Option<DisplayRecord> {
        let t: Title = serde_json::from_value(raw.clone()).ok()?;
        let id = present(t.id.as_deref())?;
        let primary_title = present(t.title.as_deref())?;

        let release = present(t.release_date.as_deref()).and_then(|d| ReleaseDate::parse_iso(&d));
        let (year, end_year) = match present(t.year.as_deref()) {
            Some(y) => year_span(&y),
            None => t.description.as_deref().map(year_span).unwrap_or((None, None)),
        };
        let year = year.or_else(|| release.and_then(|d| d.year).and_then(four_digit_year));

        let rating = present(t.imdb_rating.as_deref())
            .and_then(|r| r.parse().ok())
            .and_then(|r| Rating::new(r, RatingScale::Ten));
        let length = present(t.runtime_mins.as_deref())
            .and_then(|m| m.parse().ok())
            .filter(|m| *m > 0)
            .map_or(Length::Unknown, |minutes| Length::Runtime { minutes });
        let genres = present(t.genres.as_deref())
            .map(|g| g.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Some(DisplayRecord {
            kind: MediaKind::Movie,
            alternate_titles: distinct_titles(&primary_title, [present(t.original_title.as_deref())]),
            primary_title,
            year,
            end_year,
            release,
            format: present(t.kind.as_deref()).filter(|k| !k.eq_ignore_ascii_case("movie")),
            genres,
            rating,
            popularity_rank: None,
            length,
            synopsis: present(t.plot.as_deref()).unwrap_or_default(),
            poster_url: present(t.image.as_deref()).filter(|u| u.starts_with("http")),
            trailer_url: None,
            source_url: format!("https://www.imdb.com/title/{id}/"),
            source_id: id,
            source_name: "IMDb",
        })
    }
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct SearchResp {
    results: Option<Vec<Value>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Title {
    id: Option<String>,
    title: Option<String>,
    original_title: Option<String>,
    description: Option<String>,
    year: Option<String>,
    release_date: Option<String>,
    runtime_mins: Option<String>,
    plot: Option<String>,
    image: Option<String>,
    #[serde(rename = "imDbRating")]
    imdb_rating: Option<String>,
    genres: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ImdbApiClient {
        ImdbApiClient::new("k_test".into(), Duration::from_secs(2)).with_base_url(server.uri())
    }

    fn inception() -> Value {
        json!({
            "id": "tt1375666",
            "title": "Inception",
            "originalTitle": "",
            "type": "Movie",
            "year": "2010",
            "releaseDate": "2010-07-16",
            "runtimeMins": "148",
            "plot": "A thief who steals corporate secrets through dream-sharing.",
            "image": "https://imdb-api.com/images/original/inception.jpg",
            "imDbRating": "8.8",
            "genres": "Action, Adventure, Sci-Fi",
            "errorMessage": ""
        })
    }

    #[tokio::test]
    async fn search_reads_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/SearchMovie"))
            .and(query_param("apiKey", "k_test"))
            .and(query_param("expression", "inception"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "searchType": "Movie",
                "expression": "inception",
                "results": [
                    {"id": "tt1375666", "resultType": "Title", "image": "https://img/1.jpg", "title": "Inception", "description": "(2010)"},
                    {"id": "tt5295894", "resultType": "Title", "image": "", "title": "Inception: The Cobol Job", "description": "(2010) (Short)"}
                ],
                "errorMessage": ""
            })))
            .mount(&server)
            .await;

        let imdb = client(&server);
        let hits = imdb.search("inception").await;
        assert_eq!(hits.len(), 2);
        let c = imdb.candidate(&hits[0]).expect("candidate");
        assert_eq!((c.id.as_str(), c.label.as_str()), ("tt1375666", "Inception (2010)"));
        assert_eq!(imdb.normalize(&hits[1]).and_then(|r| r.poster_url), None);
    }

    #[tokio::test]
    async fn error_message_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(path("/SearchMovie"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"results": null, "errorMessage": "Invalid API Key"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/Title/k_test/tt0000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": null, "errorMessage": "Not found"})))
            .mount(&server)
            .await;

        let imdb = client(&server);
        assert!(imdb.search("inception").await.is_empty());
        assert!(imdb.fetch_details("tt0000000").await.is_none());
    }

    #[tokio::test]
    async fn details_by_id() {
        let server = MockServer::start().await;
        Mock::given(path("/Title/k_test/tt1375666"))
            .respond_with(ResponseTemplate::new(200).set_body_json(inception()))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client(&server).fetch_details("tt1375666").await.expect("details");
        assert_eq!(raw["runtimeMins"], "148");
    }

    #[test]
    fn normalizes_title() {
        let imdb = ImdbApiClient::new("k".into(), Duration::from_secs(1));
        let r = imdb.normalize(&inception()).expect("record");
        assert_eq!(r.primary_title, "Inception");
        assert!(r.alternate_titles.is_empty());
        assert_eq!(r.year, Some(2010));
        assert_eq!(r.release, Some(ReleaseDate { year: Some(2010), month: Some(7), day: Some(16) }));
        assert_eq!(r.rating, Rating::new(8.8, RatingScale::Ten));
        assert_eq!(r.length, Length::Runtime { minutes: 148 });
        assert_eq!(r.genres, vec!["Action", "Adventure", "Sci-Fi"]);
        assert_eq!(r.format, None);
        assert_eq!(r.source_name, "IMDb");
    }
}
