use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{candidate_from, fetch_json, http_client, or_empty, MetadataProvider, Provider, MAX_RESULTS};
use crate::error::ProviderError;
use crate::model::{
    distinct_titles, four_digit_year, DisplayRecord, Length, MediaKind, Rating, RatingScale, ReleaseDate,
};
use crate::selection::Candidate;

pub const DEFAULT_ENDPOINT: &str = "https://graphql.anilist.co";

const MEDIA_FIELDS: &str = r#"
    id
    siteUrl
    title { romaji english native }
    synonyms
    format
    episodes
    duration
    averageScore
    meanScore
    rankings { rank type allTime }
    genres
    description(asHtml: false)
    startDate { year month day }
    endDate { year }
    coverImage { extraLarge large }
    trailer { id site }
"#;

#[derive(Clone)]
pub struct AniListClient {
    endpoint: String,
    http: Client,
}

impl AniListClient {
    pub fn new(timeout: Duration) -> Self {
        Self { endpoint: DEFAULT_ENDPOINT.to_string(), http: http_client(timeout) }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn query(&self, query: String, variables: Value) -> Result<Value, ProviderError> {
        let body = json!({ "query": query, "variables": variables });
        let resp: GraphQlResponse = serde_json::from_value(
            fetch_json(self.http.post(&self.endpoint).json(&body)).await?,
        )?;
        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            let msg = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
            return Err(ProviderError::Rejected(msg));
        }
        resp.data.ok_or_else(|| ProviderError::Rejected("no data".into()))
    }

    async fn search_media(&self, search: &str) -> Result<Vec<Value>, ProviderError> {
        let query = format!(
            "query ($search: String, $perPage: Int) {{ Page(perPage: $perPage) {{ media(search: $search, type: ANIME) {{ {MEDIA_FIELDS} }} }} }}"
        );
        let data = self.query(query, json!({ "search": search, "perPage": MAX_RESULTS })).await?;
        let media = data
            .pointer("/Page/media")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(media.into_iter().take(MAX_RESULTS).collect())
    }

    async fn media_by_id(&self, id: &str) -> Result<Option<Value>, ProviderError> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let query = format!("query ($id: Int) {{ Media(id: $id, type: ANIME) {{ {MEDIA_FIELDS} }} }}");
        let data = self.query(query, json!({ "id": id })).await?;
        Ok(data.get("Media").filter(|m| !m.is_null()).cloned())
    }
}

#[async_trait]
impl MetadataProvider for AniListClient {
    fn provider(&self) -> Provider {
        Provider::Anilist
    }

    async fn search(&self, title: &str) -> Vec<Value> {
        or_empty(Provider::Anilist, "search", self.search_media(title).await)
    }

    async fn fetch_details(&self, id: &str) -> Option<Value> {
        or_empty(Provider::Anilist, "details", self.media_by_id(id).await)
    }

    fn needs_details(&self) -> bool {
        false
    }

    fn candidate(&self, raw: &Value) -> Option<Candidate> {
        self.normalize(raw).map(|r| candidate_from(&r, raw))
    }

    fn normalize(&self, raw: &Value) -> Option<DisplayRecord> {
        let media: Media = serde_json::from_value(raw.clone()).ok()?;
        let title = media.title.unwrap_or_default();
        let english = title.english.filter(|s| !s.trim().is_empty());
        let romaji = title.romaji.filter(|s| !s.trim().is_empty());
        let primary = english.clone().or_else(|| romaji.clone())?.trim().to_string();

        let mut alternates = vec![romaji, title.native];
        alternates.extend(media.synonyms.unwrap_or_default().into_iter().map(Some));
        let alternate_titles = distinct_titles(&primary, alternates);

        let release = media.start_date.map(|d| ReleaseDate {
            year: d.year.and_then(four_digit_year),
            month: d.month,
            day: d.day,
        });
        let rating = media
            .average_score
            .or(media.mean_score)
            .and_then(|s| Rating::new(s, RatingScale::Hundred));
        let popularity_rank = media
            .rankings
            .iter()
            .flatten()
            .find(|r| r.all_time.unwrap_or(false) && r.r#type.as_deref() == Some("POPULAR"))
            .map(|r| r.rank);
        let length = match (media.format.as_deref(), media.duration) {
            (Some("MOVIE"), Some(minutes)) => Length::Runtime { minutes },
            (_, minutes_each) if media.episodes.is_some() || minutes_each.is_some() => {
                Length::Episodes { count: media.episodes, minutes_each }
            }
            _ => Length::Unknown,
        };
        let poster_url = media
            .cover_image
            .and_then(|c| c.extra_large.or(c.large));

        Some(DisplayRecord {
            kind: MediaKind::Anime,
            primary_title: primary,
            alternate_titles,
            year: release.and_then(|d| d.year),
            end_year: media.end_date.and_then(|d| d.year).and_then(four_digit_year),
            release,
            format: media.format,
            genres: media.genres.unwrap_or_default(),
            rating,
            popularity_rank,
            length,
            synopsis: media.description.unwrap_or_default(),
            poster_url,
            trailer_url: media.trailer.and_then(|t| trailer_url(&t)),
            source_url: media
                .site_url
                .unwrap_or_else(|| format!("https://anilist.co/anime/{}", media.id)),
            source_id: media.id.to_string(),
            source_name: "AniList",
        })
    }
}

fn trailer_url(trailer: &Trailer) -> Option<String> {
    let site = trailer.site.as_deref()?;
    let id = trailer.id.as_deref()?;
    if site.eq_ignore_ascii_case("youtube") {
        return Some(format!("https://www.youtube.com/watch?v={id}"));
    }
    if site.eq_ignore_ascii_case("dailymotion") {
        return Some(format!("https://www.dailymotion.com/video/{id}"));
    }
    None
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize, Debug)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i64,
    site_url: Option<String>,
    title: Option<MediaTitle>,
    synonyms: Option<Vec<String>>,
    format: Option<String>,
    episodes: Option<u32>,
    duration: Option<u32>,
    average_score: Option<f64>,
    mean_score: Option<f64>,
    rankings: Option<Vec<Ranking>>,
    genres: Option<Vec<String>>,
    description: Option<String>,
    start_date: Option<FuzzyDate>,
    end_date: Option<FuzzyDate>,
    cover_image: Option<CoverImage>,
    trailer: Option<Trailer>,
}

#[derive(Deserialize, Debug, Default)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Ranking {
    rank: u32,
    r#type: Option<String>,
    all_time: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct FuzzyDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CoverImage {
    extra_large: Option<String>,
    large: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Trailer {
    id: Option<String>,
    site: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn naruto() -> Value {
        json!({
            "id": 20,
            "siteUrl": "https://anilist.co/anime/20",
            "title": {"romaji": "NARUTO", "english": "Naruto", "native": "NARUTO -ナルト-"},
            "synonyms": ["ナルト", "Naruto"],
            "format": "TV",
            "episodes": 220,
            "duration": 23,
            "averageScore": 79,
            "meanScore": 80,
            "rankings": [
                {"rank": 40, "type": "RATED", "allTime": true},
                {"rank": 12, "type": "POPULAR", "allTime": true},
                {"rank": 3, "type": "POPULAR", "allTime": false}
            ],
            "genres": ["Action", "Adventure"],
            "description": "Naruto Uzumaki, a hyperactive and knuckle-headed ninja.<br><br>(Source: Anime News Network)",
            "startDate": {"year": 2002, "month": 10, "day": 3},
            "endDate": {"year": 2007, "month": 2, "day": 8},
            "coverImage": {"extraLarge": "https://img.anili.st/naruto-xl.jpg", "large": "https://img.anili.st/naruto.jpg"},
            "trailer": {"id": "abc123", "site": "youtube"}
        })
    }

    fn client(server: &MockServer) -> AniListClient {
        AniListClient::new(Duration::from_secs(2)).with_endpoint(server.uri())
    }

    #[tokio::test]
    async fn search_posts_graphql_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"variables": {"search": "naruto"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"Page": {"media": [naruto()]}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let hits = client(&server).search("naruto").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], 20);
    }

    #[tokio::test]
    async fn graphql_errors_mean_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": "Too Many Requests.", "status": 429}]
            })))
            .mount(&server)
            .await;

        let anilist = client(&server);
        assert!(anilist.search("naruto").await.is_empty());
        assert!(anilist.fetch_details("20").await.is_none());
    }

    #[tokio::test]
    async fn details_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"variables": {"id": 20}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"Media": naruto()}})))
            .mount(&server)
            .await;

        let anilist = client(&server);
        assert_eq!(anilist.fetch_details("20").await.expect("media")["id"], 20);
        assert!(anilist.fetch_details("not-a-number").await.is_none());
    }

    #[test]
    fn normalizes_media() {
        let anilist = AniListClient::new(Duration::from_secs(1));
        let r = anilist.normalize(&naruto()).expect("record");
        assert_eq!(r.kind, MediaKind::Anime);
        assert_eq!(r.primary_title, "Naruto");
        assert_eq!(r.alternate_titles, vec!["NARUTO -ナルト-", "ナルト"]);
        assert_eq!((r.year, r.end_year), (Some(2002), Some(2007)));
        assert_eq!(r.rating, Rating::new(79.0, RatingScale::Hundred));
        assert_eq!(r.popularity_rank, Some(12));
        assert_eq!(r.length, Length::Episodes { count: Some(220), minutes_each: Some(23) });
        assert_eq!(r.format.as_deref(), Some("TV"));
        assert_eq!(r.poster_url.as_deref(), Some("https://img.anili.st/naruto-xl.jpg"));
        assert_eq!(r.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=abc123"));
        assert_eq!(r.source_id, "20");
    }

    #[test]
    fn movies_use_runtime_and_missing_fields_stay_absent() {
        let anilist = AniListClient::new(Duration::from_secs(1));
        let raw = json!({
            "id": 199,
            "title": {"romaji": "Sen to Chihiro no Kamikakushi", "english": null},
            "format": "MOVIE",
            "episodes": 1,
            "duration": 125
        });
        let r = anilist.normalize(&raw).expect("record");
        assert_eq!(r.primary_title, "Sen to Chihiro no Kamikakushi");
        assert_eq!(r.length, Length::Runtime { minutes: 125 });
        assert_eq!(r.rating, None);
        assert_eq!(r.release, None);
        assert_eq!(r.source_url, "https://anilist.co/anime/199");

        assert!(anilist.normalize(&json!({"id": 1, "title": {}})).is_none());
    }
}
