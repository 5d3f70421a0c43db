use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tg_fiche_bot::format::BORDER;
use tg_fiche_bot::i18n::{translate, Language};
use tg_fiche_bot::model::MediaKind;
use tg_fiche_bot::providers::{AniListClient, Provider, TmdbClient};
use tg_fiche_bot::service::{AccessList, AppContext, Reply, Request};
use tg_fiche_bot::storage::JsonStore;

const FOOTER: &str = "🍿 Bon visionnage !";

struct Harness {
    ctx: AppContext,
    server: MockServer,
    _dir: TempDir,
}

async fn harness(access: AccessList) -> Harness {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open(dir.path().join("state.json"), FOOTER).await.unwrap();
    let timeout = Duration::from_secs(2);
    let ctx = AppContext::new(Arc::new(store), access)
        .with_provider(Arc::new(AniListClient::new(timeout).with_endpoint(format!("{}/graphql", server.uri()))))
        .with_provider(Arc::new(
            TmdbClient::new("token".into(), "fr-FR".into(), timeout).with_base_url(format!("{}/tmdb", server.uri())),
        ))
        .movie_provider(Provider::Tmdb);
    Harness { ctx, server, _dir: dir }
}

fn naruto() -> Value {
    json!({
        "id": 20,
        "siteUrl": "https://anilist.co/anime/20",
        "title": {"romaji": "NARUTO", "english": "Naruto", "native": "NARUTO -ナルト-"},
        "synonyms": [],
        "format": "TV",
        "episodes": 220,
        "duration": 23,
        "averageScore": 79,
        "meanScore": 80,
        "rankings": [{"rank": 12, "type": "POPULAR", "allTime": true}],
        "genres": ["Action", "Adventure"],
        "description": "Naruto Uzumaki, a hyperactive ninja.<br>Believe it!",
        "startDate": {"year": 2002, "month": 10, "day": 3},
        "endDate": {"year": 2007},
        "coverImage": {"extraLarge": "https://img.anili.st/naruto.jpg"},
        "trailer": null
    })
}

fn search(kind: MediaKind, title: &str) -> Request {
    Request::Search { kind, title: title.into() }
}

#[tokio::test]
async fn anime_search_renders_a_fiche_with_footer() {
    let h = harness(AccessList::open()).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"search": "Naruto"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"Page": {"media": [naruto()]}}})))
        .expect(1)
        .mount(&h.server)
        .await;

    let reply = h.ctx.handle(11, search(MediaKind::Anime, "Naruto")).await;
    let Reply::Record { text, poster } = reply else {
        panic!("expected a record, got {reply:?}");
    };
    assert!(text.contains("Format"), "{text}");
    assert!(text.contains("<b>Naruto</b> (2002–2007)"), "{text}");
    assert!(text.contains("★★★☆☆"), "{text}");
    assert!(text.ends_with(&format!("{BORDER}\n{FOOTER}")), "{text}");
    assert_eq!(poster.as_deref(), Some("https://img.anili.st/naruto.jpg"));

    // second lookup comes from the cache
    let again = h.ctx.handle(11, search(MediaKind::Anime, " naruto ")).await;
    assert!(matches!(again, Reply::Record { .. }));
    assert_eq!(h.ctx.store().stats().await.unwrap().searches, 2);
}

#[tokio::test]
async fn english_users_get_english_labels() {
    let h = harness(AccessList::open()).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"Page": {"media": [naruto()]}}})))
        .mount(&h.server)
        .await;

    h.ctx.handle(12, Request::SetLanguage("en".into())).await;
    h.ctx.handle(12, Request::SetFooter("Enjoy <3".into())).await;
    let Reply::Record { text, .. } = h.ctx.handle(12, search(MediaKind::Anime, "naruto")).await else {
        panic!("expected a record");
    };
    assert!(text.contains("Episodes"), "{text}");
    assert!(text.contains("3 October 2002"), "{text}");
    assert!(text.ends_with("Enjoy &lt;3"), "{text}");
}

#[tokio::test]
async fn multiple_results_open_a_single_use_selection() {
    let h = harness(AccessList::open()).await;
    let results: Vec<Value> = [(101, "Dune"), (102, "Dune : Deuxième partie"), (103, "Dune (1984)")]
        .iter()
        .map(|(id, title)| json!({"id": id, "title": title, "release_date": "2021-09-15"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/tmdb/search/movie"))
        .and(query_param("query", "dune"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tmdb/movie/102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 102,
            "title": "Dune : Deuxième partie",
            "overview": "Paul Atreides s'unit à Chani.",
            "release_date": "2024-02-28",
            "vote_average": 8.2,
            "vote_count": 5000,
            "runtime": 166,
            "genres": [{"name": "Science-Fiction"}]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let Reply::Choices { buttons, .. } = h.ctx.handle(21, search(MediaKind::Movie, "dune")).await else {
        panic!("expected choices");
    };
    assert_eq!(buttons.len(), 3);
    assert_eq!(buttons[1].0, "Dune : Deuxième partie (2021)");

    assert_eq!(h.ctx.select(22, &buttons[1].1).await, Reply::Ignore);

    let Reply::Record { text, .. } = h.ctx.select(21, &buttons[1].1).await else {
        panic!("expected the picked record");
    };
    assert!(text.contains("Dune : Deuxième partie"), "{text}");
    assert!(text.contains("166 min"), "{text}");

    let expired = Reply::Text(translate(Language::Fr, "session_expired").to_string());
    assert_eq!(h.ctx.select(21, &buttons[1].1).await, expired);
    assert_eq!(h.ctx.select(21, &buttons[0].1).await, expired);
}

#[tokio::test]
async fn unknown_titles_report_no_results() {
    let h = harness(AccessList::open()).await;
    Mock::given(path("/tmdb/search/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&h.server)
        .await;

    let reply = h.ctx.handle(5, search(MediaKind::Movie, "<zzz>")).await;
    assert_eq!(reply, Reply::Text("❌ Aucun résultat pour « &lt;zzz&gt; ».".into()));
    assert!(h.ctx.cache().is_empty().await);
}

#[tokio::test]
async fn unauthorized_callers_touch_nothing() {
    let h = harness(AccessList::only([1])).await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let denied = Reply::Text(translate(Language::BASE, "access_denied").to_string());
    assert_eq!(h.ctx.handle(2, search(MediaKind::Anime, "naruto")).await, denied);
    assert_eq!(h.ctx.handle(2, Request::SetLanguage("en".into())).await, denied);
    assert_eq!(h.ctx.handle(2, Request::ClearCache).await, denied);
    assert_eq!(h.ctx.select(2, "pick:tmdb:1:0:2").await, denied);
    assert_eq!(h.ctx.chosen_inline(2, "tmdb_102").await, denied);
    assert!(h.ctx.inline_search(2, "dune").await.is_empty());

    assert!(h.ctx.cache().is_empty().await);
    let stats = h.ctx.store().stats().await.unwrap();
    assert_eq!((stats.users, stats.searches), (0, 0));
}

#[tokio::test]
async fn inline_anime_prefix_uses_anilist() {
    let h = harness(AccessList::open()).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"Page": {"media": [naruto()]}}})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"id": 20}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"Media": naruto()}})))
        .expect(1)
        .with_priority(1)
        .mount(&h.server)
        .await;

    let items = h.ctx.inline_search(31, "Anime Naruto").await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "anilist_20");
    assert_eq!(items[0].thumbnail.as_deref(), Some("https://img.anili.st/naruto.jpg"));
    assert!(items[0].message.contains("Chargement"));

    let Reply::Record { text, .. } = h.ctx.chosen_inline(31, &items[0].id).await else {
        panic!("expected a record");
    };
    assert!(text.contains("Naruto"));
}
