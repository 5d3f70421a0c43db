use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tg_fiche_bot::cache::QueryCache;
use tg_fiche_bot::config::Config;
use tg_fiche_bot::providers::{AniListClient, ImdbApiClient, MetadataProvider, OmdbClient, Provider, TmdbClient};
use tg_fiche_bot::selection::SelectionBook;
use tg_fiche_bot::service::{AccessList, AppContext};
use tg_fiche_bot::storage::{JsonStore, PgStore, PreferenceStore};
use tg_fiche_bot::tg::{self, Webhook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn PreferenceStore> = match &config.database_url {
        Some(url) => {
            info!("using PostgreSQL preference store");
            Arc::new(PgStore::connect(url, config.default_footer.clone()).await?)
        }
        None => {
            info!(path = %config.store_path.display(), "using JSON preference store");
            Arc::new(JsonStore::open(config.store_path.clone(), config.default_footer.clone()).await?)
        }
    };

    let access = match &config.authorized_users {
        Some(ids) => AccessList::only(ids.iter().copied()),
        None => AccessList::open(),
    };

    let timeout = config.http_timeout;
    let key = config.movie_api_key.clone();
    let movies: Arc<dyn MetadataProvider> = match config.movie_provider {
        Provider::Omdb => Arc::new(OmdbClient::new(key, timeout)),
        Provider::ImdbApi => Arc::new(ImdbApiClient::new(key, timeout)),
        Provider::Tmdb | Provider::Anilist => Arc::new(TmdbClient::new(key, config.tmdb_language.clone(), timeout)),
    };

    let ctx = AppContext::new(store, access)
        .with_provider(Arc::new(AniListClient::new(timeout)))
        .with_provider(movies)
        .movie_provider(config.movie_provider)
        .with_cache(QueryCache::new(config.cache_capacity, config.cache_ttl))
        .with_selections(SelectionBook::new(config.selection_capacity, config.selection_ttl));

    info!(movie_provider = %config.movie_provider, "starting bot");
    let bot = Bot::new(config.bot_token.clone());
    let webhook = config.webhook_url.clone().map(|url| Webhook { url, port: config.port });
    tg::run(bot, Arc::new(ctx), webhook).await
}
