//! Environment configuration, validated once at startup.

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::model::MediaKind;
use crate::providers::Provider;

pub const DEFAULT_FOOTER: &str = "🍿 Bon visionnage !";
pub const DEFAULT_STORE_PATH: &str = "fiche_bot_state.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bot_token: String,
    pub movie_provider: Provider,
    /// Key of the selected movie provider.
    pub movie_api_key: String,
    pub tmdb_language: String,
    /// `None` = everyone may use the bot.
    pub authorized_users: Option<Vec<i64>>,
    pub database_url: Option<String>,
    pub store_path: PathBuf,
    pub webhook_url: Option<String>,
    pub port: u16,
    pub http_timeout: Duration,
    pub cache_capacity: u64,
    pub cache_ttl: Option<Duration>,
    pub selection_capacity: u64,
    pub selection_ttl: Duration,
    pub default_footer: String,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("TELOXIDE_TOKEN"))
            .context("TELEGRAM_BOT_TOKEN is missing")?;

        let movie_provider = match var("MOVIE_PROVIDER") {
            None => Provider::Tmdb,
            Some(tag) => match Provider::from_tag(&tag) {
                Some(p) if p.kind() == MediaKind::Movie => p,
                _ => bail!("MOVIE_PROVIDER must be one of tmdb, omdb, imdb (got {tag:?})"),
            },
        };
        let key_var = match movie_provider {
            Provider::Omdb => "OMDB_API_KEY",
            Provider::ImdbApi => "IMDB_API_KEY",
            Provider::Tmdb | Provider::Anilist => "TMDB_API_KEY",
        };
        let movie_api_key = var(key_var).with_context(|| format!("{key_var} is missing"))?;

        let mut ids = Vec::new();
        let mut restricted = false;
        for name in ["AUTHORIZED_USER_ID", "AUTHORIZED_USER_IDS"] {
            if let Some(list) = var(name) {
                restricted = true;
                for id in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    ids.push(id.parse::<i64>().with_context(|| format!("{name}: invalid user id {id:?}"))?);
                }
            }
        }
        if restricted && ids.is_empty() {
            bail!("AUTHORIZED_USER_IDS is set but lists no user id");
        }

        let webhook_url = var("WEBHOOK_URL");
        let production = var("APP_ENV").is_some_and(|e| e.eq_ignore_ascii_case("production"));
        if production && webhook_url.is_none() {
            bail!("WEBHOOK_URL is required when APP_ENV=production");
        }

        let timeout_secs: u64 = parse_or(&var, "HTTP_TIMEOUT_SECS", 10)?;
        if !(1..=60).contains(&timeout_secs) {
            bail!("HTTP_TIMEOUT_SECS must be between 1 and 60 (got {timeout_secs})");
        }

        let cache_capacity = parse_or(&var, "CACHE_CAPACITY", 1000)?;
        let selection_capacity = parse_or(&var, "SELECTION_CAPACITY", 10_000)?;
        if cache_capacity == 0 || selection_capacity == 0 {
            bail!("CACHE_CAPACITY and SELECTION_CAPACITY must be positive");
        }
        let cache_ttl = match var("CACHE_TTL_SECS") {
            Some(v) => Some(Duration::from_secs(parse("CACHE_TTL_SECS", &v)?)),
            None => None,
        };

        Ok(Config {
            bot_token,
            movie_provider,
            movie_api_key,
            tmdb_language: var("TMDB_LANGUAGE").unwrap_or_else(|| "fr-FR".to_string()),
            authorized_users: restricted.then_some(ids),
            database_url: var("DATABASE_URL"),
            store_path: var("STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()).into(),
            webhook_url,
            port: parse_or(&var, "PORT", 8443)?,
            http_timeout: Duration::from_secs(timeout_secs),
            cache_capacity,
            cache_ttl,
            selection_capacity,
            selection_ttl: Duration::from_secs(parse_or(&var, "SELECTION_TTL_SECS", 3600)?),
            default_footer: var("DEFAULT_FOOTER").unwrap_or_else(|| DEFAULT_FOOTER.to_string()),
        })
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| anyhow!("{name}: invalid value {value:?}"))
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T> {
    match var(name) {
        Some(v) => parse(name, &v),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[("TELEGRAM_BOT_TOKEN", "123:abc"), ("TMDB_API_KEY", "t")]).unwrap();
        assert_eq!(c.movie_provider, Provider::Tmdb);
        assert_eq!(c.movie_api_key, "t");
        assert_eq!(c.tmdb_language, "fr-FR");
        assert_eq!(c.authorized_users, None);
        assert_eq!(c.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(c.port, 8443);
        assert_eq!(c.http_timeout, Duration::from_secs(10));
        assert_eq!((c.cache_capacity, c.cache_ttl), (1000, None));
        assert_eq!((c.selection_capacity, c.selection_ttl), (10_000, Duration::from_secs(3600)));
        assert_eq!(c.default_footer, DEFAULT_FOOTER);
    }

    #[test]
    fn teloxide_token_is_accepted() {
        let c = config(&[("TELOXIDE_TOKEN", "1:x"), ("TMDB_API_KEY", "t")]).unwrap();
        assert_eq!(c.bot_token, "1:x");
    }

    #[test]
    fn selected_provider_key_is_required() {
        let err = config(&[("TELEGRAM_BOT_TOKEN", "1:x"), ("MOVIE_PROVIDER", "omdb"), ("TMDB_API_KEY", "t")])
            .unwrap_err();
        assert!(err.to_string().contains("OMDB_API_KEY"), "{err}");

        let c = config(&[("TELEGRAM_BOT_TOKEN", "1:x"), ("MOVIE_PROVIDER", "imdb"), ("IMDB_API_KEY", "k")]).unwrap();
        assert_eq!(c.movie_provider, Provider::ImdbApi);
        assert!(config(&[("TELEGRAM_BOT_TOKEN", "1:x"), ("MOVIE_PROVIDER", "anilist")]).is_err());
    }

    #[test]
    fn authorized_ids_merge() {
        let c = config(&[
            ("TELEGRAM_BOT_TOKEN", "1:x"),
            ("TMDB_API_KEY", "t"),
            ("AUTHORIZED_USER_ID", "7"),
            ("AUTHORIZED_USER_IDS", "8, 9,"),
        ])
        .unwrap();
        assert_eq!(c.authorized_users, Some(vec![7, 8, 9]));
        assert!(config(&[("TELEGRAM_BOT_TOKEN", "1:x"), ("TMDB_API_KEY", "t"), ("AUTHORIZED_USER_ID", "me")]).is_err());
    }

    #[test]
    fn production_needs_webhook() {
        let base = [("TELEGRAM_BOT_TOKEN", "1:x"), ("TMDB_API_KEY", "t"), ("APP_ENV", "production")];
        assert!(config(&base).is_err());
        let mut with_hook = base.to_vec();
        with_hook.push(("WEBHOOK_URL", "https://bot.example.org/webhook"));
        assert!(config(&with_hook).unwrap().webhook_url.is_some());
    }

    #[test]
    fn timeout_bounds() {
        let vars = |t: &'static str| [("TELEGRAM_BOT_TOKEN", "1:x"), ("TMDB_API_KEY", "t"), ("HTTP_TIMEOUT_SECS", t)];
        assert!(config(&vars("0")).is_err());
        assert!(config(&vars("61")).is_err());
        assert!(config(&vars("soon")).is_err());
        assert_eq!(config(&vars("60")).unwrap().http_timeout, Duration::from_secs(60));
    }
}
