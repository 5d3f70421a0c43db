//! Localized strings: a two-level table (language code → key → template).
//!
//! Lookups fall back to the base language when the language or the key is
//! missing there. Templates use `{name}` placeholders filled by [`translate_with`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::UNKNOWN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fr,
    En,
}

impl Language {
    pub const BASE: Language = Language::Fr;
    pub const ALL: [Language; 2] = [Language::Fr, Language::En];

    pub fn code(self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
        }
    }

    /// Accepts `fr`, `FR`, `fr-FR`, ` en ` and so on.
    pub fn from_code(code: &str) -> Option<Language> {
        let primary = code.trim().split(['-', '_']).next().unwrap_or("");
        Language::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(primary))
    }

    pub fn codes() -> String {
        Language::ALL.map(Language::code).join(", ")
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::BASE
    }
}

impl AsRef<str> for Language {
    fn as_ref(&self) -> &str {
        self.code()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const FR: &[(&str, &str)] = &[
    ("label_format", "Format"),
    ("label_release", "Sortie"),
    ("label_episodes", "Épisodes"),
    ("label_runtime", "Durée"),
    ("label_rating", "Note"),
    ("label_popularity", "Popularité"),
    ("label_genres", "Genres"),
    ("label_synopsis", "Synopsis"),
    ("label_view_on", "Voir sur"),
    ("label_trailer", "Bande-annonce"),
    ("format_movie", "Film"),
    ("no_description", "Aucune description."),
    ("no_results", "❌ Aucun résultat pour « {query} »."),
    ("choose_candidate", "🔎 Plusieurs résultats pour « {query} », choisissez :"),
    ("session_expired", "⌛ Cette recherche a expiré, relancez-la."),
    ("access_denied", "⛔ Accès refusé."),
    ("generic_error", "😕 Une erreur est survenue, réessayez plus tard."),
    ("loading", "🔍 Chargement..."),
    ("fiche_sent", "✅ Fiche envoyée."),
    (
        "start",
        "🎬 Bienvenue ! Utilisez /anime ou /movie suivi d'un titre,\nou tapez @ce_bot nom_du_film dans n'importe quelle discussion.",
    ),
    (
        "help",
        "<b>Commandes</b>\n/anime &lt;titre&gt; : chercher un anime\n/movie &lt;titre&gt; : chercher un film\n/setfooter &lt;texte&gt; : changer la signature\n/setlang &lt;code&gt; : changer la langue ({langs})\n/stats : statistiques\n/clearcache : vider le cache\n/help : cette aide",
    ),
    ("usage_anime", "Usage : /anime &lt;titre&gt;"),
    ("usage_movie", "Usage : /movie &lt;titre&gt;"),
    ("usage_setfooter", "Usage : /setfooter &lt;texte&gt;"),
    ("usage_setlang", "Usage : /setlang &lt;code&gt; (langues : {langs})"),
    ("footer_updated", "✅ Signature mise à jour."),
    ("language_updated", "✅ Langue : {lang}"),
    (
        "stats",
        "📊 <b>Statistiques</b>\nRecherches : {searches}\nUtilisateurs : {users}\nEntrées en cache : {entries}\nSélections en attente : {selections}",
    ),
    ("cache_cleared", "🧹 Cache vidé ({count} entrées)."),
    ("minutes", "min"),
];

const EN: &[(&str, &str)] = &[
    ("label_format", "Format"),
    ("label_release", "Release"),
    ("label_episodes", "Episodes"),
    ("label_runtime", "Runtime"),
    ("label_rating", "Rating"),
    ("label_popularity", "Popularity"),
    ("label_genres", "Genres"),
    ("label_synopsis", "Synopsis"),
    ("label_view_on", "View on"),
    ("label_trailer", "Trailer"),
    ("format_movie", "Movie"),
    ("no_description", "No description."),
    ("no_results", "❌ No results for “{query}”."),
    ("choose_candidate", "🔎 Several results for “{query}”, pick one:"),
    ("session_expired", "⌛ This search has expired, please run it again."),
    ("access_denied", "⛔ Access denied."),
    ("generic_error", "😕 Something went wrong, please try again later."),
    ("loading", "🔍 Loading..."),
    ("fiche_sent", "✅ Card sent."),
    (
        "start",
        "🎬 Welcome! Use /anime or /movie followed by a title,\nor type @this_bot movie_name in any chat.",
    ),
    (
        "help",
        "<b>Commands</b>\n/anime &lt;title&gt;: search an anime\n/movie &lt;title&gt;: search a movie\n/setfooter &lt;text&gt;: change the signature\n/setlang &lt;code&gt;: change the language ({langs})\n/stats: statistics\n/clearcache: clear the cache\n/help: this help",
    ),
    ("usage_anime", "Usage: /anime &lt;title&gt;"),
    ("usage_movie", "Usage: /movie &lt;title&gt;"),
    ("usage_setfooter", "Usage: /setfooter &lt;text&gt;"),
    ("usage_setlang", "Usage: /setlang &lt;code&gt; (languages: {langs})"),
    ("footer_updated", "✅ Signature updated."),
    ("language_updated", "✅ Language: {lang}"),
    (
        "stats",
        "📊 <b>Statistics</b>\nSearches: {searches}\nUsers: {users}\nCached entries: {entries}\nPending selections: {selections}",
    ),
    ("cache_cleared", "🧹 Cache cleared ({count} entries)."),
    ("minutes", "min"),
];

const MONTHS_FR: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

static TABLE: Lazy<HashMap<&'static str, HashMap<&'static str, &'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("fr", FR.iter().copied().collect()),
        ("en", EN.iter().copied().collect()),
    ])
});

/// Look up `key` for `lang`, falling back to the base language, then to `?`.
pub fn translate(lang: impl AsRef<str>, key: &str) -> &'static str {
    let base = Language::BASE.code();
    TABLE
        .get(lang.as_ref())
        .and_then(|t| t.get(key))
        .or_else(|| TABLE.get(base).and_then(|t| t.get(key)))
        .copied()
        .unwrap_or_else(|| {
            tracing::warn!(key, lang = lang.as_ref(), "missing translation");
            UNKNOWN
        })
}

pub fn translate_with(lang: impl AsRef<str>, key: &str, args: &[(&str, &str)]) -> String {
    let mut out = translate(lang, key).to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Month number (1–12) to its localized name, `?` otherwise.
pub fn month_name(lang: Language, month: u32) -> &'static str {
    let names = match lang {
        Language::Fr => &MONTHS_FR,
        Language::En => &MONTHS_EN,
    };
    match month {
        1..=12 => names[month as usize - 1],
        _ => UNKNOWN,
    }
}

#[cfg(test)]
fn keys() -> impl Iterator<Item = &'static str> {
    FR.iter().map(|(k, _)| *k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_is_translated_in_every_language() {
        for lang in Language::ALL {
            for key in keys() {
                let table = TABLE.get(lang.code()).unwrap();
                let value = table.get(key).unwrap_or_else(|| panic!("{lang} lacks {key}"));
                assert!(!value.is_empty(), "{lang}/{key} is empty");
                assert!(!translate(lang, key).is_empty());
            }
        }
        assert_eq!(FR.len(), EN.len());
    }

    #[test]
    fn unsupported_language_falls_back_to_base() {
        for key in keys() {
            assert_eq!(translate("de", key), translate(Language::BASE, key));
        }
        assert_eq!(translate("xx", "label_release"), "Sortie");
    }

    #[test]
    fn placeholders_are_filled() {
        let s = translate_with(Language::En, "no_results", &[("query", "Naruto")]);
        assert_eq!(s, "❌ No results for “Naruto”.");
    }

    #[test]
    fn language_codes_parse_loosely() {
        assert_eq!(Language::from_code("fr"), Some(Language::Fr));
        assert_eq!(Language::from_code(" EN "), Some(Language::En));
        assert_eq!(Language::from_code("en-US"), Some(Language::En));
        assert_eq!(Language::from_code("de"), None);
        assert_eq!(Language::from_code(""), None);
        assert_eq!(Language::default(), Language::Fr);
    }

    #[test]
    fn months_outside_range_are_unknown() {
        assert_eq!(month_name(Language::Fr, 1), "janvier");
        assert_eq!(month_name(Language::En, 12), "December");
        assert_eq!(month_name(Language::En, 0), "?");
        assert_eq!(month_name(Language::Fr, 13), "?");
    }
}
