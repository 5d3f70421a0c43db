//! Rendering of a [`DisplayRecord`] into the HTML "fiche" sent to users.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::i18n::{month_name, translate, Language};
use crate::model::{DisplayRecord, Length, MediaKind, Rating, RatingScale, ReleaseDate, UNKNOWN};

pub const SYNOPSIS_LIMIT: usize = 480;
pub const ELLIPSIS: &str = "…";
pub const BORDER: &str = "━━━━━━━━━━━━━━━━━━";
pub const FILLED_STAR: char = '★';
pub const EMPTY_STAR: char = '☆';
pub const GENERIC_GENRE_SYMBOL: &str = "🎞️";
/// Button and inline-result titles are cut to this many graphemes.
pub const LABEL_LIMIT: usize = 48;

static BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]*>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("valid regex"));
static BLANKS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
static NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static GENRE_SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("action", "💥"),
        ("adventure", "🗺️"),
        ("aventure", "🗺️"),
        ("animation", "🎨"),
        ("comedy", "😂"),
        ("comédie", "😂"),
        ("crime", "🕵️"),
        ("documentary", "🎥"),
        ("documentaire", "🎥"),
        ("drama", "🎭"),
        ("drame", "🎭"),
        ("ecchi", "🔥"),
        ("family", "👪"),
        ("familial", "👪"),
        ("fantasy", "🧙"),
        ("fantastique", "🧙"),
        ("history", "📜"),
        ("histoire", "📜"),
        ("horror", "👻"),
        ("horreur", "👻"),
        ("mahou shoujo", "🪄"),
        ("mecha", "🤖"),
        ("music", "🎵"),
        ("musique", "🎵"),
        ("mystery", "🔍"),
        ("mystère", "🔍"),
        ("psychological", "🧠"),
        ("romance", "💕"),
        ("sci-fi", "🚀"),
        ("science fiction", "🚀"),
        ("science-fiction", "🚀"),
        ("slice of life", "🍵"),
        ("sports", "⚽"),
        ("sport", "⚽"),
        ("supernatural", "✨"),
        ("thriller", "🔪"),
        ("war", "⚔️"),
        ("guerre", "⚔️"),
        ("western", "🤠"),
    ])
});

/// Five-glyph star scale for `score` out of `max`; `?` when the score is absent or non-positive.
pub fn stars(score: f64, max: f64) -> String {
    if !(score > 0.0) || !(max > 0.0) {
        return UNKNOWN.to_string();
    }
    let filled = ((5.0 * score / max).floor() as usize).min(5);
    let mut out = String::with_capacity(5 * FILLED_STAR.len_utf8());
    out.extend(std::iter::repeat(FILLED_STAR).take(filled));
    out.extend(std::iter::repeat(EMPTY_STAR).take(5 - filled));
    out
}

pub fn star_rating(rating: Option<Rating>) -> String {
    match rating {
        Some(r) => stars(r.raw(), r.scale().max()),
        None => UNKNOWN.to_string(),
    }
}

pub fn genre_symbol(genre: &str) -> &'static str {
    GENRE_SYMBOLS
        .get(genre.trim().to_lowercase().as_str())
        .copied()
        .unwrap_or(GENERIC_GENRE_SYMBOL)
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// [`html_escape`] plus `"`, for values inside `href="..."`.
fn attr_escape(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}

fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "hellip" => Some('…'),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    "rsquo" | "lsquo" => Some('\''),
                    "laquo" => Some('«'),
                    "raquo" => Some('»'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn normalize_whitespace(s: &str) -> String {
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<String> = s
        .split('\n')
        .map(|line| BLANKS_RE.replace_all(line, " ").trim().to_string())
        .collect();
    NEWLINES_RE.replace_all(&lines.join("\n"), "\n\n").trim().to_string()
}

/// Cuts `s` to `limit` characters, appending [`ELLIPSIS`] when something was cut.
pub fn clip(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        None => s.to_string(),
        Some((at, _)) => format!("{}{ELLIPSIS}", &s[..at]),
    }
}

/// Cleans a provider synopsis into HTML-safe text of at most [`SYNOPSIS_LIMIT`]
/// characters (plus ellipsis). Applying it to its own output changes nothing.
pub fn sanitize_synopsis(raw: &str, lang: Language) -> String {
    let text = BREAK_RE.replace_all(raw, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return translate(lang, "no_description").to_string();
    }
    html_escape(&clip(&text, SYNOPSIS_LIMIT))
}

/// Grapheme-safe shortening for button and inline-result labels.
pub fn short_text(s: &str, limit: usize) -> String {
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() <= limit {
        return s.to_string();
    }
    let mut out: String = graphemes[..limit.saturating_sub(1)].concat();
    out.push_str(ELLIPSIS);
    out
}

/// `Title (year)` shortened for a button.
pub fn short_label(title: &str, year: Option<i32>) -> String {
    let label = match year {
        Some(y) => format!("{title} ({y})"),
        None => title.to_string(),
    };
    short_text(&label, LABEL_LIMIT)
}

fn year_line(record: &DisplayRecord) -> Option<String> {
    match (record.year, record.end_year) {
        (Some(start), Some(end)) if end != start => Some(format!("{start}–{end}")),
        (Some(start), _) => Some(start.to_string()),
        _ => None,
    }
}

pub fn render_date(date: Option<&ReleaseDate>, lang: Language) -> String {
    let Some(date) = date else {
        return UNKNOWN.to_string();
    };
    let year = date.year.map_or_else(|| UNKNOWN.to_string(), |y| y.to_string());
    match (date.day, date.month) {
        (Some(day), Some(month)) => format!("{day} {} {year}", month_name(lang, month)),
        (None, Some(month)) => format!("{} {year}", month_name(lang, month)),
        _ => year,
    }
}

fn render_rating(rating: Option<Rating>) -> String {
    match rating {
        Some(r) if r.raw() > 0.0 => {
            let value = match r.scale() {
                RatingScale::Ten => format!("{:.1}", r.raw()),
                RatingScale::Hundred => format!("{:.0}", r.raw()),
            };
            format!("{} ({value}/{})", star_rating(Some(r)), r.scale().max())
        }
        _ => UNKNOWN.to_string(),
    }
}

fn render_length(length: &Length, lang: Language) -> (&'static str, String) {
    let min = translate(lang, "minutes");
    match *length {
        Length::Runtime { minutes } => ("label_runtime", format!("{minutes} {min}")),
        Length::Episodes { count, minutes_each } => {
            let count = count.map_or_else(|| UNKNOWN.to_string(), |c| c.to_string());
            match minutes_each {
                Some(m) => ("label_episodes", format!("{count} × {m} {min}")),
                None => ("label_episodes", count),
            }
        }
        Length::Unknown => ("label_runtime", UNKNOWN.to_string()),
    }
}

fn render_genres(genres: &[String]) -> String {
    if genres.is_empty() {
        return UNKNOWN.to_string();
    }
    genres
        .iter()
        .map(|g| format!("{} {}", genre_symbol(g), html_escape(g)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the full fiche. Pure: the same inputs always give the same text.
pub fn format_record(record: &DisplayRecord, lang: Language, footer: &str) -> String {
    let label = |key: &str| translate(lang, key);
    let icon = match record.kind {
        MediaKind::Anime => "🎌",
        MediaKind::Movie => "🎬",
    };

    let mut out = Vec::new();
    out.push(BORDER.to_string());
    match year_line(record) {
        Some(years) => out.push(format!("{icon} <b>{}</b> ({years})", html_escape(&record.primary_title))),
        None => out.push(format!("{icon} <b>{}</b>", html_escape(&record.primary_title))),
    }
    if !record.alternate_titles.is_empty() {
        out.push(format!("<i>{}</i>", html_escape(&record.alternate_titles.join(" • "))));
    }
    out.push(String::new());

    let format = match (&record.format, record.kind) {
        (Some(f), _) => html_escape(&f.replace('_', " ")),
        (None, MediaKind::Movie) => label("format_movie").to_string(),
        (None, MediaKind::Anime) => UNKNOWN.to_string(),
    };
    out.push(format!("📺 <b>{}:</b> {format}", label("label_format")));
    out.push(format!(
        "📅 <b>{}:</b> {}",
        label("label_release"),
        render_date(record.release.as_ref(), lang)
    ));
    let (length_key, length) = render_length(&record.length, lang);
    out.push(format!("⏱ <b>{}:</b> {length}", label(length_key)));
    out.push(format!("⭐ <b>{}:</b> {}", label("label_rating"), render_rating(record.rating)));
    let rank = record.popularity_rank.map_or_else(|| UNKNOWN.to_string(), |r| format!("#{r}"));
    out.push(format!("📈 <b>{}:</b> {rank}", label("label_popularity")));
    out.push(format!("🏷 <b>{}:</b> {}", label("label_genres"), render_genres(&record.genres)));
    out.push(String::new());

    out.push(format!("📖 <b>{}</b>", label("label_synopsis")));
    out.push(sanitize_synopsis(&record.synopsis, lang));
    out.push(String::new());

    out.push(format!(
        "🔗 <a href=\"{}\">{} {}</a>",
        attr_escape(&record.source_url),
        label("label_view_on"),
        record.source_name
    ));
    if let Some(trailer) = &record.trailer_url {
        out.push(format!("▶️ <a href=\"{}\">{}</a>", attr_escape(trailer), label("label_trailer")));
    }
    out.push(BORDER.to_string());
    out.push(html_escape(footer.trim()));
    out.join("\n")
}
