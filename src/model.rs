use once_cell::sync::Lazy;
use regex::Regex;

/// Rendered in place of any field a provider did not supply.
pub const UNKNOWN: &str = "?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Anime,
    Movie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingScale {
    Ten,
    Hundred,
}

impl RatingScale {
    pub fn max(self) -> f64 {
        match self {
            RatingScale::Ten => 10.0,
            RatingScale::Hundred => 100.0,
        }
    }
}

/// A provider score together with its denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    raw: f64,
    scale: RatingScale,
}

impl Rating {
    /// `None` unless `0 <= raw <= scale.max()`.
    pub fn new(raw: f64, scale: RatingScale) -> Option<Rating> {
        (raw.is_finite() && (0.0..=scale.max()).contains(&raw)).then_some(Rating { raw, scale })
    }

    pub fn raw(&self) -> f64 {
        self.raw
    }

    pub fn scale(&self) -> RatingScale {
        self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ReleaseDate {
    /// Parses `YYYY-MM-DD`, tolerating missing trailing parts (`YYYY`, `YYYY-MM`).
    pub fn parse_iso(s: &str) -> Option<ReleaseDate> {
        let mut parts = s.trim().splitn(3, '-');
        let year = parts.next().and_then(|y| y.parse().ok()).and_then(four_digit_year)?;
        let month = parts.next().and_then(|m| m.parse().ok());
        let day = parts.next().and_then(|d| d.parse().ok());
        Some(ReleaseDate { year: Some(year), month, day })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Runtime { minutes: u32 },
    Episodes { count: Option<u32>, minutes_each: Option<u32> },
    Unknown,
}

/// Provider-agnostic view of one movie or anime.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub kind: MediaKind,
    pub primary_title: String,
    pub alternate_titles: Vec<String>,
    pub year: Option<i32>,
    pub end_year: Option<i32>,
    pub release: Option<ReleaseDate>,
    pub format: Option<String>,
    pub genres: Vec<String>,
    pub rating: Option<Rating>,
    pub popularity_rank: Option<u32>,
    pub length: Length,
    pub synopsis: String,
    pub poster_url: Option<String>,
    pub trailer_url: Option<String>,
    pub source_id: String,
    pub source_name: &'static str,
    pub source_url: String,
}

pub fn four_digit_year(y: i32) -> Option<i32> {
    (1000..=9999).contains(&y).then_some(y)
}

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("valid regex"));

/// Extracts `(start, end)` from strings like `2010`, `2010–2013` or `2019–`.
pub fn year_span(s: &str) -> (Option<i32>, Option<i32>) {
    let mut years = YEAR_RE
        .find_iter(s)
        .filter_map(|m| m.as_str().parse().ok())
        .filter_map(four_digit_year);
    (years.next(), years.next())
}

/// Trims titles, drops empties and anything equal to `primary`, keeps first occurrences.
pub fn distinct_titles<I>(primary: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut out: Vec<String> = Vec::new();
    for title in candidates.into_iter().flatten() {
        let title = title.trim();
        if title.is_empty() || title.eq_ignore_ascii_case(primary) {
            continue;
        }
        if !out.iter().any(|t| t.eq_ignore_ascii_case(title)) {
            out.push(title.to_string());
        }
    }
    out
}

/// `"N/A"`, empty and whitespace-only values become `None`.
pub fn present(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("n/a"))
        .map(str::to_string)
}
