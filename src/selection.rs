//! Multi-result disambiguation: pending selections and the tokens carried by buttons.

use moka::future::Cache;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::providers::Provider;

const TOKEN_PREFIX: &str = "pick";

/// One entry of a multi-result list.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub label: String,
    pub raw: Value,
}

#[derive(Debug)]
pub struct PendingSelection {
    pub provider: Provider,
    pub owner: i64,
    pub candidates: Vec<Candidate>,
}

/// Callback data of a selection button: `pick:<provider>:<session>:<index>:<owner>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken {
    pub provider: Provider,
    pub session: u64,
    pub index: usize,
    pub owner: i64,
}

impl SelectionToken {
    pub fn encode(&self) -> String {
        format!(
            "{TOKEN_PREFIX}:{}:{}:{}:{}",
            self.provider.tag(),
            self.session,
            self.index,
            self.owner
        )
    }

    pub fn parse(data: &str) -> Option<SelectionToken> {
        let mut parts = data.split(':');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let provider = Provider::from_tag(parts.next()?)?;
        let session = parts.next()?.parse().ok()?;
        let index = parts.next()?.parse().ok()?;
        let owner = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(SelectionToken { provider, session, index, owner })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pick {
    Resolved { provider: Provider, candidate: Candidate },
    /// Someone other than the searcher pressed the button; nothing is consumed.
    ForeignUser,
    Expired,
}

/// Open selections, each consumed at most once. Bounded by capacity and idle time.
#[derive(Clone)]
pub struct SelectionBook {
    sessions: Cache<u64, Arc<PendingSelection>>,
    next_session: Arc<AtomicU64>,
}

impl SelectionBook {
    pub fn new(capacity: u64, idle: Duration) -> Self {
        // seeded from the clock so buttons left over from a previous run never match
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        Self {
            sessions: Cache::builder().max_capacity(capacity).time_to_idle(idle).build(),
            next_session: Arc::new(AtomicU64::new(seed)),
        }
    }

    /// Registers a selection and returns one token per candidate, in order.
    pub async fn open(&self, provider: Provider, owner: i64, candidates: Vec<Candidate>) -> Vec<SelectionToken> {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let tokens = (0..candidates.len())
            .map(|index| SelectionToken { provider, session, index, owner })
            .collect();
        self.sessions
            .insert(session, Arc::new(PendingSelection { provider, owner, candidates }))
            .await;
        tokens
    }

    pub async fn take(&self, token: &SelectionToken, caller: i64) -> Pick {
        if token.owner != caller {
            return Pick::ForeignUser;
        }
        let Some(pending) = self.sessions.remove(&token.session).await else {
            return Pick::Expired;
        };
        let candidate = match pending.candidates.get(token.index) {
            Some(candidate) if pending.owner == caller && pending.provider == token.provider => candidate.clone(),
            _ => {
                // forged token: put the session back untouched
                self.sessions.insert(token.session, pending).await;
                return Pick::ForeignUser;
            }
        };
        Pick::Resolved { provider: pending.provider, candidate }
    }

    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate { id: i.to_string(), label: format!("Movie {i}"), raw: json!({ "id": i }) })
            .collect()
    }

    fn book() -> SelectionBook {
        SelectionBook::new(100, Duration::from_secs(60))
    }

    #[test]
    fn tokens_fit_callback_data() {
        let token = SelectionToken { provider: Provider::Anilist, session: u64::MAX, index: 9, owner: i64::MIN };
        let data = token.encode();
        assert!(data.len() <= 64, "{data}");
        assert_eq!(SelectionToken::parse(&data), Some(token));
    }

    #[test]
    fn garbage_tokens_do_not_parse() {
        assert_eq!(SelectionToken::parse("add:42"), None);
        assert_eq!(SelectionToken::parse("pick:nope:1:0:5"), None);
        assert_eq!(SelectionToken::parse("pick:tmdb:1:0"), None);
        assert_eq!(SelectionToken::parse("pick:tmdb:1:0:5:6"), None);
    }

    #[tokio::test]
    async fn selection_is_consumed_once() {
        let book = book();
        let tokens = book.open(Provider::Tmdb, 7, candidates(3)).await;
        assert_eq!(tokens.len(), 3);
        assert_eq!(book.len().await, 1);

        match book.take(&tokens[1], 7).await {
            Pick::Resolved { provider, candidate } => {
                assert_eq!(provider, Provider::Tmdb);
                assert_eq!(candidate.id, "1");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(book.take(&tokens[1], 7).await, Pick::Expired);
        assert_eq!(book.take(&tokens[0], 7).await, Pick::Expired);
    }

    #[tokio::test]
    async fn foreign_users_are_ignored_without_consuming() {
        let book = book();
        let tokens = book.open(Provider::Anilist, 7, candidates(2)).await;
        assert_eq!(book.take(&tokens[0], 8).await, Pick::ForeignUser);

        let forged = SelectionToken { owner: 8, ..tokens[0] };
        assert_eq!(book.take(&forged, 8).await, Pick::ForeignUser);

        assert!(matches!(book.take(&tokens[0], 7).await, Pick::Resolved { .. }));
    }

    #[tokio::test]
    async fn unknown_sessions_expire() {
        let book = book();
        let token = SelectionToken { provider: Provider::Omdb, session: 1, index: 0, owner: 7 };
        assert_eq!(book.take(&token, 7).await, Pick::Expired);
    }

    #[tokio::test]
    async fn out_of_range_index_keeps_the_session() {
        let book = book();
        let tokens = book.open(Provider::Omdb, 7, candidates(2)).await;
        let out_of_range = SelectionToken { index: 5, ..tokens[0] };
        assert_eq!(book.take(&out_of_range, 7).await, Pick::ForeignUser);
        assert_eq!(book.len().await, 1);

        match book.take(&tokens[1], 7).await {
            Pick::Resolved { candidate, .. } => assert_eq!(candidate.id, "1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn sessions_have_distinct_ids() {
        let book = book();
        let a = book.open(Provider::Tmdb, 1, candidates(2)).await;
        let b = book.open(Provider::Tmdb, 1, candidates(2)).await;
        assert_ne!(a[0].session, b[0].session);
    }
}
