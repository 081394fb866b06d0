//! Schedule/match-detail sources
//!
//! One `ScheduleProvider` implementation per upstream format:
//! - LoL: esports-api.lolesports.com persisted-gw (API key, typed JSON)
//! - Valorant: vlrggapi.vercel.app (upcoming + results feeds)
//!
//! Both normalize into the same `ScheduledEvent`/`MatchDetail` shapes so the
//! classifier and reconciler never care which esport they are looking at.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use logger::{now_iso, ApiStatusEvent, EventLogger};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

mod league;
mod valorant;

pub use league::LeagueSource;
pub use valorant::ValorantSource;

// ── Normalized model ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Unstarted,
    InProgress,
    Completed,
    Unknown,
}

impl EventState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "unstarted" => Self::Unstarted,
            "inProgress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamSide {
    pub name: String,
    pub code: String,
    pub game_wins: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStrategy {
    /// Upstream strategy type, `"bestOf"` for every league series seen so far.
    pub kind: String,
    pub count: u32,
}

/// One scheduled match as reported upstream. Immutable snapshot per poll;
/// `match_id` is the only correlation key.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub state: EventState,
    pub league: String,
    pub block_name: String,
    pub teams: Vec<TeamSide>,
    pub strategy: Option<SeriesStrategy>,
}

impl ScheduledEvent {
    /// Either side still a placeholder? Such events are skipped outright and
    /// re-evaluated on a later poll once the bracket resolves.
    pub fn has_tbd_team(&self) -> bool {
        self.teams.len() < 2 || self.teams.iter().any(|t| t.name == "TBD" || t.name.is_empty())
    }
}

/// Authoritative per-match result data, fetched during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamScore {
    pub code: String,
    pub game_wins: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchDetail {
    pub teams: Vec<TeamScore>,
    pub strategy: Option<SeriesStrategy>,
}

// ── Provider boundary ─────────────────────────────────────────────────────────

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    /// Esport key ("lol", "valorant"), used for logging and display metadata.
    fn kind(&self) -> &'static str;

    async fn fetch_schedule(&self) -> Result<Vec<ScheduledEvent>>;

    async fn fetch_match_detail(&self, match_id: &str) -> Result<MatchDetail>;
}

// ── Shared client plumbing ────────────────────────────────────────────────────

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        // Imitate a browser; some feed frontends reject default agents
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) struct SourceLog {
    logger: EventLogger,
    source: &'static str,
    scope: &'static str,
}

impl SourceLog {
    pub(crate) fn new(log_dir: impl Into<PathBuf>, source: &'static str, scope: &'static str) -> Self {
        Self { logger: EventLogger::new(log_dir), source, scope }
    }

    pub(crate) fn ok(&self, items: usize) {
        let _ = self.logger.log(&ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: self.source.to_string(),
            scope: self.scope.to_string(),
            ok: true,
            status_code: Some(200),
            message: "ok".to_string(),
            items,
        });
    }

    pub(crate) fn error(&self, msg: &str) {
        let _ = self.logger.log(&ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: self.source.to_string(),
            scope: self.scope.to_string(),
            ok: false,
            status_code: None,
            message: msg.to_string(),
            items: 0,
        });
    }
}

pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
) -> Result<T> {
    let mut req = client.get(url);
    if let Some(key) = api_key {
        req = req.header("x-api-key", key);
    }
    let resp = req.send().await.with_context(|| format!("request failed: {url}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("upstream {url} failed {status}: {}", &body[..body.len().min(100)]);
        anyhow::bail!("http_{status}");
    }

    let raw = resp.text().await?;
    debug!("upstream {url} returned {} bytes", raw.len());
    serde_json::from_str::<T>(&raw).with_context(|| format!("decode failed: {url}"))
}

/// `"2024-10-05 14:30:00"` (UTC, vlrggapi) or RFC 3339 (lolesports).
pub(crate) fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
