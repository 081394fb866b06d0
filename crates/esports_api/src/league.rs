//! lolesports persisted-gw client
//!
//! Endpoints:
//!   getSchedule?hl=en-US[&leagueId=..]   — upcoming/completed events
//!   getEventDetails?hl=en-US&id=<match>  — per-match result detail

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::{
    get_json, http_client, parse_start_time, EventState, MatchDetail, ScheduleProvider,
    ScheduledEvent, SeriesStrategy, SourceLog, TeamScore, TeamSide,
};

const BASE_URL: &str = "https://esports-api.lolesports.com/persisted/gw";
const API_KEY: &str = "0TvQnueqKa5mxJntVWt0w4LpLfEkrV1Ta8rQBb9Z";

/// Riot league ids accepted by getSchedule's leagueId filter.
pub mod league_ids {
    pub const WORLDS: &str = "98767975604431411";
    pub const LCS: &str = "98767991299243165";
    pub const LEC: &str = "98767991302996019";
    pub const LCK: &str = "98767991310872058";
    pub const LPL: &str = "98767991314006698";
    pub const MSI: &str = "98767991325878492";
}

pub struct LeagueSource {
    client: reqwest::Client,
    log: SourceLog,
    league_id: Option<String>,
}

impl LeagueSource {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: http_client(),
            log: SourceLog::new(log_dir, "lolesports", "leagueoflegends"),
            league_id: None,
        }
    }

    /// Restrict the schedule to a single league (see [`league_ids`]).
    pub fn with_league(mut self, league_id: impl Into<String>) -> Self {
        self.league_id = Some(league_id.into());
        self
    }
}

#[async_trait]
impl ScheduleProvider for LeagueSource {
    fn kind(&self) -> &'static str {
        "lol"
    }

    async fn fetch_schedule(&self) -> Result<Vec<ScheduledEvent>> {
        let mut url = format!("{BASE_URL}/getSchedule?hl=en-US");
        if let Some(id) = &self.league_id {
            url.push_str(&format!("&leagueId={id}"));
        }

        let resp: ScheduleResponse = match get_json(&self.client, &url, Some(API_KEY)).await {
            Ok(r) => r,
            Err(e) => {
                self.log.error(&e.to_string());
                return Err(e).context("LoL schedule fetch failed");
            }
        };

        let events: Vec<ScheduledEvent> = resp
            .data
            .schedule
            .events
            .into_iter()
            .filter_map(normalize_event)
            .collect();

        self.log.ok(events.len());
        Ok(events)
    }

    async fn fetch_match_detail(&self, match_id: &str) -> Result<MatchDetail> {
        let url = format!("{BASE_URL}/getEventDetails?hl=en-US&id={match_id}");

        let resp: DetailResponse = match get_json(&self.client, &url, Some(API_KEY)).await {
            Ok(r) => r,
            Err(e) => {
                self.log.error(&e.to_string());
                return Err(e).with_context(|| format!("LoL detail fetch failed for {match_id}"));
            }
        };

        Ok(normalize_detail(resp.data.event.r#match))
    }
}

fn normalize_event(raw: RawEvent) -> Option<ScheduledEvent> {
    // Schedule feeds interleave "show" blocks with matches; only the latter
    // carry a match object.
    let m = raw.r#match?;
    let start_time = parse_start_time(&raw.start_time)?;

    Some(ScheduledEvent {
        match_id: m.id,
        start_time,
        state: EventState::parse(&raw.state),
        league: raw.league.map(|l| l.name).unwrap_or_default(),
        block_name: raw.block_name.unwrap_or_default(),
        teams: m
            .teams
            .into_iter()
            .map(|t| TeamSide {
                game_wins: t.result.map(|r| r.game_wins).unwrap_or(0),
                name: t.name,
                code: t.code,
            })
            .collect(),
        strategy: m.strategy.map(|s| SeriesStrategy { kind: s.kind, count: s.count }),
    })
}

fn normalize_detail(m: RawMatch) -> MatchDetail {
    MatchDetail {
        teams: m
            .teams
            .into_iter()
            .map(|t| TeamScore {
                code: t.code,
                game_wins: t.result.map(|r| r.game_wins).unwrap_or(0),
            })
            .collect(),
        strategy: m.strategy.map(|s| SeriesStrategy { kind: s.kind, count: s.count }),
    }
}

// ── Response types (persisted-gw schema) ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    data: ScheduleData,
}

#[derive(Debug, Deserialize)]
struct ScheduleData {
    schedule: RawSchedule,
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    start_time: String,
    #[serde(default)]
    state: String,
    block_name: Option<String>,
    league: Option<RawLeague>,
    r#match: Option<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawLeague {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(default)]
    id: String,
    #[serde(default)]
    teams: Vec<RawTeam>,
    strategy: Option<RawStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: String,
    result: Option<RawResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    #[serde(default)]
    game_wins: u32,
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(rename = "type")]
    kind: String,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: DetailData,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    event: DetailEvent,
}

#[derive(Debug, Deserialize)]
struct DetailEvent {
    r#match: RawMatch,
}
