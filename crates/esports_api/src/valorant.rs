//! vlrggapi client (Valorant)
//!
//! The API exposes list feeds only (`match/?q=upcoming`, `match/?q=results`),
//! no per-match detail endpoint. Match detail is therefore reconstructed from
//! the results feed: the final map score is all we get, so the series length
//! is rebuilt from the winner's map total and scoring goes through the same
//! winner rule as every other esport.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::{
    get_json, http_client, parse_start_time, EventState, MatchDetail, ScheduleProvider,
    ScheduledEvent, SeriesStrategy, SourceLog, TeamScore, TeamSide,
};

const BASE_URL: &str = "https://vlrggapi.vercel.app";

pub struct ValorantSource {
    client: reqwest::Client,
    log: SourceLog,
}

impl ValorantSource {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: http_client(),
            log: SourceLog::new(log_dir, "vlrgg", "valorant"),
        }
    }
}

#[async_trait]
impl ScheduleProvider for ValorantSource {
    fn kind(&self) -> &'static str {
        "valorant"
    }

    async fn fetch_schedule(&self) -> Result<Vec<ScheduledEvent>> {
        let url = format!("{BASE_URL}/match/?q=upcoming");

        let resp: VlrResponse = match get_json(&self.client, &url, None).await {
            Ok(r) => r,
            Err(e) => {
                self.log.error(&e.to_string());
                return Err(e).context("Valorant schedule fetch failed");
            }
        };

        let events: Vec<ScheduledEvent> = resp
            .data
            .segments
            .into_iter()
            .filter_map(normalize_upcoming)
            .collect();

        self.log.ok(events.len());
        Ok(events)
    }

    async fn fetch_match_detail(&self, match_id: &str) -> Result<MatchDetail> {
        let url = format!("{BASE_URL}/match/?q=results");

        let resp: VlrResponse = match get_json(&self.client, &url, None).await {
            Ok(r) => r,
            Err(e) => {
                self.log.error(&e.to_string());
                return Err(e).with_context(|| format!("Valorant results fetch failed for {match_id}"));
            }
        };

        // Not in the results feed yet → "no winner yet", retried next tick.
        let segment = resp.data.segments.into_iter().find(|s| {
            segment_match_id(s).as_deref() == Some(match_id)
                || teams::match_key(&s.team1, &s.team2) == match_id
        });

        Ok(segment.map(detail_from_result).unwrap_or_default())
    }
}

fn normalize_upcoming(seg: RawSegment) -> Option<ScheduledEvent> {
    let match_id = segment_match_id(&seg)?;
    let start_time = parse_start_time(&seg.unix_timestamp)?;

    Some(ScheduledEvent {
        match_id,
        start_time,
        state: EventState::Unstarted,
        league: seg.match_event.clone(),
        block_name: seg.match_series.clone(),
        teams: vec![team_side(&seg.team1), team_side(&seg.team2)],
        strategy: None,
    })
}

/// Final map score → synthetic series detail. A 2:1 result reconstructs a
/// best-of-3, 3:1 a best-of-5; a tied or unparsable score stays undecided.
fn detail_from_result(seg: RawSegment) -> MatchDetail {
    let s1: u32 = seg.score1.trim().parse().unwrap_or(0);
    let s2: u32 = seg.score2.trim().parse().unwrap_or(0);

    if s1 == s2 {
        return MatchDetail::default();
    }

    let winner_maps = s1.max(s2);
    MatchDetail {
        teams: vec![
            TeamScore { code: team_code(&seg.team1), game_wins: s1 },
            TeamScore { code: team_code(&seg.team2), game_wins: s2 },
        ],
        strategy: Some(SeriesStrategy {
            kind: "bestOf".to_string(),
            count: 2 * winner_maps - 1,
        }),
    }
}

/// Stable id for a segment: the numeric page id out of
/// `/378663/team-a-vs-team-b-...`, else the normalized team-pair key.
fn segment_match_id(seg: &RawSegment) -> Option<String> {
    let page_id = seg
        .match_page
        .split('/')
        .find(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

    match page_id {
        Some(id) => Some(id.to_string()),
        None if !seg.team1.is_empty() && !seg.team2.is_empty() => {
            Some(teams::match_key(&seg.team1, &seg.team2))
        }
        None => None,
    }
}

fn team_side(name: &str) -> TeamSide {
    TeamSide {
        name: name.to_string(),
        code: team_code(name),
        game_wins: 0,
    }
}

fn team_code(name: &str) -> String {
    teams::get_team_by_name(name)
        .map(|t| t.shortcode.to_string())
        .unwrap_or_else(|| name.to_string())
}

// ── Response types (vlrggapi schema) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VlrResponse {
    data: VlrData,
}

#[derive(Debug, Deserialize)]
struct VlrData {
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSegment {
    team1: String,
    team2: String,
    score1: String,
    score2: String,
    match_series: String,
    match_event: String,
    unix_timestamp: String,
    match_page: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upcoming_segment() -> RawSegment {
        RawSegment {
            team1: "Fnatic".to_string(),
            team2: "Sentinels".to_string(),
            match_series: "Playoffs: Grand Final".to_string(),
            match_event: "Valorant Champions 2024".to_string(),
            unix_timestamp: "2024-10-05 14:30:00".to_string(),
            match_page: "/378663/fnatic-vs-sentinels-valorant-champions-2024-gf".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn upcoming_normalizes_to_scheduled_event() {
        let ev = normalize_upcoming(upcoming_segment()).unwrap();
        assert_eq!(ev.match_id, "378663");
        assert_eq!(ev.state, EventState::Unstarted);
        assert_eq!(ev.league, "Valorant Champions 2024");
        assert_eq!(ev.block_name, "Playoffs: Grand Final");
        // Fnatic is in the registry, Sentinels is not
        assert_eq!(ev.teams[0].code, "FNC");
        assert_eq!(ev.teams[1].code, "Sentinels");
    }

    #[test]
    fn segment_without_page_id_falls_back_to_team_key() {
        let seg = RawSegment {
            team1: "Fnatic".to_string(),
            team2: "Sentinels".to_string(),
            match_page: "/live/".to_string(),
            ..Default::default()
        };
        assert_eq!(segment_match_id(&seg).unwrap(), "fnatic_vs_sentinels");
    }

    #[test]
    fn result_reconstructs_series_length() {
        let seg = RawSegment {
            team1: "Fnatic".to_string(),
            team2: "Sentinels".to_string(),
            score1: "2".to_string(),
            score2: "1".to_string(),
            ..Default::default()
        };
        let detail = detail_from_result(seg);
        assert_eq!(detail.strategy.as_ref().unwrap().count, 3);
        assert_eq!(detail.teams[0].game_wins, 2);
    }

    #[test]
    fn tied_or_missing_score_stays_undecided() {
        let tied = RawSegment {
            team1: "A".to_string(),
            team2: "B".to_string(),
            score1: "1".to_string(),
            score2: "1".to_string(),
            ..Default::default()
        };
        assert_eq!(detail_from_result(tied), MatchDetail::default());

        let blank = RawSegment::default();
        assert_eq!(detail_from_result(blank), MatchDetail::default());
    }
}
