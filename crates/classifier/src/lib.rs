//! Event classifier
//!
//! Pure functions between the schedule feeds and the reconciler: which events
//! are worth announcing, and who won a finished series. No I/O, no state.

use chrono::{DateTime, Duration, Utc};
use esports_api::{EventState, MatchDetail, ScheduledEvent};

/// Announce window in hours ahead of kickoff. Closed interval: an event
/// starting exactly `window_hours` from now still qualifies.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Whole hours until kickoff, truncated toward zero.
pub fn hours_until(start_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    start_time.signed_duration_since(now).num_hours()
}

/// Keep events that are unstarted, not yet announced, and starting within
/// `[0, window_hours]` hours. Input order is preserved.
pub fn filter_upcoming<'a, F>(
    events: &'a [ScheduledEvent],
    now: DateTime<Utc>,
    window_hours: i64,
    mut is_posted: F,
) -> Vec<&'a ScheduledEvent>
where
    F: FnMut(&str) -> bool,
{
    events
        .iter()
        .filter(|ev| {
            if ev.state != EventState::Unstarted || is_posted(&ev.match_id) {
                return false;
            }
            let until = ev.start_time.signed_duration_since(now);
            until >= Duration::zero() && until.num_hours() <= window_hours
        })
        .collect()
}

/// Winner of a series, if decided. Total: missing or zero-count strategy and
/// missing teams mean "no winner yet", never an error.
pub fn determine_winner(detail: &MatchDetail) -> Option<&str> {
    let strategy = detail.strategy.as_ref()?;
    if strategy.count == 0 {
        return None;
    }
    let win_threshold = strategy.count.div_ceil(2);

    let (team1, team2) = match detail.teams.as_slice() {
        [a, b] => (a, b),
        _ => return None,
    };

    if team1.game_wins >= win_threshold {
        Some(&team1.code)
    } else if team2.game_wins >= win_threshold {
        Some(&team2.code)
    } else {
        None
    }
}

/// Series length, surfaced only for display.
pub fn best_of(event: &ScheduledEvent) -> Option<u32> {
    event
        .strategy
        .as_ref()
        .filter(|s| s.kind == "bestOf")
        .map(|s| s.count)
}

/// Chat-ready listing of upcoming events, one line per match.
pub fn format_schedule(events: &[ScheduledEvent], now: DateTime<Utc>) -> String {
    if events.is_empty() {
        return "No upcoming matches.".to_string();
    }

    events
        .iter()
        .map(|ev| {
            let names: Vec<&str> = ev.teams.iter().map(|t| t.name.as_str()).collect();
            let versus = names.join(" vs ");
            let when = match hours_until(ev.start_time, now) {
                h if h <= 0 => "soon".to_string(),
                h => format!("in {h}h"),
            };
            match best_of(ev) {
                Some(n) => format!("**{versus}** — {} ({}) — Bo{n}, {when}", ev.league, ev.block_name),
                None => format!("**{versus}** — {} ({}) — {when}", ev.league, ev.block_name),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
