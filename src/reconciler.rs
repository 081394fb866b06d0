//! Schedule reconciler
//!
//! Drives the whole lifecycle on a fixed tick, past phase first:
//!   1. settle announced matches whose voting window has long closed:
//!      fetch the authoritative result, score stored predictions, stamp the
//!      original announcement, drop the dedup row
//!   2. fetch the schedule, classify what is newly announceable, and for each
//!      destination guild post the announcement and open a voting window
//!
//! Every match and every guild is an independent unit of work: its failure is
//! logged and the batch moves on. A match without a decided winner stays in
//! `posted_matches` and is retried on every later tick.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use logger::{
    now_iso, AnnouncePostedEvent, EventLogger, MatchResolvedEvent, ReconcileHeartbeatEvent,
};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::collector::{EmojiChoice, PredictionCollector};
use crate::config::Config;
use crate::gateway::{Announcement, ChatGateway, EmbedField};
use crate::store::{PostedMatch, PredictionStore};
use classifier::{best_of, determine_winner, filter_upcoming, hours_until};
use esports_api::{ScheduleProvider, ScheduledEvent, TeamSide};

/// Reaction glyphs for teams without a registered custom emoji.
const FALLBACK_EMOJIS: [&str; 2] = ["1\u{fe0f}\u{20e3}", "2\u{fe0f}\u{20e3}"];

const ANNOUNCE_COLOR: u32 = 0x2f4ff1;

pub struct Reconciler {
    store: Arc<PredictionStore>,
    provider: Arc<dyn ScheduleProvider>,
    collector: Arc<PredictionCollector>,
    logger: Arc<EventLogger>,
    window_hours: i64,
    lookback_hours: i64,
    poll_interval_secs: u64,
    predictions_channel: String,
    tick_lock: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(
        store: Arc<PredictionStore>,
        provider: Arc<dyn ScheduleProvider>,
        collector: Arc<PredictionCollector>,
        logger: Arc<EventLogger>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            provider,
            collector,
            logger,
            window_hours: config.window_hours,
            lookback_hours: config.lookback_hours,
            poll_interval_secs: config.poll_interval_secs,
            predictions_channel: config.predictions_channel.clone(),
            tick_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run ticks forever, the first one immediately.
    pub async fn start_periodic(&self, gateway: &dyn ChatGateway) {
        info!("reconciler started, tick every {}s", self.poll_interval_secs);
        loop {
            info!("--- schedule tick ---");
            self.run_tick(gateway, None).await;
            sleep(std::time::Duration::from_secs(self.poll_interval_secs)).await;
        }
    }

    /// One two-phase tick. Single-flight: a tick arriving while another is
    /// still running is skipped, not queued.
    pub async fn run_tick(&self, gateway: &dyn ChatGateway, target_guild: Option<&str>) {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            warn!("tick already in flight, skipping");
            return;
        };

        let (resolved, pending) = self.reconcile_past(gateway).await;
        let announced = self.reconcile_upcoming(gateway, target_guild).await;

        let _ = self.logger.log(&ReconcileHeartbeatEvent {
            ts: now_iso(),
            event: "RECONCILE_HEARTBEAT",
            poll_interval_secs: self.poll_interval_secs,
            announced,
            resolved,
            pending_past: pending,
            open_sessions: self.collector.open_session_count().await,
        });
        info!("Tick completed. {announced} announced, {resolved} resolved ({pending} past still pending).");
    }

    // ── Past phase ────────────────────────────────────────────────────────────

    async fn reconcile_past(&self, gateway: &dyn ChatGateway) -> (usize, usize) {
        let cutoff = (Utc::now() - Duration::hours(self.lookback_hours)).timestamp();
        let matches = match self.store.get_past_matches(cutoff) {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to load past matches: {e:#}");
                return (0, 0);
            }
        };

        let total = matches.len();
        let mut resolved = 0;
        for m in matches {
            match self.reconcile_match(gateway, &m).await {
                Ok(true) => resolved += 1,
                Ok(false) => {} // no winner yet, retried next tick
                Err(e) => warn!("failed to process past match {}: {e:#}", m.match_id),
            }
        }
        (resolved, total - resolved)
    }

    async fn reconcile_match(&self, gateway: &dyn ChatGateway, m: &PostedMatch) -> Result<bool> {
        let detail = self.provider.fetch_match_detail(&m.match_id).await?;
        let Some(winner) = determine_winner(&detail) else {
            return Ok(false);
        };
        let winner = winner.to_string();

        self.store.update_predictions(&m.match_id, &winner)?;

        let result_line = match teams::get_emoji_markdown(&winner) {
            Some(emoji) => format!("Match completed. Winner: {emoji} {winner}"),
            None => format!("Match completed. Winner: {winner}"),
        };
        if let Err(e) = gateway
            .append_to_message(&m.channel_id, &m.message_id, &result_line)
            .await
        {
            warn!("failed to update message for match {}: {e}", m.match_id);
        }

        // Delete-on-completion: the dedup row only goes once scoring is done
        self.store.delete_posted_match(&m.match_id)?;

        let _ = self.logger.log(&MatchResolvedEvent {
            ts: now_iso(),
            event: "MATCH_RESOLVED",
            match_id: m.match_id.clone(),
            team1: detail.teams.first().map(|t| t.code.clone()).unwrap_or_default(),
            team2: detail.teams.get(1).map(|t| t.code.clone()).unwrap_or_default(),
            winner: winner.clone(),
        });
        info!("match {} resolved, winner {winner}", m.match_id);
        Ok(true)
    }

    // ── Upcoming phase ────────────────────────────────────────────────────────

    async fn reconcile_upcoming(
        &self,
        gateway: &dyn ChatGateway,
        target_guild: Option<&str>,
    ) -> usize {
        let events = match self.provider.fetch_schedule().await {
            Ok(ev) => ev,
            Err(e) => {
                warn!("schedule fetch failed: {e:#}");
                return 0;
            }
        };

        let now = Utc::now();
        let upcoming: Vec<ScheduledEvent> =
            filter_upcoming(&events, now, self.window_hours, |id| {
                self.store.is_match_posted(id).unwrap_or(false)
            })
            .into_iter()
            .cloned()
            .collect();
        if upcoming.is_empty() {
            return 0;
        }

        let guilds: Vec<String> = match target_guild {
            Some(g) => vec![g.to_string()],
            None => match gateway.list_guilds().await {
                Ok(g) => g,
                Err(e) => {
                    warn!("failed to list guilds: {e:#}");
                    return 0;
                }
            },
        };

        join_all(
            guilds
                .iter()
                .map(|guild| self.process_guild(gateway, guild, &upcoming, now)),
        )
        .await
        .into_iter()
        .sum()
    }

    async fn process_guild(
        &self,
        gateway: &dyn ChatGateway,
        guild_id: &str,
        events: &[ScheduledEvent],
        now: DateTime<Utc>,
    ) -> usize {
        let channel_id = match gateway
            .find_or_create_channel(guild_id, &self.predictions_channel)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!("no predictions channel in guild {guild_id}: {e:#}");
                return 0;
            }
        };

        let mut announced = 0;
        for event in events {
            match self
                .announce_event(gateway, guild_id, &channel_id, event, now)
                .await
            {
                Ok(true) => announced += 1,
                Ok(false) => {} // skipped (TBD placeholder)
                Err(e) => warn!("failed to announce match {}: {e:#}", event.match_id),
            }
        }
        announced
    }

    async fn announce_event(
        &self,
        gateway: &dyn ChatGateway,
        guild_id: &str,
        channel_id: &str,
        event: &ScheduledEvent,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if event.has_tbd_team() {
            info!("TBD team found, skipping match {}", event.match_id);
            return Ok(false);
        }
        let team1 = &event.teams[0];
        let team2 = &event.teams[1];
        let choice1 = emoji_choice(team1, FALLBACK_EMOJIS[0]);
        let choice2 = emoji_choice(team2, FALLBACK_EMOJIS[1]);

        let time_diff = hours_until(event.start_time, now);
        let mut fields = vec![
            EmbedField { name: "League".into(), value: event.league.clone(), inline: true },
            EmbedField { name: "Block".into(), value: event.block_name.clone(), inline: true },
            EmbedField {
                name: "Start Time".into(),
                value: format!("<t:{}:F>", event.start_time.timestamp()),
                inline: false,
            },
        ];
        if let Some(n) = best_of(event) {
            fields.push(EmbedField {
                name: "Best Of".into(),
                value: format!("Best of {n}"),
                inline: true,
            });
        }

        let announcement = Announcement {
            title: format!("Upcoming match in {time_diff} hours"),
            description: format!(
                "{} {} vs {} {}",
                choice1.emoji_markdown, team1.name, choice2.emoji_markdown, team2.name
            ),
            fields,
            footer: format!("Match ID: {}", event.match_id),
            url: self.deep_link(&event.match_id),
            color: ANNOUNCE_COLOR,
            timestamp: event.start_time.to_rfc3339(),
        };

        let message_id = gateway
            .send_announcement(channel_id, &announcement)
            .await
            .context("send announcement")?;

        for choice in [&choice1, &choice2] {
            if let Err(e) = gateway.react(channel_id, &message_id, &choice.emoji_markdown).await {
                warn!("failed to react on {message_id}: {e}");
            }
        }

        self.store
            .add_posted_match(&event.match_id, &message_id, channel_id, guild_id)?;
        self.collector
            .open_session(
                &message_id,
                &event.match_id,
                channel_id,
                guild_id,
                [choice1, choice2],
                event.start_time,
            )
            .await;

        let _ = self.logger.log(&AnnouncePostedEvent {
            ts: now_iso(),
            event: "ANNOUNCE_POSTED",
            match_id: event.match_id.clone(),
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            message_id,
            team1: team1.code.clone(),
            team2: team2.code.clone(),
            league: event.league.clone(),
            hours_until: time_diff,
        });
        Ok(true)
    }

    fn deep_link(&self, match_id: &str) -> String {
        match self.provider.kind() {
            "valorant" => format!("https://www.vlr.gg/{match_id}"),
            _ => format!("https://lolesports.com/vod/{match_id}"),
        }
    }
}

fn emoji_choice(team: &TeamSide, fallback: &'static str) -> EmojiChoice {
    let markdown = teams::get_emoji_markdown(&team.code)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string());
    let emoji_id = teams::emoji_id(&markdown).unwrap_or_else(|| markdown.clone());
    EmojiChoice {
        emoji_id,
        emoji_markdown: markdown,
        team_code: team.code.clone(),
    }
}
