//! Full lifecycle: announce → collect votes → reconcile → score → clean up,
//! driven through a fake schedule provider and a recording gateway.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use esports_api::{
    EventState, MatchDetail, ScheduleProvider, ScheduledEvent, SeriesStrategy, TeamScore, TeamSide,
};
use logger::EventLogger;
use pickem_bot::collector::PredictionCollector;
use pickem_bot::config::Config;
use pickem_bot::gateway::{Announcement, ChatGateway, ReactionEvent, ReactionKind};
use pickem_bot::reconciler::Reconciler;
use pickem_bot::store::PredictionStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct FakeProvider {
    schedule: Mutex<Vec<ScheduledEvent>>,
    detail: Mutex<MatchDetail>,
}

impl FakeProvider {
    fn new(schedule: Vec<ScheduledEvent>) -> Self {
        Self {
            schedule: Mutex::new(schedule),
            detail: Mutex::new(MatchDetail::default()),
        }
    }

    fn set_schedule(&self, schedule: Vec<ScheduledEvent>) {
        *self.schedule.lock().unwrap() = schedule;
    }

    fn set_detail(&self, detail: MatchDetail) {
        *self.detail.lock().unwrap() = detail;
    }
}

#[async_trait]
impl ScheduleProvider for FakeProvider {
    fn kind(&self) -> &'static str {
        "lol"
    }
    async fn fetch_schedule(&self) -> Result<Vec<ScheduledEvent>> {
        Ok(self.schedule.lock().unwrap().clone())
    }
    async fn fetch_match_detail(&self, _match_id: &str) -> Result<MatchDetail> {
        Ok(self.detail.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct RecordingGateway {
    next_id: AtomicU64,
    announcements: Mutex<Vec<(String, Announcement)>>,
    reactions: Mutex<Vec<(String, String)>>,
    appended: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn list_guilds(&self) -> Result<Vec<String>> {
        Ok(vec!["g-1".to_string()])
    }
    async fn find_or_create_channel(&self, guild_id: &str, name: &str) -> Result<String> {
        Ok(format!("{guild_id}/{name}"))
    }
    async fn send_announcement(&self, channel_id: &str, announcement: &Announcement) -> Result<String> {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.announcements
            .lock()
            .unwrap()
            .push((channel_id.to_string(), announcement.clone()));
        Ok(id)
    }
    async fn send_text(&self, _: &str, _: &str) -> Result<String> {
        Ok("notice".to_string())
    }
    async fn append_to_message(&self, _: &str, message_id: &str, line: &str) -> Result<()> {
        self.appended
            .lock()
            .unwrap()
            .push((message_id.to_string(), line.to_string()));
        Ok(())
    }
    async fn react(&self, _: &str, message_id: &str, emoji_markdown: &str) -> Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((message_id.to_string(), emoji_markdown.to_string()));
        Ok(())
    }
    async fn remove_reaction(&self, _: &str, _: &str, _: &str, _: &str) -> Result<()> {
        Ok(())
    }
    async fn take_reaction_events(&self) -> Option<mpsc::UnboundedReceiver<ReactionEvent>> {
        None
    }
}

fn upcoming_event(match_id: &str, hours_ahead: i64) -> ScheduledEvent {
    ScheduledEvent {
        match_id: match_id.to_string(),
        start_time: Utc::now() + Duration::hours(hours_ahead),
        state: EventState::Unstarted,
        league: "Worlds".to_string(),
        block_name: "Playoffs".to_string(),
        teams: vec![
            TeamSide { name: "T1".to_string(), code: "T1".to_string(), game_wins: 0 },
            TeamSide { name: "G2 Esports".to_string(), code: "G2".to_string(), game_wins: 0 },
        ],
        strategy: Some(SeriesStrategy { kind: "bestOf".to_string(), count: 5 }),
    }
}

fn test_config() -> Config {
    Config {
        esport: "lol".to_string(),
        window_hours: 24,
        // Negative lookback pulls the cutoff into the future so freshly
        // posted rows reconcile on the very next tick
        lookback_hours: -1,
        poll_interval_secs: 300,
        predictions_channel: "bot-predictions".to_string(),
        db_path: String::new(),
        log_dir: std::env::temp_dir()
            .join("pickem-test-logs")
            .to_string_lossy()
            .into_owned(),
        guilds: vec!["g-1".to_string()],
    }
}

struct Harness {
    store: Arc<PredictionStore>,
    provider: Arc<FakeProvider>,
    collector: Arc<PredictionCollector>,
    reconciler: Reconciler,
    gateway: RecordingGateway,
}

fn harness(schedule: Vec<ScheduledEvent>) -> Harness {
    let config = test_config();
    let store = Arc::new(PredictionStore::open_in_memory().unwrap());
    let logger = Arc::new(EventLogger::new(&config.log_dir));
    let provider = Arc::new(FakeProvider::new(schedule));
    let collector = Arc::new(PredictionCollector::new(
        Arc::clone(&store),
        Arc::clone(&logger),
    ));
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn ScheduleProvider>,
        Arc::clone(&collector),
        logger,
        &config,
    );
    Harness {
        store,
        provider,
        collector,
        reconciler,
        gateway: RecordingGateway::default(),
    }
}

fn reaction(kind: ReactionKind, message_id: &str, emoji_id: &str, user_id: &str) -> ReactionEvent {
    ReactionEvent {
        kind,
        message_id: message_id.to_string(),
        emoji_id: emoji_id.to_string(),
        user_id: user_id.to_string(),
        user_is_bot: false,
    }
}

#[tokio::test]
async fn announce_vote_reconcile_lifecycle() {
    let h = harness(vec![upcoming_event("M1", 10)]);

    // Tick 1: M1 is announced once, with both team reactions and a session
    h.reconciler.run_tick(&h.gateway, None).await;

    assert!(h.store.is_match_posted("M1").unwrap());
    {
        let announcements = h.gateway.announcements.lock().unwrap();
        assert_eq!(announcements.len(), 1);
        let (channel, ann) = &announcements[0];
        assert_eq!(channel, "g-1/bot-predictions");
        assert_eq!(ann.footer, "Match ID: M1");
        assert!(ann.url.contains("M1"));
        assert!(ann.fields.iter().any(|f| f.name == "Best Of" && f.value == "Best of 5"));
    }
    assert_eq!(h.gateway.reactions.lock().unwrap().len(), 2);
    assert!(h.collector.has_session("msg-1").await);

    // Tick 2: dedup record suppresses a re-announcement
    h.reconciler.run_tick(&h.gateway, None).await;
    assert_eq!(h.gateway.announcements.lock().unwrap().len(), 1);

    // U1 votes for side one
    let t1_emoji_id = teams::emoji_id(teams::get_emoji_markdown("T1").unwrap()).unwrap();
    h.collector
        .handle_reaction_add(&h.gateway, &reaction(ReactionKind::Added, "msg-1", &t1_emoji_id, "U1"))
        .await;

    let rows = h.store.get_predictions("M1").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].prediction, "T1");
    assert_eq!(rows[0].is_correct, None);

    // Undecided result: the posted row stays and is retried
    h.provider.set_detail(MatchDetail {
        teams: vec![
            TeamScore { code: "T1".to_string(), game_wins: 2 },
            TeamScore { code: "G2".to_string(), game_wins: 2 },
        ],
        strategy: Some(SeriesStrategy { kind: "bestOf".to_string(), count: 5 }),
    });
    h.provider.set_schedule(vec![]);
    h.reconciler.run_tick(&h.gateway, None).await;
    assert!(h.store.is_match_posted("M1").unwrap());
    assert!(h.gateway.appended.lock().unwrap().is_empty());

    // Final result lands: predictions scored, message stamped, dedup row gone
    h.provider.set_detail(MatchDetail {
        teams: vec![
            TeamScore { code: "T1".to_string(), game_wins: 3 },
            TeamScore { code: "G2".to_string(), game_wins: 1 },
        ],
        strategy: Some(SeriesStrategy { kind: "bestOf".to_string(), count: 5 }),
    });
    h.reconciler.run_tick(&h.gateway, None).await;

    let rows = h.store.get_predictions("M1").unwrap();
    assert_eq!(rows[0].is_correct, Some(true));
    assert!(!h.store.is_match_posted("M1").unwrap());

    let appended = h.gateway.appended.lock().unwrap();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].0, "msg-1");
    assert!(appended[0].1.contains("Winner:"));
    assert!(appended[0].1.contains("T1"));
}

#[tokio::test]
async fn tbd_events_are_skipped_entirely() {
    let mut event = upcoming_event("M2", 5);
    event.teams[1].name = "TBD".to_string();
    let h = harness(vec![event]);

    h.reconciler.run_tick(&h.gateway, None).await;

    assert!(h.gateway.announcements.lock().unwrap().is_empty());
    // No dedup row either: the event is re-evaluated fresh once resolved
    assert!(!h.store.is_match_posted("M2").unwrap());
}

#[tokio::test]
async fn out_of_window_events_are_not_announced() {
    let h = harness(vec![upcoming_event("M3", 48)]);
    h.reconciler.run_tick(&h.gateway, None).await;
    assert!(h.gateway.announcements.lock().unwrap().is_empty());
}

#[tokio::test]
async fn target_guild_limits_the_fanout() {
    let h = harness(vec![upcoming_event("M4", 10)]);
    h.reconciler.run_tick(&h.gateway, Some("g-2")).await;

    let announcements = h.gateway.announcements.lock().unwrap();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].0, "g-2/bot-predictions");
}

#[tokio::test]
async fn reactions_after_restart_are_ignored() {
    let h = harness(vec![upcoming_event("M5", 10)]);
    h.reconciler.run_tick(&h.gateway, None).await;
    assert!(h.collector.has_session("msg-1").await);

    // "Restart": a fresh collector has no sessions, so the same reaction
    // that would have counted is now a no-op
    let restarted = PredictionCollector::new(
        Arc::clone(&h.store),
        Arc::new(EventLogger::new(&test_config().log_dir)),
    );
    let t1_emoji_id = teams::emoji_id(teams::get_emoji_markdown("T1").unwrap()).unwrap();
    restarted
        .handle_reaction_add(&h.gateway, &reaction(ReactionKind::Added, "msg-1", &t1_emoji_id, "U1"))
        .await;

    assert!(h.store.get_predictions("M5").unwrap().is_empty());
}
