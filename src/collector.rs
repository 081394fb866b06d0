//! Prediction collector
//!
//! Owns the live voting windows: one in-memory session per announcement
//! message, fed by the gateway's global reaction stream. A session enforces
//! exactly one active choice per user; the durable outcome is the
//! `user_predictions` row, the session itself dies at kickoff or on process
//! restart; reactions arriving for an unknown message are no-ops.
//!
//! Validation is a pure transition function over the session state; the async
//! wrapper only executes the resulting side effects, so delivery failures are
//! logged and never stall the stream.

use chrono::{DateTime, Utc};
use logger::{now_iso, EventLogger, PredictionClearedEvent, PredictionRecordedEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gateway::{ChatGateway, ReactionEvent, ReactionKind};
use crate::store::PredictionStore;

/// One selectable side of a match: the reaction emoji and the team it maps to.
#[derive(Debug, Clone)]
pub struct EmojiChoice {
    pub emoji_id: String,
    pub emoji_markdown: String,
    pub team_code: String,
}

/// Live state of one open voting window: plain ids and sets plus the expiry
/// timer, never a transport handle.
pub struct PredictionSession {
    pub match_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub choices: [EmojiChoice; 2],
    pub expires_at: DateTime<Utc>,
    user_reactions: HashMap<String, HashSet<String>>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug, PartialEq)]
enum Verdict {
    InvalidEmoji,
    DoubleVote,
    Accept { team_code: String },
}

/// Voting discipline for a reaction-add, given the current session state.
fn evaluate_add(session: &PredictionSession, user_id: &str, emoji_id: &str) -> Verdict {
    let Some(choice) = session.choices.iter().find(|c| c.emoji_id == emoji_id) else {
        return Verdict::InvalidEmoji;
    };

    if let Some(held) = session.user_reactions.get(user_id) {
        // Already holding the other side → trying to vote both ways at once
        if held.len() == 1 && !held.contains(emoji_id) {
            return Verdict::DoubleVote;
        }
    }

    Verdict::Accept { team_code: choice.team_code.clone() }
}

enum SideEffect {
    Record { match_id: String, team_code: String },
    Revoke { channel_id: String, notice: String },
}

pub struct PredictionCollector {
    sessions: Arc<RwLock<HashMap<String, PredictionSession>>>,
    store: Arc<PredictionStore>,
    logger: Arc<EventLogger>,
}

impl PredictionCollector {
    pub fn new(store: Arc<PredictionStore>, logger: Arc<EventLogger>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
            logger,
        }
    }

    /// Attach the reaction handlers to the gateway's global event stream.
    /// Called once at startup; the stream outlives every individual session.
    pub fn register_global_listeners(
        self: &Arc<Self>,
        gateway: Arc<dyn ChatGateway>,
    ) -> JoinHandle<()> {
        let collector = Arc::clone(self);
        tokio::spawn(async move {
            let Some(mut events) = gateway.take_reaction_events().await else {
                debug!("gateway has no reaction stream, collector idle");
                return;
            };
            while let Some(ev) = events.recv().await {
                match ev.kind {
                    ReactionKind::Added => {
                        collector.handle_reaction_add(gateway.as_ref(), &ev).await
                    }
                    ReactionKind::Removed => collector.handle_reaction_remove(&ev).await,
                }
            }
        })
    }

    /// Open a voting window for a freshly posted announcement. The window
    /// closes exactly at kickoff; replacing an existing session for the same
    /// message cancels the old timer.
    pub async fn open_session(
        &self,
        message_id: &str,
        match_id: &str,
        channel_id: &str,
        guild_id: &str,
        choices: [EmojiChoice; 2],
        expires_at: DateTime<Utc>,
    ) {
        let window = (expires_at - Utc::now()).to_std().unwrap_or_default();

        let timer = {
            let sessions = Arc::clone(&self.sessions);
            let message_id = message_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if sessions.write().await.remove(&message_id).is_some() {
                    debug!("voting window closed for message {message_id}");
                }
            })
        };

        let session = PredictionSession {
            match_id: match_id.to_string(),
            channel_id: channel_id.to_string(),
            guild_id: guild_id.to_string(),
            choices,
            expires_at,
            user_reactions: HashMap::new(),
            timer: Some(timer),
        };

        let replaced = self
            .sessions
            .write()
            .await
            .insert(message_id.to_string(), session);
        if let Some(old) = replaced {
            if let Some(t) = old.timer {
                t.abort();
            }
        }
    }

    pub async fn open_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn has_session(&self, message_id: &str) -> bool {
        self.sessions.read().await.contains_key(message_id)
    }

    pub async fn handle_reaction_add(&self, gateway: &dyn ChatGateway, ev: &ReactionEvent) {
        if ev.user_is_bot {
            return;
        }

        let effect = {
            let mut sessions = self.sessions.write().await;
            // Unknown message: window expired, or posted before a restart
            let Some(session) = sessions.get_mut(&ev.message_id) else {
                return;
            };

            match evaluate_add(session, &ev.user_id, &ev.emoji_id) {
                Verdict::Accept { team_code } => {
                    session
                        .user_reactions
                        .entry(ev.user_id.clone())
                        .or_default()
                        .insert(ev.emoji_id.clone());
                    SideEffect::Record {
                        match_id: session.match_id.clone(),
                        team_code,
                    }
                }
                Verdict::InvalidEmoji => SideEffect::Revoke {
                    channel_id: session.channel_id.clone(),
                    notice: format!(
                        "Please only use {} or {} to predict the match outcome.",
                        session.choices[0].emoji_markdown, session.choices[1].emoji_markdown
                    ),
                },
                Verdict::DoubleVote => SideEffect::Revoke {
                    channel_id: session.channel_id.clone(),
                    notice: format!(
                        "<@{}> You can only predict one outcome for this match. Please choose either {} or {}.",
                        ev.user_id,
                        session.choices[0].emoji_markdown,
                        session.choices[1].emoji_markdown
                    ),
                },
            }
        };

        match effect {
            SideEffect::Record { match_id, team_code } => {
                if let Err(e) = self.store.upsert_user_prediction(&match_id, &ev.user_id, &team_code) {
                    warn!("failed to persist prediction for {match_id}/{}: {e}", ev.user_id);
                    return;
                }
                let _ = self.logger.log(&PredictionRecordedEvent {
                    ts: now_iso(),
                    event: "PREDICTION_RECORDED",
                    match_id,
                    user_id: ev.user_id.clone(),
                    team_code,
                });
            }
            SideEffect::Revoke { channel_id, notice } => {
                if let Err(e) = gateway
                    .remove_reaction(&channel_id, &ev.message_id, &ev.emoji_id, &ev.user_id)
                    .await
                {
                    warn!("failed to revoke reaction on {}: {e}", ev.message_id);
                }
                if let Err(e) = gateway.send_text(&channel_id, &notice).await {
                    warn!("failed to send corrective notice: {e}");
                }
            }
        }
    }

    pub async fn handle_reaction_remove(&self, ev: &ReactionEvent) {
        if ev.user_is_bot {
            return;
        }

        let cleared = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(&ev.message_id) else {
                return;
            };
            if !session.choices.iter().any(|c| c.emoji_id == ev.emoji_id) {
                return;
            }
            let Some(held) = session.user_reactions.get_mut(&ev.user_id) else {
                return;
            };
            held.remove(&ev.emoji_id);
            if held.is_empty() {
                session.user_reactions.remove(&ev.user_id);
                Some(session.match_id.clone())
            } else {
                None
            }
        };

        // No tracked reactions left → the user's intent is "no prediction",
        // so the persisted row goes too
        if let Some(match_id) = cleared {
            if let Err(e) = self.store.delete_user_prediction(&match_id, &ev.user_id) {
                warn!("failed to clear prediction for {match_id}/{}: {e}", ev.user_id);
                return;
            }
            let _ = self.logger.log(&PredictionClearedEvent {
                ts: now_iso(),
                event: "PREDICTION_CLEARED",
                match_id,
                user_id: ev.user_id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Announcement;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingGateway {
        revokes: Mutex<Vec<(String, String, String)>>,
        notices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn list_guilds(&self) -> Result<Vec<String>> {
            Ok(vec!["g-1".into()])
        }
        async fn find_or_create_channel(&self, guild_id: &str, name: &str) -> Result<String> {
            Ok(format!("{guild_id}/{name}"))
        }
        async fn send_announcement(&self, _: &str, _: &Announcement) -> Result<String> {
            Ok("msg-1".into())
        }
        async fn send_text(&self, _: &str, content: &str) -> Result<String> {
            self.notices.lock().unwrap().push(content.to_string());
            Ok("msg-n".into())
        }
        async fn append_to_message(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn react(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_reaction(
            &self,
            _: &str,
            message_id: &str,
            emoji_id: &str,
            user_id: &str,
        ) -> Result<()> {
            self.revokes.lock().unwrap().push((
                message_id.to_string(),
                emoji_id.to_string(),
                user_id.to_string(),
            ));
            Ok(())
        }
        async fn take_reaction_events(&self) -> Option<mpsc::UnboundedReceiver<ReactionEvent>> {
            None
        }
    }

    fn choices() -> [EmojiChoice; 2] {
        [
            EmojiChoice {
                emoji_id: "111".into(),
                emoji_markdown: "<:T1:111>".into(),
                team_code: "T1".into(),
            },
            EmojiChoice {
                emoji_id: "222".into(),
                emoji_markdown: "<:G2:222>".into(),
                team_code: "G2".into(),
            },
        ]
    }

    fn collector() -> (Arc<PredictionCollector>, Arc<PredictionStore>) {
        let store = Arc::new(PredictionStore::open_in_memory().unwrap());
        let logger = Arc::new(EventLogger::new(std::env::temp_dir().join("pickem-test-logs")));
        (
            Arc::new(PredictionCollector::new(Arc::clone(&store), logger)),
            store,
        )
    }

    async fn open_default_session(collector: &PredictionCollector) {
        collector
            .open_session(
                "msg-1",
                "M1",
                "ch-1",
                "g-1",
                choices(),
                Utc::now() + chrono::Duration::hours(10),
            )
            .await;
    }

    fn add(user_id: &str, emoji_id: &str) -> ReactionEvent {
        ReactionEvent {
            kind: ReactionKind::Added,
            message_id: "msg-1".into(),
            emoji_id: emoji_id.into(),
            user_id: user_id.into(),
            user_is_bot: false,
        }
    }

    fn remove(user_id: &str, emoji_id: &str) -> ReactionEvent {
        ReactionEvent {
            kind: ReactionKind::Removed,
            ..add(user_id, emoji_id)
        }
    }

    #[tokio::test]
    async fn valid_reaction_records_prediction() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;

        let rows = store.get_predictions("M1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, "T1");
        assert_eq!(rows[0].is_correct, None);
        assert!(gateway.revokes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_emoji_is_revoked_without_recording() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        collector.handle_reaction_add(&gateway, &add("u1", "999")).await;

        assert!(store.get_predictions("M1").unwrap().is_empty());
        let revokes = gateway.revokes.lock().unwrap();
        assert_eq!(revokes.len(), 1);
        assert_eq!(revokes[0].1, "999");
        assert_eq!(gateway.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_simultaneous_choice_is_blocked() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;
        collector.handle_reaction_add(&gateway, &add("u1", "222")).await;

        // First prediction preserved, second revoked with a notice
        let rows = store.get_predictions("M1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, "T1");
        let revokes = gateway.revokes.lock().unwrap();
        assert_eq!(revokes.len(), 1);
        assert_eq!(revokes[0].1, "222");
        assert!(gateway.notices.lock().unwrap()[0].contains("only predict one outcome"));
    }

    #[tokio::test]
    async fn switching_sides_after_removal_overwrites() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;
        collector.handle_reaction_remove(&remove("u1", "111")).await;
        collector.handle_reaction_add(&gateway, &add("u1", "222")).await;

        let rows = store.get_predictions("M1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, "G2");
        assert!(gateway.revokes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_last_reaction_deletes_the_row() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;
        collector.handle_reaction_remove(&remove("u1", "111")).await;

        assert!(store.get_predictions("M1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn bot_reactions_are_ignored() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();
        open_default_session(&collector).await;

        let mut ev = add("bot", "111");
        ev.user_is_bot = true;
        collector.handle_reaction_add(&gateway, &ev).await;

        assert!(store.get_predictions("M1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_message_is_a_no_op() {
        // Restart scenario: no session for the message, nothing happens
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();

        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;
        collector.handle_reaction_remove(&remove("u1", "111")).await;

        assert!(store.get_predictions("M1").unwrap().is_empty());
        assert!(gateway.revokes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_expiry_tears_down_the_session() {
        let (collector, store) = collector();
        let gateway = RecordingGateway::default();

        collector
            .open_session(
                "msg-1",
                "M1",
                "ch-1",
                "g-1",
                choices(),
                Utc::now() + chrono::Duration::milliseconds(20),
            )
            .await;
        assert_eq!(collector.open_session_count().await, 1);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(collector.open_session_count().await, 0);

        // Late reactions after close are no-ops
        collector.handle_reaction_add(&gateway, &add("u1", "111")).await;
        assert!(store.get_predictions("M1").unwrap().is_empty());
    }

    #[test]
    fn evaluate_add_verdicts() {
        let session = PredictionSession {
            match_id: "M1".into(),
            channel_id: "ch-1".into(),
            guild_id: "g-1".into(),
            choices: choices(),
            expires_at: Utc::now(),
            user_reactions: HashMap::from([(
                "u1".to_string(),
                HashSet::from(["111".to_string()]),
            )]),
            timer: None,
        };

        assert_eq!(evaluate_add(&session, "u2", "999"), Verdict::InvalidEmoji);
        assert_eq!(evaluate_add(&session, "u1", "222"), Verdict::DoubleVote);
        // Re-adding the emoji already held is fine (idempotent)
        assert_eq!(
            evaluate_add(&session, "u1", "111"),
            Verdict::Accept { team_code: "T1".into() }
        );
        assert_eq!(
            evaluate_add(&session, "u2", "222"),
            Verdict::Accept { team_code: "G2".into() }
        );
    }
}
