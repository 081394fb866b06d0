/// PickemBot — Logger
/// JSONL event stream for the match lifecycle

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ───────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct AnnouncePostedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "ANNOUNCE_POSTED"
    pub match_id:    String,
    pub guild_id:    String,
    pub channel_id:  String,
    pub message_id:  String,
    pub team1:       String,
    pub team2:       String,
    pub league:      String,
    pub hours_until: i64,
}

#[derive(Serialize, Debug)]
pub struct PredictionRecordedEvent {
    pub ts:        String,
    pub event:     &'static str,     // "PREDICTION_RECORDED"
    pub match_id:  String,
    pub user_id:   String,
    pub team_code: String,
}

#[derive(Serialize, Debug)]
pub struct PredictionClearedEvent {
    pub ts:       String,
    pub event:    &'static str,      // "PREDICTION_CLEARED"
    pub match_id: String,
    pub user_id:  String,
}

#[derive(Serialize, Debug)]
pub struct MatchResolvedEvent {
    pub ts:       String,
    pub event:    &'static str,      // "MATCH_RESOLVED"
    pub match_id: String,
    pub team1:    String,
    pub team2:    String,
    pub winner:   String,
}

#[derive(Serialize, Debug)]
pub struct ReconcileHeartbeatEvent {
    pub ts:                 String,
    pub event:              &'static str,   // "RECONCILE_HEARTBEAT"
    pub poll_interval_secs: u64,
    pub announced:          usize,
    pub resolved:           usize,
    pub pending_past:       usize,
    pub open_sessions:      usize,
}

#[derive(Serialize, Debug)]
pub struct ApiStatusEvent {
    pub ts:          String,
    pub event:       &'static str,   // "API_STATUS"
    pub source:      String,
    pub scope:       String,
    pub ok:          bool,
    pub status_code: Option<u16>,
    pub message:     String,
    pub items:       usize,
}
