//! Persistence gateway
//!
//! Durable record of announced matches and user predictions. Two tables:
//! `posted_matches` (one row per announced match, deleted once reconciled)
//! and `user_predictions` (one row per user per match, scored in bulk once a
//! winner is known). Every write is an idempotent upsert so overlapping ticks
//! or restarts can only repeat work, not corrupt state.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct PostedMatch {
    pub match_id: String,
    pub posted_at: i64,
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPrediction {
    pub match_id: String,
    pub user_id: String,
    pub prediction: String,
    /// NULL until reconciliation scores the match.
    pub is_correct: Option<bool>,
}

pub struct PredictionStore {
    conn: Mutex<Connection>,
}

impl PredictionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).context("open sqlite db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn is_match_posted(&self, match_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM posted_matches WHERE id = ?1",
                params![match_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    pub fn add_posted_match(
        &self,
        match_id: &str,
        message_id: &str,
        channel_id: &str,
        guild_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO posted_matches(id, posted_at, message_id, channel_id, guild_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                posted_at=excluded.posted_at,
                message_id=excluded.message_id,
                channel_id=excluded.channel_id,
                guild_id=excluded.guild_id
            "#,
            params![match_id, Utc::now().timestamp(), message_id, channel_id, guild_id],
        )?;
        Ok(())
    }

    /// Matches announced before `cutoff_epoch`, i.e. whose voting window has
    /// long closed and which are due for reconciliation.
    pub fn get_past_matches(&self, cutoff_epoch: i64) -> Result<Vec<PostedMatch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, posted_at, message_id, channel_id, guild_id
             FROM posted_matches WHERE posted_at < ?1",
        )?;
        let rows = stmt
            .query_map(params![cutoff_epoch], |r| {
                Ok(PostedMatch {
                    match_id: r.get(0)?,
                    posted_at: r.get(1)?,
                    message_id: r.get(2)?,
                    channel_id: r.get(3)?,
                    guild_id: r.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_posted_match(&self, match_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM posted_matches WHERE id = ?1", params![match_id])?;
        Ok(())
    }

    /// Last write wins; any earlier scoring for this user+match is reset.
    pub fn upsert_user_prediction(&self, match_id: &str, user_id: &str, team_code: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_predictions(match_id, user_id, prediction, is_correct)
            VALUES (?1, ?2, ?3, NULL)
            ON CONFLICT(match_id, user_id) DO UPDATE SET
                prediction=excluded.prediction,
                is_correct=NULL
            "#,
            params![match_id, user_id, team_code],
        )?;
        Ok(())
    }

    pub fn delete_user_prediction(&self, match_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM user_predictions WHERE match_id = ?1 AND user_id = ?2",
            params![match_id, user_id],
        )?;
        Ok(())
    }

    /// Scores every prediction for a match in one statement. Idempotent for a
    /// given winner.
    pub fn update_predictions(&self, match_id: &str, winner_code: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE user_predictions
             SET is_correct = CASE WHEN prediction = ?1 THEN 1 ELSE 0 END
             WHERE match_id = ?2",
            params![winner_code, match_id],
        )?;
        Ok(changed)
    }

    pub fn get_predictions(&self, match_id: &str) -> Result<Vec<UserPrediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT match_id, user_id, prediction, is_correct
             FROM user_predictions WHERE match_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![match_id], |r| {
                Ok(UserPrediction {
                    match_id: r.get(0)?,
                    user_id: r.get(1)?,
                    prediction: r.get(2)?,
                    is_correct: r.get::<_, Option<i64>>(3)?.map(|v| v != 0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS posted_matches (
            id TEXT PRIMARY KEY,
            posted_at INTEGER NOT NULL,
            message_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            guild_id TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posted_at ON posted_matches(posted_at);

        CREATE TABLE IF NOT EXISTS user_predictions (
            match_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            prediction TEXT NOT NULL,
            is_correct INTEGER,
            PRIMARY KEY (match_id, user_id)
        );
        "#,
    )
    .context("init schema")?;
    Ok(())
}
