//! Runtime configuration, env-driven with sensible defaults.

use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    /// "lol" or "valorant": selects the schedule source.
    pub esport: String,
    /// Announce window ahead of kickoff, hours (closed interval).
    pub window_hours: i64,
    /// How far back `posted_matches` must reach before reconciliation.
    pub lookback_hours: i64,
    pub poll_interval_secs: u64,
    pub predictions_channel: String,
    pub db_path: String,
    pub log_dir: String,
    /// Guilds served by the console gateway when no chat transport is wired.
    pub guilds: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            esport: env::var("ESPORT").unwrap_or_else(|_| "lol".to_string()),
            window_hours: env_parse("WINDOW_HOURS", classifier::DEFAULT_WINDOW_HOURS),
            lookback_hours: env_parse("LOOKBACK_HOURS", 24),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 300),
            predictions_channel: env::var("PREDICTIONS_CHANNEL")
                .unwrap_or_else(|_| "bot-predictions".to_string()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "data.db".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            guilds: env::var("GUILDS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["local".to_string()]),
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
