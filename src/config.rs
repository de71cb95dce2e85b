//! Application-level configuration loading: scoring constants, timers and moderator grants.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "OLYMPIA_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Point constants of the rule table.
    pub scoring: ScoringRules,
    /// Default timer durations.
    pub timers: TimerRules,
    /// Minimum length of the reason attached to manual score edits.
    pub min_reason_len: usize,
    /// How long a loaded question catalog may be served from cache.
    pub catalog_cache_ttl: Duration,
    /// Accepted moderator tokens.
    pub moderators: Vec<ModeratorGrant>,
}

/// Point constants of the per-round rule table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringRules {
    /// Opening round award for a correct answer.
    pub opening_correct: i32,
    /// Opening common-pool penalty for a wrong answer.
    pub opening_common_penalty: i32,
    /// Obstacle award per resolved clue.
    pub obstacle_clue_points: i32,
    /// Keyword award when no clue has been opened yet.
    pub obstacle_keyword_base: i32,
    /// Keyword award lost per opened clue.
    pub obstacle_keyword_step: i32,
    /// Award by rank (1st, 2nd, ...) for correct speed-round answers.
    pub speed_awards: Vec<i32>,
    /// Allowed finish-round question values.
    pub finish_values: Vec<u8>,
    /// A failed steal costs `value / steal_penalty_divisor`.
    pub steal_penalty_divisor: i32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            opening_correct: 10,
            opening_common_penalty: 5,
            obstacle_clue_points: 10,
            obstacle_keyword_base: 60,
            obstacle_keyword_step: 10,
            speed_awards: vec![40, 30, 20, 10],
            finish_values: vec![20, 30],
            steal_penalty_divisor: 2,
        }
    }
}

/// Timer durations resolved when a moderator starts a timer without an explicit one.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerRules {
    /// Opening round answer time.
    pub opening_ms: u64,
    /// Obstacle clue answer time.
    pub obstacle_ms: u64,
    /// Per question position; positions past the end use `speed_default_ms`.
    pub speed_by_position_ms: Vec<u64>,
    /// Speed-round fallback duration.
    pub speed_default_ms: u64,
    /// Finish-round time for a 20 point question.
    pub finish_20_ms: u64,
    /// Finish-round time for a 30 point question.
    pub finish_30_ms: u64,
    /// Finish-round steal window.
    pub steal_window_ms: u64,
}

impl Default for TimerRules {
    fn default() -> Self {
        Self {
            opening_ms: 5_000,
            obstacle_ms: 15_000,
            speed_by_position_ms: vec![10_000, 20_000, 30_000, 40_000],
            speed_default_ms: 30_000,
            finish_20_ms: 15_000,
            finish_30_ms: 20_000,
            steal_window_ms: 3_000,
        }
    }
}

/// Token granting moderator rights, optionally restricted to some matches.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModeratorGrant {
    /// Shared secret sent in `x-moderator-token`.
    pub token: String,
    /// Empty means every match.
    #[serde(default)]
    pub matches: Vec<Uuid>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        moderators = app_config.moderators.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    scoring: ScoringRules,
    timers: TimerRules,
    min_reason_len: usize,
    catalog_cache_ttl_ms: u64,
    moderators: Vec<ModeratorGrant>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringRules::default(),
            timers: TimerRules::default(),
            min_reason_len: 3,
            catalog_cache_ttl_ms: 2_000,
            moderators: Vec::new(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut scoring = value.scoring;
        if scoring.steal_penalty_divisor <= 0 {
            warn!(
                divisor = scoring.steal_penalty_divisor,
                "steal penalty divisor must be positive; using 2"
            );
            scoring.steal_penalty_divisor = 2;
        }

        Self {
            scoring,
            timers: value.timers,
            min_reason_len: value.min_reason_len,
            catalog_cache_ttl: Duration::from_millis(value.catalog_cache_ttl_ms),
            moderators: value.moderators,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "scoring": { "speed_awards": [50, 30] }, "min_reason_len": 5 }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.scoring.speed_awards, vec![50, 30]);
        assert_eq!(config.scoring.opening_correct, 10);
        assert_eq!(config.min_reason_len, 5);
        assert_eq!(config.timers.steal_window_ms, 3_000);
    }

    #[test]
    fn non_positive_steal_divisor_is_replaced() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "scoring": { "steal_penalty_divisor": 0 } }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.scoring.steal_penalty_divisor, 2);
    }
}
