use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// §6 configuration surface — the five tunables spec.md calls out, plus the
/// SQLite path the ambient persistence layer needs. Scheduler cadence stays
/// external, as spec.md §6 says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// How long a user may go without an inbound message before a goodbye fires.
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: i64,
    /// How long a sent goodbye waits for a response before it silently times out.
    #[serde(default = "default_goodbye_timeout_secs")]
    pub goodbye_timeout_secs: i64,
    /// How long a "remind me later" deferral waits before falling to dormant.
    #[serde(default = "default_remind_later_secs")]
    pub remind_later_secs: i64,
    /// Minimum inactivity (in seconds) for a `dormant -> active` return to be
    /// tagged `unprompted_return`.
    #[serde(default = "default_unprompted_return_threshold_secs")]
    pub unprompted_return_threshold_secs: i64,
    /// Retry budget for the external message sender (consumed by the sender,
    /// not enforced by the core itself, but carried in config per §6).
    #[serde(default = "default_max_message_retries")]
    pub max_message_retries: u32,
    /// Path to the SQLite database file backing the state store / queue.
    #[serde(default = "default_db_path")]
    pub database_path: String,
    /// Expected gap between daily-driver runs, used only to flag a skipped
    /// run on startup (§3's supplemented observability, not a schedule).
    #[serde(default = "default_expected_run_interval_secs")]
    pub expected_run_interval_secs: i64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            goodbye_timeout_secs: default_goodbye_timeout_secs(),
            remind_later_secs: default_remind_later_secs(),
            unprompted_return_threshold_secs: default_unprompted_return_threshold_secs(),
            max_message_retries: default_max_message_retries(),
            database_path: default_db_path(),
            expected_run_interval_secs: default_expected_run_interval_secs(),
        }
    }
}

impl EngagementConfig {
    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_threshold_secs)
    }

    pub fn goodbye_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.goodbye_timeout_secs)
    }

    pub fn remind_later(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.remind_later_secs)
    }

    pub fn unprompted_return_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.unprompted_return_threshold_secs)
    }

    pub fn expected_run_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expected_run_interval_secs)
    }

    /// Load config from a TOML file with `ENGAGEMENT_`-prefixed env overrides,
    /// e.g. `ENGAGEMENT_GOODBYE_TIMEOUT_SECS=3600`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: EngagementConfig = Figment::from(Serialized::defaults(EngagementConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ENGAGEMENT_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_inactivity_threshold_secs() -> i64 {
    14 * 24 * 3600
}

fn default_goodbye_timeout_secs() -> i64 {
    48 * 3600
}

fn default_remind_later_secs() -> i64 {
    14 * 24 * 3600
}

fn default_unprompted_return_threshold_secs() -> i64 {
    3 * 24 * 3600
}

fn default_max_message_retries() -> u32 {
    3
}

fn default_expected_run_interval_secs() -> i64 {
    24 * 3600
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.engagement/engagement.db")
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.engagement/engagement.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngagementConfig::default();
        assert_eq!(cfg.inactivity_threshold(), chrono::Duration::days(14));
        assert_eq!(cfg.goodbye_timeout(), chrono::Duration::hours(48));
        assert_eq!(cfg.remind_later(), chrono::Duration::days(14));
        assert_eq!(
            cfg.unprompted_return_threshold(),
            chrono::Duration::days(3)
        );
        assert_eq!(cfg.max_message_retries, 3);
    }
}
