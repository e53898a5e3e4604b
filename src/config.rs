//! Process configuration read from the environment (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{
    BLOCK_REWARD, DIFF_ADJUST_THRESHOLD_PCT, DIFF_ADJUST_WINDOW, DIFF_MAX, DIFF_MIN,
    DifficultyController, HashAlgorithm, INITIAL_DIFFICULTY, LedgerConfig,
    TARGET_BLOCK_TIME_SECS,
};
use crate::error::ConfigError;
use crate::mining::MiningConfig;

const STATS_INTERVAL_MS_MIN: u64 = 100;
const STATS_INTERVAL_MS_MAX: u64 = 5_000;

/// How long a remote ledger gets to answer one request.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub initial_difficulty: u32,
    pub target_block_time_secs: u64,
    pub diff_adjust_window: usize,
    pub diff_min: u32,
    pub diff_max: u32,
    pub block_reward: u64,
    pub mining_workers: usize,
    pub stats_interval_ms: u64,
    pub hash_algorithm: HashAlgorithm,
    pub remote_ledger_url: Option<String>,
    pub watchdog_secs: Option<u64>,
    pub miner_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            initial_difficulty: INITIAL_DIFFICULTY,
            target_block_time_secs: TARGET_BLOCK_TIME_SECS,
            diff_adjust_window: DIFF_ADJUST_WINDOW,
            diff_min: DIFF_MIN,
            diff_max: DIFF_MAX,
            block_reward: BLOCK_REWARD,
            mining_workers: 0,
            stats_interval_ms: 500,
            hash_algorithm: HashAlgorithm::default(),
            remote_ledger_url: None,
            watchdog_secs: None,
            miner_address: None,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys keep their
    /// defaults; anything unparsable is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            initial_difficulty: parse(&get, "INITIAL_DIFFICULTY")?
                .unwrap_or(defaults.initial_difficulty),
            target_block_time_secs: parse(&get, "TARGET_BLOCK_TIME_SECS")?
                .unwrap_or(defaults.target_block_time_secs),
            diff_adjust_window: parse(&get, "DIFF_ADJUST_WINDOW")?
                .unwrap_or(defaults.diff_adjust_window),
            diff_min: parse(&get, "DIFF_MIN")?.unwrap_or(defaults.diff_min),
            diff_max: parse(&get, "DIFF_MAX")?.unwrap_or(defaults.diff_max),
            block_reward: parse(&get, "BLOCK_REWARD")?.unwrap_or(defaults.block_reward),
            mining_workers: parse(&get, "MINING_WORKERS")?.unwrap_or(defaults.mining_workers),
            stats_interval_ms: parse::<u64>(&get, "STATS_INTERVAL_MS")?
                .unwrap_or(defaults.stats_interval_ms)
                .clamp(STATS_INTERVAL_MS_MIN, STATS_INTERVAL_MS_MAX),
            hash_algorithm: parse(&get, "HASH_ALGORITHM")?.unwrap_or(defaults.hash_algorithm),
            remote_ledger_url: get("REMOTE_LEDGER_URL"),
            watchdog_secs: parse(&get, "WATCHDOG_SECS")?,
            miner_address: get("MINER_ADDRESS"),
        };
        config.check()
    }

    fn check(self) -> Result<Self, ConfigError> {
        if self.diff_min == 0 {
            return Err(invalid("DIFF_MIN", self.diff_min, "must be at least 1"));
        }
        if self.diff_max < self.diff_min {
            return Err(invalid("DIFF_MAX", self.diff_max, "must not be below DIFF_MIN"));
        }
        if self.diff_max > 64 {
            return Err(invalid("DIFF_MAX", self.diff_max, "a digest has 64 hex digits"));
        }
        if !(self.diff_min..=self.diff_max).contains(&self.initial_difficulty) {
            return Err(invalid(
                "INITIAL_DIFFICULTY",
                self.initial_difficulty,
                "must lie within DIFF_MIN..=DIFF_MAX",
            ));
        }
        if self.target_block_time_secs == 0 {
            return Err(invalid("TARGET_BLOCK_TIME_SECS", 0, "must be positive"));
        }
        if self.diff_adjust_window == 0 {
            return Err(invalid("DIFF_ADJUST_WINDOW", 0, "must be positive"));
        }
        if self.watchdog_secs == Some(0) {
            return Err(invalid("WATCHDOG_SECS", 0, "must be positive"));
        }
        if let Some(url) = &self.remote_ledger_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("REMOTE_LEDGER_URL", url, "must be an http(s) URL"));
            }
        }
        Ok(self)
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            initial_difficulty: self.initial_difficulty,
            block_reward: self.block_reward,
            controller: DifficultyController::new(
                self.target_block_time_secs,
                self.diff_adjust_window,
                DIFF_ADJUST_THRESHOLD_PCT,
                self.diff_min,
                self.diff_max,
            ),
        }
    }

    pub fn mining(&self) -> MiningConfig {
        MiningConfig {
            workers: self.mining_workers,
            stats_interval: Duration::from_millis(self.stats_interval_ms),
            watchdog: self.watchdog_secs.map(Duration::from_secs),
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    get(key)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(key, &raw, e.to_string())))
        .transpose()
}

fn invalid(key: &'static str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.mining().stats_interval, Duration::from_millis(500));
        assert_eq!(cfg.mining().watchdog, None);
        assert_eq!(cfg.ledger().controller.bounds(), (1, 6));
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("PORT", "9000"),
            ("INITIAL_DIFFICULTY", "3"),
            ("BLOCK_REWARD", "42"),
            ("MINING_WORKERS", "2"),
            ("HASH_ALGORITHM", "blake3"),
            ("WATCHDOG_SECS", "60"),
            ("MINER_ADDRESS", " alice "),
            ("REMOTE_LEDGER_URL", "http://10.0.0.2:8080"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.ledger().initial_difficulty, 3);
        assert_eq!(cfg.ledger().block_reward, 42);
        assert_eq!(cfg.mining().worker_count(), 2);
        assert_eq!(cfg.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(cfg.mining().watchdog, Some(Duration::from_secs(60)));
        assert_eq!(cfg.miner_address.as_deref(), Some("alice"));
        assert_eq!(cfg.remote_ledger_url.as_deref(), Some("http://10.0.0.2:8080"));
    }

    #[test]
    fn clamps_stats_interval() {
        assert_eq!(load(&[("STATS_INTERVAL_MS", "1")]).unwrap().stats_interval_ms, 100);
        assert_eq!(load(&[("STATS_INTERVAL_MS", "60000")]).unwrap().stats_interval_ms, 5_000);
    }

    #[test]
    fn rejects_bad_values() {
        let cases: &[(&str, &str)] = &[
            ("PORT", "eighty"),
            ("HASH_ALGORITHM", "md5"),
            ("DIFF_MIN", "0"),
            ("DIFF_MAX", "65"),
            ("INITIAL_DIFFICULTY", "9"),
            ("WATCHDOG_SECS", "0"),
            ("REMOTE_LEDGER_URL", "ftp://x"),
        ];
        for &(key, value) in cases {
            match load(&[(key, value)]) {
                Err(ConfigError::Invalid { key: k, .. }) => {
                    assert!(k == key || k == "INITIAL_DIFFICULTY" || k == "DIFF_MAX", "{key}: {k}")
                }
                Ok(_) => panic!("{key}={value} should be rejected"),
            }
        }
    }
}
