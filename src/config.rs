use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::quiz::Rules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings read from the environment (and `.env`, if present).
/// The bot token itself is read by teloxide from `TELOXIDE_TOKEN`.
#[derive(Debug, Clone)]
pub struct Config {
    pub chatgpt_api_key: Option<String>,
    pub countries_path: PathBuf,
    pub dialogue_db_path: String,
    pub rules: Rules,
    pub run_idle_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Rules::default();

        let max_attempts: u8 = parse_or(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_ATTEMPTS",
                value: max_attempts.to_string(),
                reason: "a run needs at least one attempt".to_string(),
            });
        }

        let capital_threshold_km: f64 =
            parse_or(&lookup, "CAPITAL_THRESHOLD_KM", defaults.capital_threshold_km)?;
        if !(capital_threshold_km.is_finite() && capital_threshold_km > 0.0) {
            return Err(ConfigError::Invalid {
                key: "CAPITAL_THRESHOLD_KM",
                value: capital_threshold_km.to_string(),
                reason: "must be a positive number of kilometres".to_string(),
            });
        }

        let rules = Rules {
            max_attempts,
            capital_threshold_km,
            strict_population_order: parse_or(
                &lookup,
                "STRICT_POPULATION_ORDER",
                defaults.strict_population_order,
            )?,
        };

        Ok(Self {
            chatgpt_api_key: lookup("CHATGPT_API_KEY").filter(|key| !key.trim().is_empty()),
            countries_path: lookup("COUNTRIES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/countries.json")),
            dialogue_db_path: lookup("DIALOGUE_DB_PATH").unwrap_or_else(|| "db.sqlite".to_string()),
            rules,
            run_idle_ttl: Duration::from_secs(parse_or(&lookup, "RUN_IDLE_TTL_SECS", 30 * 60)?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
