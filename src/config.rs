//! Runtime configuration, read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::proximity::DEFAULT_ALERT_RADIUS_METERS;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:disasterzone.db?mode=rwc";

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_DEDUP_TTL_HOURS: u64 = 7 * 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Radius within which users are alerted about a new incident.
    pub alert_radius_meters: f64,
    /// How often expired incidents are removed.
    pub sweep_interval: Duration,
    /// How often active incidents are re-evaluated against fresh presence.
    pub rescan_interval: Duration,
    /// Minimum age of an alert log entry before it may be pruned.
    pub dedup_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.to_string(),
            alert_radius_meters: DEFAULT_ALERT_RADIUS_METERS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            rescan_interval: Duration::from_secs(DEFAULT_RESCAN_INTERVAL_SECS),
            dedup_ttl: Duration::from_secs(DEFAULT_DEDUP_TTL_HOURS * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from `DISASTERZONE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| parse::<u64>(&v));

        Self {
            port: lookup("DISASTERZONE_PORT")
                .and_then(|p| parse(&p))
                .unwrap_or(defaults.port),
            database_url: lookup("DISASTERZONE_DATABASE_URL").unwrap_or(defaults.database_url),
            alert_radius_meters: lookup("DISASTERZONE_ALERT_RADIUS_METERS")
                .and_then(|r| parse::<f64>(&r))
                .filter(|r| r.is_finite() && *r > 0.0)
                .unwrap_or(defaults.alert_radius_meters),
            sweep_interval: parsed("DISASTERZONE_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            rescan_interval: parsed("DISASTERZONE_RESCAN_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rescan_interval),
            dedup_ttl: parsed("DISASTERZONE_DEDUP_TTL_HOURS")
                .and_then(|h| h.checked_mul(60 * 60))
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
        }
    }
}

fn parse<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.alert_radius_meters, 1000.0);
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.dedup_ttl, Duration::from_secs(168 * 3600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DISASTERZONE_PORT", "8080"),
            ("DISASTERZONE_DATABASE_URL", "sqlite::memory:"),
            ("DISASTERZONE_ALERT_RADIUS_METERS", "2500"),
            ("DISASTERZONE_RESCAN_INTERVAL_SECS", "30"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.alert_radius_meters, 2500.0);
        assert_eq!(config.rescan_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("DISASTERZONE_PORT", "not-a-port"),
            ("DISASTERZONE_ALERT_RADIUS_METERS", "-5"),
            ("DISASTERZONE_SWEEP_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.alert_radius_meters, 1000.0);
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_overflowing_dedup_ttl_falls_back() {
        let max = u64::MAX.to_string();
        let config = config_from(&[("DISASTERZONE_DEDUP_TTL_HOURS", max.as_str())]);
        assert_eq!(config.dedup_ttl, Duration::from_secs(168 * 3600));

        let config = config_from(&[("DISASTERZONE_DEDUP_TTL_HOURS", "24")]);
        assert_eq!(config.dedup_ttl, Duration::from_secs(24 * 3600));
    }
}
