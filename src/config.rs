use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::Error;
use crate::engine::DEFAULT_HISTORY_LIMIT;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub history: HistoryConfig,
    pub polling: PollingConfig,
    pub sweep: SweepConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub default_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Progressive polling cadence for a sent document.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_delay_secs: u64,
    pub secondary_delay_secs: u64,
    pub tertiary_delay_secs: u64,
    pub hourly_delay_secs: u64,
    pub max_window_hours: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 3,
            secondary_delay_secs: 7,
            tertiary_delay_secs: 50,
            hourly_delay_secs: 59 * 60,
            max_window_hours: 24,
        }
    }
}

impl PollingConfig {
    pub fn max_window(&self) -> Duration {
        Duration::from_secs(self.max_window_hours.saturating_mul(3600))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
    /// Pending reservations younger than this are left to the poller.
    pub stale_after_minutes: u32,
    /// Reservations still unresolved after this long are cancelled.
    pub timeout_after_minutes: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            stale_after_minutes: 10,
            timeout_after_minutes: 24 * 60,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl WalletConfig {
    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        let config: WalletConfig = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.sweep.timeout_after_minutes < self.sweep.stale_after_minutes {
            return Err(Error::Config(format!(
                "sweep.timeout_after_minutes ({}) is shorter than sweep.stale_after_minutes ({})",
                self.sweep.timeout_after_minutes, self.sweep.stale_after_minutes
            )));
        }
        if self.polling.max_window_hours == 0 {
            return Err(Error::Config("polling.max_window_hours must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = WalletConfig::default();
        assert_eq!(c.history.default_limit, 50);
        assert_eq!(c.polling.initial_delay_secs, 3);
        assert_eq!(c.polling.secondary_delay_secs, 7);
        assert_eq!(c.polling.tertiary_delay_secs, 50);
        assert_eq!(c.polling.hourly_delay_secs, 3540);
        assert_eq!(c.polling.max_window(), Duration::from_secs(24 * 3600));
        assert_eq!(c.sweep.timeout_after_minutes, 1440);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = WalletConfig::from_toml(
            r#"
            [sweep]
            stale_after_minutes = 30

            [history]
            default_limit = 10
            "#,
        )
        .unwrap();
        assert_eq!(c.sweep.stale_after_minutes, 30);
        assert_eq!(c.sweep.interval_secs, 300);
        assert_eq!(c.history.default_limit, 10);
        assert_eq!(c.polling, PollingConfig::default());
    }

    #[test]
    fn inconsistent_sweep_windows_are_rejected() {
        let err = WalletConfig::from_toml(
            "[sweep]\nstale_after_minutes = 60\ntimeout_after_minutes = 5\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn oversized_window_saturates() {
        let polling = PollingConfig {
            max_window_hours: u64::MAX,
            ..PollingConfig::default()
        };
        assert_eq!(polling.max_window(), Duration::from_secs(u64::MAX));
    }
}
