//! Configuration types for usenet-webquery

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query engine configuration
///
/// Controls the heartbeat that drives admission and timeouts. With the
/// defaults a new query is admitted at most once per second and an active
/// query is aborted after 30 heartbeats (~30 seconds) without a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Heartbeat period (default: 1000 ms)
    #[serde(default = "default_tick_interval", with = "millis_serde")]
    pub tick_interval: Duration,

    /// Heartbeats an active query may live before it is timed out (default: 30)
    #[serde(default = "default_timeout_ticks")]
    pub timeout_ticks: u32,

    /// User-Agent header sent with every request (default: "NewsflashPlus")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Admit the first query submitted to an idle engine right away instead of
    /// waiting a full heartbeat (default: true)
    #[serde(default = "default_true")]
    pub admit_on_first_submit: bool,

    /// Capacity of the broadcast event channel (default: 1000)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            timeout_ticks: default_timeout_ticks(),
            user_agent: default_user_agent(),
            admit_on_first_submit: true,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Set the query timeout as wall-clock time
    ///
    /// The timeout is converted to heartbeats, rounding up, and is never less
    /// than a single heartbeat.
    ///
    /// ```
    /// use std::time::Duration;
    /// use usenet_webquery::EngineConfig;
    ///
    /// let mut config = EngineConfig::default();
    /// config.set_timeout(Duration::from_secs(5));
    /// assert_eq!(config.timeout_ticks, 5);
    /// ```
    pub fn set_timeout(&mut self, timeout: Duration) {
        let interval = self.tick_interval.as_millis().max(1);
        let ticks = timeout.as_millis().div_ceil(interval).max(1);
        self.timeout_ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
    }

    /// Wall-clock time after which an active query is timed out
    pub fn timeout(&self) -> Duration {
        self.tick_interval.saturating_mul(self.timeout_ticks)
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::config(
                "tick_interval",
                "heartbeat interval must be greater than zero",
            ));
        }
        if self.timeout_ticks == 0 {
            return Err(Error::config(
                "timeout_ticks",
                "timeout must be at least one heartbeat",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config(
                "event_channel_capacity",
                "event channel capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_timeout_ticks() -> u32 {
    30
}

fn default_user_agent() -> String {
    "NewsflashPlus".to_string()
}

fn default_true() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.timeout_ticks, 30);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.admit_on_first_submit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_tick_interval_serializes_as_millis() {
        let config = EngineConfig {
            tick_interval: Duration::from_millis(250),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tick_interval"], 250);

        let back: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_set_timeout_rounds_up_to_whole_ticks() {
        let mut config = EngineConfig {
            tick_interval: Duration::from_millis(500),
            ..Default::default()
        };

        config.set_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout_ticks, 10);

        config.set_timeout(Duration::from_millis(1200));
        assert_eq!(config.timeout_ticks, 3);

        config.set_timeout(Duration::ZERO);
        assert_eq!(config.timeout_ticks, 1);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(ref k), .. }) if k == "tick_interval"
        ));

        let config = EngineConfig {
            timeout_ticks: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(ref k), .. }) if k == "timeout_ticks"
        ));

        let config = EngineConfig {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
