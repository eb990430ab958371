use crate::error::{KefError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default control port of the speaker
pub const DEFAULT_PORT: u16 = 50001;

/// Client configuration
///
/// Deserializes from camelCase keys; every field except `host` is optional.
///
/// ```
/// use kef_wireless::ClientOptions;
///
/// let options = ClientOptions::new("192.168.1.40")
///     .with_max_volume(60)
///     .with_check_state_interval_ms(10_000);
/// assert_eq!(options.port, 50001);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Speaker address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between a close and the next connection attempt
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Initial retry flag. `connect` always turns it on and `end` turns it off.
    #[serde(default = "default_true")]
    pub retry_enabled: bool,

    /// Hard ceiling for volume set operations, 1..=100
    #[serde(default = "default_max_volume")]
    pub max_volume: u8,

    /// Period of the repeating state check. 0 checks once per connection.
    #[serde(default)]
    pub check_state_interval_ms: u64,

    /// Emit a `state` event for every report, even when nothing changed
    #[serde(default)]
    pub emit_unchanged_state: bool,

    #[serde(default = "default_true")]
    pub connect_on_construction: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_volume() -> u8 {
    50
}

impl ClientOptions {
    /// Options with defaults for everything but the host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_enabled: true,
            max_volume: default_max_volume(),
            check_state_interval_ms: 0,
            emit_unchanged_state: false,
            connect_on_construction: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_retry_interval_ms(mut self, retry_interval_ms: u64) -> Self {
        self.retry_interval_ms = retry_interval_ms;
        self
    }

    pub fn with_retry_enabled(mut self, retry_enabled: bool) -> Self {
        self.retry_enabled = retry_enabled;
        self
    }

    pub fn with_max_volume(mut self, max_volume: u8) -> Self {
        self.max_volume = max_volume;
        self
    }

    pub fn with_check_state_interval_ms(mut self, check_state_interval_ms: u64) -> Self {
        self.check_state_interval_ms = check_state_interval_ms;
        self
    }

    pub fn with_emit_unchanged_state(mut self, emit_unchanged_state: bool) -> Self {
        self.emit_unchanged_state = emit_unchanged_state;
        self
    }

    pub fn with_connect_on_construction(mut self, connect_on_construction: bool) -> Self {
        self.connect_on_construction = connect_on_construction;
        self
    }

    /// Check the options a client cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(KefError::MissingHost);
        }
        if !(1..=100).contains(&self.max_volume) {
            return Err(KefError::InvalidMaxVolume(self.max_volume));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// `None` when state is checked once per connection instead of periodically
    pub fn check_state_interval(&self) -> Option<Duration> {
        (self.check_state_interval_ms > 0)
            .then(|| Duration::from_millis(self.check_state_interval_ms))
    }

    /// `host:port` for the TCP connector
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let options: ClientOptions = serde_json::from_str(r#"{"host":"10.0.0.5"}"#).unwrap();
        assert_eq!(options, ClientOptions::new("10.0.0.5"));
        assert_eq!(options.port, 50001);
        assert_eq!(options.retry_interval(), Duration::from_millis(1000));
        assert!(options.retry_enabled);
        assert_eq!(options.max_volume, 50);
        assert_eq!(options.check_state_interval(), None);
        assert!(!options.emit_unchanged_state);
        assert!(options.connect_on_construction);
    }

    #[test]
    fn camel_case_keys() {
        let options: ClientOptions = serde_json::from_str(
            r#"{
                "host": "speaker.local",
                "port": 6000,
                "retryIntervalMs": 250,
                "maxVolume": 80,
                "checkStateIntervalMs": 5000,
                "emitUnchangedState": true,
                "connectOnConstruction": false
            }"#,
        )
        .unwrap();
        assert_eq!(options.address(), "speaker.local:6000");
        assert_eq!(options.retry_interval(), Duration::from_millis(250));
        assert_eq!(options.max_volume, 80);
        assert_eq!(options.check_state_interval(), Some(Duration::from_secs(5)));
        assert!(options.emit_unchanged_state);
        assert!(!options.connect_on_construction);
    }

    #[test]
    fn missing_host_is_rejected() {
        assert!(serde_json::from_str::<ClientOptions>("{}").is_err());
        assert!(matches!(
            ClientOptions::new("  ").validate(),
            Err(KefError::MissingHost)
        ));
    }

    #[test]
    fn max_volume_bounds() {
        assert!(ClientOptions::new("h").with_max_volume(1).validate().is_ok());
        assert!(ClientOptions::new("h").with_max_volume(100).validate().is_ok());
        assert!(matches!(
            ClientOptions::new("h").with_max_volume(0).validate(),
            Err(KefError::InvalidMaxVolume(0))
        ));
        assert!(matches!(
            ClientOptions::new("h").with_max_volume(101).validate(),
            Err(KefError::InvalidMaxVolume(101))
        ));
    }
}
