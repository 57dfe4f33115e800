//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the client, its pools and the health loop.
///
/// Durations are (de)serialized as `{"secs": .., "nanos": ..}` by serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cluster node addresses, e.g. "127.0.0.1:8087".
    pub addrs: Vec<String>,
    /// Pooled connections opened against each address.
    pub connections_per_node: usize,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Period between health probes.
    pub health_interval: Duration,
    /// First reconnect wait after a failure.
    pub backoff_base: Duration,
    /// Upper bound for the reconnect wait.
    pub backoff_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addrs: vec!["127.0.0.1:8087".to_string()],
            connections_per_node: 4,
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            health_interval: Duration::from_secs(10),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at the given addresses.
    pub fn with_addrs<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientConfig {
            addrs: addrs.into_iter().map(Into::into).collect(),
            ..ClientConfig::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|err| ClientError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.addrs.is_empty() {
            return Err(ClientError::InvalidConfig("no node addresses".into()));
        }
        if self.connections_per_node == 0 {
            return Err(ClientError::InvalidConfig(
                "connections_per_node must be at least 1".into(),
            ));
        }
        if self.backoff_base.is_zero() || self.backoff_max < self.backoff_base {
            return Err(ClientError::InvalidConfig(
                "backoff_max must be >= backoff_base > 0".into(),
            ));
        }
        if self.health_interval.is_zero() {
            return Err(ClientError::InvalidConfig("health_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Total number of nodes across all addresses.
    pub fn capacity(&self) -> usize {
        self.addrs.len() * self.connections_per_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backoff_max, Duration::from_secs(300));
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = ClientConfig::from_json(
            r#"{"addrs": ["10.0.0.1:8087", "10.0.0.2:8087"], "connections_per_node": 2}"#,
        )
        .unwrap();
        assert_eq!(config.capacity(), 4);
        assert_eq!(config.health_interval, Duration::from_secs(10));
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(matches!(
            ClientConfig::from_json(r#"{"addrs": []}"#),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::from_json(r#"{"connections_per_node": 0}"#),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::from_json("not json"),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}
