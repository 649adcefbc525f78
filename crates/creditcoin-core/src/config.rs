//! Configuration types for the Creditcoin SDK

use serde::{Deserialize, Serialize};

use crate::{constants, AddressFormat, BlockNumber, Error, Network, Result};

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// WebSocket endpoint (e.g., "wss://mainnet.creditcoin.network/ws")
    pub url: String,

    /// Upper bound for a single read or submit round-trip
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for waiting on block inclusion
    #[serde(default = "default_inclusion_timeout")]
    pub inclusion_timeout_secs: u64,

    /// Reconnect on dropped connections (forwarded to the connector)
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_inclusion_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl NodeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: constants::MAINNET_URL.to_string(),
            request_timeout_secs: default_request_timeout(),
            inclusion_timeout_secs: default_inclusion_timeout(),
            auto_reconnect: true,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node connection settings
    pub node: NodeConfig,

    /// Network (mainnet or local)
    pub network: Network,

    /// SS58 format used when deriving and validating addresses
    #[serde(default)]
    pub address_format: AddressFormat,

    /// Expiry applied to new orders when the caller gives none
    #[serde(default = "default_expiry_blocks")]
    pub default_expiry_blocks: BlockNumber,
}

fn default_expiry_blocks() -> BlockNumber {
    constants::BLOCKS_PER_DAY
}

impl ClientConfig {
    /// Config pointing at a network's default endpoint
    pub fn for_network(network: Network) -> Self {
        Self {
            node: NodeConfig::new(network.default_url()),
            network,
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.node.url = url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.node.url.trim();
        if url.is_empty() {
            return Err(Error::Config("node url must not be empty".into()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "node url must use ws:// or wss://, got {}",
                url
            )));
        }
        if self.node.request_timeout_secs == 0 {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if self.node.inclusion_timeout_secs == 0 {
            return Err(Error::Config("inclusion timeout must be positive".into()));
        }
        if self.default_expiry_blocks == 0 {
            return Err(Error::Config("default expiry must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            network: Network::Mainnet,
            address_format: AddressFormat::CREDITCOIN,
            default_expiry_blocks: default_expiry_blocks(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.node.url, "wss://mainnet.creditcoin.network/ws");
        assert_eq!(config.node.request_timeout_secs, 30);
        assert_eq!(config.node.inclusion_timeout_secs, 120);
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.address_format, AddressFormat(42));
        assert_eq!(config.default_expiry_blocks, 14_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ClientConfig::for_network(Network::Local);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node.url, "ws://127.0.0.1:9944");
        assert_eq!(parsed.network, Network::Local);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: ClientConfig = serde_json::from_str(
            r#"{"node": {"url": "ws://10.0.0.5:9944"}, "network": "local"}"#,
        )
        .unwrap();
        assert_eq!(parsed.node.request_timeout_secs, 30);
        assert!(parsed.node.auto_reconnect);
        assert_eq!(parsed.address_format, AddressFormat::CREDITCOIN);
        assert_eq!(parsed.default_expiry_blocks, 14_400);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig::default().with_url("http://localhost:9933");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClientConfig::default();
        config.node.inclusion_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
