//! Block and network queries

use chrono::{DateTime, Utc};
use creditcoin_core::constants::TARGET_BLOCK_TIME_SECS;
use creditcoin_core::{BlockNumber, Result};
use serde::{Deserialize, Serialize};

use crate::CreditcoinClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: BlockNumber,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
    pub timestamp: DateTime<Utc>,
    pub extrinsic_count: u32,
    /// Validator that authored the block, when the node reports it
    pub validator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub current_block: BlockNumber,
    pub active_validators: usize,
    /// Target block time in seconds
    pub average_block_time: f64,
    /// SS58 address format reported by the node
    pub network_version: u16,
    pub token_symbol: String,
}

impl CreditcoinClient {
    /// Block `number`, or the best block when `None`
    pub async fn get_block_info(&self, number: Option<BlockNumber>) -> Result<BlockInfo> {
        let header = self.chain.get_block(number).await?;
        let timestamp = self.chain.get_block_timestamp(&header.hash).await?;

        Ok(BlockInfo {
            number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            state_root: header.state_root,
            extrinsics_root: header.extrinsics_root,
            timestamp,
            extrinsic_count: header.extrinsic_count,
            validator: header.author,
        })
    }

    pub async fn get_network_stats(&self) -> Result<NetworkStats> {
        let current_block = self.chain.current_block_number().await?;
        let validators = self.chain.validators().await?;
        let properties = self.chain.properties().await?;

        Ok(NetworkStats {
            current_block,
            active_validators: validators.len(),
            average_block_time: TARGET_BLOCK_TIME_SECS as f64,
            network_version: properties.ss58_format,
            token_symbol: properties.token_symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chain_client::SimulatedChain;
    use creditcoin_core::{ClientConfig, Error, Network};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<SimulatedChain>, CreditcoinClient) {
        let chain = Arc::new(SimulatedChain::new());
        let client =
            CreditcoinClient::new(chain.clone(), ClientConfig::for_network(Network::Local)).unwrap();
        (chain, client)
    }

    #[tokio::test]
    async fn test_block_info_links_to_parent() {
        let (chain, client) = setup();
        chain.advance_blocks(2);

        let best = client.get_block_info(None).await.unwrap();
        assert_eq!(best.number, 2);
        assert_eq!(best.extrinsic_count, 1);

        let parent = client.get_block_info(Some(1)).await.unwrap();
        assert_eq!(best.parent_hash, parent.hash);
        assert_eq!(
            (best.timestamp - parent.timestamp).num_seconds(),
            TARGET_BLOCK_TIME_SECS as i64
        );
    }

    #[tokio::test]
    async fn test_block_info_counts_extrinsics() {
        let (chain, client) = setup();
        let alice = client.import_account_from_uri("//Alice").unwrap();
        let bob = client.import_account_from_uri("//Bob").unwrap();
        chain.endow(&alice.address, dec!(10)).unwrap();
        client
            .transfer(&alice, bob.address.as_str(), dec!(1), true)
            .await
            .unwrap();

        let best = client.get_block_info(None).await.unwrap();
        assert_eq!(best.extrinsic_count, 2);
    }

    #[tokio::test]
    async fn test_block_info_reports_validator() {
        let (chain, client) = setup();
        chain.advance_blocks(1);
        assert_eq!(client.get_block_info(None).await.unwrap().validator, None);

        let validators = vec!["v1".to_string(), "v2".to_string()];
        chain.set_validators(validators.clone());
        chain.advance_blocks(2);

        let best = client.get_block_info(None).await.unwrap();
        let parent = client.get_block_info(Some(best.number - 1)).await.unwrap();
        for info in [&best, &parent] {
            let validator = info.validator.as_ref().unwrap();
            assert!(validators.contains(validator));
        }
        assert_ne!(best.validator, parent.validator);
    }

    #[tokio::test]
    async fn test_unknown_block_is_network_error() {
        let (_chain, client) = setup();
        let err = client.get_block_info(Some(99)).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_network_stats() {
        let (chain, client) = setup();
        chain.set_validators(vec!["v1".into(), "v2".into(), "v3".into()]);
        chain.advance_blocks(4);

        let stats = client.get_network_stats().await.unwrap();
        assert_eq!(stats.current_block, 4);
        assert_eq!(stats.active_validators, 3);
        assert_eq!(stats.average_block_time, 6.0);
        assert_eq!(stats.network_version, 42);
        assert_eq!(stats.token_symbol, "CTC");
    }
}
