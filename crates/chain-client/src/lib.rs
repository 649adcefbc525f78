//! chain-client: Creditcoin node client wrapper
//!
//! This crate provides a high-level client over an injectable [`ChainRpc`]
//! capability, with per-request timeouts, account queries, the shared
//! extrinsic submission protocol, an sr25519 key backend, and an in-memory
//! simulated chain for tests and demos.

pub mod keys;
pub mod queries;
pub mod rpc;
pub mod sim;
pub mod submission;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use creditcoin_core::{Address, BlockNumber, NetworkError, NodeConfig};
use serde_json::Value;

pub use keys::{KeyBackend, Sr25519Backend};
pub use queries::{AccountData, AccountInfo};
pub use rpc::{
    BlockHeader, Call, ChainConnector, ChainProperties, ChainRpc, PaymentInfo, SignedExtrinsic,
    StorageEntry, SubmissionResult,
};
pub use sim::{SimulatedChain, SimulatedConnector};

/// Result type for chain client operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// High-level Creditcoin node client
#[derive(Clone)]
pub struct ChainClient {
    inner: Arc<dyn ChainRpc>,
    config: NodeConfig,
}

impl ChainClient {
    /// Open a connection through `connector` to the configured endpoint
    pub async fn connect(connector: &dyn ChainConnector, config: NodeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let inner = tokio::time::timeout(timeout, connector.connect(&config.url))
            .await
            .map_err(|_| NetworkError::Unreachable {
                url: format!("{}: connection timed out", config.url),
            })??;

        tracing::info!(url = %config.url, "Connected to Creditcoin node");

        Ok(Self { inner, config })
    }

    /// Wrap an already-open connection
    pub fn new(inner: Arc<dyn ChainRpc>, config: NodeConfig) -> Self {
        Self { inner, config }
    }

    /// Get the underlying RPC capability (for advanced usage)
    pub fn inner(&self) -> &Arc<dyn ChainRpc> {
        &self.inner
    }

    /// Get the current node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    pub(crate) fn inclusion_timeout(&self) -> Duration {
        Duration::from_secs(self.config.inclusion_timeout_secs)
    }

    /// Get current best block number
    pub async fn current_block_number(&self) -> Result<BlockNumber> {
        Ok(self.get_block(None).await?.number)
    }

    /// Check if node is online
    pub async fn is_online(&self) -> bool {
        self.get_block(None).await.is_ok()
    }

    pub async fn query(
        &self,
        module: &str,
        storage: &str,
        params: &[Value],
    ) -> Result<Option<Value>> {
        timed_request(
            self.request_timeout(),
            self.inner.query(module, storage, params),
        )
        .await
    }

    pub async fn query_map(&self, module: &str, storage: &str) -> Result<Vec<StorageEntry>> {
        timed_request(self.request_timeout(), self.inner.query_map(module, storage)).await
    }

    /// `System.Account` for an address; a missing account decodes as zeroed
    pub async fn account_info(&self, address: &Address) -> Result<AccountInfo> {
        let raw = self
            .query("System", "Account", &[Value::String(address.to_string())])
            .await?;
        queries::decode_account_info(raw)
    }

    pub async fn compose_call(&self, module: &str, function: &str, params: Value) -> Result<Call> {
        timed_request(
            self.request_timeout(),
            self.inner.compose_call(module, function, params),
        )
        .await
    }

    /// Estimated fee for `call` signed by `keypair`, in base units
    pub async fn estimate_fee(
        &self,
        call: &Call,
        keypair: &creditcoin_core::Keypair,
    ) -> Result<u128> {
        let info = timed_request(
            self.request_timeout(),
            self.inner.get_payment_info(call, keypair),
        )
        .await?;
        Ok(info.partial_fee)
    }

    /// Header of block `number`, or the best block when `None`
    pub async fn get_block(&self, number: Option<BlockNumber>) -> Result<BlockHeader> {
        timed_request(self.request_timeout(), self.inner.get_block(number)).await
    }

    pub async fn get_block_timestamp(&self, block_hash: &str) -> Result<DateTime<Utc>> {
        let millis = timed_request(
            self.request_timeout(),
            self.inner.get_block_timestamp(block_hash),
        )
        .await?;

        i64::try_from(millis)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| {
                NetworkError::Decode(format!(
                    "block {} timestamp {} out of range",
                    block_hash, millis
                ))
            })
    }

    pub async fn properties(&self) -> Result<ChainProperties> {
        timed_request(self.request_timeout(), self.inner.properties()).await
    }

    /// Current session validator set (`Session.Validators`)
    pub async fn validators(&self) -> Result<Vec<String>> {
        let raw = self.query("Session", "Validators", &[]).await?;
        match raw {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| NetworkError::Decode(format!("Session.Validators: {}", e))),
        }
    }

    /// Release the underlying connection
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await?;
        tracing::info!(url = %self.config.url, "Closed connection to Creditcoin node");
        Ok(())
    }
}

/// Run a node call with a timeout
pub(crate) async fn timed_request<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| NetworkError::Timeout {
            secs: timeout.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditcoin_core::{AddressFormat, Error};
    use rust_decimal_macros::dec;

    fn alice() -> creditcoin_core::Keypair {
        Sr25519Backend
            .derive_from_uri("//Alice", AddressFormat::CREDITCOIN)
            .unwrap()
    }

    async fn connected() -> (Arc<SimulatedChain>, ChainClient) {
        let chain = Arc::new(SimulatedChain::new());
        let connector = SimulatedConnector::new(chain.clone());
        let client = ChainClient::connect(&connector, NodeConfig::new("ws://127.0.0.1:9944"))
            .await
            .unwrap();
        (chain, client)
    }

    #[tokio::test]
    async fn test_missing_account_is_zeroed() {
        let (_chain, client) = connected().await;
        let info = client.account_info(&alice().address).await.unwrap();
        assert_eq!(info.nonce, 0);
        assert_eq!(info.data.free, 0);
        assert_eq!(info.data.locked(), 0);
    }

    #[tokio::test]
    async fn test_account_info_after_endow() {
        let (chain, client) = connected().await;
        let alice = alice();
        chain.endow(&alice.address, dec!(250)).unwrap();

        let info = client.account_info(&alice.address).await.unwrap();
        assert_eq!(info.data.free, 250 * 10u128.pow(18));
    }

    #[tokio::test]
    async fn test_offline_node_is_network_error() {
        let (chain, client) = connected().await;
        chain.set_offline(true);

        assert!(!client.is_online().await);
        let err = client.current_block_number().await.unwrap_err();
        assert!(matches!(err, NetworkError::Unreachable { .. }));
        assert!(Error::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_block_timestamp_is_utc() {
        let (_chain, client) = connected().await;
        let header = client.get_block(None).await.unwrap();
        let ts = client.get_block_timestamp(&header.hash).await.unwrap();
        assert!(ts.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let (_chain, client) = connected().await;
        client.close().await.unwrap();
        assert!(!client.is_online().await);
    }
}
