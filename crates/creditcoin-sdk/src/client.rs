//! SDK entry point

use std::sync::Arc;

use chain_client::{ChainClient, ChainConnector, ChainRpc, KeyBackend, Sr25519Backend};
use credit_market::CreditMarket;
use creditcoin_core::{ClientConfig, Result};

/// Creditcoin client: accounts, balances, transfers, explorer queries, and
/// the credit marketplace under [`CreditcoinClient::credit_contracts`].
///
/// One instance serves one logical flow; create a client per worker for
/// parallel use.
#[derive(Clone)]
pub struct CreditcoinClient {
    pub(crate) chain: ChainClient,
    pub(crate) market: CreditMarket,
    pub(crate) keys: Arc<dyn KeyBackend>,
    pub(crate) config: ClientConfig,
}

impl CreditcoinClient {
    /// Validate `config` and connect to its node through `connector`
    pub async fn connect(connector: &dyn ChainConnector, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let chain = ChainClient::connect(connector, config.node.clone()).await?;

        tracing::info!(
            network = %config.network.as_str(),
            address_format = config.address_format.prefix(),
            "Creditcoin client ready"
        );

        Ok(Self::assemble(chain, config))
    }

    /// Build a client over an already-open chain capability
    pub fn new(rpc: Arc<dyn ChainRpc>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let chain = ChainClient::new(rpc, config.node.clone());
        Ok(Self::assemble(chain, config))
    }

    fn assemble(chain: ChainClient, config: ClientConfig) -> Self {
        let market = CreditMarket::new(chain.clone()).with_default_expiry(config.default_expiry_blocks);
        Self {
            chain,
            market,
            keys: Arc::new(Sr25519Backend),
            config,
        }
    }

    /// Replace the keypair library
    pub fn with_key_backend(mut self, keys: Arc<dyn KeyBackend>) -> Self {
        self.keys = keys;
        self
    }

    /// Marketplace operations: orders, deals, repayments
    pub fn credit_contracts(&self) -> &CreditMarket {
        &self.market
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Release the node connection
    pub async fn close(&self) -> Result<()> {
        self.chain.close().await?;
        Ok(())
    }
}
