//! Balance and account queries

use chain_client::AccountInfo;
use creditcoin_core::{amount, Address, Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CreditcoinClient;

/// Account balance in whole tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address: Address,
    pub free: Decimal,
    pub reserved: Decimal,
    /// Sum of the frozen fields
    pub locked: Decimal,
    /// `free + reserved`
    pub total: Decimal,
    /// `free - locked`, never negative
    pub available: Decimal,
    pub nonce: u64,
}

impl Balance {
    /// All-zero balance for `address`
    pub fn zeroed(address: Address) -> Self {
        Self {
            address,
            free: Decimal::ZERO,
            reserved: Decimal::ZERO,
            locked: Decimal::ZERO,
            total: Decimal::ZERO,
            available: Decimal::ZERO,
            nonce: 0,
        }
    }

    fn from_account(address: Address, info: &AccountInfo) -> Result<Self> {
        let data = &info.data;
        Ok(Self {
            address,
            free: amount::from_wire(data.free)?,
            reserved: amount::from_wire(data.reserved)?,
            locked: amount::from_wire(data.locked())?,
            total: amount::from_wire(data.total())?,
            available: amount::from_wire(data.available())?,
            nonce: info.nonce,
        })
    }
}

/// Account summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: Address,
    /// Total balance
    pub balance: Decimal,
    pub nonce: u64,
    pub locked_balance: Decimal,
    /// Approximated by the nonce
    pub transaction_count: u64,
}

impl CreditcoinClient {
    pub(crate) fn checked_address(&self, address: &str) -> Result<Address> {
        if !self.validate_address(address) {
            return Err(Error::InvalidAddress {
                address: address.to_string(),
            });
        }
        Ok(Address::new(address))
    }

    /// Balance of `address`; an account the chain has never seen is zeroed
    pub async fn get_balance(&self, address: &str) -> Result<Balance> {
        let address = self.checked_address(address)?;
        let info = self.chain.account_info(&address).await?;
        Balance::from_account(address, &info)
    }

    /// Balances of several addresses, one query each.
    ///
    /// A failing address yields a zeroed placeholder instead of failing the
    /// batch.
    pub async fn get_balances(&self, addresses: &[&str]) -> Vec<Balance> {
        let mut balances = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.get_balance(address).await {
                Ok(balance) => balances.push(balance),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Balance query failed");
                    balances.push(Balance::zeroed(Address::new(*address)));
                }
            }
        }
        balances
    }

    pub async fn get_address_info(&self, address: &str) -> Result<AddressInfo> {
        let balance = self.get_balance(address).await?;
        Ok(AddressInfo {
            address: balance.address,
            balance: balance.total,
            nonce: balance.nonce,
            locked_balance: balance.locked,
            transaction_count: balance.nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chain_client::SimulatedChain;
    use creditcoin_core::{ClientConfig, Keypair, Network};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<SimulatedChain>, CreditcoinClient, Keypair) {
        let chain = Arc::new(SimulatedChain::new());
        let client =
            CreditcoinClient::new(chain.clone(), ClientConfig::for_network(Network::Local)).unwrap();
        let alice = client.import_account_from_uri("//Alice").unwrap();
        (chain, client, alice)
    }

    #[tokio::test]
    async fn test_balance_breakdown() {
        let (chain, client, alice) = setup();
        chain.endow(&alice.address, dec!(100)).unwrap();
        chain.freeze(&alice.address, dec!(30)).unwrap();

        let balance = client.get_balance(alice.address.as_str()).await.unwrap();
        assert_eq!(balance.free, dec!(100));
        assert_eq!(balance.reserved, Decimal::ZERO);
        assert_eq!(balance.locked, dec!(30));
        assert_eq!(balance.total, dec!(100));
        assert_eq!(balance.available, dec!(70));
        assert_eq!(balance.nonce, 0);
    }

    #[tokio::test]
    async fn test_unknown_account_is_zeroed() {
        let (_chain, client, _alice) = setup();
        let bob = client.import_account_from_uri("//Bob").unwrap();
        let balance = client.get_balance(bob.address.as_str()).await.unwrap();
        assert_eq!(balance, Balance::zeroed(bob.address));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let (_chain, client, _alice) = setup();
        let err = client.get_balance("nope").await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { ref address } if address == "nope"));
        assert!(client.get_address_info("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_bulk_balances_isolate_failures() {
        let (chain, client, alice) = setup();
        chain.endow(&alice.address, dec!(5)).unwrap();

        let balances = client
            .get_balances(&[alice.address.as_str(), "garbage", alice.address.as_str()])
            .await;
        assert_eq!(balances.len(), 3);
        assert_eq!(balances[0].free, dec!(5));
        assert_eq!(balances[1], Balance::zeroed(Address::new("garbage")));
        assert_eq!(balances[2].free, dec!(5));
    }

    #[tokio::test]
    async fn test_address_info() {
        let (chain, client, alice) = setup();
        chain.endow(&alice.address, dec!(42)).unwrap();
        let info = client.get_address_info(alice.address.as_str()).await.unwrap();
        assert_eq!(info.balance, dec!(42));
        assert_eq!(info.transaction_count, 0);
        assert_eq!(info.locked_balance, Decimal::ZERO);
    }
}
