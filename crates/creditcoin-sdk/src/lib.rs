//! creditcoin-sdk: Client SDK for the Creditcoin network
//!
//! [`CreditcoinClient`] bundles account management, balance and explorer
//! queries, native transfers, and the credit marketplace behind one handle.
//!
//! ```ignore
//! let client = CreditcoinClient::connect(&connector, ClientConfig::default()).await?;
//! let lender = client.import_account_from_mnemonic(&phrase)?;
//! let terms = LoanTerms::new(dec!(1000), dec!(5), 90);
//! client.credit_contracts().create_ask_order(&lender, &terms, None, true).await?;
//! ```

pub mod accounts;
pub mod balances;
pub mod client;
pub mod explorer;
pub mod transfer;

pub use balances::{AddressInfo, Balance};
pub use client::CreditcoinClient;
pub use explorer::{BlockInfo, NetworkStats};

pub use chain_client::{
    ChainClient, ChainConnector, ChainRpc, KeyBackend, SimulatedChain, SimulatedConnector,
    Sr25519Backend,
};
pub use credit_market::{
    CreditMarket, Deal, DealFilter, DealStatus, LoanTerms, MarketSnapshot, Order, OrderFilter,
    OrderStatus, OrderType, RepaymentSchedule, RepaymentStatus,
};
pub use creditcoin_core::{
    Address, AddressFormat, ClientConfig, Error, Keypair, Network, NodeConfig, ReceiptStatus,
    Result, TransactionReceipt,
};
