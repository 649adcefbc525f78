//! Core type definitions for the Creditcoin SDK

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SS58-encoded account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Extrinsic hash (0x-prefixed hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SS58 address format (network prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressFormat(pub u16);

impl AddressFormat {
    /// Format used by Creditcoin accounts (generic substrate prefix)
    pub const CREDITCOIN: AddressFormat = AddressFormat(42);

    pub fn prefix(&self) -> u16 {
        self.0
    }
}

impl Default for AddressFormat {
    fn default() -> Self {
        Self::CREDITCOIN
    }
}

impl fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ss58:{}", self.0)
    }
}

/// Network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    /// Local development node
    Local,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Local => "local",
        }
    }

    /// Default WebSocket endpoint for this network
    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Mainnet => constants::MAINNET_URL,
            Self::Local => constants::LOCAL_URL,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Block height
pub type BlockNumber = u64;

/// Key material for a single account.
///
/// Held by the caller only; the SDK never stores it. `mnemonic` is empty when
/// the pair was derived from a raw private key.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub mnemonic: String,
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
    pub address: Address,
    pub address_format: AddressFormat,
}

impl Keypair {
    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.public_key))
    }

    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.private_key))
    }

    pub fn has_mnemonic(&self) -> bool {
        !self.mnemonic.is_empty()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("mnemonic", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key_hex())
            .field("address", &self.address)
            .field("address_format", &self.address_format)
            .finish()
    }
}

/// A decoded runtime event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Emitting pallet, e.g. "Credit"
    pub pallet: String,
    /// Event variant, e.g. "AskOrderAdded"
    pub name: String,
    /// Event fields as decoded by the chain client
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Index of the extrinsic that emitted the event (None for block-level events)
    #[serde(default)]
    pub extrinsic_index: Option<u32>,
}

impl EventRecord {
    pub fn is(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }
}

/// Outcome recorded on a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Accepted by the node; inclusion was not awaited
    Submitted,
    Success,
    Failed,
}

/// Record of a submitted extrinsic, built once after inclusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_hash: Option<String>,
    pub block_number: Option<BlockNumber>,
    pub status: ReceiptStatus,
    pub events: Vec<EventRecord>,
    /// Fee actually charged, in whole tokens
    pub fee: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionReceipt {
    /// Receipt for an extrinsic whose inclusion was not awaited
    pub fn submitted(tx_hash: TxHash) -> Self {
        Self {
            tx_hash,
            block_hash: None,
            block_number: None,
            status: ReceiptStatus::Submitted,
            events: Vec::new(),
            fee: None,
            timestamp: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }

    pub fn find_event(&self, pallet: &str, name: &str) -> Option<&EventRecord> {
        self.events.iter().find(|e| e.is(pallet, name))
    }
}

/// Constants
pub mod constants {
    use super::BlockNumber;

    /// Decimal places of the native token
    pub const CHAIN_DECIMALS: u32 = 18;

    /// Target block time in seconds
    pub const TARGET_BLOCK_TIME_SECS: u64 = 6;

    /// Blocks produced per day at the target block time
    pub const BLOCKS_PER_DAY: BlockNumber = 24 * 60 * 60 / TARGET_BLOCK_TIME_SECS;

    /// Public mainnet RPC endpoint
    pub const MAINNET_URL: &str = "wss://mainnet.creditcoin.network/ws";

    /// Default endpoint of a local development node
    pub const LOCAL_URL: &str = "ws://127.0.0.1:9944";
}
