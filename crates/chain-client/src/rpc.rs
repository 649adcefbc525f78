//! Chain RPC capability
//!
//! Everything the SDK needs from a Substrate node: storage reads, call
//! composition, signing, submission, events, and block metadata. Wire encoding
//! lives behind this trait; values cross it as JSON.

use std::sync::Arc;

use async_trait::async_trait;
use creditcoin_core::amount::wire_amount;
use creditcoin_core::{Address, BlockNumber, EventRecord, Keypair, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// One entry of a storage map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Decoded map key (order id, deal id, account id)
    pub key: String,
    pub value: Value,
}

/// A composed runtime call, not yet signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub pallet: String,
    pub function: String,
    pub params: Value,
}

impl Call {
    pub fn name(&self) -> String {
        format!("{}.{}", self.pallet, self.function)
    }
}

/// A signed extrinsic ready for submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedExtrinsic {
    pub hash: TxHash,
    pub signer: Address,
    pub nonce: u64,
    pub call: Call,
    /// Encoded extrinsic bytes as produced by the backend
    pub encoded: Vec<u8>,
}

/// Node response to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub extrinsic_hash: TxHash,
    pub block_hash: Option<String>,
    pub block_number: Option<BlockNumber>,
    /// Position of the extrinsic within its block
    pub extrinsic_index: Option<u32>,
    pub is_success: bool,
    pub error_message: Option<String>,
}

/// Fee estimate for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(with = "wire_amount")]
    pub partial_fee: u128,
    #[serde(default)]
    pub weight: u64,
}

/// Block header plus extrinsic count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
    pub extrinsic_count: u32,
    /// Block author, when the node reports one
    #[serde(default)]
    pub author: Option<String>,
}

/// Chain properties reported by `system_properties`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProperties {
    pub ss58_format: u16,
    pub token_decimals: u32,
    pub token_symbol: String,
}

impl Default for ChainProperties {
    fn default() -> Self {
        Self {
            ss58_format: 42,
            token_decimals: 18,
            token_symbol: "CTC".to_string(),
        }
    }
}

/// Node RPC capability.
///
/// Implementations own the connection and the wire encoding. All failures are
/// reported as `NetworkError`; callers decide how they map to SDK errors.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Read a single storage value; `None` when the key is absent
    async fn query(&self, module: &str, storage: &str, params: &[Value]) -> Result<Option<Value>>;

    /// Enumerate a storage map. Order is backend-defined.
    async fn query_map(&self, module: &str, storage: &str) -> Result<Vec<StorageEntry>>;

    async fn compose_call(&self, module: &str, function: &str, params: Value) -> Result<Call>;

    async fn create_signed_extrinsic(&self, call: &Call, keypair: &Keypair)
        -> Result<SignedExtrinsic>;

    async fn submit_extrinsic(
        &self,
        extrinsic: &SignedExtrinsic,
        wait_for_inclusion: bool,
    ) -> Result<SubmissionResult>;

    async fn get_events(&self, block_hash: &str) -> Result<Vec<EventRecord>>;

    async fn get_payment_info(&self, call: &Call, keypair: &Keypair) -> Result<PaymentInfo>;

    /// Block timestamp in milliseconds since the epoch
    async fn get_block_timestamp(&self, block_hash: &str) -> Result<u64>;

    /// Header of block `number`, or of the best block when `None`
    async fn get_block(&self, number: Option<BlockNumber>) -> Result<BlockHeader>;

    async fn properties(&self) -> Result<ChainProperties>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens [`ChainRpc`] connections
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainRpc>>;
}
