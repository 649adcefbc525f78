//! In-memory simulated chain
//!
//! Implements [`ChainRpc`] over plain maps so the SDK can be driven without a
//! node. Covers `System`, `Balances`, `Timestamp`, `Session`, and the `Credit`
//! marketplace pallet. Every submitted extrinsic produces one block holding
//! the timestamp inherent (index 0) and the extrinsic (index 1); fees are
//! charged up front and nonces are enforced.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use creditcoin_core::amount::{self, wire_amount};
use creditcoin_core::constants::{BLOCKS_PER_DAY, TARGET_BLOCK_TIME_SECS};
use creditcoin_core::{Address, BlockNumber, EventRecord, Keypair, NetworkError, TxHash};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::keys::{KeyBackend, Sr25519Backend};
use crate::rpc::{
    BlockHeader, Call, ChainConnector, ChainProperties, ChainRpc, PaymentInfo, SignedExtrinsic,
    StorageEntry, SubmissionResult,
};
use crate::Result;

type Blake2b256 = Blake2b<U32>;

const SIMULATED_URL: &str = "sim://creditcoin-dev";
const GENESIS_TIMESTAMP_MS: u64 = 1_700_000_000_000;
/// 0.01 CTC
const DEFAULT_FEE: u128 = 10_000_000_000_000_000;
const CALL_WEIGHT: u64 = 150_000_000;

const CREDIT: &str = "Credit";
const ASK_ORDERS: &str = "AskOrders";
const BID_ORDERS: &str = "BidOrders";
const DEALS: &str = "Deals";

const KNOWN_CALLS: &[(&str, &str)] = &[
    ("Balances", "transfer"),
    ("Balances", "transfer_allow_death"),
    ("Balances", "transfer_keep_alive"),
    ("Credit", "create_ask_order"),
    ("Credit", "create_bid_order"),
    ("Credit", "accept_ask_order"),
    ("Credit", "accept_bid_order"),
    ("Credit", "repay_loan"),
];

/// Events emitted by a successful dispatch, or the module error text
type DispatchResult = std::result::Result<Vec<(&'static str, &'static str, Value)>, String>;

#[derive(Debug, Clone, Default)]
struct SimAccount {
    nonce: u64,
    free: u128,
    reserved: u128,
    frozen: u128,
}

impl SimAccount {
    fn spendable(&self) -> u128 {
        self.free.saturating_sub(self.frozen)
    }

    fn to_json(&self) -> Value {
        json!({
            "nonce": self.nonce,
            "consumers": 0,
            "providers": 1,
            "sufficients": 0,
            "data": {
                "free": self.free.to_string(),
                "reserved": self.reserved.to_string(),
                "frozen": self.frozen.to_string(),
                "flags": "0x80000000000000000000000000000000",
            }
        })
    }
}

#[derive(Debug, Clone)]
struct SimBlock {
    header: BlockHeader,
    timestamp_ms: u64,
    events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ask,
    Bid,
}

impl Side {
    fn map(self) -> &'static str {
        match self {
            Side::Ask => ASK_ORDERS,
            Side::Bid => BID_ORDERS,
        }
    }

    fn owner_field(self) -> &'static str {
        match self {
            Side::Ask => "lender",
            Side::Bid => "borrower",
        }
    }

    fn counter(self) -> Side {
        match self {
            Side::Ask => Side::Bid,
            Side::Bid => Side::Ask,
        }
    }
}

struct SimState {
    accounts: BTreeMap<String, SimAccount>,
    maps: BTreeMap<(String, String), BTreeMap<String, Value>>,
    /// Never empty: genesis is pushed on construction
    blocks: Vec<SimBlock>,
    validators: Vec<String>,
    fee: u128,
    pending_failure: Option<String>,
    offline: bool,
    closed: bool,
    submissions: usize,
    id_seq: u64,
}

impl SimState {
    fn genesis() -> Self {
        let mut state = Self {
            accounts: BTreeMap::new(),
            maps: BTreeMap::new(),
            blocks: Vec::new(),
            validators: Vec::new(),
            fee: DEFAULT_FEE,
            pending_failure: None,
            offline: false,
            closed: false,
            submissions: 0,
            id_seq: 0,
        };
        state.push_block(Vec::new(), Vec::new());
        state
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline || self.closed {
            return Err(NetworkError::Unreachable {
                url: SIMULATED_URL.to_string(),
            });
        }
        Ok(())
    }

    fn best(&self) -> &SimBlock {
        &self.blocks[self.blocks.len() - 1]
    }

    fn best_number(&self) -> BlockNumber {
        self.best().header.number
    }

    fn block_by_hash(&self, hash: &str) -> Result<&SimBlock> {
        self.blocks
            .iter()
            .find(|b| b.header.hash == hash)
            .ok_or_else(|| NetworkError::Rpc {
                message: format!("Block {} not found", hash),
            })
    }

    /// Append a block. `extrinsics` excludes the timestamp inherent, which
    /// is always at index 0.
    fn push_block(&mut self, extrinsics: Vec<String>, events: Vec<EventRecord>) -> BlockHeader {
        let number = self.blocks.len() as BlockNumber;
        let parent_hash = self
            .blocks
            .last()
            .map(|b| b.header.hash.clone())
            .unwrap_or_else(|| format!("0x{}", "00".repeat(32)));
        let timestamp_ms = GENESIS_TIMESTAMP_MS + number * TARGET_BLOCK_TIME_SECS * 1000;

        let extrinsics_root = hash_hex(extrinsics.join(",").as_bytes());
        let state_root = hash_hex(format!("state:{}:{}", number, self.submissions).as_bytes());
        let hash = hash_hex(
            format!("{}:{}:{}:{}", number, parent_hash, extrinsics_root, timestamp_ms).as_bytes(),
        );

        let mut block_events = vec![event("System", "ExtrinsicSuccess", json!({}), 0)];
        block_events.extend(events);

        // round-robin over the session validators
        let author = match self.validators.len() {
            0 => None,
            len => self.validators.get((number % len as u64) as usize).cloned(),
        };

        let header = BlockHeader {
            number,
            hash,
            parent_hash,
            state_root,
            extrinsics_root,
            extrinsic_count: extrinsics.len() as u32 + 1,
            author,
        };
        self.blocks.push(SimBlock {
            header: header.clone(),
            timestamp_ms,
            events: block_events,
        });
        header
    }

    fn map(&self, pallet: &str, item: &str) -> Option<&BTreeMap<String, Value>> {
        self.maps.get(&(pallet.to_string(), item.to_string()))
    }

    fn map_mut(&mut self, pallet: &str, item: &str) -> &mut BTreeMap<String, Value> {
        self.maps
            .entry((pallet.to_string(), item.to_string()))
            .or_default()
    }

    fn account_mut(&mut self, address: &str) -> &mut SimAccount {
        self.accounts.entry(address.to_string()).or_default()
    }

    fn spendable(&self, address: &str) -> u128 {
        self.accounts
            .get(address)
            .map(SimAccount::spendable)
            .unwrap_or(0)
    }

    fn move_funds(&mut self, from: &str, to: &str, value: u128) {
        let sender = self.account_mut(from);
        sender.free = sender.free.saturating_sub(value);
        let receiver = self.account_mut(to);
        receiver.free = receiver.free.saturating_add(value);
    }

    fn next_id(&mut self, number: BlockNumber) -> String {
        self.id_seq += 1;
        let digest = hash_hex(format!("{}:{}", number, self.id_seq).as_bytes());
        format!("{}-{}", number, &digest[2..10])
    }

    /// Mark active orders whose expiry block has passed
    fn expire_orders(&mut self, number: BlockNumber) {
        for side in [Side::Ask, Side::Bid] {
            for record in self.map_mut(CREDIT, side.map()).values_mut() {
                let expired = record["expiry"].as_u64().is_some_and(|e| e < number);
                if expired && record["status"] == "active" {
                    record["status"] = json!("expired");
                }
            }
        }
    }
}

/// In-memory chain implementing [`ChainRpc`]
pub struct SimulatedChain {
    state: Mutex<SimState>,
    keys: Sr25519Backend,
    properties: ChainProperties,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::genesis()),
            keys: Sr25519Backend,
            properties: ChainProperties::default(),
        }
    }

    /// Credit `amount` tokens to an account's free balance
    pub fn endow(&self, address: &Address, amount: Decimal) -> creditcoin_core::Result<()> {
        let raw = amount::to_wire(amount)?;
        let mut state = self.state.lock();
        let account = state.account_mut(address.as_str());
        account.free = account.free.saturating_add(raw);
        Ok(())
    }

    /// Freeze part of an account's free balance
    pub fn freeze(&self, address: &Address, amount: Decimal) -> creditcoin_core::Result<()> {
        let raw = amount::to_wire(amount)?;
        self.state.lock().account_mut(address.as_str()).frozen = raw;
        Ok(())
    }

    /// Flat fee charged per extrinsic
    pub fn set_fee(&self, fee: Decimal) -> creditcoin_core::Result<()> {
        let raw = amount::to_wire(fee)?;
        self.state.lock().fee = raw;
        Ok(())
    }

    pub fn set_validators(&self, validators: Vec<String>) {
        self.state.lock().validators = validators;
    }

    /// Write a raw storage map entry, bypassing dispatch
    pub fn insert_raw_entry(&self, pallet: &str, item: &str, key: &str, value: Value) {
        self.state
            .lock()
            .map_mut(pallet, item)
            .insert(key.to_string(), value);
    }

    /// Reject the next submission at the pool with `message`
    pub fn fail_next_submission(&self, message: impl Into<String>) {
        self.state.lock().pending_failure = Some(message.into());
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Extrinsics that reached the node, accepted or not
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Produce `count` empty blocks
    pub fn advance_blocks(&self, count: u64) {
        let mut state = self.state.lock();
        for _ in 0..count {
            let number = state.best_number() + 1;
            state.expire_orders(number);
            state.push_block(Vec::new(), Vec::new());
        }
    }

    pub fn best_block_number(&self) -> BlockNumber {
        self.state.lock().best_number()
    }

    /// (free, reserved) in base units
    pub fn balance_of(&self, address: &Address) -> (u128, u128) {
        self.state
            .lock()
            .accounts
            .get(address.as_str())
            .map(|a| (a.free, a.reserved))
            .unwrap_or((0, 0))
    }
}

#[async_trait]
impl ChainRpc for SimulatedChain {
    async fn query(&self, module: &str, storage: &str, params: &[Value]) -> Result<Option<Value>> {
        let state = self.state.lock();
        state.ensure_online()?;
        let key = params.first().map(value_key);

        let value = match (module, storage) {
            ("System", "Account") => key
                .and_then(|k| state.accounts.get(&k))
                .map(SimAccount::to_json),
            ("System", "Number") => Some(json!(state.best_number())),
            ("Timestamp", "Now") => Some(json!(state.best().timestamp_ms)),
            ("Session", "Validators") => Some(json!(state.validators)),
            _ => key.and_then(|k| state.map(module, storage).and_then(|m| m.get(&k)).cloned()),
        };
        Ok(value)
    }

    async fn query_map(&self, module: &str, storage: &str) -> Result<Vec<StorageEntry>> {
        let state = self.state.lock();
        state.ensure_online()?;

        let entries = match (module, storage) {
            ("System", "Account") => state
                .accounts
                .iter()
                .map(|(k, a)| StorageEntry {
                    key: k.clone(),
                    value: a.to_json(),
                })
                .collect(),
            _ => state
                .map(module, storage)
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| StorageEntry {
                            key: k.clone(),
                            value: v.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        Ok(entries)
    }

    async fn compose_call(&self, module: &str, function: &str, params: Value) -> Result<Call> {
        self.state.lock().ensure_online()?;

        if !KNOWN_CALLS.contains(&(module, function)) {
            return Err(NetworkError::Rpc {
                message: format!("Call function {}.{} not found in metadata", module, function),
            });
        }
        if !params.is_object() {
            return Err(NetworkError::Rpc {
                message: format!("Call params for {}.{} must be an object", module, function),
            });
        }

        Ok(Call {
            pallet: module.to_string(),
            function: function.to_string(),
            params,
        })
    }

    async fn create_signed_extrinsic(
        &self,
        call: &Call,
        keypair: &Keypair,
    ) -> Result<SignedExtrinsic> {
        let nonce = {
            let state = self.state.lock();
            state.ensure_online()?;
            state
                .accounts
                .get(keypair.address.as_str())
                .map(|a| a.nonce)
                .unwrap_or(0)
        };

        let (public, _) = self
            .keys
            .decode_address(keypair.address.as_str())
            .map_err(|e| NetworkError::Rpc {
                message: e.to_string(),
            })?;
        if public != keypair.public_key {
            return Err(NetworkError::Rpc {
                message: "signer address does not match public key".to_string(),
            });
        }

        let payload = serde_json::to_vec(&json!({
            "call": call,
            "nonce": nonce,
            "signer": keypair.address,
        }))
        .map_err(|e| NetworkError::Rpc {
            message: e.to_string(),
        })?;
        let signature = self
            .keys
            .sign(keypair, &payload)
            .map_err(|e| NetworkError::Rpc {
                message: e.to_string(),
            })?;

        let mut encoded = payload;
        encoded.extend_from_slice(&signature);
        let hash = TxHash::new(hash_hex(&encoded));

        Ok(SignedExtrinsic {
            hash,
            signer: keypair.address.clone(),
            nonce,
            call: call.clone(),
            encoded,
        })
    }

    async fn submit_extrinsic(
        &self,
        extrinsic: &SignedExtrinsic,
        wait_for_inclusion: bool,
    ) -> Result<SubmissionResult> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        state.submissions += 1;

        if let Some(message) = state.pending_failure.take() {
            return Err(NetworkError::Rpc { message });
        }

        let signer = extrinsic.signer.to_string();
        let (nonce, spendable) = state
            .accounts
            .get(&signer)
            .map(|a| (a.nonce, a.spendable()))
            .unwrap_or((0, 0));
        if extrinsic.nonce < nonce {
            return Err(NetworkError::Rpc {
                message: "1010: Invalid Transaction: Transaction is outdated".to_string(),
            });
        }
        if extrinsic.nonce > nonce {
            return Err(NetworkError::Rpc {
                message: "1010: Invalid Transaction: Transaction will be valid in the future"
                    .to_string(),
            });
        }
        let fee = state.fee;
        if spendable < fee {
            return Err(NetworkError::Rpc {
                message:
                    "1010: Invalid Transaction: Inability to pay some fees , e.g. account balance too low"
                        .to_string(),
            });
        }

        let account = state.account_mut(&signer);
        account.free -= fee;
        account.nonce += 1;

        let number = state.best_number() + 1;
        state.expire_orders(number);

        let outcome = dispatch(&mut state, &self.keys, &extrinsic.call, &signer, number);
        let fee_paid = event(
            "TransactionPayment",
            "TransactionFeePaid",
            json!({"who": signer, "actual_fee": fee.to_string(), "tip": "0"}),
            1,
        );

        let (events, error_message) = match outcome {
            Ok(emitted) => {
                let mut events: Vec<EventRecord> = emitted
                    .into_iter()
                    .map(|(pallet, name, attrs)| event(pallet, name, attrs, 1))
                    .collect();
                events.push(fee_paid);
                events.push(event("System", "ExtrinsicSuccess", json!({}), 1));
                (events, None)
            }
            Err(message) => {
                tracing::debug!(
                    call = %extrinsic.call.name(),
                    error = %message,
                    "Simulated dispatch failed"
                );
                let failed = event(
                    "System",
                    "ExtrinsicFailed",
                    json!({"dispatch_error": message}),
                    1,
                );
                (vec![fee_paid, failed], Some(message))
            }
        };

        let header = state.push_block(vec![extrinsic.hash.to_string()], events);

        if !wait_for_inclusion {
            return Ok(SubmissionResult {
                extrinsic_hash: extrinsic.hash.clone(),
                block_hash: None,
                block_number: None,
                extrinsic_index: None,
                is_success: true,
                error_message: None,
            });
        }

        Ok(SubmissionResult {
            extrinsic_hash: extrinsic.hash.clone(),
            block_hash: Some(header.hash),
            block_number: Some(header.number),
            extrinsic_index: Some(1),
            is_success: error_message.is_none(),
            error_message,
        })
    }

    async fn get_events(&self, block_hash: &str) -> Result<Vec<EventRecord>> {
        let state = self.state.lock();
        state.ensure_online()?;
        Ok(state.block_by_hash(block_hash)?.events.clone())
    }

    async fn get_payment_info(&self, _call: &Call, _keypair: &Keypair) -> Result<PaymentInfo> {
        let state = self.state.lock();
        state.ensure_online()?;
        Ok(PaymentInfo {
            partial_fee: state.fee,
            weight: CALL_WEIGHT,
        })
    }

    async fn get_block_timestamp(&self, block_hash: &str) -> Result<u64> {
        let state = self.state.lock();
        state.ensure_online()?;
        Ok(state.block_by_hash(block_hash)?.timestamp_ms)
    }

    async fn get_block(&self, number: Option<BlockNumber>) -> Result<BlockHeader> {
        let state = self.state.lock();
        state.ensure_online()?;
        match number {
            None => Ok(state.best().header.clone()),
            Some(n) => usize::try_from(n)
                .ok()
                .and_then(|i| state.blocks.get(i))
                .map(|b| b.header.clone())
                .ok_or_else(|| NetworkError::Rpc {
                    message: format!("Block {} not found", n),
                }),
        }
    }

    async fn properties(&self) -> Result<ChainProperties> {
        self.state.lock().ensure_online()?;
        Ok(self.properties.clone())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Connector handing out a shared [`SimulatedChain`]
#[derive(Clone)]
pub struct SimulatedConnector {
    chain: Arc<SimulatedChain>,
}

impl SimulatedConnector {
    pub fn new(chain: Arc<SimulatedChain>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<SimulatedChain> {
        &self.chain
    }
}

#[async_trait]
impl ChainConnector for SimulatedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainRpc>> {
        {
            let mut state = self.chain.state.lock();
            if state.offline {
                return Err(NetworkError::Unreachable {
                    url: endpoint.to_string(),
                });
            }
            state.closed = false;
        }
        let rpc: Arc<dyn ChainRpc> = self.chain.clone();
        Ok(rpc)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch(
    state: &mut SimState,
    keys: &Sr25519Backend,
    call: &Call,
    signer: &str,
    number: BlockNumber,
) -> DispatchResult {
    let params = &call.params;
    match (call.pallet.as_str(), call.function.as_str()) {
        ("Balances", _) => transfer(state, keys, params, signer),
        ("Credit", "create_ask_order") => create_order(state, params, signer, number, Side::Ask),
        ("Credit", "create_bid_order") => create_order(state, params, signer, number, Side::Bid),
        ("Credit", "accept_ask_order") => accept_order(state, params, signer, number, Side::Ask),
        ("Credit", "accept_bid_order") => accept_order(state, params, signer, number, Side::Bid),
        ("Credit", "repay_loan") => repay_loan(state, params, signer),
        _ => Err(format!("{}.CallNotSupported", call.pallet)),
    }
}

fn transfer(
    state: &mut SimState,
    keys: &Sr25519Backend,
    params: &Value,
    signer: &str,
) -> DispatchResult {
    let dest = str_param(params, "dest", "Balances")?;
    let value = amount_param(params, "value", "Balances")?;

    if keys.decode_address(&dest).is_err() {
        return Err("Balances.InvalidDestination".to_string());
    }
    if state.spendable(signer) < value {
        return Err("Balances.InsufficientBalance".to_string());
    }

    state.move_funds(signer, &dest, value);
    Ok(vec![(
        "Balances",
        "Transfer",
        json!({"from": signer, "to": dest, "amount": value.to_string()}),
    )])
}

fn create_order(
    state: &mut SimState,
    params: &Value,
    signer: &str,
    number: BlockNumber,
    side: Side,
) -> DispatchResult {
    let principal = amount_param(params, "principal", CREDIT)?;
    let interest_rate = u64_param(params, "interest_rate")?;
    let duration = u64_param(params, "duration")?;
    let expiry = u64_param(params, "expiry")?;
    let collateral_required = params["collateral_required"].as_bool().unwrap_or(false);
    let collateral_amount = opt_amount(params, "collateral_amount")
        .map_err(|_| "Credit.InvalidParameter(collateral_amount)".to_string())?;

    if principal == 0 {
        return Err("Credit.InvalidPrincipal".to_string());
    }
    if duration == 0 {
        return Err("Credit.InvalidDuration".to_string());
    }
    let expiry_block = match number.checked_add(expiry) {
        Some(block) if expiry > 0 => block,
        _ => return Err("Credit.InvalidExpiry".to_string()),
    };
    if collateral_required && collateral_amount.unwrap_or(0) == 0 {
        return Err("Credit.CollateralRequired".to_string());
    }

    let order_id = state.next_id(number);
    let mut record = order_record(
        side,
        signer,
        principal,
        interest_rate,
        duration,
        collateral_required,
        collateral_amount,
        expiry_block,
        "active",
        number,
        0,
    );
    copy_optional_terms(params, &mut record);
    state
        .map_mut(CREDIT, side.map())
        .insert(order_id.clone(), record);

    let name = match side {
        Side::Ask => "AskOrderAdded",
        Side::Bid => "BidOrderAdded",
    };
    Ok(vec![(
        CREDIT,
        name,
        json!({"order_id": order_id, side.owner_field(): signer}),
    )])
}

fn accept_order(
    state: &mut SimState,
    params: &Value,
    signer: &str,
    number: BlockNumber,
    side: Side,
) -> DispatchResult {
    let order_id = str_param(params, "order_id", CREDIT)?;
    let order = state
        .map(CREDIT, side.map())
        .and_then(|m| m.get(&order_id))
        .cloned()
        .ok_or_else(|| "Credit.OrderNotFound".to_string())?;

    if order["status"] != "active" {
        return Err("Credit.OrderNotActive".to_string());
    }
    let owner = record_str(&order, side.owner_field())?;
    if owner == signer {
        return Err("Credit.CannotAcceptOwnOrder".to_string());
    }

    let (lender, borrower) = match side {
        Side::Ask => (owner, signer.to_string()),
        Side::Bid => (signer.to_string(), owner),
    };
    let principal = record_amount(&order, "principal")?;
    let interest_rate = record_u64(&order, "interest_rate")?;
    let duration = record_u64(&order, "duration")?;
    let end_block = duration
        .checked_mul(BLOCKS_PER_DAY)
        .and_then(|blocks| number.checked_add(blocks))
        .ok_or_else(|| "Credit.InvalidDuration".to_string())?;
    let collateral_required = order["collateral_required"].as_bool().unwrap_or(false);
    let collateral_amount = opt_amount(&order, "collateral_amount")?;
    let collateral = if collateral_required {
        collateral_amount.unwrap_or(0)
    } else {
        0
    };

    if state.spendable(&lender) < principal {
        return Err("Credit.InsufficientLenderBalance".to_string());
    }
    if state.spendable(&borrower) < collateral {
        return Err("Credit.InsufficientCollateral".to_string());
    }
    let interest = simple_interest(principal, interest_rate, duration)?;
    let amount = principal
        .checked_add(interest)
        .ok_or_else(|| "Credit.ArithmeticOverflow".to_string())?;

    state.move_funds(&lender, &borrower, principal);
    if collateral > 0 {
        let account = state.account_mut(&borrower);
        account.free -= collateral;
        account.reserved += collateral;
    }

    if let Some(record) = state.map_mut(CREDIT, side.map()).get_mut(&order_id) {
        record["status"] = json!("filled");
        record["filled_amount"] = json!(principal.to_string());
    }

    let counter_side = side.counter();
    let counter_id = state.next_id(number);
    let mut counter = order_record(
        counter_side,
        signer,
        principal,
        interest_rate,
        duration,
        collateral_required,
        collateral_amount,
        number,
        "filled",
        number,
        principal,
    );
    copy_optional_terms(&order, &mut counter);
    state
        .map_mut(CREDIT, counter_side.map())
        .insert(counter_id.clone(), counter);

    let (ask_order_id, bid_order_id) = match side {
        Side::Ask => (order_id.clone(), counter_id),
        Side::Bid => (counter_id, order_id.clone()),
    };
    let deal_id = state.next_id(number);
    let mut deal = json!({
        "ask_order_id": ask_order_id,
        "bid_order_id": bid_order_id,
        "lender": lender,
        "borrower": borrower,
        "principal": principal.to_string(),
        "interest_rate": interest_rate,
        "duration": duration,
        "collateral_required": collateral_required,
        "collateral_amount": collateral_amount.map(|c| c.to_string()),
        "amount": amount.to_string(),
        "status": "pending",
        "created_block": number,
        "start_block": number,
        "end_block": end_block,
        "repaid_amount": "0",
    });
    copy_optional_terms(&order, &mut deal);
    state.map_mut(CREDIT, DEALS).insert(deal_id.clone(), deal);

    Ok(vec![
        (
            CREDIT,
            "OrderAccepted",
            json!({"order_id": order_id, "accepted_by": signer}),
        ),
        (
            CREDIT,
            "DealCreated",
            json!({
                "deal_id": deal_id,
                "ask_order_id": ask_order_id,
                "bid_order_id": bid_order_id,
                "amount": amount.to_string(),
            }),
        ),
    ])
}

fn repay_loan(state: &mut SimState, params: &Value, signer: &str) -> DispatchResult {
    let deal_id = str_param(params, "deal_id", CREDIT)?;
    let payment = amount_param(params, "amount", CREDIT)?;

    let deal = state
        .map(CREDIT, DEALS)
        .and_then(|m| m.get(&deal_id))
        .cloned()
        .ok_or_else(|| "Credit.DealNotFound".to_string())?;

    if deal["status"] != "pending" {
        return Err("Credit.DealNotActive".to_string());
    }
    let borrower = record_str(&deal, "borrower")?;
    let lender = record_str(&deal, "lender")?;
    if borrower != signer {
        return Err("Credit.NotBorrower".to_string());
    }
    if payment == 0 {
        return Err("Credit.InvalidAmount".to_string());
    }

    let amount = record_amount(&deal, "amount")?;
    let repaid = opt_amount(&deal, "repaid_amount")?.unwrap_or(0);
    let new_repaid = repaid.saturating_add(payment);
    if new_repaid > amount {
        return Err("Credit.RepaymentExceedsDebt".to_string());
    }
    if state.spendable(signer) < payment {
        return Err("Balances.InsufficientBalance".to_string());
    }

    state.move_funds(signer, &lender, payment);
    let completed = new_repaid == amount;
    if completed {
        let collateral = if deal["collateral_required"].as_bool().unwrap_or(false) {
            opt_amount(&deal, "collateral_amount")?.unwrap_or(0)
        } else {
            0
        };
        let account = state.account_mut(&borrower);
        let released = collateral.min(account.reserved);
        account.reserved -= released;
        account.free += released;
    }

    if let Some(record) = state.map_mut(CREDIT, DEALS).get_mut(&deal_id) {
        record["repaid_amount"] = json!(new_repaid.to_string());
        if completed {
            record["status"] = json!("completed");
        }
    }

    let mut events = vec![(
        CREDIT,
        "LoanRepaid",
        json!({
            "deal_id": deal_id,
            "amount": payment.to_string(),
            "remaining": (amount - new_repaid).to_string(),
        }),
    )];
    if completed {
        events.push((CREDIT, "DealCompleted", json!({"deal_id": deal_id})));
    }
    Ok(events)
}

/// `principal * bp * days / (10_000 * 365)`, rounded half up
fn simple_interest(principal: u128, bp: u64, days: u64) -> std::result::Result<u128, String> {
    const DENOMINATOR: u128 = 10_000 * 365;
    principal
        .checked_mul(bp as u128)
        .and_then(|v| v.checked_mul(days as u128))
        .and_then(|v| v.checked_add(DENOMINATOR / 2))
        .map(|v| v / DENOMINATOR)
        .ok_or_else(|| "Credit.ArithmeticOverflow".to_string())
}

/// Carry `grace_period` and `late_fee` over when present
fn copy_optional_terms(from: &Value, to: &mut Value) {
    for field in ["grace_period", "late_fee"] {
        if let Some(v) = from.get(field).filter(|v| !v.is_null()) {
            to[field] = v.clone();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn order_record(
    side: Side,
    owner: &str,
    principal: u128,
    interest_rate: u64,
    duration: u64,
    collateral_required: bool,
    collateral_amount: Option<u128>,
    expiry: BlockNumber,
    status: &str,
    created_block: BlockNumber,
    filled_amount: u128,
) -> Value {
    json!({
        side.owner_field(): owner,
        "principal": principal.to_string(),
        "interest_rate": interest_rate,
        "duration": duration,
        "collateral_required": collateral_required,
        "collateral_amount": collateral_amount.map(|c| c.to_string()),
        "grace_period": null,
        "late_fee": null,
        "expiry": expiry,
        "status": status,
        "created_block": created_block,
        "filled_amount": filled_amount.to_string(),
    })
}

fn event(pallet: &str, name: &str, attributes: Value, index: u32) -> EventRecord {
    EventRecord {
        pallet: pallet.to_string(),
        name: name.to_string(),
        attributes,
        extrinsic_index: Some(index),
    }
}

fn hash_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(Blake2b256::digest(data)))
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_param(params: &Value, name: &str, pallet: &str) -> std::result::Result<String, String> {
    match &params[name] {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(format!("{}.InvalidParameter({})", pallet, name)),
    }
}

fn amount_param(params: &Value, name: &str, pallet: &str) -> std::result::Result<u128, String> {
    wire_amount::deserialize(&params[name])
        .map_err(|_| format!("{}.InvalidParameter({})", pallet, name))
}

fn u64_param(params: &Value, name: &str) -> std::result::Result<u64, String> {
    params[name]
        .as_u64()
        .ok_or_else(|| format!("Credit.InvalidParameter({})", name))
}

fn opt_amount(record: &Value, name: &str) -> std::result::Result<Option<u128>, String> {
    match &record[name] {
        Value::Null => Ok(None),
        value => wire_amount::deserialize(value)
            .map(Some)
            .map_err(|_| format!("Credit.CorruptRecord({})", name)),
    }
}

fn record_str(record: &Value, name: &str) -> std::result::Result<String, String> {
    record[name]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("Credit.CorruptRecord({})", name))
}

fn record_amount(record: &Value, name: &str) -> std::result::Result<u128, String> {
    wire_amount::deserialize(&record[name]).map_err(|_| format!("Credit.CorruptRecord({})", name))
}

fn record_u64(record: &Value, name: &str) -> std::result::Result<u64, String> {
    record[name]
        .as_u64()
        .ok_or_else(|| format!("Credit.CorruptRecord({})", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditcoin_core::AddressFormat;
    use rust_decimal_macros::dec;

    const CTC: u128 = 1_000_000_000_000_000_000;

    fn dev(uri: &str) -> Keypair {
        Sr25519Backend
            .derive_from_uri(uri, AddressFormat::CREDITCOIN)
            .unwrap()
    }

    async fn submit(chain: &SimulatedChain, who: &Keypair, call: Call) -> Result<SubmissionResult> {
        let ext = chain.create_signed_extrinsic(&call, who).await?;
        chain.submit_extrinsic(&ext, true).await
    }

    async fn call(chain: &SimulatedChain, function: &str, params: Value) -> Call {
        chain.compose_call(CREDIT, function, params).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_call_rejected_at_compose() {
        let chain = SimulatedChain::new();
        let err = chain
            .compose_call("Credit", "cancel_everything", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Rpc { .. }));
    }

    #[tokio::test]
    async fn test_fee_charged_and_nonce_bumped() {
        let chain = SimulatedChain::new();
        let alice = dev("//Alice");
        let bob = dev("//Bob");
        chain.endow(&alice.address, dec!(10)).unwrap();

        let transfer = chain
            .compose_call(
                "Balances",
                "transfer_keep_alive",
                json!({"dest": bob.address.as_str(), "value": CTC.to_string()}),
            )
            .await
            .unwrap();
        let result = submit(&chain, &alice, transfer).await.unwrap();
        assert!(result.is_success);
        assert_eq!(result.extrinsic_index, Some(1));

        let (free, _) = chain.balance_of(&alice.address);
        assert_eq!(free, 9 * CTC - DEFAULT_FEE);
        assert_eq!(chain.balance_of(&bob.address).0, CTC);

        let account = chain
            .query("System", "Account", &[json!(alice.address.as_str())])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account["nonce"], 1);
    }

    #[tokio::test]
    async fn test_unfunded_signer_cannot_pay_fees() {
        let chain = SimulatedChain::new();
        let alice = dev("//Alice");
        let order = call(
            &chain,
            "create_ask_order",
            json!({"principal": "1", "interest_rate": 0, "duration": 1, "collateral_required": false, "expiry": 10}),
        )
        .await;

        let err = submit(&chain, &alice, order).await.unwrap_err();
        match err {
            NetworkError::Rpc { message } => assert!(message.contains("Inability to pay some fees")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ask_accept_repay_lifecycle() {
        let chain = SimulatedChain::new();
        let lender = dev("//Alice");
        let borrower = dev("//Bob");
        chain.endow(&lender.address, dec!(2000)).unwrap();
        chain.endow(&borrower.address, dec!(500)).unwrap();

        let create = call(
            &chain,
            "create_ask_order",
            json!({
                "principal": (1000 * CTC).to_string(),
                "interest_rate": 500,
                "duration": 90,
                "collateral_required": true,
                "collateral_amount": (200 * CTC).to_string(),
                "expiry": 14400,
            }),
        )
        .await;
        let result = submit(&chain, &lender, create).await.unwrap();
        assert!(result.is_success);

        let asks = chain.query_map(CREDIT, ASK_ORDERS).await.unwrap();
        assert_eq!(asks.len(), 1);
        let order_id = asks[0].key.clone();
        assert_eq!(asks[0].value["status"], "active");
        assert_eq!(asks[0].value["expiry"], 1 + 14400);

        let accept = call(&chain, "accept_ask_order", json!({"order_id": order_id})).await;
        assert!(submit(&chain, &borrower, accept).await.unwrap().is_success);

        let deals = chain.query_map(CREDIT, DEALS).await.unwrap();
        assert_eq!(deals.len(), 1);
        let deal = &deals[0];
        assert_eq!(deal.value["ask_order_id"], json!(order_id));
        // 1000 * 5% * 90 / 365
        assert_eq!(deal.value["amount"], "1012328767123287671233");
        assert_eq!(chain.balance_of(&borrower.address).1, 200 * CTC);

        let bids = chain.query_map(CREDIT, BID_ORDERS).await.unwrap();
        assert_eq!(bids[0].value["status"], "filled");

        let overpay = call(
            &chain,
            "repay_loan",
            json!({"deal_id": deal.key, "amount": (2000 * CTC).to_string()}),
        )
        .await;
        let result = submit(&chain, &borrower, overpay).await.unwrap();
        assert!(!result.is_success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Credit.RepaymentExceedsDebt")
        );

        let repay = call(
            &chain,
            "repay_loan",
            json!({"deal_id": deal.key, "amount": "1012328767123287671233"}),
        )
        .await;
        assert!(submit(&chain, &borrower, repay).await.unwrap().is_success);

        let deal = chain
            .query(CREDIT, DEALS, &[json!(deal.key)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deal["status"], "completed");
        assert_eq!(chain.balance_of(&borrower.address).1, 0);
    }

    #[tokio::test]
    async fn test_orders_expire() {
        let chain = SimulatedChain::new();
        let alice = dev("//Alice");
        chain.endow(&alice.address, dec!(10)).unwrap();

        let create = call(
            &chain,
            "create_bid_order",
            json!({"principal": CTC.to_string(), "interest_rate": 100, "duration": 7, "collateral_required": false, "expiry": 3}),
        )
        .await;
        submit(&chain, &alice, create).await.unwrap();

        chain.advance_blocks(5);
        let bids = chain.query_map(CREDIT, BID_ORDERS).await.unwrap();
        assert_eq!(bids[0].value["status"], "expired");
    }

    #[tokio::test]
    async fn test_extreme_expiry_and_duration_fail_dispatch() {
        let chain = SimulatedChain::new();
        let lender = dev("//Alice");
        let borrower = dev("//Bob");
        chain.endow(&lender.address, dec!(100)).unwrap();
        chain.endow(&borrower.address, dec!(100)).unwrap();

        let create = call(
            &chain,
            "create_ask_order",
            json!({"principal": CTC.to_string(), "interest_rate": 0, "duration": 1, "expiry": u64::MAX}),
        )
        .await;
        let result = submit(&chain, &lender, create).await.unwrap();
        assert!(!result.is_success);
        assert_eq!(result.error_message.as_deref(), Some("Credit.InvalidExpiry"));
        assert!(chain.query_map(CREDIT, ASK_ORDERS).await.unwrap().is_empty());

        // a stored order whose term cannot fit in block numbers
        chain.insert_raw_entry(
            CREDIT,
            ASK_ORDERS,
            "huge",
            order_record(
                Side::Ask,
                lender.address.as_str(),
                CTC,
                0,
                u64::MAX / 2,
                false,
                None,
                1_000,
                "active",
                0,
                0,
            ),
        );
        let accept = call(&chain, "accept_ask_order", json!({"order_id": "huge"})).await;
        let result = submit(&chain, &borrower, accept).await.unwrap();
        assert_eq!(result.error_message.as_deref(), Some("Credit.InvalidDuration"));
        assert!(chain.query_map(CREDIT, DEALS).await.unwrap().is_empty());
        assert_eq!(chain.balance_of(&borrower.address).0, 100 * CTC - DEFAULT_FEE);

        // the chain keeps working afterwards
        chain.advance_blocks(1);
        assert!(chain.get_block(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_block_author_rotates_over_validators() {
        let chain = SimulatedChain::new();
        assert_eq!(chain.get_block(None).await.unwrap().author, None);

        chain.set_validators(vec!["v0".into(), "v1".into()]);
        chain.advance_blocks(2);
        assert_eq!(chain.get_block(Some(1)).await.unwrap().author.as_deref(), Some("v1"));
        assert_eq!(chain.get_block(Some(2)).await.unwrap().author.as_deref(), Some("v0"));
    }

    #[tokio::test]
    async fn test_events_and_blocks() {
        let chain = SimulatedChain::new();
        let genesis = chain.get_block(Some(0)).await.unwrap();
        chain.advance_blocks(2);
        let best = chain.get_block(None).await.unwrap();
        assert_eq!(best.number, 2);
        assert_ne!(best.hash, genesis.hash);

        let events = chain.get_events(&best.hash).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].extrinsic_index, Some(0));

        let ts0 = chain.get_block_timestamp(&genesis.hash).await.unwrap();
        let ts2 = chain.get_block_timestamp(&best.hash).await.unwrap();
        assert_eq!(ts2 - ts0, 2 * TARGET_BLOCK_TIME_SECS * 1000);

        assert!(chain.get_block(Some(99)).await.is_err());
    }
}
