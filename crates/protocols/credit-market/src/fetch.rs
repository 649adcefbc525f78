//! Marketplace discovery via storage reads
//!
//! Enumerates the `Credit` storage maps, decodes each record into the model,
//! and filters client-side. A record that fails to decode is logged and
//! skipped so one bad entry never hides the rest of the book.

use std::str::FromStr;

use chain_client::{ChainClient, StorageEntry};
use creditcoin_core::amount::{self, wire_amount};
use creditcoin_core::{Address, BlockNumber, Error, ProtocolError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::{ASK_ORDERS, BID_ORDERS, DEALS, PALLET};
use crate::state::{
    Deal, DealFilter, DealStatus, LoanTerms, MarketSnapshot, Order, OrderFilter, OrderStatus,
    OrderType,
};

/// Order record as stored under `Credit.AskOrders` / `Credit.BidOrders`
#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(default)]
    lender: Option<String>,
    #[serde(default)]
    borrower: Option<String>,
    #[serde(with = "wire_amount")]
    principal: u128,
    /// Basis points
    interest_rate: u32,
    duration: u32,
    #[serde(default)]
    collateral_required: bool,
    #[serde(default, with = "wire_amount::option")]
    collateral_amount: Option<u128>,
    #[serde(default)]
    grace_period: Option<u32>,
    /// Basis points
    #[serde(default)]
    late_fee: Option<u32>,
    expiry: BlockNumber,
    status: String,
    created_block: BlockNumber,
    #[serde(default, with = "wire_amount::option")]
    filled_amount: Option<u128>,
}

/// Deal record as stored under `Credit.Deals`
#[derive(Debug, Deserialize)]
struct RawDeal {
    #[serde(deserialize_with = "id_string")]
    ask_order_id: String,
    #[serde(deserialize_with = "id_string")]
    bid_order_id: String,
    lender: String,
    borrower: String,
    #[serde(with = "wire_amount")]
    principal: u128,
    interest_rate: u32,
    duration: u32,
    #[serde(default)]
    collateral_required: bool,
    #[serde(default, with = "wire_amount::option")]
    collateral_amount: Option<u128>,
    #[serde(default)]
    grace_period: Option<u32>,
    #[serde(default)]
    late_fee: Option<u32>,
    #[serde(with = "wire_amount")]
    amount: u128,
    status: String,
    created_block: BlockNumber,
    #[serde(default)]
    start_block: Option<BlockNumber>,
    #[serde(default)]
    end_block: Option<BlockNumber>,
    #[serde(default, with = "wire_amount::option")]
    repaid_amount: Option<u128>,
}

/// Order ids may be stored as strings or integers
fn id_string<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected order id, got {}",
            other
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_terms(
    principal: u128,
    interest_rate: u32,
    duration: u32,
    collateral_required: bool,
    collateral_amount: Option<u128>,
    grace_period: Option<u32>,
    late_fee: Option<u32>,
) -> Result<LoanTerms> {
    let collateral_amount = if collateral_required {
        collateral_amount.map(amount::from_wire).transpose()?
    } else {
        None
    };

    Ok(LoanTerms {
        principal: amount::from_wire(principal)?,
        interest_rate: amount::basis_points_to_rate(interest_rate),
        duration_days: duration,
        collateral_required,
        collateral_amount,
        grace_period_days: grace_period,
        late_fee_percent: late_fee.map(amount::basis_points_to_rate),
    })
}

fn decode_error(record: &'static str, key: &str, message: impl ToString) -> Error {
    ProtocolError::RecordDecode {
        record,
        key: key.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Decode one order entry
pub fn decode_order(entry: &StorageEntry, order_type: OrderType) -> Result<Order> {
    let record = match order_type {
        OrderType::Ask => ASK_ORDERS,
        OrderType::Bid => BID_ORDERS,
    };
    let raw: RawOrder =
        serde_json::from_value(entry.value.clone()).map_err(|e| decode_error(record, &entry.key, e))?;

    let owner = match order_type {
        OrderType::Ask => raw.lender,
        OrderType::Bid => raw.borrower,
    }
    .ok_or_else(|| decode_error(record, &entry.key, "missing owner address"))?;

    let status =
        OrderStatus::from_str(&raw.status).map_err(|e| decode_error(record, &entry.key, e))?;

    let terms = decode_terms(
        raw.principal,
        raw.interest_rate,
        raw.duration,
        raw.collateral_required,
        raw.collateral_amount,
        raw.grace_period,
        raw.late_fee,
    )
    .map_err(|e| decode_error(record, &entry.key, e))?;

    let filled_amount = match raw.filled_amount {
        Some(v) => amount::from_wire(v).map_err(|e| decode_error(record, &entry.key, e))?,
        None => Decimal::ZERO,
    };

    Ok(Order {
        order_id: entry.key.clone(),
        order_type,
        owner: Address::new(owner),
        terms,
        expiry_block: raw.expiry,
        status,
        created_block: raw.created_block,
        filled_amount,
    })
}

/// Decode one deal entry
pub fn decode_deal(entry: &StorageEntry) -> Result<Deal> {
    let raw: RawDeal =
        serde_json::from_value(entry.value.clone()).map_err(|e| decode_error(DEALS, &entry.key, e))?;

    let status =
        DealStatus::from_str(&raw.status).map_err(|e| decode_error(DEALS, &entry.key, e))?;

    let terms = decode_terms(
        raw.principal,
        raw.interest_rate,
        raw.duration,
        raw.collateral_required,
        raw.collateral_amount,
        raw.grace_period,
        raw.late_fee,
    )
    .map_err(|e| decode_error(DEALS, &entry.key, e))?;

    let amount = amount::from_wire(raw.amount).map_err(|e| decode_error(DEALS, &entry.key, e))?;
    let repaid_amount = match raw.repaid_amount {
        Some(v) => amount::from_wire(v).map_err(|e| decode_error(DEALS, &entry.key, e))?,
        None => Decimal::ZERO,
    };

    if repaid_amount > amount {
        tracing::warn!(
            deal_id = %entry.key,
            amount = %amount,
            repaid = %repaid_amount,
            "Deal on chain records more repaid than owed"
        );
    }

    Ok(Deal {
        deal_id: entry.key.clone(),
        ask_order_id: raw.ask_order_id,
        bid_order_id: raw.bid_order_id,
        lender: Address::new(raw.lender),
        borrower: Address::new(raw.borrower),
        terms,
        amount,
        status,
        created_block: raw.created_block,
        start_block: raw.start_block,
        end_block: raw.end_block,
        repaid_amount,
    })
}

/// List ask orders (lend offers) matching `filter`
pub async fn list_ask_orders(client: &ChainClient, filter: &OrderFilter) -> Result<Vec<Order>> {
    list_orders(client, OrderType::Ask, filter).await
}

/// List bid orders (borrow requests) matching `filter`
pub async fn list_bid_orders(client: &ChainClient, filter: &OrderFilter) -> Result<Vec<Order>> {
    list_orders(client, OrderType::Bid, filter).await
}

async fn list_orders(
    client: &ChainClient,
    order_type: OrderType,
    filter: &OrderFilter,
) -> Result<Vec<Order>> {
    let storage = match order_type {
        OrderType::Ask => ASK_ORDERS,
        OrderType::Bid => BID_ORDERS,
    };
    let entries = client.query_map(PALLET, storage).await?;

    let mut orders = Vec::with_capacity(entries.len());
    for entry in &entries {
        match decode_order(entry, order_type) {
            Ok(order) => {
                if filter.matches(&order) {
                    orders.push(order);
                }
            }
            Err(e) => {
                tracing::warn!(
                    storage = storage,
                    key = %entry.key,
                    error = %e,
                    "Skipping undecodable order record"
                );
            }
        }
    }

    tracing::debug!(
        order_type = %order_type,
        total = entries.len(),
        matched = orders.len(),
        "Listed orders"
    );
    Ok(orders)
}

/// List deals matching `filter`
pub async fn list_deals(client: &ChainClient, filter: &DealFilter) -> Result<Vec<Deal>> {
    let entries = client.query_map(PALLET, DEALS).await?;

    let mut deals = Vec::with_capacity(entries.len());
    for entry in &entries {
        match decode_deal(entry) {
            Ok(deal) => {
                if filter.matches(&deal) {
                    deals.push(deal);
                }
            }
            Err(e) => {
                tracing::warn!(
                    key = %entry.key,
                    error = %e,
                    "Skipping undecodable deal record"
                );
            }
        }
    }
    Ok(deals)
}

async fn get_entry(client: &ChainClient, storage: &str, key: &str) -> Result<Option<StorageEntry>> {
    let value = client
        .query(PALLET, storage, &[Value::String(key.to_string())])
        .await?;
    Ok(value.filter(|v| !v.is_null()).map(|value| StorageEntry {
        key: key.to_string(),
        value,
    }))
}

/// Look up one ask order; `None` when absent
pub async fn get_ask_order(client: &ChainClient, order_id: &str) -> Result<Option<Order>> {
    get_entry(client, ASK_ORDERS, order_id)
        .await?
        .map(|entry| decode_order(&entry, OrderType::Ask))
        .transpose()
}

/// Look up one bid order; `None` when absent
pub async fn get_bid_order(client: &ChainClient, order_id: &str) -> Result<Option<Order>> {
    get_entry(client, BID_ORDERS, order_id)
        .await?
        .map(|entry| decode_order(&entry, OrderType::Bid))
        .transpose()
}

/// Look up one deal; `None` when absent
pub async fn get_deal(client: &ChainClient, deal_id: &str) -> Result<Option<Deal>> {
    get_entry(client, DEALS, deal_id)
        .await?
        .map(|entry| decode_deal(&entry))
        .transpose()
}

/// Deals created from `order_id`, on either side
pub async fn deals_for_order(client: &ChainClient, order_id: &str) -> Result<Vec<Deal>> {
    let deals = list_deals(client, &DealFilter::default()).await?;
    Ok(deals
        .into_iter()
        .filter(|d| d.references_order(order_id))
        .collect())
}

/// Fetch the whole marketplace in one pass.
///
/// With `user_address`, orders are limited to that owner and deals to those
/// the address participates in.
pub async fn fetch_market(
    client: &ChainClient,
    user_address: Option<&Address>,
) -> Result<MarketSnapshot> {
    let block_number = client.current_block_number().await?;

    let order_filter = OrderFilter {
        owner: user_address.cloned(),
        status: None,
    };
    let deal_filter = DealFilter {
        participant: user_address.cloned(),
        status: None,
    };

    let ask_orders = list_ask_orders(client, &order_filter).await?;
    let bid_orders = list_bid_orders(client, &order_filter).await?;
    let deals = list_deals(client, &deal_filter).await?;

    tracing::info!(
        block = block_number,
        asks = ask_orders.len(),
        bids = bid_orders.len(),
        deals = deals.len(),
        "Fetched credit market"
    );

    Ok(MarketSnapshot {
        ask_orders,
        bid_orders,
        deals,
        block_number,
    })
}
