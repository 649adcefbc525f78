//! Credit pallet call construction
//!
//! Builds the parameter objects for marketplace extrinsics. Amounts go out as
//! 18-decimal integer strings and rates as basis points. All validation
//! happens here, before anything is signed.

use creditcoin_core::{amount, BlockNumber, Error, Result};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::constants::{
    ACCEPT_ASK_ORDER, ACCEPT_BID_ORDER, CREATE_ASK_ORDER, CREATE_BID_ORDER, REPAY_LOAN,
};
use crate::state::{LoanTerms, OrderType};

/// A composed-but-unsigned `Credit` call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub function: &'static str,
    pub params: Value,
}

/// Request to place an ask or bid order
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub terms: LoanTerms,
    /// Blocks from inclusion until the order lapses
    pub expiry_in_blocks: BlockNumber,
}

/// Build a `create_ask_order` / `create_bid_order` call
pub fn build_create_order(request: &CreateOrderRequest) -> Result<CallRequest> {
    let terms = &request.terms;
    terms.validate()?;

    if request.expiry_in_blocks == 0 {
        return Err(Error::invalid_terms("order expiry must be at least one block"));
    }

    let mut params = json!({
        "principal": amount::to_wire(terms.principal)?.to_string(),
        "interest_rate": amount::rate_to_basis_points(terms.interest_rate)?,
        "duration": terms.duration_days,
        "collateral_required": terms.collateral_required,
        "expiry": request.expiry_in_blocks,
    });

    if let Some(collateral) = terms.effective_collateral() {
        params["collateral_amount"] = json!(amount::to_wire(collateral)?.to_string());
    }
    if let Some(days) = terms.grace_period_days {
        params["grace_period"] = json!(days);
    }
    if let Some(percent) = terms.late_fee_percent {
        params["late_fee"] = json!(amount::rate_to_basis_points(percent)?);
    }

    let function = match request.order_type {
        OrderType::Ask => CREATE_ASK_ORDER,
        OrderType::Bid => CREATE_BID_ORDER,
    };

    Ok(CallRequest { function, params })
}

/// Build an `accept_ask_order` / `accept_bid_order` call
pub fn build_accept_order(order_id: &str, order_type: OrderType) -> Result<CallRequest> {
    let order_id = order_id.trim();
    if order_id.is_empty() {
        return Err(Error::invalid_terms("order id must not be empty"));
    }

    let function = match order_type {
        OrderType::Ask => ACCEPT_ASK_ORDER,
        OrderType::Bid => ACCEPT_BID_ORDER,
    };

    Ok(CallRequest {
        function,
        params: json!({ "order_id": order_id }),
    })
}

/// Build a `repay_loan` call
pub fn build_repay(deal_id: &str, repay_amount: Decimal) -> Result<CallRequest> {
    let deal_id = deal_id.trim();
    if deal_id.is_empty() {
        return Err(Error::invalid_terms("deal id must not be empty"));
    }
    if repay_amount <= Decimal::ZERO {
        return Err(Error::invalid_amount(format!(
            "repayment must be positive, got {}",
            repay_amount
        )));
    }

    let raw = amount::to_wire(repay_amount)?;
    if raw == 0 {
        return Err(Error::invalid_amount(format!(
            "repayment {} is below the smallest unit",
            repay_amount
        )));
    }

    Ok(CallRequest {
        function: REPAY_LOAN,
        params: json!({
            "deal_id": deal_id,
            "amount": raw.to_string(),
        }),
    })
}
